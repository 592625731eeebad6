//! Reply correlation: one send, exactly one settlement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use evsock::prelude::*;
use evsock::transport::memory::MemoryWebSocketChannel;

fn connect(server: &Server) -> (Socket, Arc<MemoryWebSocketChannel>) {
    let accepted = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&accepted);
    server.on_socket(move |socket| {
        *captured.lock().unwrap() = Some(socket.clone());
    });
    let channel = MemoryWebSocketChannel::new("/evsock");
    server.handle_websocket(channel.clone());
    let socket = accepted.lock().unwrap().take().unwrap();
    (socket, channel)
}

fn envelopes(channel: &MemoryWebSocketChannel) -> Vec<Envelope> {
    channel
        .sent()
        .iter()
        .filter(|frame| !frame.starts_with('?'))
        .map(|frame| Envelope::decode(frame).unwrap())
        .collect()
}

#[tokio::test]
async fn handler_resolution_travels_back_to_the_peer() {
    let server = Server::builder().build();
    let (socket, channel) = connect(&server);
    socket.on("divide", |data, reply| {
        let reply = reply.expect("reply requested");
        let (a, b) = (data["a"].as_f64().unwrap(), data["b"].as_f64().unwrap());
        if b == 0.0 {
            reply.reject(json!("division by zero"));
        } else {
            reply.resolve(json!(a / b));
        }
    });

    let frame = Envelope::new("1", "divide", json!({"a": 6.0, "b": 2.0}))
        .expecting_reply()
        .encode()
        .unwrap();
    channel.emit_text(&frame);

    let sent = envelopes(&channel);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event_type, "reply");
    let outcome: ReplyOutcome = serde_json::from_value(sent[0].data.clone()).unwrap();
    assert_eq!(outcome, ReplyOutcome::resolved("1", json!(3.0)));
}

#[tokio::test]
async fn handler_rejection_is_flagged_as_an_exception() {
    let server = Server::builder().build();
    let (socket, channel) = connect(&server);
    socket.on("divide", |_, reply| {
        reply.expect("reply requested").reject(json!("division by zero"));
    });

    let frame = Envelope::new("7", "divide", json!({"a": 1.0, "b": 0.0}))
        .expecting_reply()
        .encode()
        .unwrap();
    channel.emit_text(&frame);

    let outcome: ReplyOutcome =
        serde_json::from_value(envelopes(&channel)[0].data.clone()).unwrap();
    assert_eq!(outcome, ReplyOutcome::rejected("7", json!("division by zero")));
}

#[tokio::test]
async fn a_reply_settles_at_most_once() {
    let server = Server::builder().build();
    let (socket, channel) = connect(&server);
    socket.on("greedy", |_, reply| {
        let reply = reply.expect("reply requested").clone();
        reply.resolve(json!(1));
        reply.resolve(json!(2));
        reply.reject(json!(3));
    });

    let frame = Envelope::new("1", "greedy", Value::Null)
        .expecting_reply()
        .encode()
        .unwrap();
    channel.emit_text(&frame);

    assert_eq!(envelopes(&channel).len(), 1);
}

#[tokio::test]
async fn no_reply_object_without_the_reply_flag() {
    let server = Server::builder().build();
    let (socket, channel) = connect(&server);
    let saw_reply = Arc::new(Mutex::new(None));
    {
        let saw_reply = Arc::clone(&saw_reply);
        socket.on("plain", move |_, reply| {
            *saw_reply.lock().unwrap() = Some(reply.is_some());
        });
    }

    let frame = Envelope::new("1", "plain", Value::Null).encode().unwrap();
    channel.emit_text(&frame);
    assert_eq!(*saw_reply.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn server_initiated_sends_settle_from_peer_outcomes() {
    let server = Server::builder().build();
    let (socket, channel) = connect(&server);

    let resolved = Arc::new(Mutex::new(None));
    let rejections = Arc::new(AtomicUsize::new(0));
    {
        let resolved = Arc::clone(&resolved);
        let rejections = Arc::clone(&rejections);
        socket.send_expecting_reply(
            "confirm",
            json!("ready?"),
            move |value| *resolved.lock().unwrap() = Some(value.clone()),
            move |_| {
                rejections.fetch_add(1, Ordering::SeqCst);
            },
        );
    }

    let sent = envelopes(&channel);
    assert!(sent[0].reply);

    // Answer the event, then answer it again: the second outcome must find
    // nothing to settle.
    let outcome =
        serde_json::to_value(ReplyOutcome::resolved(sent[0].id.clone(), json!(true))).unwrap();
    let frame = Envelope::new("1", "reply", outcome).encode().unwrap();
    channel.emit_text(&frame);
    channel.emit_text(&frame);

    assert_eq!(*resolved.lock().unwrap(), Some(json!(true)));
    assert_eq!(rejections.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn outcomes_for_unknown_ids_are_ignored() {
    let server = Server::builder().build();
    let (socket, channel) = connect(&server);

    let outcome = serde_json::to_value(ReplyOutcome::resolved("99", Value::Null)).unwrap();
    let frame = Envelope::new("1", "reply", outcome).encode().unwrap();
    channel.emit_text(&frame);

    assert_eq!(socket.state(), TransportState::Open);
    assert!(envelopes(&channel).is_empty());
}
