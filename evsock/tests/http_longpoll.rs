//! End-to-end long-polling flow through the server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use evsock::prelude::*;
use evsock::transport::memory::MemoryHttpExchange;
use evsock::transport::query::format_query;

fn server_capturing_sockets() -> (Server, Arc<Mutex<Vec<Socket>>>) {
    let server = Server::builder().build();
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&accepted);
    server.on_socket(move |socket| {
        captured.lock().unwrap().push(socket.clone());
    });
    (server, accepted)
}

fn open_longpoll(server: &Server, accepted: &Mutex<Vec<Socket>>) -> (Socket, u64) {
    let open = MemoryHttpExchange::get("/evsock?when=open&transport=longpoll");
    server.handle_http(open.clone());
    let socket = accepted.lock().unwrap().last().unwrap().clone();

    // The handshake flushes the opening response as the first frame.
    assert!(open.is_ended());
    let frames = parse_frames(&open.response_body());
    assert_eq!(frames.len(), 1);
    assert!(frames[0].1.starts_with(&format!("?id={}", socket.id())));
    (socket, frames[0].0)
}

fn poll(server: &Server, socket: &Socket, acked: &[u64]) -> Arc<MemoryHttpExchange> {
    let acked: Vec<String> = acked.iter().map(u64::to_string).collect();
    let http = MemoryHttpExchange::get(&format!(
        "/evsock?when=poll&id={}&lastMsgIds={}",
        socket.id(),
        acked.join(",")
    ));
    server.handle_http(http.clone());
    http
}

/// Split a response body into `(msgId, payload)` frames.
fn parse_frames(body: &str) -> Vec<(u64, String)> {
    body.lines()
        .map(|line| {
            let (id, payload) = line.split_once('|').expect("framed as msgId|payload");
            (id.parse().unwrap(), payload.to_string())
        })
        .collect()
}

fn decode_events(frames: &[(u64, String)]) -> Vec<Envelope> {
    frames
        .iter()
        .map(|(_, payload)| Envelope::decode(payload).unwrap())
        .collect()
}

#[tokio::test]
async fn events_end_the_pending_poll() {
    let (server, accepted) = server_capturing_sockets();
    let (socket, handshake_id) = open_longpoll(&server, &accepted);

    let pending = poll(&server, &socket, &[handshake_id]);
    assert!(!pending.is_ended());

    socket.send("news", json!("flash"));
    assert!(pending.is_ended());

    let events = decode_events(&parse_frames(&pending.response_body()));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "news");
    assert_eq!(events[0].data, json!("flash"));
}

#[tokio::test]
async fn queued_events_replay_in_order_on_the_next_poll() {
    let (server, accepted) = server_capturing_sockets();
    let (socket, handshake_id) = open_longpoll(&server, &accepted);

    for n in 1..=3 {
        socket.send("tick", json!(n));
    }

    let pending = poll(&server, &socket, &[handshake_id]);
    assert!(pending.is_ended());
    let frames = parse_frames(&pending.response_body());
    let events = decode_events(&frames);
    assert_eq!(
        events.iter().map(|e| e.data.clone()).collect::<Vec<_>>(),
        vec![json!(1), json!(2), json!(3)]
    );

    // Not yet acknowledged, so a second poll sees the same frames again.
    let replayed = poll(&server, &socket, &[handshake_id]);
    assert_eq!(parse_frames(&replayed.response_body()), frames);

    // Acknowledging them leaves nothing to deliver; the poll is held.
    let acked: Vec<u64> = std::iter::once(handshake_id)
        .chain(frames.iter().map(|(id, _)| *id))
        .collect();
    let held = poll(&server, &socket, &acked);
    assert!(!held.is_ended());
}

#[tokio::test]
async fn posted_messages_reach_event_handlers() {
    let (server, accepted) = server_capturing_sockets();
    let (socket, _) = open_longpoll(&server, &accepted);

    let received = Arc::new(Mutex::new(Vec::new()));
    {
        let received = Arc::clone(&received);
        socket.on("chat", move |data, _| {
            received.lock().unwrap().push(data.clone());
        });
    }

    let envelope = Envelope::new("1", "chat", json!("hi there")).encode().unwrap();
    let body = format_query(&[("id", socket.id()), ("data", envelope)]);
    let post = MemoryHttpExchange::post("/evsock", &body);
    server.handle_http(post.clone());

    assert_eq!(*received.lock().unwrap(), vec![json!("hi there")]);
    assert_eq!(post.status(), 200);
    assert!(post.is_ended());
}

#[tokio::test]
async fn reply_round_trip_over_long_polling() {
    let (server, accepted) = server_capturing_sockets();
    let (socket, handshake_id) = open_longpoll(&server, &accepted);
    socket.on("sum", |data, reply| {
        let total: i64 = data
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_i64)
            .sum();
        reply.expect("reply requested").resolve(json!(total));
    });

    let pending = poll(&server, &socket, &[handshake_id]);
    let envelope = Envelope::new("5", "sum", json!([2, 3, 4]))
        .expecting_reply()
        .encode()
        .unwrap();
    let body = format_query(&[("id", socket.id()), ("data", envelope)]);
    server.handle_http(MemoryHttpExchange::post("/evsock", &body));

    // The reply event went out through the pending poll.
    assert!(pending.is_ended());
    let events = decode_events(&parse_frames(&pending.response_body()));
    assert_eq!(events[0].event_type, "reply");
    let outcome: ReplyOutcome = serde_json::from_value(events[0].data.clone()).unwrap();
    assert_eq!(outcome, ReplyOutcome::resolved("5", json!(9)));
}

#[tokio::test]
async fn abort_closes_the_socket() {
    let (server, accepted) = server_capturing_sockets();
    let (socket, handshake_id) = open_longpoll(&server, &accepted);
    let _pending = poll(&server, &socket, &[handshake_id]);

    let closed = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&closed);
    socket.on_close(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });

    let abort = MemoryHttpExchange::get(&format!("/evsock?when=abort&id={}", socket.id()));
    server.handle_http(abort.clone());

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(server.socket_count(), 0);
    assert!(abort.is_ended());
}

#[tokio::test(start_paused = true)]
async fn missing_poll_closes_the_socket_after_the_grace_period() {
    let server = Server::builder()
        .longpoll_grace(Duration::from_secs(3))
        .build();
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&accepted);
    server.on_socket(move |socket| {
        captured.lock().unwrap().push(socket.clone());
    });
    let (socket, _) = open_longpoll(&server, &accepted);

    let closed = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&closed);
    socket.on_close(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });

    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(4)).await;
    tokio::task::yield_now().await;

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(server.socket_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn polling_within_the_grace_period_keeps_the_socket_alive() {
    let server = Server::builder()
        .longpoll_grace(Duration::from_secs(3))
        .build();
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&accepted);
    server.on_socket(move |socket| {
        captured.lock().unwrap().push(socket.clone());
    });
    let (socket, handshake_id) = open_longpoll(&server, &accepted);

    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(2)).await;
    let _pending = poll(&server, &socket, &[handshake_id]);

    tokio::time::advance(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;
    assert_eq!(socket.state(), TransportState::Open);
    assert_eq!(server.socket_count(), 1);
}
