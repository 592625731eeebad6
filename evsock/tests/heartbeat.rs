//! Heartbeat watchdog behavior under paused time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::Value;

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

fn heartbeat_frame() -> String {
    Envelope::new("1", "heartbeat", Value::Null).encode().unwrap()
}

#[tokio::test(start_paused = true)]
async fn handshake_advertises_the_configured_window() {
    let server = Server::builder()
        .heartbeat(Duration::from_secs(8))
        .test_heartbeat(Duration::from_secs(2))
        .build();
    let (_socket, channel) = connect(&server);

    assert_eq!(
        channel.sent(),
        vec!["?heartbeat=8000&_heartbeat=2000".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn silent_peer_is_closed_after_the_window() {
    let server = Server::builder().heartbeat(Duration::from_secs(8)).build();
    let (socket, _channel) = connect(&server);

    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = Arc::clone(&errors);
        socket.on_error(move |error| {
            errors.lock().unwrap().push(error.clone());
        });
    }

    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(9)).await;
    tokio::task::yield_now().await;

    assert_eq!(*errors.lock().unwrap(), vec![SocketError::HeartbeatFailed]);
    assert_eq!(socket.state(), TransportState::Closed);
    assert_eq!(server.socket_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn probes_reset_the_window_and_are_echoed() {
    let server = Server::builder().heartbeat(Duration::from_secs(8)).build();
    let (socket, channel) = connect(&server);

    for _ in 0..4 {
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(6)).await;
        channel.emit_text(&heartbeat_frame());
    }
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;

    assert_eq!(socket.state(), TransportState::Open);
    let echoes = channel
        .sent()
        .iter()
        .filter(|frame| frame.contains("\"heartbeat\""))
        .count();
    assert_eq!(echoes, 4);
}

#[tokio::test(start_paused = true)]
async fn watchdog_stops_when_the_socket_closes_first() {
    let server = Server::builder().heartbeat(Duration::from_secs(8)).build();
    let (socket, _channel) = connect(&server);

    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = Arc::clone(&errors);
        socket.on_error(move |error| {
            errors.lock().unwrap().push(error.clone());
        });
    }

    socket.close();
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(20)).await;
    tokio::task::yield_now().await;

    assert!(errors.lock().unwrap().is_empty());
}
