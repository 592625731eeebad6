//! HTTP streaming transport.
//!
//! The response of the opening GET stays open for the life of the
//! connection and carries every outbound payload in Server-Sent Events
//! framing. Inbound payloads arrive out of band through POST requests
//! routed by the [`HttpDispatcher`](super::HttpDispatcher).

use std::sync::{Arc, Mutex, Weak};

use crate::bridge::HttpExchange;
use crate::query;
use crate::transport::{Transport, TransportBase};

/// Leading whitespace written before any event so intermediaries flush
/// buffered response prefixes.
const PADDING_SIZE: usize = 2048;

/// A transport over one long-lived HTTP response.
pub struct StreamTransport {
    base: TransportBase,
    http: Arc<dyn HttpExchange>,
    uri: String,
    write_lock: Mutex<()>,
}

impl StreamTransport {
    /// Attach to the opening GET exchange and start the stream.
    pub fn new(http: Arc<dyn HttpExchange>) -> Arc<Self> {
        let uri = http.uri();
        let params = query::parse_uri_query(&uri);
        let sse = params.get("transport").map(String::as_str) == Some("sse");

        let transport = Arc::new(Self {
            base: TransportBase::new(),
            http: Arc::clone(&http),
            uri,
            write_lock: Mutex::new(()),
        });

        http.set_header(
            "content-type",
            if sse {
                "text/event-stream; charset=utf-8"
            } else {
                "text/plain; charset=utf-8"
            },
        );
        {
            let _guard = transport.write_lock.lock().expect("write lock poisoned");
            let mut padding = " ".repeat(PADDING_SIZE);
            padding.push('\n');
            http.write(&padding);
        }

        let weak = Arc::downgrade(&transport);
        http.on_error(Box::new({
            let weak = Weak::clone(&weak);
            move |error| {
                if let Some(transport) = weak.upgrade() {
                    transport.base.fire_error(error);
                }
            }
        }));
        http.on_close(Box::new(move || {
            if let Some(transport) = weak.upgrade() {
                transport.base.fire_close();
            }
        }));

        transport
    }

    /// Deliver a payload that arrived through a routed POST.
    pub fn handle_text(&self, data: String) {
        self.base.fire_text(data);
    }
}

impl Transport for StreamTransport {
    fn base(&self) -> &TransportBase {
        &self.base
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn do_send(&self, data: &str) {
        // SSE framing: each payload line becomes a `data:` line, and a blank
        // line terminates the event.
        let mut event = String::new();
        for line in data.replace("\r\n", "\n").replace('\r', "\n").split('\n') {
            event.push_str("data: ");
            event.push_str(line);
            event.push('\n');
        }
        event.push('\n');

        let _guard = self.write_lock.lock().expect("write lock poisoned");
        self.http.write(&event);
    }

    fn do_close(&self) {
        self.http.end();
    }

    fn handshake(&self, params: &[(&str, String)]) {
        // HTTP transports advertise their id so the client can address POST
        // messages and aborts to this connection.
        let mut with_id: Vec<(&str, String)> = vec![("id", self.base.id().to_string())];
        with_id.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let mut frame = String::from("?");
        frame.push_str(&query::format_query(&with_id));
        self.send(&frame);
    }
}
