//! WebSocket transport.
//!
//! The simplest transport: the [`WebSocketChannel`] already is a
//! bidirectional text channel with its own close semantics, so this type
//! only funnels channel events into the shared [`TransportBase`] and frames
//! nothing.

use std::sync::{Arc, Mutex, Weak};

use crate::bridge::WebSocketChannel;
use crate::transport::{Transport, TransportBase};

/// A transport over one accepted WebSocket connection.
pub struct WebSocketTransport {
    base: TransportBase,
    channel: Arc<dyn WebSocketChannel>,
    // Serializes writes so frames from concurrent senders do not interleave
    // inside the bridge.
    write_lock: Mutex<()>,
}

impl WebSocketTransport {
    /// Wrap an accepted WebSocket connection.
    pub fn new(channel: Arc<dyn WebSocketChannel>) -> Arc<Self> {
        let transport = Arc::new(Self {
            base: TransportBase::new(),
            channel: Arc::clone(&channel),
            write_lock: Mutex::new(()),
        });

        // Channel callbacks hold a weak reference; the channel outliving the
        // transport must not keep it alive.
        let weak = Arc::downgrade(&transport);
        channel.on_text(Box::new(weak_handler(&weak, |transport, data| {
            transport.base.fire_text(data);
        })));

        let weak = Arc::downgrade(&transport);
        channel.on_error(Box::new(weak_handler(&weak, |transport, error| {
            transport.base.fire_error(error);
        })));

        let weak = Arc::downgrade(&transport);
        channel.on_close(Box::new(move || {
            if let Some(transport) = weak.upgrade() {
                transport.base.fire_close();
            }
        }));

        transport
    }
}

fn weak_handler<T>(
    weak: &Weak<WebSocketTransport>,
    handler: impl Fn(&WebSocketTransport, T) + Send + Sync + 'static,
) -> impl Fn(T) + Send + Sync + 'static {
    let weak = Weak::clone(weak);
    move |value| {
        if let Some(transport) = weak.upgrade() {
            handler(&transport, value);
        }
    }
}

impl Transport for WebSocketTransport {
    fn base(&self) -> &TransportBase {
        &self.base
    }

    fn uri(&self) -> String {
        self.channel.uri()
    }

    fn do_send(&self, data: &str) {
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        self.channel.send(data);
    }

    fn do_close(&self) {
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        self.channel.close();
    }
}
