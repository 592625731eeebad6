//! The server: accepts connections and addresses live sockets.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;

use evsock_core::ActionList;
use evsock_transport::{HttpDispatcher, HttpExchange, Transport, WebSocketChannel, WebSocketTransport};

use crate::socket::Socket;

/// Default heartbeat window advertised to clients and enforced server-side.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(20);
/// Default `_heartbeat` margin: clients send each probe this long before
/// the window would expire.
pub const DEFAULT_TEST_HEARTBEAT: Duration = Duration::from_secs(5);

struct ServerInner {
    sockets: DashMap<String, Socket>,
    socket_actions: ActionList<Socket>,
    http: HttpDispatcher,
    heartbeat: Duration,
    test_heartbeat: Duration,
}

/// Accepts connections from host bridges and keeps the registry of live
/// sockets.
///
/// Cheap to clone; clones share the registry. Build one with
/// [`Server::builder`] and feed it exchanges and channels from the host:
///
/// ```
/// use evsock_server::Server;
///
/// let server = Server::builder().build();
/// server.on_socket(|socket| {
///     socket.on("echo", {
///         let socket = socket.clone();
///         move |data, _| socket.send("echo", data.clone())
///     });
/// });
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Start configuring a server.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Register a handler for newly accepted sockets.
    pub fn on_socket(&self, handler: impl Fn(&Socket) + Send + Sync + 'static) {
        self.inner.socket_actions.add(handler);
    }

    /// Route one HTTP exchange: opening requests, polls, aborts and
    /// inbound messages.
    pub fn handle_http(&self, http: Arc<dyn HttpExchange>) {
        self.inner.http.handle(http);
    }

    /// Accept a WebSocket connection.
    pub fn handle_websocket(&self, channel: Arc<dyn WebSocketChannel>) {
        self.inner
            .accept(WebSocketTransport::new(channel) as Arc<dyn Transport>);
    }

    /// Apply an action to every live socket.
    pub fn all(&self, action: impl Fn(&Socket)) {
        for socket in self.snapshot() {
            action(&socket);
        }
    }

    /// Apply an action to the socket with the given id. Returns whether the
    /// socket was found.
    pub fn by_id(&self, id: &str, action: impl FnOnce(&Socket)) -> bool {
        let socket = self
            .inner
            .sockets
            .get(id)
            .map(|entry| entry.value().clone());
        match socket {
            Some(socket) => {
                action(&socket);
                true
            }
            None => false,
        }
    }

    /// Apply an action to every socket carrying all of the given tags.
    pub fn by_tag(&self, tags: &[&str], action: impl Fn(&Socket)) {
        for socket in self.snapshot() {
            if socket.has_tags(tags) {
                action(&socket);
            }
        }
    }

    // Actions are free to close sockets, and closing removes the socket
    // from the registry. Addressing therefore runs over a snapshot, never
    // while a shard guard is held.
    fn snapshot(&self) -> Vec<Socket> {
        self.inner
            .sockets
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of live sockets.
    #[must_use]
    pub fn socket_count(&self) -> usize {
        self.inner.sockets.len()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("sockets", &self.inner.sockets.len())
            .finish_non_exhaustive()
    }
}

impl ServerInner {
    fn accept(self: &Arc<Self>, transport: Arc<dyn Transport>) {
        let params = [
            ("heartbeat", self.heartbeat.as_millis().to_string()),
            ("_heartbeat", self.test_heartbeat.as_millis().to_string()),
        ];
        let socket = Socket::new(transport, &params);
        self.socket_actions.fire(socket);
    }
}

/// Configures and builds a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    heartbeat: Duration,
    test_heartbeat: Duration,
    longpoll_grace: Option<Duration>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
            test_heartbeat: DEFAULT_TEST_HEARTBEAT,
            longpoll_grace: None,
        }
    }
}

impl ServerBuilder {
    /// Heartbeat window: a connection without a probe for this long is
    /// presumed dead and closed.
    #[must_use]
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }

    /// Margin before the window expires at which clients send each probe.
    /// Advertised to clients in the handshake as `_heartbeat`.
    #[must_use]
    pub fn test_heartbeat(mut self, margin: Duration) -> Self {
        self.test_heartbeat = margin;
        self
    }

    /// Grace period a long-polling connection survives without a pending
    /// poll.
    #[must_use]
    pub fn longpoll_grace(mut self, grace: Duration) -> Self {
        self.longpoll_grace = Some(grace);
        self
    }

    /// Build the server and wire its connection pipeline.
    #[must_use]
    pub fn build(self) -> Server {
        let http = match self.longpoll_grace {
            Some(grace) => HttpDispatcher::new().with_grace_period(grace),
            None => HttpDispatcher::new(),
        };
        let inner = Arc::new(ServerInner {
            sockets: DashMap::new(),
            socket_actions: ActionList::new(),
            http,
            heartbeat: self.heartbeat,
            test_heartbeat: self.test_heartbeat,
        });

        // Registry bookkeeping runs before any user handler: insertion
        // here, removal as the first close handler, then the watchdog.
        {
            let weak = Arc::downgrade(&inner);
            inner.socket_actions.add(move |socket: &Socket| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let id = socket.id();
                tracing::info!(socket_id = %id, "socket opened");
                inner.sockets.insert(id.clone(), socket.clone());
                {
                    let weak = Arc::downgrade(&inner);
                    socket.on_close(move || {
                        if let Some(inner) = weak.upgrade() {
                            tracing::info!(socket_id = %id, "socket closed");
                            inner.sockets.remove(&id);
                        }
                    });
                }
                socket.set_heartbeat(inner.heartbeat);
            });
        }

        {
            let weak: Weak<ServerInner> = Arc::downgrade(&inner);
            inner.http.on_transport(move |transport| {
                if let Some(inner) = weak.upgrade() {
                    inner.accept(Arc::clone(transport));
                }
            });
        }

        Server { inner }
    }
}
