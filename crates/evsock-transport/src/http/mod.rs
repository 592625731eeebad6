//! HTTP transports and the request dispatcher in front of them.
//!
//! Both HTTP transports multiplex one logical connection over several
//! exchanges, so something has to route each request to the right
//! connection. [`HttpDispatcher`] implements the `when` query protocol:
//!
//! | Request | Meaning |
//! |---------|---------|
//! | `GET ?when=open&transport=...` | create a new connection |
//! | `GET ?when=poll&id=...` | successor request of a long-polling connection |
//! | `GET ?when=abort&id=...` | client-initiated close for hosts that cannot cancel requests |
//! | `POST` with `data=...` body | inbound payload for the connection named by `id` |

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use evsock_core::ActionList;

use crate::bridge::HttpExchange;
use crate::query;
use crate::transport::Transport;

pub mod longpoll;
pub mod stream;

pub use longpoll::LongpollTransport;
pub use stream::StreamTransport;

/// A live HTTP connection, keyed by transport id.
#[derive(Clone)]
enum HttpConnection {
    Stream(Arc<StreamTransport>),
    Longpoll(Arc<LongpollTransport>),
}

impl HttpConnection {
    fn handle_text(&self, data: String) {
        match self {
            Self::Stream(transport) => transport.handle_text(data),
            Self::Longpoll(transport) => transport.handle_text(data),
        }
    }

    fn close(&self) {
        match self {
            Self::Stream(transport) => transport.close(),
            Self::Longpoll(transport) => transport.close(),
        }
    }
}

/// Routes HTTP exchanges to their transports and creates new ones.
///
/// Cheap to clone; clones share the connection registry.
#[derive(Clone)]
pub struct HttpDispatcher {
    connections: Arc<DashMap<String, HttpConnection>>,
    transport_actions: Arc<ActionList<Arc<dyn Transport>>>,
    grace_period: Duration,
}

impl Default for HttpDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDispatcher {
    /// Create a dispatcher with the default long-polling grace period.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            transport_actions: Arc::new(ActionList::new()),
            grace_period: longpoll::DEFAULT_GRACE_PERIOD,
        }
    }

    /// Override the long-polling close grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Register a handler for newly opened transports.
    pub fn on_transport(&self, handler: impl Fn(&Arc<dyn Transport>) + Send + Sync + 'static) {
        self.transport_actions.add(handler);
    }

    /// Route one HTTP exchange.
    pub fn handle(&self, http: Arc<dyn HttpExchange>) {
        match http.method().as_str() {
            "GET" => self.handle_get(http),
            "POST" => self.handle_post(http),
            method => {
                tracing::error!(method, "unsupported request method");
                http.set_status(405);
                http.end();
            }
        }
    }

    fn handle_get(&self, http: Arc<dyn HttpExchange>) {
        set_nocache(http.as_ref());
        set_cors(http.as_ref());

        let params = query::parse_uri_query(&http.uri());
        match params.get("when").map(String::as_str) {
            Some("open") => self.open(http, params.get("transport").map(String::as_str)),
            Some("poll") => self.poll(http, params.get("id").map(String::as_str)),
            Some("abort") => self.abort(http.as_ref(), params.get("id").map(String::as_str)),
            when => {
                tracing::error!(?when, "unsupported when parameter");
                http.set_status(501);
                http.end();
            }
        }
    }

    fn open(&self, http: Arc<dyn HttpExchange>, name: Option<&str>) {
        let connection = match name {
            Some("stream" | "sse" | "streamxhr" | "streamiframe") => {
                HttpConnection::Stream(StreamTransport::new(http))
            }
            Some("longpoll" | "longpollajax" | "longpollxhr" | "longpolljsonp") => {
                HttpConnection::Longpoll(LongpollTransport::new(http, self.grace_period))
            }
            name => {
                tracing::error!(?name, "unsupported transport");
                http.set_status(501);
                http.end();
                return;
            }
        };

        let transport: Arc<dyn Transport> = match &connection {
            HttpConnection::Stream(transport) => Arc::clone(transport) as Arc<dyn Transport>,
            HttpConnection::Longpoll(transport) => Arc::clone(transport) as Arc<dyn Transport>,
        };

        // Register before announcing: the open handler typically sends the
        // handshake, and a poll or POST may race in right after.
        let id = transport.id();
        self.connections.insert(id.clone(), connection);
        {
            let connections = Arc::clone(&self.connections);
            transport.on_close(Box::new(move || {
                connections.remove(&id);
            }));
        }
        self.transport_actions.fire(transport);
    }

    fn poll(&self, http: Arc<dyn HttpExchange>, id: Option<&str>) {
        let connection = id.and_then(|id| self.connections.get(id).map(|c| c.clone()));
        match connection {
            Some(HttpConnection::Longpoll(transport)) => transport.refresh(http),
            Some(HttpConnection::Stream(_)) | None => {
                tracing::error!(?id, "poll for an unknown or non-polling connection");
                http.set_status(500);
                http.end();
            }
        }
    }

    fn abort(&self, http: &dyn HttpExchange, id: Option<&str>) {
        if let Some(connection) = id.and_then(|id| self.connections.get(id).map(|c| c.clone())) {
            connection.close();
        }
        // Abort may arrive via a script tag, so answer with javascript
        // regardless of whether the connection was still there.
        http.set_header("content-type", "text/javascript; charset=utf-8");
        http.end();
    }

    fn handle_post(&self, http: Arc<dyn HttpExchange>) {
        set_nocache(http.as_ref());
        set_cors(http.as_ref());

        let uri_params = query::parse_uri_query(&http.uri());
        let connections = Arc::clone(&self.connections);
        let weak_http = Arc::downgrade(&http);
        http.on_body(Box::new(move |body| {
            let form = query::parse_form(&body);
            let id = form
                .get("id")
                .or_else(|| uri_params.get("id"))
                .map(String::as_str);
            let connection = id.and_then(|id| connections.get(id).map(|c| c.clone()));
            let Some(http) = weak_http.upgrade() else {
                return;
            };
            match connection {
                Some(connection) => {
                    if let Some(data) = form.get("data") {
                        connection.handle_text(data.clone());
                    }
                }
                None => {
                    tracing::error!(?id, "message for an unknown connection");
                    http.set_status(500);
                }
            }
            http.end();
        }));
        http.read();
    }
}

fn set_nocache(http: &dyn HttpExchange) {
    http.set_header("cache-control", "no-cache, no-store, must-revalidate");
    http.set_header("pragma", "no-cache");
    http.set_header("expires", "0");
}

fn set_cors(http: &dyn HttpExchange) {
    let origin = http.header("origin").unwrap_or_else(|| "*".to_string());
    http.set_header("access-control-allow-origin", &origin);
    http.set_header("access-control-allow-credentials", "true");
}
