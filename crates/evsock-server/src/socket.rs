//! The socket: named events, replies and heartbeats over one transport.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde_json::Value;

use evsock_core::actions::ActionOptions;
use evsock_core::{ActionId, ActionList, Envelope, ReplyOutcome};
use evsock_transport::{Timer, Transport, TransportState};

use crate::error::SocketError;

type ReplyHandler = Arc<dyn Fn(&Value) + Send + Sync>;

struct PendingReply {
    resolved: Option<ReplyHandler>,
    rejected: Option<ReplyHandler>,
}

/// Payload delivered to event handlers: the event data plus the reply
/// object when the sender asked for one.
type EventPayload = (Value, Option<Reply>);

struct SocketInner {
    transport: Arc<dyn Transport>,
    event_seq: AtomicU64,
    tags: RwLock<HashSet<String>>,
    handlers: Mutex<HashMap<String, Arc<ActionList<EventPayload>>>>,
    pending: Mutex<HashMap<String, PendingReply>>,
    errors: Arc<ActionList<SocketError>>,
    close: Arc<ActionList<()>>,
    heartbeat_timer: Mutex<Option<Timer>>,
    heartbeat_interval: Mutex<Option<Duration>>,
}

/// A bidirectional event channel over one transport.
///
/// Payloads are [`Envelope`]-framed JSON; the socket routes inbound events
/// to handlers registered per event name, correlates `"reply"` events back
/// to their originating send, and answers `"heartbeat"` probes. Cloning is
/// cheap and clones address the same connection.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    /// Wrap an opened transport and send the handshake over it.
    ///
    /// `handshake_params` advertise connection options to the peer, such as
    /// the heartbeat interval.
    pub fn new(transport: Arc<dyn Transport>, handshake_params: &[(&str, String)]) -> Self {
        let inner = Arc::new(SocketInner {
            transport: Arc::clone(&transport),
            event_seq: AtomicU64::new(0),
            tags: RwLock::new(HashSet::new()),
            handlers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            errors: Arc::new(ActionList::new()),
            close: Arc::new(ActionList::with_options(ActionOptions::terminal())),
            heartbeat_timer: Mutex::new(None),
            heartbeat_interval: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        transport.on_text(Box::new({
            let weak = Weak::clone(&weak);
            move |text| {
                if let Some(inner) = weak.upgrade() {
                    SocketInner::handle_text(&inner, &text);
                }
            }
        }));
        transport.on_error(Box::new({
            let weak = Weak::clone(&weak);
            move |error| {
                if let Some(inner) = weak.upgrade() {
                    inner.errors.fire(SocketError::Transport(error));
                    // A connection that errored is not trusted to recover.
                    inner.transport.close();
                }
            }
        }));
        transport.on_close(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                *inner.heartbeat_timer.lock().expect("timer lock poisoned") = None;
                inner.pending.lock().expect("pending lock poisoned").clear();
                inner.close.fire(());
                inner.errors.disable();
            }
        }));

        let socket = Self { inner };

        // The peer probes liveness; answering resets our own deadline.
        {
            let weak = Arc::downgrade(&socket.inner);
            socket.on(Envelope::TYPE_HEARTBEAT, move |_, _| {
                if let Some(inner) = weak.upgrade() {
                    SocketInner::arm_heartbeat(&inner);
                    inner.send_event(Envelope::TYPE_HEARTBEAT, Value::Null, None);
                }
            });
        }

        transport.handshake(handshake_params);
        socket
    }

    /// The connection id, shared with the underlying transport.
    #[must_use]
    pub fn id(&self) -> String {
        self.inner.transport.id()
    }

    /// Lifecycle state of the underlying transport.
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.inner.transport.state()
    }

    /// The URI the connection was opened with, including its query string.
    #[must_use]
    pub fn uri(&self) -> String {
        self.inner.transport.uri()
    }

    /// Register a handler for a named event and return its removal handle.
    ///
    /// The reply argument is `Some` when the sender asked for a reply;
    /// exactly one of [`Reply::resolve`] or [`Reply::reject`] should be
    /// called on it.
    pub fn on(
        &self,
        event: &str,
        handler: impl Fn(&Value, Option<&Reply>) + Send + Sync + 'static,
    ) -> ActionId {
        let list = {
            let mut handlers = self.inner.handlers.lock().expect("handlers lock poisoned");
            Arc::clone(
                handlers
                    .entry(event.to_string())
                    .or_insert_with(|| Arc::new(ActionList::new())),
            )
        };
        list.add(move |(data, reply): &EventPayload| handler(data, reply.as_ref()))
    }

    /// Unregister a handler registered with [`on`](Socket::on). Returns
    /// whether it was still registered for the event.
    pub fn off(&self, event: &str, handle: ActionId) -> bool {
        let list = {
            let handlers = self.inner.handlers.lock().expect("handlers lock poisoned");
            handlers.get(event).map(Arc::clone)
        };
        list.is_some_and(|list| list.remove(handle))
    }

    /// Send a named event, fire and forget.
    pub fn send(&self, event: &str, data: Value) {
        self.inner.send_event(event, data, None);
    }

    /// Send a named event and expect a reply.
    ///
    /// Exactly one of the two callbacks fires when the peer answers; if the
    /// connection closes first, neither does.
    pub fn send_expecting_reply(
        &self,
        event: &str,
        data: Value,
        resolved: impl Fn(&Value) + Send + Sync + 'static,
        rejected: impl Fn(&Value) + Send + Sync + 'static,
    ) {
        self.inner.send_event(
            event,
            data,
            Some(PendingReply {
                resolved: Some(Arc::new(resolved)),
                rejected: Some(Arc::new(rejected)),
            }),
        );
    }

    /// Register a handler for socket errors.
    pub fn on_error(&self, handler: impl Fn(&SocketError) + Send + Sync + 'static) {
        self.inner.errors.add(handler);
    }

    /// Register a handler for the close event. Fires at most once and is
    /// replayed to handlers registered after the fact.
    pub fn on_close(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.inner.close.add(move |()| handler());
    }

    /// Close the connection.
    pub fn close(&self) {
        self.inner.transport.close();
    }

    /// Add a tag for group addressing.
    pub fn tag(&self, name: &str) {
        self.inner
            .tags
            .write()
            .expect("tags lock poisoned")
            .insert(name.to_string());
    }

    /// Remove a tag.
    pub fn untag(&self, name: &str) {
        self.inner
            .tags
            .write()
            .expect("tags lock poisoned")
            .remove(name);
    }

    /// Whether the socket carries every one of the given tags.
    #[must_use]
    pub fn has_tags(&self, names: &[&str]) -> bool {
        let tags = self.inner.tags.read().expect("tags lock poisoned");
        names.iter().all(|name| tags.contains(*name))
    }

    /// Start the heartbeat watchdog: unless the peer sends a `"heartbeat"`
    /// event within every `interval`, the connection is presumed dead and
    /// closed after a [`SocketError::HeartbeatFailed`] error.
    ///
    /// Requires a tokio runtime.
    pub fn set_heartbeat(&self, interval: Duration) {
        *self
            .inner
            .heartbeat_interval
            .lock()
            .expect("interval lock poisoned") = Some(interval);
        SocketInner::arm_heartbeat(&self.inner);
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SocketInner {
    fn next_id(&self) -> String {
        (self.event_seq.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn send_event(&self, event: &str, data: Value, pending: Option<PendingReply>) {
        let id = self.next_id();
        let mut envelope = Envelope::new(id.clone(), event, data);
        if let Some(pending) = pending {
            // Registered before the send so a reply arriving immediately
            // still finds its callbacks.
            envelope = envelope.expecting_reply();
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .insert(id, pending);
        }
        self.send_envelope(&envelope);
    }

    fn send_envelope(&self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(text) => self.transport.send(&text),
            Err(error) => self.errors.fire(SocketError::protocol(error)),
        }
    }

    fn handle_text(inner: &Arc<Self>, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(error) => {
                // A malformed frame is dropped; the connection is unaffected.
                tracing::warn!(
                    socket_id = %inner.transport.id(),
                    %error,
                    "dropping malformed frame"
                );
                return;
            }
        };

        if envelope.event_type == Envelope::TYPE_REPLY {
            inner.handle_reply(&envelope);
            return;
        }

        let list = {
            let handlers = inner.handlers.lock().expect("handlers lock poisoned");
            handlers.get(&envelope.event_type).map(Arc::clone)
        };
        let Some(list) = list else {
            tracing::trace!(
                socket_id = %inner.transport.id(),
                event = %envelope.event_type,
                "no handler for event"
            );
            return;
        };

        let reply = envelope.reply.then(|| Reply {
            socket: Arc::downgrade(inner),
            event_id: envelope.id.clone(),
            data: envelope.data.clone(),
            sent: Arc::new(AtomicBool::new(false)),
        });
        list.fire((envelope.data, reply));
    }

    fn handle_reply(&self, envelope: &Envelope) {
        let outcome: ReplyOutcome = match serde_json::from_value(envelope.data.clone()) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(
                    socket_id = %self.transport.id(),
                    %error,
                    "dropping malformed reply"
                );
                return;
            }
        };

        let pending = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&outcome.id);
        let Some(pending) = pending else {
            tracing::debug!(
                socket_id = %self.transport.id(),
                reply_to = %outcome.id,
                "reply for an unknown or already answered event"
            );
            return;
        };

        let handler = if outcome.exception {
            pending.rejected
        } else {
            pending.resolved
        };
        if let Some(handler) = handler {
            handler(&outcome.data);
        }
    }

    fn arm_heartbeat(inner: &Arc<Self>) {
        let interval = *inner
            .heartbeat_interval
            .lock()
            .expect("interval lock poisoned");
        let Some(interval) = interval else {
            return;
        };

        let weak = Arc::downgrade(inner);
        let timer = Timer::new(interval, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.close.has_fired() {
                return;
            }
            tracing::warn!(
                socket_id = %inner.transport.id(),
                "heartbeat missed, closing connection"
            );
            inner.errors.fire(SocketError::HeartbeatFailed);
            inner.transport.close();
        });
        *inner.heartbeat_timer.lock().expect("timer lock poisoned") = Some(timer);
    }
}

/// The sender's request for an answer to a specific event.
///
/// Exactly one of [`resolve`](Reply::resolve) or [`reject`](Reply::reject)
/// takes effect; later calls are ignored.
#[derive(Clone)]
pub struct Reply {
    socket: Weak<SocketInner>,
    event_id: String,
    data: Value,
    sent: Arc<AtomicBool>,
}

impl Reply {
    /// The data of the event being replied to.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Answer the event successfully.
    pub fn resolve(&self, data: Value) {
        self.send(ReplyOutcome::resolved(self.event_id.clone(), data));
    }

    /// Answer the event with a failure.
    pub fn reject(&self, data: Value) {
        self.send(ReplyOutcome::rejected(self.event_id.clone(), data));
    }

    fn send(&self, outcome: ReplyOutcome) {
        if self
            .sent
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(reply_to = %self.event_id, "duplicate reply ignored");
            return;
        }
        let Some(inner) = self.socket.upgrade() else {
            return;
        };
        match serde_json::to_value(&outcome) {
            Ok(data) => inner.send_event(Envelope::TYPE_REPLY, data, None),
            Err(error) => inner.errors.fire(SocketError::protocol(error)),
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply")
            .field("event_id", &self.event_id)
            .field("sent", &self.sent.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
