//! The [`Transport`] trait and the shared [`TransportBase`] state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use evsock_core::ActionList;
use evsock_core::actions::ActionOptions;

use crate::bridge::{CloseCallback, ErrorCallback, TextCallback};
use crate::error::TransportError;
use crate::query;

/// Lifecycle state of a transport.
///
/// State moves strictly forward: `Open -> Closing -> Closed`. `Closing` is
/// entered by the first `close` call and `Closed` once the underlying
/// mechanism confirms teardown and the close event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    /// The transport can send and receive.
    Open = 0,
    /// Teardown has started; writes are rejected.
    Closing = 1,
    /// The transport is fully closed and the close event has fired.
    Closed = 2,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// State shared by every transport implementation.
///
/// Holds the generated connection id, the lifecycle state, and the three
/// action lists (`text`, `error`, `close`) that deliver events to the layer
/// above. The close list is terminal: it fires at most once, replays to late
/// subscribers, and disables the other two lists when it fires.
pub struct TransportBase {
    id: String,
    state: Arc<AtomicU8>,
    text: Arc<ActionList<String>>,
    errors: Arc<ActionList<TransportError>>,
    close: Arc<ActionList<()>>,
}

impl TransportBase {
    /// Create a base in the `Open` state with a fresh connection id.
    #[must_use]
    pub fn new() -> Self {
        let state = Arc::new(AtomicU8::new(TransportState::Open as u8));
        let text = Arc::new(ActionList::new());
        let errors = Arc::new(ActionList::new());
        let close = Arc::new(ActionList::with_options(ActionOptions::terminal()));

        let id = uuid::Uuid::new_v4().to_string();

        // The first close handler finalizes the lifecycle: no text or error
        // event is observable after close.
        {
            let state = Arc::clone(&state);
            let text = Arc::clone(&text);
            let errors = Arc::clone(&errors);
            let id = id.clone();
            close.add(move |(): &()| {
                state.store(TransportState::Closed as u8, Ordering::SeqCst);
                text.disable();
                errors.disable();
                tracing::debug!(transport_id = %id, "transport closed");
            });
        }

        Self {
            id,
            state,
            text,
            errors,
            close,
        }
    }

    /// The generated connection id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Atomically move `Open -> Closing`. Returns `false` when teardown has
    /// already started, so `close` runs its side effects at most once.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                TransportState::Open as u8,
                TransportState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Deliver an inbound text payload.
    pub fn fire_text(&self, data: String) {
        self.text.fire(data);
    }

    /// Deliver a transport error.
    pub fn fire_error(&self, error: TransportError) {
        self.errors.fire(error);
    }

    /// Fire the terminal close event. Safe to call more than once; only the
    /// first call is observable.
    pub fn fire_close(&self) {
        self.close.fire(());
    }

    /// Whether the close event has fired.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.has_fired()
    }

    pub(crate) fn add_text(&self, callback: TextCallback) {
        self.text.add(move |data: &String| callback(data.clone()));
    }

    pub(crate) fn add_error(&self, callback: ErrorCallback) {
        self.errors
            .add(move |error: &TransportError| callback(error.clone()));
    }

    pub(crate) fn add_close(&self, callback: CloseCallback) {
        self.close.add(move |(): &()| callback());
    }
}

impl Default for TransportBase {
    fn default() -> Self {
        Self::new()
    }
}

/// A bidirectional text-message channel with a uniform lifecycle.
///
/// Implementations provide the mechanism (`do_send`, `do_close`) and expose
/// their shared state through [`base`](Transport::base); the lifecycle
/// bookkeeping lives in the provided methods and is identical for every
/// transport. The trait is object safe so connections of different
/// mechanisms can share one registry.
pub trait Transport: Send + Sync {
    /// Shared lifecycle state.
    fn base(&self) -> &TransportBase;

    /// Original request URI including the query string.
    fn uri(&self) -> String;

    /// Write a payload over the underlying mechanism. Only called while the
    /// transport is `Open`.
    fn do_send(&self, data: &str);

    /// Start teardown of the underlying mechanism. Called exactly once.
    fn do_close(&self);

    /// The generated connection id.
    fn id(&self) -> String {
        self.base().id().to_string()
    }

    /// Current lifecycle state.
    fn state(&self) -> TransportState {
        self.base().state()
    }

    /// Send a text payload.
    ///
    /// On a non-`Open` transport the payload is dropped and
    /// [`TransportError::NotOpen`] is fired through the error action list;
    /// `send` itself never fails. Once the close event has fired the error
    /// list is disabled, so writes after that point are dropped silently.
    fn send(&self, data: &str) {
        if self.base().state() == TransportState::Open {
            self.do_send(data);
        } else {
            tracing::debug!(
                transport_id = %self.base().id(),
                "dropping write on non-open transport"
            );
            self.base().fire_error(TransportError::NotOpen);
        }
    }

    /// Close the transport. Idempotent; only the first call starts teardown.
    fn close(&self) {
        if self.base().begin_close() {
            self.do_close();
        }
    }

    /// Send the handshake frame: `?` followed by the urlencoded parameters.
    ///
    /// The peer treats this first frame as the connection preamble rather
    /// than an event payload.
    fn handshake(&self, params: &[(&str, String)]) {
        let mut frame = String::from("?");
        frame.push_str(&query::format_query(params));
        self.send(&frame);
    }

    /// Register a handler for inbound text payloads.
    fn on_text(&self, callback: TextCallback) {
        self.base().add_text(callback);
    }

    /// Register a handler for transport errors.
    fn on_error(&self, callback: ErrorCallback) {
        self.base().add_error(callback);
    }

    /// Register a handler for the close event. Fires at most once and is
    /// replayed to handlers registered after the fact.
    fn on_close(&self, callback: CloseCallback) {
        self.base().add_close(callback);
    }
}
