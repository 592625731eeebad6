//! Ordered callback lists with lifecycle-event semantics.
//!
//! Every observable event in the engine - inbound text on a transport, a
//! socket closing, a new socket being accepted - is delivered through an
//! [`ActionList`]: an ordered list of registered handlers fired in
//! registration order. Two options cover the lifecycle cases:
//!
//! - `once`: the list fires at most once; later fires are ignored. Used for
//!   `close`, which must never fire twice.
//! - `memory`: the fired value is remembered, and a handler added after the
//!   fact is invoked immediately with it. Used for `close` as well, so a
//!   handler registered after the connection died still learns about it.
//!
//! A list can also be permanently [`disabled`](ActionList::disable), which
//! drops all handlers and ignores every subsequent `add`/`fire`. Transports
//! disable their text and error lists once closed so that late-arriving
//! events from the underlying mechanism are swallowed, not delivered.
//!
//! Handlers run outside the internal lock, so a handler may freely register
//! further handlers on the same list.

use std::sync::{Arc, Mutex};

/// A registered handler.
type Action<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle to a registered handler, returned by [`ActionList::add`] and
/// accepted by [`ActionList::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(u64);

/// Behavioral options for an [`ActionList`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionOptions {
    /// Fire at most once; subsequent fires are no-ops.
    pub once: bool,
    /// Remember the fired value and replay it to handlers added later.
    pub memory: bool,
}

impl ActionOptions {
    /// Options for a terminal lifecycle event: fire once, replay to late
    /// subscribers.
    #[must_use]
    pub const fn terminal() -> Self {
        Self {
            once: true,
            memory: true,
        }
    }
}

struct Inner<T> {
    next_id: u64,
    actions: Vec<(ActionId, Action<T>)>,
    fired: Option<T>,
    has_fired: bool,
    disabled: bool,
}

/// An ordered list of callbacks fired in registration order.
pub struct ActionList<T> {
    options: ActionOptions,
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Default for ActionList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ActionList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("action list lock poisoned");
        f.debug_struct("ActionList")
            .field("options", &self.options)
            .field("len", &inner.actions.len())
            .field("has_fired", &inner.has_fired)
            .field("disabled", &inner.disabled)
            .finish()
    }
}

impl<T: Clone> ActionList<T> {
    /// Create a list with default options (fire any number of times, no
    /// memory).
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ActionOptions::default())
    }

    /// Create a list with the given options.
    #[must_use]
    pub fn with_options(options: ActionOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(Inner {
                next_id: 0,
                actions: Vec::new(),
                fired: None,
                has_fired: false,
                disabled: false,
            }),
        }
    }

    /// Register a handler and return its removal handle.
    ///
    /// On a `memory` list that already fired, the handler is invoked
    /// immediately with the remembered value. On a disabled list the
    /// handler is discarded and the returned handle is inert.
    pub fn add(&self, action: impl Fn(&T) + Send + Sync + 'static) -> ActionId {
        let action: Action<T> = Arc::new(action);
        let (id, replay) = {
            let mut inner = self.inner.lock().expect("action list lock poisoned");
            inner.next_id += 1;
            let id = ActionId(inner.next_id);
            if inner.disabled {
                return id;
            }
            if !(self.options.once && inner.has_fired) {
                inner.actions.push((id, Arc::clone(&action)));
            }
            let replay = if self.options.memory && inner.has_fired {
                inner.fired.clone()
            } else {
                None
            };
            (id, replay)
        };
        if let Some(value) = replay {
            action(&value);
        }
        id
    }

    /// Remove a previously registered handler. Returns whether it was still
    /// registered.
    pub fn remove(&self, id: ActionId) -> bool {
        let mut inner = self.inner.lock().expect("action list lock poisoned");
        let before = inner.actions.len();
        inner.actions.retain(|(entry, _)| *entry != id);
        inner.actions.len() != before
    }

    /// Fire every registered handler, in registration order, with `value`.
    ///
    /// On a `once` list that already fired, or a disabled list, this is a
    /// no-op.
    pub fn fire(&self, value: T) {
        let actions = {
            let mut inner = self.inner.lock().expect("action list lock poisoned");
            if inner.disabled || (self.options.once && inner.has_fired) {
                return;
            }
            inner.has_fired = true;
            if self.options.memory {
                inner.fired = Some(value.clone());
            }
            inner.actions.clone()
        };
        for (_, action) in actions {
            action(&value);
        }
    }

    /// Permanently disable the list, dropping all handlers.
    pub fn disable(&self) {
        let mut inner = self.inner.lock().expect("action list lock poisoned");
        inner.disabled = true;
        inner.actions.clear();
    }

    /// Whether the list has fired at least once.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.inner
            .lock()
            .expect("action list lock poisoned")
            .has_fired
    }
}
