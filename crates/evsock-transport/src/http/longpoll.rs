//! HTTP long-polling transport.
//!
//! The client keeps exactly one GET pending at a time; each outbound payload
//! ends the pending response. Payloads are framed `msgId|data`, cached until
//! the client acknowledges them through the `lastMsgIds` parameter of its
//! next poll, and replayed when a poll arrives after the cached response was
//! lost. Between the end of one poll and the arrival of the next the
//! connection is only presumed alive; a grace timer closes it when the next
//! poll never comes.
//!
//! Requires a tokio runtime for the grace timer.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::bridge::HttpExchange;
use crate::query;
use crate::timer::Timer;
use crate::transport::{Transport, TransportBase};

/// Default close grace period after a poll cycle ends without a successor.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

struct CacheState {
    next_id: u64,
    // Sent-but-unacknowledged frames, oldest first.
    entries: VecDeque<(u64, String)>,
}

/// A transport over a sequence of short HTTP request/response pairs.
pub struct LongpollTransport {
    base: TransportBase,
    uri: String,
    jsonp_callback: Option<String>,
    grace_period: Duration,
    held: Mutex<Option<Arc<dyn HttpExchange>>>,
    // Close requested while no poll was pending; finalized on the next poll.
    aborted: AtomicBool,
    // Whether the current poll cycle carried a payload.
    written: AtomicBool,
    grace_timer: Mutex<Option<Timer>>,
    cache: Mutex<CacheState>,
}

impl LongpollTransport {
    /// Attach to the opening GET exchange.
    ///
    /// The opening response is held until the handshake is sent over it.
    pub fn new(http: Arc<dyn HttpExchange>, grace_period: Duration) -> Arc<Self> {
        let uri = http.uri();
        let params = query::parse_uri_query(&uri);
        let jsonp_callback = if params.get("transport").map(String::as_str) == Some("longpolljsonp")
        {
            Some(
                params
                    .get("callback")
                    .cloned()
                    .unwrap_or_else(|| "callback".to_string()),
            )
        } else {
            None
        };

        let transport = Arc::new(Self {
            base: TransportBase::new(),
            uri,
            jsonp_callback,
            grace_period,
            held: Mutex::new(None),
            aborted: AtomicBool::new(false),
            written: AtomicBool::new(false),
            grace_timer: Mutex::new(None),
            cache: Mutex::new(CacheState {
                next_id: 0,
                entries: VecDeque::new(),
            }),
        });

        transport.attach(&http, "open");
        *transport.held.lock().expect("held lock poisoned") = Some(http);
        transport
    }

    /// The grace period configured for this connection.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Accept a `when=poll` exchange for this connection.
    ///
    /// Unacknowledged frames are replayed immediately; otherwise the
    /// response is held until the next payload. A poll arriving while one is
    /// already held replaces it, and the replaced response ends empty.
    pub fn refresh(self: &Arc<Self>, http: Arc<dyn HttpExchange>) {
        self.attach(&http, "poll");

        if self.aborted.load(Ordering::SeqCst) {
            self.base.fire_close();
            http.end();
            return;
        }

        self.written.store(false, Ordering::SeqCst);
        *self.grace_timer.lock().expect("timer lock poisoned") = None;

        let params = query::parse_uri_query(&http.uri());
        let acked = parse_acked_ids(&params);

        // Lock order: cache before held, matching do_send.
        let mut flush = None;
        let mut replaced = None;
        {
            let mut cache = self.cache.lock().expect("cache lock poisoned");
            cache.entries.retain(|(id, _)| !acked.contains(id));
            if cache.entries.is_empty() {
                replaced = self.held.lock().expect("held lock poisoned").replace(http);
            } else {
                let frames: Vec<&str> =
                    cache.entries.iter().map(|(_, frame)| frame.as_str()).collect();
                flush = Some((http, frames.join("\n")));
            }
        }

        if let Some((http, payload)) = flush {
            self.written.store(true, Ordering::SeqCst);
            http.end_with(&self.format(&payload));
        } else if let Some(previous) = replaced {
            tracing::debug!(transport_id = %self.base.id(), "replacing pending poll");
            previous.end();
        }
    }

    fn attach(self: &Arc<Self>, http: &Arc<dyn HttpExchange>, when: &'static str) {
        http.set_header(
            "content-type",
            if self.jsonp_callback.is_some() {
                "text/javascript; charset=utf-8"
            } else {
                "text/plain; charset=utf-8"
            },
        );

        let weak = Arc::downgrade(self);
        http.on_error(Box::new({
            let weak = Weak::clone(&weak);
            move |error| {
                if let Some(transport) = weak.upgrade() {
                    transport.base.fire_error(error);
                }
            }
        }));

        let weak_http = Arc::downgrade(http);
        http.on_close(Box::new(move || {
            let Some(transport) = weak.upgrade() else {
                return;
            };
            if transport.base.is_closed() {
                return;
            }

            // The client dropped a held response; forget it so the grace
            // timer can decide the connection's fate.
            if let Some(this_http) = weak_http.upgrade() {
                let mut held = transport.held.lock().expect("held lock poisoned");
                if held
                    .as_ref()
                    .is_some_and(|held| Arc::ptr_eq(held, &this_http))
                {
                    *held = None;
                }
            }

            if when == "open" && !transport.written.load(Ordering::SeqCst) {
                // Opening response gone before the handshake: nothing was
                // established, close outright.
                transport.base.fire_close();
            } else if transport.held.lock().expect("held lock poisoned").is_none() {
                transport.arm_grace_timer();
            }
        }));
    }

    fn arm_grace_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let timer = Timer::new(self.grace_period, move || {
            let Some(transport) = weak.upgrade() else {
                return;
            };
            let pending = transport
                .held
                .lock()
                .expect("held lock poisoned")
                .is_some();
            if !pending && !transport.base.is_closed() {
                tracing::debug!(
                    transport_id = %transport.base.id(),
                    "no poll within grace period"
                );
                transport.base.fire_close();
            }
        });
        *self.grace_timer.lock().expect("timer lock poisoned") = Some(timer);
    }

    fn format(&self, payload: &str) -> String {
        match &self.jsonp_callback {
            // Payload is wrapped as a JSON string literal inside the script
            // callback invocation.
            Some(callback) => format!(
                "{callback}({});",
                serde_json::to_string(payload).unwrap_or_default()
            ),
            None => payload.to_string(),
        }
    }

    /// Deliver a payload that arrived through a routed POST.
    pub fn handle_text(&self, data: String) {
        self.base.fire_text(data);
    }
}

fn parse_acked_ids(params: &std::collections::HashMap<String, String>) -> HashSet<u64> {
    let mut acked: HashSet<u64> = params
        .get("lastMsgIds")
        .map(String::as_str)
        .unwrap_or_default()
        .split(',')
        .filter_map(|id| id.parse().ok())
        .collect();
    // Older clients acknowledge a single id.
    if let Some(id) = params.get("lastMsgId").and_then(|id| id.parse().ok()) {
        acked.insert(id);
    }
    acked
}

impl Transport for LongpollTransport {
    fn base(&self) -> &TransportBase {
        &self.base
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn do_send(&self, data: &str) {
        let (frame, pending) = {
            let mut cache = self.cache.lock().expect("cache lock poisoned");
            cache.next_id += 1;
            let id = cache.next_id;
            let frame = format!("{id}|{data}");
            cache.entries.push_back((id, frame.clone()));
            let pending = self.held.lock().expect("held lock poisoned").take();
            (frame, pending)
        };

        if let Some(http) = pending {
            self.written.store(true, Ordering::SeqCst);
            http.end_with(&self.format(&frame));
        }
        // No pending poll: the frame waits in the cache for the next one.
    }

    fn do_close(&self) {
        let pending = self.held.lock().expect("held lock poisoned").take();
        match pending {
            Some(http) => {
                // Closing before ending the response keeps the exchange
                // close hook from double-firing.
                self.base.fire_close();
                http.end();
            }
            None => {
                self.aborted.store(true, Ordering::SeqCst);
            }
        }
    }

    fn handshake(&self, params: &[(&str, String)]) {
        let mut with_id: Vec<(&str, String)> = vec![("id", self.base.id().to_string())];
        with_id.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let mut frame = String::from("?");
        frame.push_str(&query::format_query(&with_id));
        self.send(&frame);
    }
}
