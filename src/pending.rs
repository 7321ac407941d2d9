//! Pending-request correlator.
//!
//! Replies carry no request ID. Acks answer run and reset commands, data
//! frames answer queries, so an incoming frame is matched to the oldest
//! outstanding request expecting that shape. The frame is then decoded
//! against that request's own context and delivered to its waiter.
//!
//! A request the caller gave up on (timed out, or its future dropped) keeps
//! its place in the queue as a discard marker. Its late reply lands on the
//! marker and is dropped instead of resolving the next request of the same
//! shape. A marker that sees no reply within the late-reply window expires.
//!
//! Heartbeat probes are tracked like any other query but their replies go
//! to a persistent broadcast listener instead of a one-shot. At most one
//! probe is outstanding at a time.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::command::{CorrelationKey, Request};
use crate::error::{CoconutError, Result};
use crate::handler::{DispatchTable, RequestContext, Response};
use crate::protocol::{FrameShape, InboundFrame};

/// Capacity of the heartbeat reply channel.
const HEARTBEAT_CHANNEL_CAPACITY: usize = 16;

/// Default time a discard marker waits for its late reply.
pub const DEFAULT_LATE_REPLY_WINDOW: Duration = Duration::from_secs(2);

/// Receiver for a single request's response.
pub type ResponseReceiver = oneshot::Receiver<Response>;

enum Completion {
    Once(oneshot::Sender<Response>),
    Heartbeat,
    Discard { until: Instant },
}

struct InFlight {
    key: CorrelationKey,
    context: RequestContext,
    completion: Completion,
}

impl InFlight {
    /// Someone still wants the reply.
    fn is_waiting(&self) -> bool {
        match &self.completion {
            Completion::Once(tx) => !tx.is_closed(),
            Completion::Heartbeat => true,
            Completion::Discard { .. } => false,
        }
    }

    fn is_probe(&self) -> bool {
        matches!(self.completion, Completion::Heartbeat)
    }

    fn discard(&mut self, until: Instant) {
        self.completion = Completion::Discard { until };
    }
}

#[derive(Default)]
struct Inner {
    entries: VecDeque<InFlight>,
    closed: bool,
}

impl Inner {
    /// Turn dropped waiters into discard markers and expire old markers.
    fn prune(&mut self, window: Duration) {
        let now = Instant::now();
        self.entries.retain_mut(|entry| {
            if matches!(&entry.completion, Completion::Once(tx) if tx.is_closed()) {
                debug!(key = %entry.key, "Waiter dropped, discarding its reply");
                entry.discard(now + window);
                return true;
            }
            match entry.completion {
                Completion::Discard { until } if until <= now => {
                    debug!(key = %entry.key, "No late reply, marker expired");
                    false
                }
                _ => true,
            }
        });
    }

    fn waiting(&self, key: &CorrelationKey) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.is_waiting() && &entry.key == key)
    }
}

/// Outstanding requests of one peripheral, in send order.
pub struct PendingRequests {
    inner: Mutex<Inner>,
    heartbeat: broadcast::Sender<Response>,
    late_reply_window: Duration,
}

impl PendingRequests {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::with_late_reply_window(DEFAULT_LATE_REPLY_WINDOW)
    }

    /// Create an empty correlator whose discard markers live for `window`.
    pub fn with_late_reply_window(window: Duration) -> Self {
        let (heartbeat, _) = broadcast::channel(HEARTBEAT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            heartbeat,
            late_reply_window: window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a request and return the receiver its response arrives on.
    ///
    /// Fails with [`CoconutError::RequestInFlight`] if a request with the
    /// same key is still waiting.
    pub fn register(&self, request: Request) -> Result<ResponseReceiver> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(CoconutError::NotConnected);
        }
        inner.prune(self.late_reply_window);

        let (key, context) = request.into_parts();
        if inner.waiting(&key).is_some() {
            return Err(CoconutError::RequestInFlight(key.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        trace!(key = %key, "Registered request");
        inner.entries.push_back(InFlight {
            key,
            context,
            completion: Completion::Once(tx),
        });
        Ok(rx)
    }

    /// Register a heartbeat probe.
    ///
    /// Returns `false`, registering nothing, while an earlier probe is still
    /// unanswered; the caller must not write another probe frame then.
    pub fn register_heartbeat(&self, request: Request) -> Result<bool> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(CoconutError::NotConnected);
        }
        inner.prune(self.late_reply_window);

        if inner.entries.iter().any(InFlight::is_probe) {
            trace!("Probe still unanswered");
            return Ok(false);
        }

        let (key, context) = request.into_parts();
        inner.entries.push_back(InFlight {
            key,
            context,
            completion: Completion::Heartbeat,
        });
        Ok(true)
    }

    /// Subscribe to heartbeat replies.
    pub fn subscribe_heartbeat(&self) -> broadcast::Receiver<Response> {
        self.heartbeat.subscribe()
    }

    /// Match `frame` to the oldest request expecting its shape, decode it
    /// and deliver the response.
    ///
    /// Returns `false` if the frame was unsolicited, discarded, or could not
    /// be decoded.
    pub fn resolve(&self, frame: &InboundFrame, table: &DispatchTable) -> bool {
        let entry = {
            let mut inner = self.lock();
            inner.prune(self.late_reply_window);
            match take_oldest(&mut inner.entries, frame.shape()) {
                Some(entry) => entry,
                None => {
                    debug!(shape = ?frame.shape(), "Unsolicited frame");
                    return false;
                }
            }
        };

        let tx = match entry.completion {
            Completion::Discard { .. } => {
                debug!(key = %entry.key, "Discarded late reply");
                return false;
            }
            Completion::Once(tx) => Some(tx),
            Completion::Heartbeat => None,
        };

        let Some(dispatch) = table.dispatch(&entry.context, frame) else {
            warn!(key = %entry.key, "No decoder for reply");
            return false;
        };
        if dispatch.key != entry.key {
            warn!(expected = %entry.key, decoded = %dispatch.key, "Reply decoded under a different key");
        }
        trace!(key = %entry.key, response = ?dispatch.response, "Resolved");

        match tx {
            Some(tx) => tx.send(dispatch.response).is_ok(),
            None => {
                // No subscribers just means the heartbeat is stopped.
                let _ = self.heartbeat.send(dispatch.response);
                true
            }
        }
    }

    /// Remove a waiting request outright. Use only when its frame never
    /// reached the robot or the robot is known not to answer it.
    pub fn cancel(&self, key: &CorrelationKey) -> bool {
        let mut inner = self.lock();
        match inner.waiting(key) {
            Some(index) => inner.entries.remove(index).is_some(),
            None => false,
        }
    }

    /// Stop waiting for a request whose reply may still arrive.
    ///
    /// The entry stays in the queue as a discard marker for the late-reply
    /// window.
    pub fn abandon(&self, key: &CorrelationKey) -> bool {
        let until = Instant::now() + self.late_reply_window;
        let mut inner = self.lock();
        match inner.waiting(key) {
            Some(index) => {
                debug!(key = %key, "Abandoned, discarding its reply");
                inner.entries[index].discard(until);
                true
            }
            None => false,
        }
    }

    /// Check if a request with `key` is waiting.
    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.lock().waiting(key).is_some()
    }

    /// Number of requests waiting for a reply.
    pub fn len(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.is_waiting())
            .count()
    }

    /// Check if no request is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of discard markers still expecting a late reply.
    pub fn discarding(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|entry| matches!(entry.completion, Completion::Discard { .. }))
            .count()
    }

    /// Drop every outstanding request and refuse new ones.
    ///
    /// Waiters observe a closed channel.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        let dropped = inner.entries.len();
        inner.entries.clear();
        if dropped > 0 {
            debug!(dropped, "Closed pending requests");
        }
    }

    /// Check if [`Self::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

fn take_oldest(entries: &mut VecDeque<InFlight>, shape: FrameShape) -> Option<InFlight> {
    let index = entries
        .iter()
        .position(|entry| entry.context.expected_shape() == shape)?;
    entries.remove(index)
}
