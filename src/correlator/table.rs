// Request Correlator - pending request table with TTL eviction
//
// Each registration inserts one entry keyed by (referenceId, subject). The
// entry leaves the table exactly once: by a matching dispatch, by its TTL
// timer, by capacity eviction, or by an explicit cancel/clear. Whichever
// removes it fires the completion; everyone else finds nothing to do.

use crate::correlator::{PendingReply, ReplyOutcome};
use crate::protocol::{InstanceMessage, ReferenceId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for the request correlator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Maximum outstanding requests before the oldest is evicted
    pub capacity: usize,
    /// Time a request waits for its reply, counted from registration
    pub ttl_ms: u64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            ttl_ms: 60_000,
        }
    }
}

impl CorrelatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

// ============================================================================
// KEY
// ============================================================================

/// Identifies the reply a pending request waits for
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub reference_id: ReferenceId,
    pub subject: String,
}

impl CorrelationKey {
    pub fn new(reference_id: ReferenceId, subject: &str) -> Self {
        Self {
            reference_id,
            subject: subject.to_string(),
        }
    }

    /// Key an inbound message resolves
    pub fn of(message: &InstanceMessage) -> Self {
        Self::new(message.reference_id().clone(), message.subject())
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Counters describing correlator activity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub registered: u64,
    pub lookups: u64,
    pub resolved: u64,
    pub expired: u64,
    pub evicted: u64,
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    registered: AtomicU64,
    lookups: AtomicU64,
    resolved: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CorrelatorStats {
        CorrelatorStats {
            registered: self.registered.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// CORRELATOR
// ============================================================================

struct Pending {
    id: u64,
    registered_at: Instant,
    completion: oneshot::Sender<ReplyOutcome>,
    timer: JoinHandle<()>,
}

impl Pending {
    fn settle(self, outcome: ReplyOutcome) {
        self.timer.abort();
        // The waiter may have given up; nothing to do then
        let _ = self.completion.send(outcome);
    }
}

struct CorrelatorInner {
    config: CorrelatorConfig,
    table: Mutex<HashMap<CorrelationKey, Pending>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl CorrelatorInner {
    fn expire(&self, key: &CorrelationKey, id: u64) {
        let pending = {
            let mut table = self.table.lock();
            match table.get(key) {
                Some(entry) if entry.id == id => table.remove(key),
                _ => None,
            }
        };

        if let Some(pending) = pending {
            Counters::bump(&self.counters.expired);
            tracing::debug!(reference = %key.reference_id, subject = %key.subject, "pending request expired");
            // Don't abort our own timer task; just complete
            let _ = pending.completion.send(ReplyOutcome::Expired);
        }
    }
}

impl Drop for CorrelatorInner {
    fn drop(&mut self) {
        for (_, pending) in self.table.get_mut().drain() {
            pending.timer.abort();
        }
    }
}

/// Table of requests awaiting replies
///
/// Cloning yields another handle to the same table.
#[derive(Clone)]
pub struct RequestCorrelator {
    inner: Arc<CorrelatorInner>,
}

impl RequestCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            inner: Arc::new(CorrelatorInner {
                config,
                table: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.inner.config
    }

    /// Number of outstanding requests
    pub fn pending_count(&self) -> usize {
        self.inner.table.lock().len()
    }

    /// Whether `key` is still awaiting a reply
    pub fn is_pending(&self, key: &CorrelationKey) -> bool {
        self.inner.table.lock().contains_key(key)
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.inner.counters.snapshot()
    }

    /// Register a pending request. Must be called within a tokio runtime.
    ///
    /// The TTL starts now. Registering a key that is already pending
    /// replaces it and the earlier waiter sees `Expired`.
    pub fn register(&self, key: CorrelationKey) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let ttl = self.inner.config.ttl();

        let weak: Weak<CorrelatorInner> = Arc::downgrade(&self.inner);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&timer_key, id);
            }
        });

        let entry = Pending {
            id,
            registered_at: Instant::now(),
            completion: tx,
            timer,
        };

        let mut displaced = Vec::new();
        {
            let mut table = self.inner.table.lock();
            if let Some(previous) = table.remove(&key) {
                displaced.push(previous);
            }
            while table.len() >= self.inner.config.capacity.max(1) {
                let oldest = table
                    .iter()
                    .min_by_key(|(_, p)| (p.registered_at, p.id))
                    .map(|(k, _)| k.clone());
                match oldest.and_then(|k| table.remove(&k)) {
                    Some(evicted) => displaced.push(evicted),
                    None => break,
                }
            }
            table.insert(key, entry);
        }

        Counters::bump(&self.inner.counters.registered);
        for pending in displaced {
            Counters::bump(&self.inner.counters.evicted);
            pending.settle(ReplyOutcome::Expired);
        }

        PendingReply::new(rx)
    }

    /// Offer an inbound message; resolves the matching waiter if any.
    /// Returns whether a waiter was resolved.
    pub fn dispatch(&self, message: &InstanceMessage) -> bool {
        Counters::bump(&self.inner.counters.lookups);
        let key = CorrelationKey::of(message);
        let pending = self.inner.table.lock().remove(&key);

        match pending {
            Some(pending) => {
                Counters::bump(&self.inner.counters.resolved);
                pending.settle(ReplyOutcome::Replied(message.clone()));
                true
            }
            None => false,
        }
    }

    /// Withdraw a pending request; its waiter sees `Cancelled`
    pub fn cancel(&self, key: &CorrelationKey) -> bool {
        let pending = self.inner.table.lock().remove(key);
        match pending {
            Some(pending) => {
                Counters::bump(&self.inner.counters.cancelled);
                pending.settle(ReplyOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending request; returns how many were waiting
    pub fn clear(&self) -> usize {
        let drained: Vec<Pending> = self.inner.table.lock().drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for pending in drained {
            Counters::bump(&self.inner.counters.cancelled);
            pending.settle(ReplyOutcome::Cancelled);
        }
        count
    }

    /// Register for `reply_subject` under the message's own reference id,
    /// then post the message with `post`.
    ///
    /// If posting fails the registration is withdrawn and the error returned;
    /// otherwise resolves with the first matching reply or `Expired`.
    pub async fn send_and_await<F, Fut, E>(
        &self,
        message: InstanceMessage,
        reply_subject: &str,
        post: F,
    ) -> Result<ReplyOutcome, E>
    where
        F: FnOnce(InstanceMessage) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let key = CorrelationKey::new(message.reference_id().clone(), reply_subject);
        let reply = self.register(key.clone());

        if let Err(error) = post(message).await {
            self.cancel(&key);
            return Err(error);
        }

        Ok(reply.await)
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(CorrelatorConfig::default())
    }
}
