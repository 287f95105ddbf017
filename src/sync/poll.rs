// Poll Loop - the master's only way to reach this instance
//
// One poll = one ping. A successful reply refreshes the cluster fingerprint,
// fans every inbound message out to the registered nodes, offers it to the
// correlator, and replaces the membership view. A failed poll changes
// nothing and yields `None`; whether that means "disconnected" is up to the
// caller's PollPolicy. A reply that lands after `reset` belongs to a
// session that no longer exists and is dropped untouched.

use crate::client::NodeRegistry;
use crate::correlator::RequestCorrelator;
use crate::protocol::PingResponse;
use crate::sync::ClusterMembership;
use crate::transport::{ErrorHandler, MasterLink};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// How the caller wants repeated poll failures reported
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Consecutive missed polls after which ticks report `LimitReached`.
    /// `None` never reports it.
    pub missed_poll_limit: Option<u32>,
}

impl PollPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missed_poll_limit(mut self, limit: u32) -> Self {
        self.missed_poll_limit = Some(limit);
        self
    }
}

/// Result of one scheduled tick
#[derive(Clone, Debug)]
pub enum PollTick {
    Polled(PingResponse),
    Missed { consecutive: u32 },
    LimitReached { consecutive: u32 },
}

impl PollTick {
    pub fn is_polled(&self) -> bool {
        matches!(self, Self::Polled(_))
    }
}

/// Counters describing poll activity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollStats {
    pub polls: u64,
    pub missed: u64,
    pub messages_delivered: u64,
    pub replies_matched: u64,
}

/// Polls the master and distributes what comes back
pub struct PollLoop {
    link: MasterLink,
    correlator: RequestCorrelator,
    nodes: NodeRegistry,
    membership: Arc<RwLock<ClusterMembership>>,
    latest_var_hash: RwLock<Option<String>>,
    policy: PollPolicy,
    epoch: AtomicU64,
    consecutive_misses: AtomicU32,
    polls: AtomicU64,
    missed: AtomicU64,
    delivered: AtomicU64,
    matched: AtomicU64,
}

impl PollLoop {
    pub fn new(
        link: MasterLink,
        correlator: RequestCorrelator,
        nodes: NodeRegistry,
        policy: PollPolicy,
    ) -> Self {
        Self {
            link,
            correlator,
            nodes,
            membership: Arc::new(RwLock::new(ClusterMembership::new())),
            latest_var_hash: RwLock::new(None),
            policy,
            epoch: AtomicU64::new(0),
            consecutive_misses: AtomicU32::new(0),
            polls: AtomicU64::new(0),
            missed: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            matched: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current membership view
    pub fn membership(&self) -> ClusterMembership {
        self.membership.read().clone()
    }

    pub(crate) fn membership_cell(&self) -> &Arc<RwLock<ClusterMembership>> {
        &self.membership
    }

    /// Fingerprint of the cluster's sync state from the last good poll
    pub fn latest_var_hash(&self) -> Option<String> {
        self.latest_var_hash.read().clone()
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Consecutive polls that failed since the last success
    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PollStats {
        PollStats {
            polls: self.polls.load(Ordering::Relaxed),
            missed: self.missed.load(Ordering::Relaxed),
            messages_delivered: self.delivered.load(Ordering::Relaxed),
            replies_matched: self.matched.load(Ordering::Relaxed),
        }
    }

    /// Bumped by every `reset`
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Forget everything learned from the master
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.membership.write().reset();
        self.latest_var_hash.write().take();
        self.consecutive_misses.store(0, Ordering::Relaxed);
    }

    /// Ping the master once; `None` on any failure
    pub async fn poll(&self) -> Option<PingResponse> {
        self.poll_in(self.epoch()).await
    }

    /// Like `poll`, but the reply is discarded unless the loop is still in
    /// `epoch` when it arrives
    pub async fn poll_in(&self, epoch: u64) -> Option<PingResponse> {
        self.polls.fetch_add(1, Ordering::Relaxed);

        let reply: Option<PingResponse> = self
            .link
            .get("/ping", &ErrorHandler::quiet("sync::poll"))
            .await;

        if self.epoch() != epoch {
            tracing::debug!("dropping ping reply from a reset session");
            return None;
        }

        let Some(reply) = reply else {
            self.missed.fetch_add(1, Ordering::Relaxed);
            self.consecutive_misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        self.consecutive_misses.store(0, Ordering::Relaxed);
        if let Some(hash) = &reply.latest_var_hash {
            *self.latest_var_hash.write() = Some(hash.clone());
        }

        for message in &reply.messages {
            self.nodes.deliver(message);
            self.delivered.fetch_add(1, Ordering::Relaxed);
            if self.correlator.dispatch(message) {
                self.matched.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.membership
            .write()
            .replace(reply.connected_clients.clone());

        Some(reply)
    }

    /// Poll once and classify the result against the policy
    pub async fn tick(&self) -> PollTick {
        self.tick_in(self.epoch()).await
    }

    /// `tick` scoped to `epoch`, see `poll_in`
    pub async fn tick_in(&self, epoch: u64) -> PollTick {
        match self.poll_in(epoch).await {
            Some(reply) => PollTick::Polled(reply),
            None => {
                let consecutive = self.consecutive_misses();
                match self.policy.missed_poll_limit {
                    Some(limit) if consecutive >= limit => {
                        tracing::warn!(consecutive, limit, "master unreachable");
                        PollTick::LimitReached { consecutive }
                    }
                    _ => PollTick::Missed { consecutive },
                }
            }
        }
    }
}
