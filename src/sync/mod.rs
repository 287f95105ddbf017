// Sync module - HOW STATE MOVES
// Local sync entries, the poll loop against the master, and the membership view

mod membership;
mod poll;
mod store;

pub use membership::ClusterMembership;
pub use poll::{PollLoop, PollPolicy, PollStats, PollTick};
pub use store::{SyncStore, PLUGINS_KEY, ROUND_KEY, STARTUP_KEY};

use thiserror::Error;

/// Sync-store errors
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("Serialization failed: {0}")]
    Serialization(String),
}
