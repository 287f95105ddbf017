// Correlator module - MATCHING REPLIES TO REQUESTS
// Bridges the stateless poll transport to request/await call sites

mod pending;
mod table;

pub use pending::{PendingReply, ReplyOutcome};
pub use table::{CorrelationKey, CorrelatorConfig, CorrelatorStats, RequestCorrelator};
