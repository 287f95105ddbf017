// cluster-link - client connector for a master-coordinated server cluster
//
// A server instance uses NetworkClient to authenticate with the master,
// poll it for inbound messages, await replies to its own requests and
// publish replicated sync vars.

pub mod client;
pub mod correlator;
pub mod crypto;
pub mod handshake;
pub mod protocol;
pub mod schedule;
pub mod sync;
pub mod transport;

pub use client::{
    ClientBuilder, ClientConfig, ClientError, HostState, InstanceAuthority, NetworkClient,
    NetworkNode, RosterProvider, WeakNetworkClient,
};
pub use correlator::{ReplyOutcome, RequestCorrelator};
pub use handshake::HandshakeState;
pub use protocol::{InstanceMessage, NetworkSyncEntry};
pub use schedule::ScheduledTask;
pub use sync::{PollPolicy, PollTick, SyncStore};
pub use transport::{HttpTransport, Transport};
