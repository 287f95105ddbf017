// Handshake State - phase tracking and the resulting session

use crate::crypto::{ChannelKey, Keypair, PublicKey};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Where the client stands in the handshake
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Idle,
    SynSent,
    KeyExchanged,
    Authenticated,
    Failed(String),
    Disconnected,
}

impl HandshakeState {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: &HandshakeState) -> bool {
        match (self, target) {
            (Self::Idle, Self::SynSent) => true,
            (Self::Failed(_), Self::SynSent) => true,
            (Self::Disconnected, Self::SynSent) => true,
            (Self::SynSent, Self::KeyExchanged) => true,
            (Self::KeyExchanged, Self::Authenticated) => true,
            (Self::SynSent | Self::KeyExchanged, Self::Failed(_)) => true,
            (Self::SynSent | Self::KeyExchanged, Self::Disconnected) => true,
            (Self::Authenticated, Self::Disconnected) => true,
            (Self::Failed(_), Self::Disconnected) => true,
            _ => false,
        }
    }

    /// Check if the session is usable
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Check if a handshake is in flight
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::SynSent | Self::KeyExchanged)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Shared, observable handshake state
pub type StateCell = Arc<RwLock<HandshakeState>>;

/// Everything a completed handshake produced
///
/// Only constructed once all three phases succeed, so holding a `Session`
/// means the client is authenticated.
#[derive(Clone)]
pub struct Session {
    pub(crate) client_identifier: String,
    pub(crate) migration_priority: i32,
    pub(crate) keypair: Keypair,
    pub(crate) master_public_key: PublicKey,
    /// Master encrypts to us with this key
    pub(crate) inbound_key: ChannelKey,
    /// We encrypt to the master with this key
    pub(crate) outbound_key: ChannelKey,
    pub(crate) session_token: String,
}

impl Session {
    pub fn client_identifier(&self) -> &str {
        &self.client_identifier
    }

    pub fn migration_priority(&self) -> i32 {
        self.migration_priority
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn master_public_key(&self) -> PublicKey {
        self.master_public_key
    }

    pub fn inbound_key(&self) -> &ChannelKey {
        &self.inbound_key
    }

    pub fn outbound_key(&self) -> &ChannelKey {
        &self.outbound_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_identifier", &self.client_identifier)
            .field("migration_priority", &self.migration_priority)
            .finish_non_exhaustive()
    }
}
