// Handshake module - HOW A SESSION IS BORN
// Three-phase key exchange and authentication against the master

mod protocol;
mod state;

pub use protocol::{Handshake, HandshakeParams};
pub use state::{HandshakeState, Session, StateCell};

use crate::crypto::CryptoError;
use crate::transport::LinkError;
use thiserror::Error;

/// Failures that abort a connect attempt
#[derive(Error, Debug, Clone)]
pub enum HandshakeError {
    #[error("Syn phase failed: {0}")]
    Syn(LinkError),

    #[error("Key exchange failed: {0}")]
    KeyExchange(LinkError),

    #[error("Authentication failed: {0}")]
    Auth(LinkError),

    #[error("Cryptographic failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Malformed handshake reply: {0}")]
    Malformed(String),

    #[error("Out-of-sequence phase: {from:?} -> {to:?}")]
    OutOfSequence {
        from: HandshakeState,
        to: HandshakeState,
    },
}

impl HandshakeError {
    /// Whether the failure came from the network rather than the exchange itself
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Syn(LinkError::Transport(_))
                | Self::KeyExchange(LinkError::Transport(_))
                | Self::Auth(LinkError::Transport(_))
        )
    }
}
