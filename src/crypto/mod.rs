// Crypto module - SESSION SECRETS
// secp256k1 keypairs, sealed boxes for the key exchange, AES-GCM channel keys

mod channel;
mod keypair;
mod sealed;

pub use channel::{short_token, ChannelKey, CHANNEL_KEY_LEN};
pub use keypair::{Keypair, PublicKey};
pub use sealed::{open, seal};

use thiserror::Error;

/// Errors produced by key handling, sealing and channel encryption
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid key bytes: {0}")]
    InvalidKey(String),

    #[error("Invalid base64: {0}")]
    InvalidEncoding(String),

    #[error("Ciphertext too short: {0} bytes")]
    Truncated(usize),

    #[error("Encryption failed")]
    EncryptFailed,

    #[error("Decryption failed")]
    DecryptFailed,
}

pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>, CryptoError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD
        .decode(text.trim())
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.encode(bytes)
}
