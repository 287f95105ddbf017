// Sealed boxes - asymmetric wrap for the key exchange
//
// An ephemeral secp256k1 key agrees a secret with the recipient's public key,
// HKDF-SHA256 stretches it into an AES-256-GCM key, and the payload is sealed
// under that key. Only the holder of the recipient's secret key can open it.
//
// Layout: [ephemeral pk: 33][nonce: 12][ciphertext + tag]

use crate::crypto::keypair::PUBLIC_KEY_LEN;
use crate::crypto::{CryptoError, Keypair, PublicKey};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use secp256k1::ecdh::SharedSecret;
use sha2::Sha256;

const SEAL_INFO: &[u8] = b"cluster-link/seal/v1";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_SEALED_LEN: usize = PUBLIC_KEY_LEN + NONCE_LEN + TAG_LEN;

fn derive_cipher(shared: &SharedSecret, ephemeral: &PublicKey) -> Result<Aes256Gcm, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(&ephemeral.to_bytes()), &shared.secret_bytes());
    let mut key = [0u8; 32];
    hkdf.expand(SEAL_INFO, &mut key)
        .map_err(|_| CryptoError::EncryptFailed)?;
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)))
}

/// Seal `plaintext` so that only `recipient` can open it
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = Keypair::generate();
    let shared = SharedSecret::new(recipient.inner(), ephemeral.secret());
    let cipher = derive_cipher(&shared, &ephemeral.public_key())?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut output = Vec::with_capacity(PUBLIC_KEY_LEN + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&ephemeral.public_key().to_bytes());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Open a sealed box with the recipient's keypair
pub fn open(recipient: &Keypair, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(CryptoError::Truncated(sealed.len()));
    }

    let (ephemeral_bytes, rest) = sealed.split_at(PUBLIC_KEY_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let ephemeral = PublicKey::from_bytes(ephemeral_bytes)?;
    let shared = SharedSecret::new(ephemeral.inner(), recipient.secret());
    let cipher = derive_cipher(&shared, &ephemeral)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}
