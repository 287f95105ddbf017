// Channel Key Tests
// Tests for the symmetric session keys

use cluster_link::crypto::{short_token, ChannelKey, CryptoError, CHANNEL_KEY_LEN};

#[test]
fn test_channel_key_decrypts_own_ciphertext() {
    let key = ChannelKey::generate();
    let text = key.encrypt(br#"{"sessionToken":"abc"}"#).unwrap();

    assert_eq!(key.decrypt(&text).unwrap(), br#"{"sessionToken":"abc"}"#);
}

#[test]
fn test_channel_key_wrong_key_fails() {
    let key = ChannelKey::generate();
    let other = ChannelKey::generate();
    let text = key.encrypt(b"hello").unwrap();

    assert_eq!(other.decrypt(&text), Err(CryptoError::DecryptFailed));
}

#[test]
fn test_channel_key_accepts_quoted_text() {
    let key = ChannelKey::generate();
    let text = key.encrypt(b"hello").unwrap();

    assert_eq!(key.decrypt(&format!("\"{}\"", text)).unwrap(), b"hello");
}

#[test]
fn test_channel_key_length_checked() {
    assert!(ChannelKey::from_bytes(&[1u8; CHANNEL_KEY_LEN]).is_ok());
    assert_eq!(
        ChannelKey::from_bytes(&[1u8; 16]),
        Err(CryptoError::InvalidLength {
            expected: CHANNEL_KEY_LEN,
            got: 16
        })
    );
}

#[test]
fn test_garbage_ciphertext_rejected() {
    let key = ChannelKey::generate();

    assert!(key.decrypt("@@@").is_err());
    assert!(key.decrypt("AAAA").is_err());
}

#[test]
fn test_short_token_is_hex() {
    let token = short_token(12);

    assert_eq!(token.len(), 24);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(token, short_token(12));
}
