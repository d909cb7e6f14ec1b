//! crates/chat_core/src/cipher.rs
//!
//! At-rest encryption for message text. One process-wide key, loaded once at
//! startup; there is no key versioning, so rotating the secret makes every
//! previously stored ciphertext unreadable.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::ports::{PortError, PortResult};

const NONCE_SIZE: usize = 24;
const KEY_CONTEXT: &str = "chat_core message-store text key v1";

/// Symmetric cipher for the `text` field of stored messages.
///
/// Output layout is `base64(nonce || ciphertext)`, with a fresh random
/// 24-byte nonce per call, so encrypting the same text twice gives two
/// different strings.
#[derive(Clone)]
pub struct MessageCipher {
    cipher: XChaCha20Poly1305,
}

impl MessageCipher {
    /// Builds the cipher from the configured secret. The 32-byte key is derived
    /// from the secret with BLAKE3 so any non-empty secret string is accepted.
    pub fn new(secret: &str) -> PortResult<Self> {
        if secret.trim().is_empty() {
            return Err(PortError::Validation(
                "Encryption key must not be empty".to_string(),
            ));
        }
        let key = blake3::derive_key(KEY_CONTEXT, secret.as_bytes());
        Ok(Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> PortResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| PortError::Unexpected("Message encryption failed".to_string()))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(output))
    }

    pub fn decrypt(&self, encoded: &str) -> PortResult<String> {
        let data = STANDARD.decode(encoded).map_err(|_| PortError::Decryption)?;
        if data.len() < NONCE_SIZE {
            return Err(PortError::Decryption);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| PortError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| PortError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_unicode_and_empty_text() {
        let cipher = MessageCipher::new("test-secret").unwrap();
        for text in ["hello", "", "héllo wörld 👋", "多语言 テキスト", "line\nbreak\ttab"] {
            let encrypted = cipher.encrypt(text).unwrap();
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), text);
        }
    }

    #[test]
    fn ciphertext_does_not_leak_plaintext() {
        let cipher = MessageCipher::new("test-secret").unwrap();
        let encrypted = cipher.encrypt("hello").unwrap();
        assert_ne!(encrypted, "hello");
        assert!(!encrypted.contains("hello"));
        assert_ne!(encrypted, cipher.encrypt("hello").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let first = MessageCipher::new("key-one").unwrap();
        let second = MessageCipher::new("key-two").unwrap();
        let encrypted = first.encrypt("secret message").unwrap();
        assert!(matches!(second.decrypt(&encrypted), Err(PortError::Decryption)));
    }

    #[test]
    fn garbage_input_fails() {
        let cipher = MessageCipher::new("test-secret").unwrap();
        assert!(cipher.decrypt("not base64 at all!").is_err());
        assert!(cipher.decrypt(&STANDARD.encode([1u8, 2, 3])).is_err());
        assert!(cipher.decrypt("").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = MessageCipher::new("test-secret").unwrap();
        let mut raw = STANDARD.decode(cipher.encrypt("important").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        assert!(cipher.decrypt(&STANDARD.encode(raw)).is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(MessageCipher::new("   "), Err(PortError::Validation(_))));
    }
}
