//! XChaCha20-Poly1305 packet encryption.
//!
//! A sealed frame body is `[nonce(24)] [ciphertext + tag(16)]`. Every call to
//! [`PacketCipher::seal`] draws a fresh random nonce, so one key can protect
//! any number of packets. Authentication is part of the cipher: a modified
//! frame fails to open.

use crate::error::{FrameworkError, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use tracing::warn;

/// Key length in bytes
pub const KEY_LEN: usize = 32;

/// XChaCha20 nonce length in bytes
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length in bytes
pub const TAG_LEN: usize = 16;

/// Encrypts and decrypts frame bodies with a shared 32-byte key
#[derive(Clone)]
pub struct PacketCipher {
    cipher: XChaCha20Poly1305,
}

impl std::fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketCipher").finish_non_exhaustive()
    }
}

impl PacketCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(FrameworkError::ConfigError(format!(
                "Encryption key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = XChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| FrameworkError::ConfigError(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Build from a hex-encoded key, as stored in configuration
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key.trim())
            .map_err(|e| FrameworkError::ConfigError(format!("Encryption key is not hex: {e}")))?;
        Self::new(&bytes)
    }

    /// Fresh random nonce from the OS entropy source
    pub fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce).map_err(|e| {
            warn!(error = %e, "Entropy source unavailable");
            FrameworkError::EncryptionFailure
        })?;
        Ok(nonce)
    }

    /// Encrypt `plaintext` into `nonce || ciphertext`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Self::generate_nonce()?;
        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| FrameworkError::EncryptionFailure)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a `nonce || ciphertext` body, rejecting anything that fails authentication
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(FrameworkError::DecryptionFailure);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| FrameworkError::DecryptionFailure)
    }
}
