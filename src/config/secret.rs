//! Sealing of stored credentials.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("credential encryption failed: {reason}")]
pub struct EncryptionFailure {
    pub reason: String,
}

impl EncryptionFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// AES-256-GCM box keyed by the SHA-256 of a configured secret.
///
/// Sealed values are `base64(nonce || ciphertext || tag)`.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

impl SecretBox {
    pub fn new(secret: &str) -> Result<Self, EncryptionFailure> {
        if secret.is_empty() {
            return Err(EncryptionFailure::new("secret key is empty"));
        }
        let digest = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&digest[..])
            .map_err(|err| EncryptionFailure::new(err.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plain: &str) -> Result<String, EncryptionFailure> {
        if plain.is_empty() {
            return Ok(String::new());
        }

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plain.as_bytes())
            .map_err(|_| EncryptionFailure::new("encryption failed"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&sealed);
        Ok(STANDARD.encode(payload))
    }

    pub fn open(&self, sealed: &str) -> Result<String, EncryptionFailure> {
        let sealed = sealed.trim();
        if sealed.is_empty() {
            return Ok(String::new());
        }

        let payload = STANDARD
            .decode(sealed)
            .map_err(|err| EncryptionFailure::new(format!("invalid base64: {err}")))?;
        if payload.len() <= NONCE_LEN {
            return Err(EncryptionFailure::new("sealed value is too short"));
        }

        let (nonce, body) = payload.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| EncryptionFailure::new("authentication failed"))?;
        String::from_utf8(plain).map_err(|_| EncryptionFailure::new("plaintext is not UTF-8"))
    }
}
