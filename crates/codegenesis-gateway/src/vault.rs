//! API-key vault: AES-256-GCM with a key derived from the configured secret.
//!
//! Stored form is `hex(nonce):hex(ciphertext+tag)`. Plaintext keys exist only
//! in memory for the duration of a request.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};

use codegenesis_core::error::{CodeGenesisError, Result};

const NONCE_LEN: usize = 12;

pub struct KeyVault {
    cipher: Aes256Gcm,
}

impl KeyVault {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CodeGenesisError::Crypto("encryption failed".into()))?;
        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let (nonce_hex, ct_hex) = stored
            .split_once(':')
            .ok_or_else(|| CodeGenesisError::Crypto("malformed ciphertext".into()))?;
        let nonce = hex::decode(nonce_hex)
            .map_err(|e| CodeGenesisError::Crypto(format!("bad nonce: {e}")))?;
        if nonce.len() != NONCE_LEN {
            return Err(CodeGenesisError::Crypto("bad nonce length".into()));
        }
        let ciphertext = hex::decode(ct_hex)
            .map_err(|e| CodeGenesisError::Crypto(format!("bad ciphertext: {e}")))?;
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| CodeGenesisError::Crypto("decryption failed".into()))?;
        String::from_utf8(plaintext).map_err(|e| CodeGenesisError::Crypto(e.to_string()))
    }
}
