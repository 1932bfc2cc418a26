//! AES-256-GCM encryption for credentials at rest.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use pipeline_core::Secret;

use crate::DbError;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Environment variable holding the base64 master key.
pub const MASTER_KEY_ENV: &str = "MASTER_KEY";

/// Encrypts credentials with a process-wide master key.
///
/// Ciphertexts are `base64([12-byte nonce][ciphertext + tag])`.
#[derive(Clone)]
pub struct CredentialVault {
    key: [u8; KEY_LENGTH],
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialVault(***)")
    }
}

impl CredentialVault {
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Build a vault from a base64 encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, DbError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| DbError::Vault(format!("master key is not base64: {}", e)))?;
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            DbError::Vault(format!(
                "master key must be {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self::new(key))
    }

    /// Build a vault from `MASTER_KEY`.
    pub fn from_env() -> Result<Self, DbError> {
        let encoded = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| DbError::Vault(format!("{} is not set", MASTER_KEY_ENV)))?;
        Self::from_base64(&encoded)
    }

    /// Generate a fresh random key, base64 encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        STANDARD.encode(key)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, DbError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| DbError::Vault("encryption failed".into()))?;

        let mut bytes = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(bytes))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Secret, DbError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| DbError::Vault(format!("ciphertext is not base64: {}", e)))?;
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(DbError::Vault("ciphertext too short".into()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LENGTH);

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DbError::Vault("decryption failed".into()))?;

        String::from_utf8(plaintext)
            .map(Secret::new)
            .map_err(|_| DbError::Vault("credential is not utf-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let vault = CredentialVault::from_base64(&CredentialVault::generate_key()).unwrap();
        let sealed = vault.encrypt("sk-live-123").unwrap();
        assert_ne!(sealed, "sk-live-123");
        assert_eq!(vault.decrypt(&sealed).unwrap().expose(), "sk-live-123");
    }

    #[test]
    fn nonces_differ_per_encryption() {
        let vault = CredentialVault::new([7u8; 32]);
        assert_ne!(vault.encrypt("same").unwrap(), vault.encrypt("same").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = CredentialVault::new([1u8; 32]).encrypt("secret").unwrap();
        let result = CredentialVault::new([2u8; 32]).decrypt(&sealed);
        assert!(matches!(result, Err(DbError::Vault(_))));
    }

    #[test]
    fn short_keys_are_rejected() {
        let result = CredentialVault::from_base64(&STANDARD.encode([0u8; 16]));
        assert!(matches!(result, Err(DbError::Vault(msg)) if msg.contains("32 bytes")));
    }
}
