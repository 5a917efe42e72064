// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key vault: AES-256-GCM encryption of custody private keys at rest.
//!
//! Blob layout is `[12-byte nonce][ciphertext || 16-byte tag]`, base64
//! encoded, so each blob is self-describing. A fresh random nonce is drawn
//! per encryption. Decryption authenticates before returning anything; a
//! tampered or truncated blob yields [`VaultError::CorruptCiphertext`],
//! never garbage plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64ct::{Base64, Encoding};
use rand::rngs::OsRng;
use rand::RngCore;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("ciphertext is malformed or failed authentication")]
    CorruptCiphertext,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// Process-wide key vault. The master key is read-only after construction.
pub struct KeyVault {
    cipher: Aes256Gcm,
}

impl KeyVault {
    pub fn new(master_key: [u8; 32]) -> Self {
        let cipher = Aes256Gcm::new_from_slice(&master_key)
            .expect("32-byte key is always valid for AES-256-GCM");
        Self { cipher }
    }

    /// Encrypt plaintext key material into a base64 blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(Base64::encode_string(&blob))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        let combined =
            Base64::decode_vec(blob).map_err(|_| VaultError::CorruptCiphertext)?;
        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::CorruptCiphertext);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::CorruptCiphertext)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::CorruptCiphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> KeyVault {
        KeyVault::new([7u8; 32])
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let vault = test_vault();
        let blob = vault.encrypt("super-secret-private-key").unwrap();
        assert_eq!(vault.decrypt(&blob).unwrap(), "super-secret-private-key");
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let vault = test_vault();
        let a = vault.encrypt("same input").unwrap();
        let b = vault.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_blob_fails_authentication() {
        let vault = test_vault();
        let blob = vault.encrypt("key material").unwrap();

        let mut bytes = Base64::decode_vec(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = Base64::encode_string(&bytes);

        assert!(matches!(
            vault.decrypt(&tampered),
            Err(VaultError::CorruptCiphertext)
        ));
    }

    #[test]
    fn malformed_blobs_are_rejected() {
        let vault = test_vault();
        assert!(matches!(
            vault.decrypt("not base64 !!!"),
            Err(VaultError::CorruptCiphertext)
        ));
        // Too short to hold nonce + tag.
        let short = Base64::encode_string(&[0u8; 8]);
        assert!(matches!(
            vault.decrypt(&short),
            Err(VaultError::CorruptCiphertext)
        ));
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let blob = test_vault().encrypt("key material").unwrap();
        let other = KeyVault::new([8u8; 32]);
        assert!(matches!(
            other.decrypt(&blob),
            Err(VaultError::CorruptCiphertext)
        ));
    }
}
