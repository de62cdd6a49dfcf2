//! Sealing of private key seeds at rest.
//!
//! Seeds are encrypted with ChaCha20-Poly1305 under a master key. The key id
//! is bound as associated data so a sealed seed cannot be moved to another
//! key record without failing to open.
//!
//! Wire format: `nonce (12 bytes) || ciphertext+tag`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use memreceipt_core::KeyId;

use crate::error::{Result, ServiceError};

const NONCE_LEN: usize = 12;
const SEED_LEN: usize = 32;

/// Associated-data prefix for sealed seeds.
const SEAL_DOMAIN: &[u8] = b"memreceipt/sealed-seed/v1";

/// Seals and opens signing-key seeds.
#[derive(Clone)]
pub struct KeySealer {
    cipher: ChaCha20Poly1305,
}

impl KeySealer {
    /// Create a sealer from a 32-byte master key.
    pub fn new(master_key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(master_key.into()),
        }
    }

    /// Create a sealer with a random master key.
    ///
    /// Seeds sealed by it cannot be opened after the process exits.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(&key)
    }

    /// Seal a seed for a key id.
    pub fn seal(&self, key_id: &KeyId, seed: &[u8; 32]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let aad = associated_data(key_id);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: seed,
                    aad: &aad,
                },
            )
            .map_err(|e| ServiceError::KeyMaterialCorrupted(format!("seal {}: {}", key_id, e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open a sealed seed.
    ///
    /// Fails with `KeyMaterialCorrupted` on a wrong master key, a key id
    /// mismatch, or damaged bytes.
    pub fn open(&self, key_id: &KeyId, sealed: &[u8]) -> Result<[u8; 32]> {
        if sealed.len() <= NONCE_LEN {
            return Err(ServiceError::KeyMaterialCorrupted(format!(
                "sealed seed for {} is truncated",
                key_id
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let aad = associated_data(key_id);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                ServiceError::KeyMaterialCorrupted(format!("sealed seed for {} failed to open", key_id))
            })?;

        let len = plaintext.len();
        plaintext.try_into().map_err(|_| {
            ServiceError::KeyMaterialCorrupted(format!(
                "seed for {} has {} bytes, expected {}",
                key_id, len, SEED_LEN
            ))
        })
    }
}

impl std::fmt::Debug for KeySealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeySealer(..)")
    }
}

fn associated_data(key_id: &KeyId) -> Vec<u8> {
    let mut aad = Vec::with_capacity(SEAL_DOMAIN.len() + key_id.as_str().len());
    aad.extend_from_slice(SEAL_DOMAIN);
    aad.extend_from_slice(key_id.as_str().as_bytes());
    aad
}
