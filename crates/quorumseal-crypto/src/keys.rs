//! Key material: per-envelope master key, party key hashes, bearer-token key
//! derivation, and random request keys

use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use quorumseal_core::{SealError, SealResult};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::kdf::SymmetricKey;
use crate::{HASH_SIZE, KEY_SIZE, SALT_SIZE};

/// HKDF info string for bearer-token stage keys
const BEARER_KEY_INFO: &[u8] = b"quorumseal-bearer-token-v3";

/// Length of a request key produced by [`generate_random_key`], before encoding
const RANDOM_KEY_BYTES: usize = 32;

/// The random 256-bit secret generated once per envelope. Zeroized on drop.
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Rebuild a master key from an unwrapped stage plaintext.
    pub fn from_slice(bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(SealError::Malformed(format!(
                "unwrapped master key has wrong size: {} bytes (expected {KEY_SIZE})",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Constant-time equality, used by the convergence check.
    pub fn ct_eq(&self, other: &MasterKey) -> bool {
        self.bytes.as_slice().ct_eq(other.bytes.as_slice()).into()
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// SHA-256 of a party's raw secret. Stored in each stage so decryption can
/// match supplied parties to stages without trying every combination.
pub fn key_hash(secret: &[u8]) -> [u8; HASH_SIZE] {
    Sha256::digest(secret).into()
}

/// Constant-time comparison of two key hashes.
pub fn key_hash_eq(a: &[u8; HASH_SIZE], b: &[u8; HASH_SIZE]) -> bool {
    a.as_slice().ct_eq(b.as_slice()).into()
}

/// Derive a stage key from a bearer token via HKDF-SHA256.
///
/// Bearer tokens are already high-entropy, so the expensive PBKDF2 path is
/// skipped. The stage salt still makes every stage key unique.
pub fn derive_bearer_key(token: &[u8], salt: &[u8; SALT_SIZE]) -> SealResult<SymmetricKey> {
    if token.is_empty() {
        return Err(SealError::EmptySecret);
    }
    let hkdf = Hkdf::<Sha256>::new(Some(salt.as_slice()), token);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(BEARER_KEY_INFO, &mut okm)
        .map_err(|e| SealError::KeyDerivation(format!("HKDF expand failed: {e}")))?;
    Ok(SymmetricKey::from_bytes(okm))
}

/// Generate a fresh request key: 32 random bytes, base64 encoded.
pub fn generate_random_key() -> String {
    let mut bytes = [0u8; RANDOM_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = STANDARD.encode(bytes);
    bytes.zeroize();
    encoded
}
