//! AES-256-GCM seal/open
//!
//! Ciphertext layout: `[N bytes: ciphertext][16 bytes: GCM tag]`. The 12-byte
//! nonce travels separately (the `iv` field of a stage or payload blob).

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use quorumseal_core::{SealError, SealResult};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::kdf::SymmetricKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Generate a fresh random 96-bit nonce. Never reuse one with the same key.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it.
pub fn seal(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> SealResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| SealError::Encryption(format!("AES-256-GCM seal failed: {e}")))
}

/// Decrypt and verify. Any tag mismatch, truncation or corruption returns
/// [`SealError::Authentication`]; no plaintext is ever released on failure.
pub fn open(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> SealResult<Zeroizing<Vec<u8>>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(SealError::Authentication);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| SealError::Authentication)
}
