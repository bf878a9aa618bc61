//! quorumseal-crypto: multi-party envelope encryption
//!
//! An envelope can only be opened when every designated party supplies its
//! key, in any order, and opening proves the envelope was not modified.
//!
//! Key hierarchy (version 3):
//! ```text
//! Master Key M (256-bit random, one per envelope)
//!   ├── Payload AEAD: AES-256-GCM (key=PBKDF2-SHA256(M, masterSalt), nonce=random 96-bit)
//!   └── Per-party stage: AES-256-GCM over M
//!         ├── request-key / custom: key=PBKDF2-SHA256(secret, salt), 100k iterations
//!         └── bearer-token:         key=HKDF-SHA256(token, salt), AAD=SHA-256(token)
//! ```
//!
//! Decryption recovers M from every stage independently and refuses to touch
//! the payload unless all recovered copies are identical.

pub mod cipher;
pub mod envelope;
pub mod format;
pub mod kdf;
pub mod keys;
pub mod legacy;
pub mod wrap;

pub use envelope::EnvelopeEngine;
pub use format::{
    is_legacy_two_party_envelope, is_multi_party_envelope, Envelope, Protocol, Stage,
    CURRENT_VERSION, LEGACY_VERSION,
};
pub use kdf::{derive_key, KdfParams, SymmetricKey};
pub use keys::{generate_random_key, MasterKey};
pub use quorumseal_core::{ErrorKind, KeyType, Party, SealError, SealResult};
pub use wrap::{unwrap_bytes, unwrap_json, wrap_bytes, wrap_json, WrappedData};

use serde::{de::DeserializeOwned, Serialize};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a PBKDF2/HKDF salt
pub const SALT_SIZE: usize = 16;

/// Size of a SHA-256 key hash
pub const HASH_SIZE: usize = 32;

/// Wire name of the stage cipher
pub const ALGORITHM: &str = "AES-GCM-256";

pub const MIN_PARTIES: usize = 2;
pub const MAX_PARTIES: usize = 10;

/// Seal `payload` for `parties` with default settings (100k PBKDF2 iterations).
pub fn encrypt_envelope<T: Serialize + ?Sized>(
    payload: &T,
    parties: &[Party],
) -> SealResult<Envelope> {
    EnvelopeEngine::default().encrypt(payload, parties)
}

/// Open an envelope of any supported version with default settings.
pub fn decrypt_envelope<T: DeserializeOwned>(
    envelope: &Envelope,
    parties: &[Party],
) -> SealResult<T> {
    EnvelopeEngine::default().decrypt(envelope, parties)
}
