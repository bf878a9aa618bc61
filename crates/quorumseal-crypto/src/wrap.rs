//! Single-party wrap primitive
//!
//! Encrypts bytes (or any serde value) under one party's key and yields the
//! fields a stage record stores: `iv`, `salt`, `keyHash`, `data`.
//!
//! Key paths by [`KeyType`]:
//! - `bearer-token`: stage key = HKDF-SHA256(token, salt); the token hash is
//!   authenticated as AEAD associated data and checked before any cipher work
//! - `request-key` / `custom`: stage key = PBKDF2-HMAC-SHA256(secret, salt)
//!
//! In every case `keyHash` is SHA-256 of the raw secret, never of the derived
//! key.

use quorumseal_core::{KeyType, Party, SealError, SealResult};
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

use crate::cipher;
use crate::kdf::{self, KdfParams, SymmetricKey};
use crate::keys;
use crate::{HASH_SIZE, NONCE_SIZE, SALT_SIZE};

/// The cryptographic fields of one wrapped blob, in raw (undecoded) form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedData {
    pub iv: [u8; NONCE_SIZE],
    pub salt: [u8; SALT_SIZE],
    pub key_hash: [u8; HASH_SIZE],
    pub data: Vec<u8>,
}

/// Encrypt `plaintext` under `party`'s key with a fresh salt and nonce.
pub fn wrap_bytes(plaintext: &[u8], party: &Party, params: &KdfParams) -> SealResult<WrappedData> {
    let secret = party.secret();
    let key_hash = keys::key_hash(secret);
    let salt = kdf::generate_salt();
    let iv = cipher::generate_nonce();

    let key = stage_key(party.key_type, secret, &salt, params)?;
    let data = cipher::seal(
        &key,
        &iv,
        plaintext,
        associated_data(party.key_type, &key_hash),
    )?;

    Ok(WrappedData {
        iv,
        salt,
        key_hash,
        data,
    })
}

/// Decrypt a wrapped blob with `party`'s key.
///
/// Returns [`SealError::Authentication`] when the key is wrong or the blob
/// was modified; this is the only reliable wrong-key signal.
pub fn unwrap_bytes(
    wrapped: &WrappedData,
    party: &Party,
    params: &KdfParams,
) -> SealResult<Zeroizing<Vec<u8>>> {
    let secret = party.secret();

    if party.key_type == KeyType::BearerToken
        && !keys::key_hash_eq(&keys::key_hash(secret), &wrapped.key_hash)
    {
        return Err(SealError::Authentication);
    }

    let key = stage_key(party.key_type, secret, &wrapped.salt, params)?;
    cipher::open(
        &key,
        &wrapped.iv,
        &wrapped.data,
        associated_data(party.key_type, &wrapped.key_hash),
    )
}

/// Serialize `value` as JSON and wrap it.
pub fn wrap_json<T: Serialize + ?Sized>(
    value: &T,
    party: &Party,
    params: &KdfParams,
) -> SealResult<WrappedData> {
    let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
    wrap_bytes(&plaintext, party, params)
}

/// Unwrap and deserialize a JSON value produced by [`wrap_json`].
pub fn unwrap_json<T: DeserializeOwned>(
    wrapped: &WrappedData,
    party: &Party,
    params: &KdfParams,
) -> SealResult<T> {
    let plaintext = unwrap_bytes(wrapped, party, params)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

fn stage_key(
    key_type: KeyType,
    secret: &[u8],
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> SealResult<SymmetricKey> {
    match key_type {
        KeyType::BearerToken => keys::derive_bearer_key(secret, salt),
        KeyType::RequestKey | KeyType::Custom => kdf::derive_key(secret, salt, params),
    }
}

fn associated_data(key_type: KeyType, key_hash: &[u8; HASH_SIZE]) -> &[u8] {
    match key_type {
        KeyType::BearerToken => key_hash.as_slice(),
        KeyType::RequestKey | KeyType::Custom => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fast() -> KdfParams {
        KdfParams { iterations: 1_000 }
    }

    #[test]
    fn test_wrap_unwrap_request_key() {
        let party = Party::request_key("req", keys::generate_random_key());
        let wrapped = wrap_bytes(b"master-key-bytes", &party, &fast()).unwrap();
        let opened = unwrap_bytes(&wrapped, &party, &fast()).unwrap();

        assert_eq!(opened.as_slice(), b"master-key-bytes");
        assert_eq!(wrapped.key_hash, keys::key_hash(party.secret()));
    }

    #[test]
    fn test_wrap_unwrap_bearer_token() {
        let party = Party::bearer_token("owner", "eyJhbGciOiJIUzI1NiJ9.payload.signature");
        let wrapped = wrap_bytes(b"hello", &party, &fast()).unwrap();
        let opened = unwrap_bytes(&wrapped, &party, &fast()).unwrap();

        assert_eq!(opened.as_slice(), b"hello");
    }

    #[test]
    fn test_wrong_request_key_fails() {
        let party = Party::request_key("req", keys::generate_random_key());
        let other = Party::request_key("req", keys::generate_random_key());
        let wrapped = wrap_bytes(b"secret", &party, &fast()).unwrap();

        let err = unwrap_bytes(&wrapped, &other, &fast()).unwrap_err();
        assert!(matches!(err, SealError::Authentication));
    }

    #[test]
    fn test_wrong_bearer_token_rejected_before_cipher() {
        let party = Party::bearer_token("owner", "token-aaaaaaaaaaaaaaaa");
        let other = Party::bearer_token("owner", "token-bbbbbbbbbbbbbbbb");
        let wrapped = wrap_bytes(b"secret", &party, &fast()).unwrap();

        let err = unwrap_bytes(&wrapped, &other, &fast()).unwrap_err();
        assert!(matches!(err, SealError::Authentication));
    }

    #[test]
    fn test_bearer_stage_binds_key_hash() {
        let party = Party::bearer_token("owner", "token-aaaaaaaaaaaaaaaa");
        let mut wrapped = wrap_bytes(b"secret", &party, &fast()).unwrap();
        wrapped.key_hash[0] ^= 1;

        let err = unwrap_bytes(&wrapped, &party, &fast()).unwrap_err();
        assert!(matches!(err, SealError::Authentication));
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_wrap() {
        let party = Party::custom("c", "custom-secret-value");
        let a = wrap_bytes(b"same", &party, &fast()).unwrap();
        let b = wrap_bytes(b"same", &party, &fast()).unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.data, b.data);
        assert_eq!(a.key_hash, b.key_hash);
    }

    #[test]
    fn test_key_type_selects_derivation() {
        // The same secret wrapped as bearer vs custom must not be interchangeable.
        let as_bearer = Party::bearer_token("p", "shared-secret-value");
        let as_custom = Party::custom("p", "shared-secret-value");
        let wrapped = wrap_bytes(b"data", &as_custom, &fast()).unwrap();

        assert!(unwrap_bytes(&wrapped, &as_bearer, &fast()).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let party = Party::custom("c", "custom-secret-value");
        let value = json!({"email": "a@b.com", "n": 3});
        let wrapped = wrap_json(&value, &party, &fast()).unwrap();
        let back: serde_json::Value = unwrap_json(&wrapped, &party, &fast()).unwrap();

        assert_eq!(back, value);
    }
}
