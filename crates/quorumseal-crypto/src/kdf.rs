//! Key derivation: PBKDF2-HMAC-SHA256 secret → symmetric key

use pbkdf2::pbkdf2_hmac;
use quorumseal_core::{
    KdfConfig, SealError, SealResult, DEFAULT_KDF_ITERATIONS, MAX_KDF_ITERATIONS,
    MIN_KDF_ITERATIONS,
};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit AEAD key derived from a party secret or the master key.
///
/// Zeroized on drop to prevent secrets lingering in memory.
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Iteration count (default: 100000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::from(&KdfConfig::default())
    }
}

impl KdfParams {
    /// Reject iteration counts outside the range an envelope may declare.
    pub fn validate(&self) -> SealResult<()> {
        if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&self.iterations) {
            return Err(SealError::KeyDerivation(format!(
                "iteration count {} is outside {MIN_KDF_ITERATIONS}..={MAX_KDF_ITERATIONS}",
                self.iterations
            )));
        }
        Ok(())
    }

    pub fn is_default(&self) -> bool {
        self.iterations == DEFAULT_KDF_ITERATIONS
    }
}

impl From<&KdfConfig> for KdfParams {
    fn from(config: &KdfConfig) -> Self {
        Self {
            iterations: config.iterations,
        }
    }
}

/// Generate a fresh random derivation salt.
///
/// Only the encrypt path calls this; decryption always reads the salt back
/// from the stage it is opening.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a secret and salt using PBKDF2-HMAC-SHA256.
pub fn derive_key(
    secret: &[u8],
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> SealResult<SymmetricKey> {
    if secret.is_empty() {
        return Err(SealError::EmptySecret);
    }
    if params.iterations == 0 {
        return Err(SealError::KeyDerivation(
            "iteration count must be non-zero".into(),
        ));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret, salt, params.iterations, &mut key);
    Ok(SymmetricKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Use fast params for testing
    fn fast() -> KdfParams {
        KdfParams { iterations: 1_000 }
    }

    #[test]
    fn test_kdf_deterministic() {
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_key(b"test-secret-123", &salt, &fast()).unwrap();
        let key2 = derive_key(b"test-secret-123", &salt, &fast()).unwrap();

        assert_eq!(
            key1.as_bytes(),
            key2.as_bytes(),
            "KDF must be deterministic"
        );
    }

    #[test]
    fn test_kdf_different_secrets() {
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_key(b"secret-a-long", &salt, &fast()).unwrap();
        let key2 = derive_key(b"secret-b-long", &salt, &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_different_salts() {
        let key1 = derive_key(b"same-secret", &[1u8; SALT_SIZE], &fast()).unwrap();
        let key2 = derive_key(b"same-secret", &[2u8; SALT_SIZE], &fast()).unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different salts must produce different keys"
        );
    }

    #[test]
    fn test_kdf_iterations_change_output() {
        let salt = [7u8; SALT_SIZE];
        let key1 = derive_key(b"same-secret", &salt, &KdfParams { iterations: 1_000 }).unwrap();
        let key2 = derive_key(b"same-secret", &salt, &KdfParams { iterations: 1_001 }).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_rejects_empty_secret() {
        let err = derive_key(b"", &[0u8; SALT_SIZE], &fast()).unwrap_err();
        assert!(matches!(err, SealError::EmptySecret));
    }

    #[test]
    fn test_default_iterations() {
        assert_eq!(KdfParams::default().iterations, 100_000);
        assert!(KdfParams::default().is_default());
        assert!(!fast().is_default());
    }

    #[test]
    fn test_validate_range() {
        fast().validate().unwrap();
        KdfParams::default().validate().unwrap();
        assert!(KdfParams { iterations: 999 }.validate().is_err());

        let mut excessive = fast();
        excessive.iterations = MAX_KDF_ITERATIONS + 1;
        assert!(excessive.validate().is_err());
    }

    #[test]
    fn test_salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
