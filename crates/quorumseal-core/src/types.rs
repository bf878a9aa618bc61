use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SealError, SealResult};

/// Minimum length of a party's secret, in bytes
pub const MIN_KEY_LENGTH: usize = 10;

/// How the caller obtained a party's secret.
///
/// The protocol treats every secret as opaque bytes; the tag only selects the
/// derivation path and lets decryption report "wrong kind of credential"
/// separately from "wrong credential".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyType {
    /// Bearer token (JWT) issued by an external identity provider
    #[serde(alias = "jwt")]
    BearerToken,
    /// Single-use random request key (see `generate_random_key`)
    RequestKey,
    /// Any other caller-provided secret
    Custom,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BearerToken => "bearer-token",
            Self::RequestKey => "request-key",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One required key-holder of an envelope.
///
/// Parties exist only as call-time arguments. The secret is held in a
/// [`SecretString`] and never appears in `Debug` output.
pub struct Party {
    pub id: String,
    pub key_type: KeyType,
    pub label: Option<String>,
    key: SecretString,
}

impl Party {
    pub fn new(id: impl Into<String>, key: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            id: id.into(),
            key_type,
            label: None,
            key: SecretString::from(key.into()),
        }
    }

    pub fn bearer_token(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self::new(id, token, KeyType::BearerToken)
    }

    pub fn request_key(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(id, key, KeyType::RequestKey)
    }

    pub fn custom(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(id, key, KeyType::Custom)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Raw secret bytes. Callers must not copy these into long-lived buffers.
    pub fn secret(&self) -> &[u8] {
        self.key.expose_secret().as_bytes()
    }

    /// Check the party is usable for encryption: non-empty id and a key of
    /// at least [`MIN_KEY_LENGTH`] bytes. `index` is the position in the
    /// caller's list, used for error reporting.
    pub fn validate(&self, index: usize) -> SealResult<()> {
        if self.id.trim().is_empty() {
            return Err(SealError::MissingPartyId { index });
        }
        let length = self.secret().len();
        if length < MIN_KEY_LENGTH {
            return Err(SealError::InvalidKey {
                party: self.id.clone(),
                length,
                min: MIN_KEY_LENGTH,
            });
        }
        Ok(())
    }
}

impl Clone for Party {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            key_type: self.key_type,
            label: self.label.clone(),
            key: SecretString::from(self.key.expose_secret().to_owned()),
        }
    }
}

impl fmt::Debug for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Party")
            .field("id", &self.id)
            .field("key_type", &self.key_type)
            .field("label", &self.label)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
