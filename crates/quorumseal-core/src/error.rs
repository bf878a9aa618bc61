use thiserror::Error;

use crate::types::KeyType;

pub type SealResult<T> = Result<T, SealError>;

#[derive(Debug, Error)]
pub enum SealError {
    // ── Construction (encrypt time, before any cryptographic work) ───────────
    #[error("at least {min} parties are required, got {count}")]
    TooFewParties { count: usize, min: usize },

    #[error("at most {max} parties are allowed, got {count}")]
    TooManyParties { count: usize, max: usize },

    #[error("party at position {index} has an empty id")]
    MissingPartyId { index: usize },

    #[error("party `{party}`: key must be at least {min} bytes, got {length}")]
    InvalidKey {
        party: String,
        length: usize,
        min: usize,
    },

    #[error("parties `{first}` and `{second}` supplied the same key")]
    DuplicateParty { first: String, second: String },

    #[error("key derivation requires a non-empty secret")]
    EmptySecret,

    // ── Decrypt time ─────────────────────────────────────────────────────────
    #[error("envelope requires {expected} parties, {supplied} supplied")]
    CountMismatch { expected: usize, supplied: usize },

    #[error("stage {stage}: expected a {expected} key, but no supplied party has that key type")]
    KeyTypeMismatch { stage: u32, expected: KeyType },

    #[error("party `{party}`, stage {stage}: declared {supplied} but the stage was sealed for {expected}")]
    PartyKeyTypeMismatch {
        party: String,
        stage: u32,
        expected: KeyType,
        supplied: KeyType,
    },

    #[error("stage {stage}: no supplied {key_type} key matches")]
    KeyMismatch { stage: u32, key_type: KeyType },

    #[error("party `{party}`, stage {stage}: incorrect key")]
    IncorrectKey { party: String, stage: u32 },

    /// Raised by the cipher when a tag fails to verify. The envelope layer
    /// rewrites it into [`SealError::IncorrectKey`] or
    /// [`SealError::PayloadAuthentication`] depending on where it happened.
    #[error("authentication failed: wrong key or corrupted data")]
    Authentication,

    // ── Integrity ────────────────────────────────────────────────────────────
    #[error("master keys do not match at stage {stage}; data may be tampered")]
    MasterKeyMismatch { stage: u32 },

    #[error("only {verified} of {expected} stages verified")]
    StageVerification { verified: usize, expected: usize },

    #[error("payload authentication failed after master key recovery; data may be tampered")]
    PayloadAuthentication,

    // ── Format ───────────────────────────────────────────────────────────────
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Internal ─────────────────────────────────────────────────────────────
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`SealError`], for callers that map failures
/// onto status codes or user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid party list at encrypt time.
    Construction,
    /// Wrong number of parties supplied at decrypt time.
    CountMismatch,
    /// A supplied credential is the wrong kind for its stage.
    KeyTypeMismatch,
    /// A supplied credential is the right kind but the wrong secret.
    KeyMismatch,
    /// The envelope itself is corrupted or was modified.
    Integrity,
    /// The envelope could not be parsed or uses an unknown version.
    Format,
    /// Configuration, I/O, or primitive failures unrelated to the caller's keys.
    Internal,
}

impl SealError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooFewParties { .. }
            | Self::TooManyParties { .. }
            | Self::MissingPartyId { .. }
            | Self::InvalidKey { .. }
            | Self::DuplicateParty { .. }
            | Self::EmptySecret => ErrorKind::Construction,
            Self::CountMismatch { .. } => ErrorKind::CountMismatch,
            Self::KeyTypeMismatch { .. } | Self::PartyKeyTypeMismatch { .. } => {
                ErrorKind::KeyTypeMismatch
            }
            Self::KeyMismatch { .. } | Self::IncorrectKey { .. } | Self::Authentication => {
                ErrorKind::KeyMismatch
            }
            Self::MasterKeyMismatch { .. }
            | Self::StageVerification { .. }
            | Self::PayloadAuthentication => ErrorKind::Integrity,
            Self::UnsupportedVersion(_) | Self::Malformed(_) | Self::Serialization(_) => {
                ErrorKind::Format
            }
            Self::Encryption(_) | Self::KeyDerivation(_) | Self::Config(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// True for errors that indicate the envelope may have been tampered with.
    pub fn is_integrity_failure(&self) -> bool {
        self.kind() == ErrorKind::Integrity
    }
}
