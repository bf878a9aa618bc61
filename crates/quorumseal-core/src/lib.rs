//! quorumseal-core: shared types for multi-party envelope encryption
//!
//! - [`types`]: parties and their key types (call-time only, never persisted)
//! - [`error`]: the error taxonomy every protocol operation reports through
//! - [`config`]: TOML configuration schema (KDF work factor, fan-out, logging)
//! - [`logging`]: `tracing-subscriber` bootstrap for embedding applications

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    EngineConfig, KdfConfig, LogConfig, LogFormat, SealConfig, DEFAULT_KDF_ITERATIONS,
    MAX_KDF_ITERATIONS, MIN_KDF_ITERATIONS,
};
pub use error::{ErrorKind, SealError, SealResult};
pub use types::{KeyType, Party, MIN_KEY_LENGTH};
