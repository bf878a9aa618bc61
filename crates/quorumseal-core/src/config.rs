use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SealError, SealResult};

/// PBKDF2 iteration count used when nothing else is configured or recorded
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Lowest PBKDF2 iteration count `validate` accepts
pub const MIN_KDF_ITERATIONS: u32 = 1_000;

/// Highest PBKDF2 iteration count accepted, from config or from an envelope
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

/// Top-level configuration (loaded from quorumseal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub kdf: KdfConfig,
    pub engine: EngineConfig,
    pub log: LogConfig,
}

/// Password-based key derivation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// PBKDF2-HMAC-SHA256 iterations used when sealing (default: 100000)
    ///
    /// A non-default count is written into the envelope, and decryption
    /// always uses the count the envelope declares.
    pub iterations: u32,
}

/// Per-party fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run per-party wrap/unwrap on the rayon pool (default: true)
    pub parallel: bool,
    /// Minimum number of parties before fan-out goes parallel (default: 2)
    pub parallel_threshold: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level or EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: LogFormat,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: 2,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl SealConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> SealResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SealError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults if it does
    /// not exist.
    pub fn load(path: &Path) -> SealResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            SealError::Config(msg) => SealError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn validate(&self) -> SealResult<()> {
        if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&self.kdf.iterations) {
            return Err(SealError::Config(format!(
                "kdf.iterations must be in {MIN_KDF_ITERATIONS}..={MAX_KDF_ITERATIONS}, got {}",
                self.kdf.iterations
            )));
        }
        if self.engine.parallel_threshold == 0 {
            return Err(SealError::Config(
                "engine.parallel_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[kdf]
iterations = 250000

[engine]
parallel = false
parallel_threshold = 4

[log]
level = "debug"
format = "json"
"#;
        let config = SealConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(config.kdf.iterations, 250_000);
        assert!(!config.engine.parallel);
        assert_eq!(config.engine.parallel_threshold, 4);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_defaults() {
        let config = SealConfig::from_toml_str("").unwrap();

        assert_eq!(config.kdf.iterations, 100_000);
        assert!(config.engine.parallel);
        assert_eq!(config.engine.parallel_threshold, 2);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = SealConfig::from_toml_str("[kdf]\niterations = 5000\n").unwrap();

        // Overridden
        assert_eq!(config.kdf.iterations, 5_000);
        // Defaults
        assert!(config.engine.parallel);
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn test_rejects_weak_kdf() {
        let err = SealConfig::from_toml_str("[kdf]\niterations = 10\n").unwrap_err();
        assert!(matches!(err, SealError::Config(_)));
    }

    #[test]
    fn test_rejects_excessive_kdf() {
        let err = SealConfig::from_toml_str("[kdf]\niterations = 20000000\n").unwrap_err();
        assert!(err.to_string().contains("kdf.iterations"));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let err = SealConfig::from_toml_str("[engine]\nparallel_threshold = 0\n").unwrap_err();
        assert!(err.to_string().contains("parallel_threshold"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SealConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.kdf.iterations, 100_000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quorumseal.toml");
        std::fs::write(&path, "[log]\nlevel = \"trace\"\n").unwrap();

        let config = SealConfig::load(&path).unwrap();
        assert_eq!(config.log.level, "trace");
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[kdf\n").unwrap();

        let err = SealConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = SealConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = SealConfig::from_toml_str(&toml_str).unwrap();

        assert_eq!(config.kdf.iterations, parsed.kdf.iterations);
        assert_eq!(config.log.format, parsed.log.format);
    }
}
