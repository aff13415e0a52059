/*!
 * Configuration types for Satchel
 */

use crate::archive::ArchiveCompression;
use crate::backend::StorageConfig;
use crate::error::{FileServiceError, Result};
use crate::service::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration, loaded from TOML
///
/// ```toml
/// [storage]
/// kind = "local"
/// root = "/var/lib/satchel"
///
/// [archive]
/// compression = "deflate"
///
/// [logging]
/// level = "info"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatchelConfig {
    /// Storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Zip export settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Diagnostic output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Zip export settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Entry compression method
    #[serde(default)]
    pub compression: ArchiveCompression,
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,

    /// Write JSON logs to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Verbose logging (forces debug level)
    #[serde(default)]
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl SatchelConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            FileServiceError::Config(format!("{}: {}", path.display(), e))
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| FileServiceError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Service settings derived from this configuration
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            compression: self.archive.compression,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SatchelConfig::default();
        assert_eq!(config.storage.kind, StorageKind::Local);
        assert_eq!(config.archive.compression, ArchiveCompression::Deflate);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(!config.logging.verbose);
    }

    #[test]
    fn test_parse_full_config() {
        let config: SatchelConfig = toml::from_str(
            r#"
            [storage]
            kind = "object-store-local"
            root = "/srv/satchel"

            [archive]
            compression = "stored"

            [logging]
            level = "debug"
            file = "/var/log/satchel.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.kind, StorageKind::ObjectStoreLocal);
        assert_eq!(config.storage.root, Some(PathBuf::from("/srv/satchel")));
        assert_eq!(config.service_config().compression, ArchiveCompression::Stored);
        assert_eq!(config.logging.level.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(
            config.logging.file,
            Some(PathBuf::from("/var/log/satchel.json"))
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SatchelConfig = toml::from_str("[logging]\nverbose = true\n").unwrap();
        assert!(config.logging.verbose);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("satchel.toml");

        let mut config = SatchelConfig::default();
        config.storage = StorageConfig::local("/data/satchel");
        config.archive.compression = ArchiveCompression::Stored;
        config.to_file(&path).unwrap();

        assert_eq!(SatchelConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[archive]\ncompression = \"lzma\"\n").unwrap();

        assert!(matches!(
            SatchelConfig::from_file(&path),
            Err(FileServiceError::Config(_))
        ));
    }
}
