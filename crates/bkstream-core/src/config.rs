use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BackupError, BackupResult};

/// Top-level codec configuration (loaded from bkstream.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupStreamConfig {
    pub compression: CompressionConfig,
    pub padding: PaddingConfig,
    pub reader: ReaderConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// gzip level, 0 (store) to 9 (best) (default: 6)
    pub level: u32,
}

/// Size-bucketing applied to the compressed stream before encryption
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddingConfig {
    /// Pad the compressed stream up to the next bucket (default: true)
    pub enabled: bool,
    /// Smallest bucket in bytes (default: 541)
    pub min_bucket: u64,
    /// Growth between consecutive buckets, in percent (default: 5)
    pub growth_percent: u32,
    /// Explicit ascending bucket table; overrides min_bucket/growth_percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Buffer size for the decrypt/decompress pass (default: 64 KiB)
    pub buffer_size: usize,
    /// What a frame cut off mid-way means
    pub truncation: TruncationPolicy,
}

/// How the reader treats a stream that ends inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationPolicy {
    /// Surface `BackupError::Truncated` from the iterator
    #[default]
    Error,
    /// Treat the partial frame as the end of the stream
    EndOfStream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_bucket: 541,
            growth_percent: 5,
            buckets: None,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            truncation: TruncationPolicy::Error,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl BackupStreamConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> BackupResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| BackupError::Config(format!("parsing: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> BackupResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> BackupResult<()> {
        if self.compression.level > 9 {
            return Err(BackupError::Config(format!(
                "compression.level must be 0-9, got {}",
                self.compression.level
            )));
        }
        if self.padding.growth_percent == 0 {
            return Err(BackupError::Config(
                "padding.growth_percent must be greater than zero".into(),
            ));
        }
        if self.padding.min_bucket == 0 {
            return Err(BackupError::Config(
                "padding.min_bucket must be greater than zero".into(),
            ));
        }
        if let Some(buckets) = &self.padding.buckets {
            if buckets.is_empty() || buckets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(BackupError::Config(
                    "padding.buckets must be a non-empty, strictly ascending list".into(),
                ));
            }
        }
        if self.reader.buffer_size == 0 {
            return Err(BackupError::Config(
                "reader.buffer_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
