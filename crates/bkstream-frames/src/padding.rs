//! Size-bucketing gzip sink
//!
//! The compressed stream is padded with zero bytes up to the next bucket size
//! after the gzip trailer has been written. gzip is self-terminating, so a
//! decoder stops at the end of the member and never sees the padding.
//!
//! Bucketing hides the exact compressed size of a backup; it does not hide
//! which bucket the backup falls into.

use std::io::{self, Write};

use bkstream_core::config::{CompressionConfig, PaddingConfig};
use bkstream_core::{BackupError, BackupResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::counting::CountingWriter;

const ZEROS: [u8; 8192] = [0u8; 8192];

/// Monotonic table of allowed stream sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketTable {
    /// `min`, then each bucket `growth_percent` larger than the previous one
    /// (rounded up, always at least one byte larger). Unbounded.
    Exponential { min: u64, growth_percent: u32 },
    /// Explicit ascending sizes. Lengths past the last bucket are not padded.
    Fixed(Vec<u64>),
}

impl Default for BucketTable {
    fn default() -> Self {
        let defaults = PaddingConfig::default();
        Self::exponential(defaults.min_bucket, defaults.growth_percent)
    }
}

impl BucketTable {
    pub fn exponential(min: u64, growth_percent: u32) -> Self {
        Self::Exponential {
            min: min.max(1),
            growth_percent: growth_percent.max(1),
        }
    }

    pub fn from_sizes(sizes: Vec<u64>) -> BackupResult<Self> {
        if sizes.is_empty() || sizes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BackupError::Config(
                "bucket table must be non-empty and strictly ascending".into(),
            ));
        }
        Ok(Self::Fixed(sizes))
    }

    /// Bucket table described by `config`, or `None` when padding is disabled.
    pub fn from_config(config: &PaddingConfig) -> BackupResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        match &config.buckets {
            Some(sizes) => Self::from_sizes(sizes.clone()).map(Some),
            None => Ok(Some(Self::exponential(
                config.min_bucket,
                config.growth_percent,
            ))),
        }
    }

    /// Bucket sizes in ascending order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        match self {
            Self::Exponential {
                min,
                growth_percent,
            } => {
                let growth = *growth_percent as u64;
                let buckets = std::iter::successors(Some(*min), move |&bucket| {
                    let step = bucket.saturating_mul(growth).div_ceil(100).max(1);
                    bucket.checked_add(step)
                });
                Box::new(buckets)
            }
            Self::Fixed(sizes) => Box::new(sizes.iter().copied()),
        }
    }

    /// Smallest bucket `>= len`, or `len` itself when no bucket is large enough.
    pub fn padded_len(&self, len: u64) -> u64 {
        self.iter().find(|&bucket| bucket >= len).unwrap_or(len)
    }
}

/// Sizes recorded when a [`PaddingGzipSink`] is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingStats {
    pub compressed_len: u64,
    pub padded_len: u64,
}

impl PaddingStats {
    pub fn padding(&self) -> u64 {
        self.padded_len - self.compressed_len
    }
}

/// gzip compressor that pads its output to a bucket size on `finish`.
pub struct PaddingGzipSink<W: Write> {
    encoder: GzEncoder<CountingWriter<W>>,
    buckets: Option<BucketTable>,
}

impl<W: Write> PaddingGzipSink<W> {
    /// `buckets: None` compresses without padding.
    pub fn new(inner: W, level: Compression, buckets: Option<BucketTable>) -> Self {
        Self {
            encoder: GzEncoder::new(CountingWriter::new(inner), level),
            buckets,
        }
    }

    pub fn from_config(
        inner: W,
        compression: &CompressionConfig,
        padding: &PaddingConfig,
    ) -> BackupResult<Self> {
        Ok(Self::new(
            inner,
            Compression::new(compression.level),
            BucketTable::from_config(padding)?,
        ))
    }

    /// Write the gzip trailer, append the zero padding, and return the inner writer.
    pub fn finish(self) -> io::Result<(W, PaddingStats)> {
        let mut counting = self.encoder.finish()?;
        let compressed_len = counting.count();
        let padded_len = self
            .buckets
            .as_ref()
            .map_or(compressed_len, |b| b.padded_len(compressed_len));

        let mut remaining = padded_len - compressed_len;
        while remaining > 0 {
            let n = remaining.min(ZEROS.len() as u64) as usize;
            counting.write_all(&ZEROS[..n])?;
            remaining -= n as u64;
        }
        counting.flush()?;

        debug!(compressed_len, padded_len, "compressed stream padded to bucket");
        Ok((
            counting.into_inner(),
            PaddingStats {
                compressed_len,
                padded_len,
            },
        ))
    }
}

impl<W: Write> Write for PaddingGzipSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}
