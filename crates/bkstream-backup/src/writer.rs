//! Encrypted backup writer
//!
//! Pipeline, outermost first:
//! ```text
//! frames -> gzip + bucket padding -> AES-256-CBC -> HMAC-SHA256 -> sink
//! ```
//! The IV goes through the MAC layer before any ciphertext, and the MAC is
//! appended to the sink on `close`.

use std::io::Write;

use bkstream_core::config::{CompressionConfig, PaddingConfig};
use bkstream_core::{BackupError, BackupHeader, BackupResult, BackupStreamConfig};
use bkstream_crypto::{
    BackupId, BackupKey, CbcEncryptWriter, KeyMaterial, MacWriter, MAC_SIZE,
};
use bkstream_frames::{check_frame_len, write_frame, PaddingGzipSink, PaddingStats};
use tracing::{debug, info, warn};

type Pipeline<W> = PaddingGzipSink<CbcEncryptWriter<MacWriter<W>>>;

enum WriterState<W: Write> {
    Open(Box<Pipeline<W>>),
    Closed { sink: W, mac: [u8; MAC_SIZE] },
    /// A pipeline write or `close` failed; the sink is gone and no MAC will
    /// ever be produced.
    Failed,
}

/// Writes frames into an authenticated, encrypted, compressed backup stream.
///
/// The header comes first, then frames, written in order by a single caller.
/// Nothing is durable until [`close`](Self::close) returns. Any I/O error
/// from the pipeline fails the writer for good: later writes return
/// `Closed` and `close` never seals the partial stream.
pub struct EncryptedBackupWriter<W: Write> {
    state: WriterState<W>,
    header_written: bool,
    frames_written: u64,
}

impl<W: Write> EncryptedBackupWriter<W> {
    /// Open a writer with default compression and padding.
    pub fn open(key: &BackupKey, backup_id: &BackupId, sink: W) -> BackupResult<Self> {
        Self::open_with_config(key, backup_id, sink, &BackupStreamConfig::default())
    }

    pub fn open_with_config(
        key: &BackupKey,
        backup_id: &BackupId,
        sink: W,
        config: &BackupStreamConfig,
    ) -> BackupResult<Self> {
        let material = KeyMaterial::for_backup(key, backup_id)?;
        Self::from_key_material(&material, sink, &config.compression, &config.padding)
    }

    /// Build the pipeline from already-derived key material.
    ///
    /// The IV is written to `sink` immediately.
    pub fn from_key_material(
        material: &KeyMaterial,
        sink: W,
        compression: &CompressionConfig,
        padding: &PaddingConfig,
    ) -> BackupResult<Self> {
        let mut mac = MacWriter::new(sink, material.mac_key())?;
        mac.write_all(material.iv())?;

        let cipher = CbcEncryptWriter::new(mac, material.cipher_key(), material.iv());
        let pipeline = PaddingGzipSink::from_config(cipher, compression, padding)?;
        debug!(
            level = compression.level,
            padding = padding.enabled,
            "encrypted backup writer opened"
        );

        Ok(Self {
            state: WriterState::Open(Box::new(pipeline)),
            header_written: false,
            frames_written: 0,
        })
    }

    /// Write the stream header. Must precede every frame and may only be
    /// written once.
    pub fn write_header(&mut self, header: &BackupHeader) -> BackupResult<()> {
        if self.header_written {
            return Err(BackupError::HeaderOutOfOrder);
        }
        let bytes = header.to_bytes();
        check_frame_len(bytes.len())?;
        self.with_pipeline(|pipeline| write_frame(pipeline, &bytes))?;
        self.header_written = true;
        debug!(version = header.version, "backup header written");
        Ok(())
    }

    /// Write one data frame. Fails with `HeaderOutOfOrder` until the header
    /// has been written.
    pub fn write_frame(&mut self, payload: &[u8]) -> BackupResult<()> {
        if !self.header_written {
            return Err(BackupError::HeaderOutOfOrder);
        }
        check_frame_len(payload.len())?;
        self.with_pipeline(|pipeline| write_frame(pipeline, payload))?;
        self.frames_written += 1;
        Ok(())
    }

    /// Finish compression, padding and encryption, append the MAC, and
    /// return it.
    ///
    /// Fails with `MacNotAvailable` if the writer is already closed and with
    /// `Closed` if it has failed.
    pub fn close(&mut self) -> BackupResult<[u8; MAC_SIZE]> {
        let pipeline = match std::mem::replace(&mut self.state, WriterState::Failed) {
            WriterState::Open(pipeline) => pipeline,
            closed @ WriterState::Closed { .. } => {
                self.state = closed;
                return Err(BackupError::MacNotAvailable);
            }
            WriterState::Failed => return Err(BackupError::Closed),
        };

        let (sink, mac, stats, physical_len) = match seal(*pipeline) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!(error = %e, frames = self.frames_written, "encrypted backup close failed");
                return Err(e);
            }
        };

        info!(
            frames = self.frames_written,
            compressed_len = stats.compressed_len,
            padded_len = stats.padded_len,
            physical_len,
            "encrypted backup closed"
        );
        self.state = WriterState::Closed { sink, mac };
        Ok(mac)
    }

    /// MAC of the closed stream.
    pub fn mac(&self) -> BackupResult<[u8; MAC_SIZE]> {
        match &self.state {
            WriterState::Closed { mac, .. } => Ok(*mac),
            _ => Err(BackupError::MacNotAvailable),
        }
    }

    /// Frames written so far, not counting the header.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self.state, WriterState::Open(_))
    }

    /// Recover the sink after a successful `close`.
    pub fn into_inner(self) -> BackupResult<W> {
        match self.state {
            WriterState::Closed { sink, .. } => Ok(sink),
            WriterState::Open(_) => Err(BackupError::MacNotAvailable),
            WriterState::Failed => Err(BackupError::Closed),
        }
    }

    /// Run `op` against the open pipeline; an error fails the writer.
    fn with_pipeline<F>(&mut self, op: F) -> BackupResult<()>
    where
        F: FnOnce(&mut Pipeline<W>) -> BackupResult<()>,
    {
        let WriterState::Open(pipeline) = &mut self.state else {
            return Err(BackupError::Closed);
        };
        let result = op(pipeline.as_mut());
        if let Err(e) = &result {
            warn!(error = %e, frames = self.frames_written, "encrypted backup writer failed");
            self.state = WriterState::Failed;
        }
        result
    }
}

/// Finish every layer of the pipeline and append the MAC to the sink.
fn seal<W: Write>(pipeline: Pipeline<W>) -> BackupResult<(W, [u8; MAC_SIZE], PaddingStats, u64)> {
    let (cipher, stats) = pipeline.finish()?;
    let mac_writer = cipher.finish()?;
    let physical_len = mac_writer.bytes_written() + MAC_SIZE as u64;
    let (mut sink, mac) = mac_writer.finalize();
    sink.write_all(&mac)?;
    sink.flush()?;
    Ok((sink, mac, stats, physical_len))
}
