//! Encrypted backup reader
//!
//! Opening a reader makes two passes over the source:
//!
//! 1. HMAC-SHA256 over `[0, total_len - 32)`, compared in constant time with
//!    the trailing 32 bytes. Nothing is decrypted if this fails.
//! 2. Reopen, read the 16-byte IV, then decrypt and gunzip the ciphertext
//!    into a frame stream.
//!
//! The header frame and the first data frame are read during `open`.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use bkstream_core::config::ReaderConfig;
use bkstream_core::{BackupError, BackupHeader, BackupResult};
use bkstream_crypto::{
    verify_stream_mac, BackupId, BackupKey, CbcDecryptReader, KeyMaterial, BLOCK_SIZE, IV_SIZE,
    MAC_SIZE,
};
use bkstream_frames::{read_frame, ByteCounter, CountingReader};
use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::cursor::FrameCursor;
use crate::source::{FileSource, StreamSource};

type DecryptPipeline<R> = BufReader<GzDecoder<CbcDecryptReader<CountingReader<R>>>>;

/// Pull-based iterator over the frames of an authenticated backup stream.
pub struct EncryptedBackupReader<R: Read> {
    cursor: FrameCursor<DecryptPipeline<R>>,
    header: Option<BackupHeader>,
    bytes_read: ByteCounter,
    stream_length: u64,
    drained: bool,
}

impl<R: Read> EncryptedBackupReader<R> {
    /// Authenticate and open `source`, whose physical length is `total_len`.
    pub fn open<S>(
        key: &BackupKey,
        backup_id: &BackupId,
        source: &S,
        total_len: u64,
    ) -> BackupResult<Self>
    where
        S: StreamSource<Reader = R>,
    {
        Self::open_with_config(key, backup_id, source, total_len, &ReaderConfig::default())
    }

    pub fn open_with_config<S>(
        key: &BackupKey,
        backup_id: &BackupId,
        source: &S,
        total_len: u64,
        config: &ReaderConfig,
    ) -> BackupResult<Self>
    where
        S: StreamSource<Reader = R>,
    {
        let material = KeyMaterial::for_backup(key, backup_id)?;
        Self::from_key_material(&material, source, total_len, config)
    }

    /// Open with already-derived key material. The derived IV is not used;
    /// the stream's own first 16 bytes are.
    pub fn from_key_material<S>(
        material: &KeyMaterial,
        source: &S,
        total_len: u64,
        config: &ReaderConfig,
    ) -> BackupResult<Self>
    where
        S: StreamSource<Reader = R>,
    {
        verify_stream_mac(source.open_stream()?, total_len, material.mac_key())?;

        let ciphertext_len = total_len - (IV_SIZE + MAC_SIZE) as u64;
        if ciphertext_len == 0 || ciphertext_len % BLOCK_SIZE as u64 != 0 {
            return Err(BackupError::Corrupt(format!(
                "ciphertext length {ciphertext_len} is not a positive multiple of {BLOCK_SIZE}"
            )));
        }

        let mut raw = CountingReader::new(source.open_stream()?);
        let bytes_read = raw.counter();
        let mut iv = [0u8; IV_SIZE];
        raw.read_exact(&mut iv).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => BackupError::Truncated {
                expected: IV_SIZE as u64,
                actual: bytes_read.get(),
            },
            _ => BackupError::Io(e),
        })?;

        let cipher = CbcDecryptReader::new(raw, material.cipher_key(), &iv, ciphertext_len);
        let pipeline = BufReader::with_capacity(config.buffer_size, GzDecoder::new(cipher));
        let mut cursor = FrameCursor::new(pipeline, config.truncation);

        let header = cursor
            .read_with(|r| read_frame(r))?
            .map(|bytes| BackupHeader::from_bytes(&bytes))
            .transpose()?;
        cursor.advance();

        let mut reader = Self {
            cursor,
            header,
            bytes_read,
            stream_length: total_len,
            drained: false,
        };
        reader.settle();

        debug!(
            stream_length = total_len,
            has_header = reader.header.is_some(),
            "encrypted backup authenticated and opened"
        );
        Ok(reader)
    }

    /// Stream header, if one was written.
    ///
    /// The first frame is always decoded as the header, so a stream written
    /// without one exposes its first data frame here (or fails to open when
    /// that frame is not a valid header).
    pub fn header(&self) -> Option<&BackupHeader> {
        self.header.as_ref()
    }

    /// True while a frame, or a read error not yet returned, is pending.
    pub fn has_next(&self) -> bool {
        self.cursor.has_next()
    }

    /// Return the next frame. Fails with `NoSuchElement` once exhausted.
    pub fn next_frame(&mut self) -> BackupResult<Vec<u8>> {
        let frame = self.cursor.next_frame();
        if frame.is_err() {
            self.drained = true;
        }
        self.settle();
        frame
    }

    /// Bytes consumed from the physical source by the decrypt pass.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.get()
    }

    /// Physical stream length given at open.
    pub fn stream_length(&self) -> u64 {
        self.stream_length
    }

    pub fn frames_read(&self) -> u64 {
        self.cursor.frames_read()
    }

    /// Release the decrypting source. Further reads report exhaustion.
    pub fn close(&mut self) {
        self.drained = true;
        self.cursor.close();
    }

    /// Once the frames run out, read the rest of the physical stream so
    /// the cipher padding is checked and `bytes_read` reaches
    /// `stream_length`.
    fn settle(&mut self) {
        if self.drained || !self.cursor.is_exhausted() {
            return;
        }
        self.drained = true;
        match self.drain() {
            Ok(()) => info!(
                frames = self.cursor.frames_read(),
                bytes_read = self.bytes_read.get(),
                "encrypted backup fully read"
            ),
            Err(e) => self.cursor.fail(e),
        }
    }

    fn drain(&mut self) -> BackupResult<()> {
        let Some(pipeline) = self.cursor.source_mut() else {
            return Ok(());
        };
        let cipher = pipeline.get_mut().get_mut();
        io::copy(cipher, &mut io::sink())?;
        io::copy(&mut cipher.get_mut().take(MAC_SIZE as u64), &mut io::sink())?;
        Ok(())
    }
}

impl EncryptedBackupReader<BufReader<File>> {
    /// Open a backup file, taking its length from the file metadata.
    pub fn open_file(
        key: &BackupKey,
        backup_id: &BackupId,
        path: impl AsRef<Path>,
    ) -> BackupResult<Self> {
        let source = FileSource::new(path.as_ref());
        let total_len = source.len()?;
        Self::open(key, backup_id, &source, total_len)
    }
}

impl<R: Read> Iterator for EncryptedBackupReader<R> {
    type Item = BackupResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_frame())
    }
}
