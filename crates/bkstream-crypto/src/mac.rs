//! HMAC-SHA256 over the physical stream
//!
//! The writer path routes IV and ciphertext through [`MacWriter`]; the reader
//! path runs [`verify_stream_mac`] over the whole stream before anything is
//! decrypted.

use std::io::{self, Read, Write};

use bkstream_core::{BackupError, BackupResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::{IV_SIZE, KEY_SIZE, MAC_SIZE};

type HmacSha256 = Hmac<Sha256>;

fn new_hmac(mac_key: &[u8; KEY_SIZE]) -> BackupResult<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| BackupError::Corrupt(format!("HMAC init failed: {e}")))
}

/// Write adapter that feeds every byte it passes through into an HMAC.
///
/// The `hmac` state holds key-derived pads and is dropped without being
/// wiped; the crate offers no zeroizing variant. The key itself is only
/// borrowed from [`KeyMaterial`](crate::KeyMaterial), which is wiped on drop.
pub struct MacWriter<W: Write> {
    inner: W,
    mac: HmacSha256,
    written: u64,
}

impl<W: Write> MacWriter<W> {
    pub fn new(inner: W, mac_key: &[u8; KEY_SIZE]) -> BackupResult<Self> {
        Ok(Self {
            inner,
            mac: new_hmac(mac_key)?,
            written: 0,
        })
    }

    /// Bytes covered by the MAC so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Consume the writer, returning the inner sink and the final MAC.
    pub fn finalize(self) -> (W, [u8; MAC_SIZE]) {
        let tag: [u8; MAC_SIZE] = self.mac.finalize().into_bytes().into();
        (self.inner, tag)
    }
}

impl<W: Write> Write for MacWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.mac.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Authenticate a whole physical stream of `total_len` bytes.
///
/// Computes HMAC-SHA256 over the first `total_len - 32` bytes of `source` and
/// compares it in constant time against the trailing 32 bytes.
pub fn verify_stream_mac<R: Read>(
    source: R,
    total_len: u64,
    mac_key: &[u8; KEY_SIZE],
) -> BackupResult<()> {
    let min = (IV_SIZE + MAC_SIZE) as u64;
    if total_len < min {
        return Err(BackupError::StreamTooShort {
            len: total_len,
            min,
        });
    }
    let covered = total_len - MAC_SIZE as u64;

    let mut source = source;
    let mut sink = MacWriter::new(io::sink(), mac_key)?;
    let copied = io::copy(&mut (&mut source).take(covered), &mut sink)?;
    if copied != covered {
        return Err(BackupError::Truncated {
            expected: total_len,
            actual: copied,
        });
    }

    let mut expected = [0u8; MAC_SIZE];
    source.read_exact(&mut expected).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => BackupError::Truncated {
            expected: total_len,
            actual: covered,
        },
        _ => BackupError::Io(e),
    })?;

    match sink.mac.verify_slice(&expected) {
        Ok(()) => {
            debug!(bytes = total_len, "stream MAC verified");
            Ok(())
        }
        Err(_) => {
            warn!(bytes = total_len, "stream MAC mismatch");
            Err(BackupError::InvalidMac)
        }
    }
}
