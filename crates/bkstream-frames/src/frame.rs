//! Length-delimited frame codec
//!
//! Frame format:
//! ```text
//! [1-5 bytes: varint32 payload length][N bytes: payload]
//! ```
//!
//! Varints are little-endian base-128 with a continuation bit, as in protobuf.

use std::io::{self, Read, Write};

use bkstream_core::{BackupError, BackupResult};
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};

/// Longest varint encoding of a `u32`
pub const MAX_VARINT32_LEN: usize = 5;

/// Largest payload a single frame can carry. Lengths are read back as signed
/// 32-bit values, so the top bit of a varint32 length is never set.
pub const MAX_FRAME_LEN: u64 = i32::MAX as u64;

/// Payload bytes reserved up front; larger frames grow as they are read.
const PREALLOC_LIMIT: u64 = 1024 * 1024;

/// Validate a payload length against [`MAX_FRAME_LEN`].
pub fn check_frame_len(len: usize) -> BackupResult<u32> {
    let len = len as u64;
    if len > MAX_FRAME_LEN {
        return Err(BackupError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(len as u32)
}

/// Encode `varint32(len) || payload`.
pub fn encode_frame(payload: &[u8]) -> BackupResult<Vec<u8>> {
    let len = check_frame_len(payload.len())? as u64;
    let mut out = Vec::with_capacity(encoded_len_varint(len) + payload.len());
    encode_varint(len, &mut out);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Write one frame to `w`.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> BackupResult<()> {
    let len = check_frame_len(payload.len())?;
    write_varint32(w, len)?;
    w.write_all(payload)?;
    Ok(())
}

pub fn write_varint32<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    let mut buf = Vec::with_capacity(MAX_VARINT32_LEN);
    encode_varint(value as u64, &mut buf);
    w.write_all(&buf)
}

/// Read a varint32, or `None` if the source is exhausted before its first byte.
pub fn read_varint32<R: Read>(r: &mut R) -> BackupResult<Option<u32>> {
    let mut buf = [0u8; MAX_VARINT32_LEN];
    let mut n = 0;
    loop {
        let Some(byte) = read_byte(r)? else {
            if n == 0 {
                return Ok(None);
            }
            return Err(BackupError::Truncated {
                expected: n as u64 + 1,
                actual: n as u64,
            });
        };
        buf[n] = byte;
        n += 1;
        if byte & 0x80 == 0 {
            break;
        }
        if n == MAX_VARINT32_LEN {
            return Err(BackupError::Corrupt("varint32 longer than 5 bytes".into()));
        }
    }

    let value = decode_varint(&mut &buf[..n])
        .map_err(|e| BackupError::Corrupt(format!("invalid varint32: {e}")))?;
    u32::try_from(value)
        .map(Some)
        .map_err(|_| BackupError::Corrupt(format!("varint32 overflow: {value}")))
}

/// Read one frame.
///
/// Returns `Ok(None)` when the source ends exactly at a frame boundary and
/// `BackupError::Truncated` when it ends inside a length prefix or payload.
pub fn read_frame<R: Read>(r: &mut R) -> BackupResult<Option<Vec<u8>>> {
    let Some(len) = read_varint32(r)? else {
        return Ok(None);
    };
    if len as u64 > MAX_FRAME_LEN {
        return Err(BackupError::FrameTooLarge {
            len: len as u64,
            max: MAX_FRAME_LEN,
        });
    }
    read_payload(r, len as u64).map(Some)
}

/// Read exactly `len` payload bytes.
pub fn read_payload<R: Read>(r: &mut R, len: u64) -> BackupResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(len.min(PREALLOC_LIMIT) as usize);
    let got = r.take(len).read_to_end(&mut payload)? as u64;
    if got < len {
        return Err(BackupError::Truncated {
            expected: len,
            actual: got,
        });
    }
    Ok(payload)
}

fn read_byte<R: Read>(r: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Iterator over the frames of a source, stopping at the first error.
pub struct FrameIter<R: Read> {
    source: R,
    done: bool,
}

impl<R: Read> FrameIter<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            done: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: Read> Iterator for FrameIter<R> {
    type Item = BackupResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_frame(&mut self.source) {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
