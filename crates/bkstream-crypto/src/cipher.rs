//! Streaming AES-256-CBC layers with PKCS#7 padding
//!
//! `CbcEncryptWriter` encrypts every complete block as it arrives and holds
//! back at most 15 bytes; `finish` pads and emits the final block.
//! `CbcDecryptReader` is bounded by a known ciphertext length so it can tell
//! which block is last and strip the padding from it.
//!
//! Buffered plaintext is held in `Zeroizing` vectors and wiped on drop. A
//! buffer that grows past its initial capacity leaves the old allocation
//! unwiped.

use std::io::{self, Read, Write};

use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use crate::{BLOCK_SIZE, IV_SIZE, KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Ciphertext read per refill of the decrypting reader (a block multiple).
const READ_CHUNK: usize = 256 * BLOCK_SIZE;

/// Write adapter that encrypts everything written to it.
pub struct CbcEncryptWriter<W: Write> {
    inner: W,
    encryptor: Aes256CbcEnc,
    pending: Zeroizing<Vec<u8>>,
}

impl<W: Write> CbcEncryptWriter<W> {
    pub fn new(inner: W, key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE]) -> Self {
        Self {
            inner,
            encryptor: Aes256CbcEnc::new(key.into(), iv.into()),
            pending: Zeroizing::new(Vec::with_capacity(READ_CHUNK)),
        }
    }

    /// Pad and encrypt the final block, returning the inner writer.
    ///
    /// Always emits at least one block: a full padding block when the
    /// plaintext length is already block aligned.
    pub fn finish(self) -> io::Result<W> {
        let Self {
            mut inner,
            mut encryptor,
            mut pending,
        } = self;

        let pad = BLOCK_SIZE - pending.len() % BLOCK_SIZE;
        let new_len = pending.len() + pad;
        pending.resize(new_len, pad as u8);
        encrypt_blocks(&mut encryptor, &mut pending);
        inner.write_all(&pending)?;
        inner.flush()?;
        Ok(inner)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> Write for CbcEncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let full = self.pending.len() - self.pending.len() % BLOCK_SIZE;
        if full > 0 {
            encrypt_blocks(&mut self.encryptor, &mut self.pending[..full]);
            self.inner.write_all(&self.pending[..full])?;
            self.pending.drain(..full);
        }
        Ok(buf.len())
    }

    /// Flushes complete blocks only; a partial block stays buffered until `finish`.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn encrypt_blocks(encryptor: &mut Aes256CbcEnc, data: &mut [u8]) {
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Read adapter that decrypts exactly `ciphertext_len` bytes from `inner`.
pub struct CbcDecryptReader<R: Read> {
    inner: R,
    decryptor: Aes256CbcDec,
    remaining: u64,
    buf: Zeroizing<Vec<u8>>,
    pos: usize,
}

impl<R: Read> CbcDecryptReader<R> {
    /// `ciphertext_len` must be a non-zero multiple of the block size; the
    /// caller checks this (after authentication) before constructing.
    pub fn new(inner: R, key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], ciphertext_len: u64) -> Self {
        Self {
            inner,
            decryptor: Aes256CbcDec::new(key.into(), iv.into()),
            remaining: ciphertext_len,
            buf: Zeroizing::new(Vec::with_capacity(READ_CHUNK)),
            pos: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn refill(&mut self) -> io::Result<()> {
        let want = self.remaining.min(READ_CHUNK as u64) as usize;
        self.buf.clear();
        self.buf.resize(want, 0);
        self.pos = 0;
        self.inner.read_exact(&mut self.buf)?;
        self.remaining -= want as u64;

        for block in self.buf.chunks_exact_mut(BLOCK_SIZE) {
            self.decryptor
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        if self.remaining == 0 {
            let unpadded = strip_pkcs7(&self.buf)?;
            self.buf.truncate(unpadded);
        }
        Ok(())
    }
}

impl<R: Read> Read for CbcDecryptReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.buf.len() {
            if self.remaining == 0 {
                return Ok(0);
            }
            self.refill()?;
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Length of `data` without its PKCS#7 padding.
fn strip_pkcs7(data: &[u8]) -> io::Result<usize> {
    let bad = || io::Error::new(io::ErrorKind::InvalidData, "invalid PKCS#7 padding");
    let pad = *data.last().ok_or_else(bad)? as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return Err(bad());
    }
    if data[data.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(bad());
    }
    Ok(data.len() - pad)
}
