//! Re-openable byte sources
//!
//! The encrypted reader authenticates the whole stream before decrypting any
//! of it, so it reads its source twice. A [`StreamSource`] hands out a fresh
//! reader positioned at byte 0 on every call.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes};

/// Factory for readers over the same physical stream.
pub trait StreamSource {
    type Reader: Read;

    /// Open a new reader starting at the beginning of the stream.
    fn open_stream(&self) -> io::Result<Self::Reader>;
}

impl<F, R> StreamSource for F
where
    F: Fn() -> io::Result<R>,
    R: Read,
{
    type Reader = R;

    fn open_stream(&self) -> io::Result<R> {
        self()
    }
}

/// A stream stored in a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file size, used as the physical stream length.
    pub fn len(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

impl StreamSource for FileSource {
    type Reader = BufReader<File>;

    fn open_stream(&self) -> io::Result<Self::Reader> {
        Ok(BufReader::new(File::open(&self.path)?))
    }
}

/// A stream held in memory. Cloning the underlying `Bytes` is cheap, so each
/// open shares the same allocation.
#[derive(Debug, Clone)]
pub struct MemorySource(Bytes);

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn len(&self) -> u64 {
        self.0.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl StreamSource for MemorySource {
    type Reader = bytes::buf::Reader<Bytes>;

    fn open_stream(&self) -> io::Result<Self::Reader> {
        Ok(self.0.clone().reader())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn read_all<S: StreamSource>(source: &S) -> Vec<u8> {
        let mut out = Vec::new();
        source.open_stream().unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn memory_source_reopens_from_start() {
        let source = MemorySource::new(b"physical stream".to_vec());
        assert_eq!(source.len(), 15);
        assert_eq!(read_all(&source), b"physical stream");
        assert_eq!(read_all(&source), b"physical stream");
    }

    #[test]
    fn closure_source() {
        let data = vec![1u8, 2, 3];
        let source = || Ok::<_, io::Error>(io::Cursor::new(data.clone()));
        assert_eq!(read_all(&source), [1, 2, 3]);
        assert_eq!(read_all(&source), [1, 2, 3]);
    }

    #[test]
    fn file_source_len_and_reopen() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xAB; 100]).unwrap();
        file.flush().unwrap();

        let source = FileSource::new(file.path());
        assert_eq!(source.len().unwrap(), 100);
        assert_eq!(read_all(&source), vec![0xAB; 100]);
        assert_eq!(read_all(&source).len(), 100);
    }

    #[test]
    fn file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("absent.bin"));
        assert!(source.len().is_err());
        assert!(source.open_stream().is_err());
    }
}
