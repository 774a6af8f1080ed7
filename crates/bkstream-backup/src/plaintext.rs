//! Plaintext backup fixtures
//!
//! Same frame stream as the encrypted format with no compression, cipher or
//! MAC. The header is prefixed by a fixed 4-byte big-endian length rather
//! than a varint; data frames use the normal varint32 prefix.
//!
//! ```text
//! [u32 BE header len][header][varint32 len][frame]...
//! ```
//!
//! For human-diffable fixtures and local debugging only. Nothing here is
//! authenticated, so never accept this format from an untrusted source.

use std::io::{self, Read, Write};

use bkstream_core::{BackupError, BackupHeader, BackupResult, TruncationPolicy};
use bkstream_frames::{check_frame_len, read_payload, write_frame};

use crate::cursor::FrameCursor;

const HEADER_LEN_SIZE: usize = 4;

pub struct PlainTextBackupWriter<W: Write> {
    sink: W,
    header_written: bool,
    frames_written: u64,
}

impl<W: Write> PlainTextBackupWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            header_written: false,
            frames_written: 0,
        }
    }

    pub fn write_header(&mut self, header: &BackupHeader) -> BackupResult<()> {
        if self.header_written {
            return Err(BackupError::HeaderOutOfOrder);
        }
        let bytes = header.to_bytes();
        let len = check_frame_len(bytes.len())?;
        self.sink.write_all(&len.to_be_bytes())?;
        self.sink.write_all(&bytes)?;
        self.header_written = true;
        Ok(())
    }

    /// Write one data frame; the header has to come first.
    pub fn write_frame(&mut self, payload: &[u8]) -> BackupResult<()> {
        if !self.header_written {
            return Err(BackupError::HeaderOutOfOrder);
        }
        write_frame(&mut self.sink, payload)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and return the sink.
    pub fn into_inner(mut self) -> BackupResult<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Read the 4-byte header length, or `None` on an empty source.
fn read_header_len<R: Read>(r: &mut R) -> BackupResult<Option<u32>> {
    let mut buf = [0u8; HEADER_LEN_SIZE];
    let mut filled = 0;
    while filled < HEADER_LEN_SIZE {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        HEADER_LEN_SIZE => Ok(Some(u32::from_be_bytes(buf))),
        n => Err(BackupError::Truncated {
            expected: HEADER_LEN_SIZE as u64,
            actual: n as u64,
        }),
    }
}

fn read_header<R: Read>(r: &mut R) -> BackupResult<Option<Vec<u8>>> {
    match read_header_len(r)? {
        Some(len) => read_payload(r, len as u64).map(Some),
        None => Ok(None),
    }
}

pub struct PlainTextBackupReader<R: Read> {
    cursor: FrameCursor<R>,
    header: Option<BackupHeader>,
}

impl<R: Read> PlainTextBackupReader<R> {
    pub fn open(source: R) -> BackupResult<Self> {
        Self::open_with_truncation(source, TruncationPolicy::default())
    }

    pub fn open_with_truncation(source: R, truncation: TruncationPolicy) -> BackupResult<Self> {
        let mut cursor = FrameCursor::new(source, truncation);
        let header = cursor
            .read_with(read_header)?
            .map(|bytes| BackupHeader::from_bytes(&bytes))
            .transpose()?;
        cursor.advance();
        Ok(Self { cursor, header })
    }

    pub fn header(&self) -> Option<&BackupHeader> {
        self.header.as_ref()
    }

    pub fn has_next(&self) -> bool {
        self.cursor.has_next()
    }

    pub fn next_frame(&mut self) -> BackupResult<Vec<u8>> {
        self.cursor.next_frame()
    }

    pub fn frames_read(&self) -> u64 {
        self.cursor.frames_read()
    }

    pub fn close(&mut self) {
        self.cursor.close();
    }
}

impl<R: Read> Iterator for PlainTextBackupReader<R> {
    type Item = BackupResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BackupHeader {
        BackupHeader {
            current_app_version: "2.0.0".into(),
            ..BackupHeader::new(1_700_000_000_000)
        }
    }

    #[test]
    fn test_header_uses_fixed_width_length() {
        let mut writer = PlainTextBackupWriter::new(Vec::new());
        writer.write_header(&header()).unwrap();
        writer.write_frame(b"frame").unwrap();
        let out = writer.into_inner().unwrap();

        let header_bytes = header().to_bytes();
        assert_eq!(&out[..4], &(header_bytes.len() as u32).to_be_bytes());
        assert_eq!(&out[4..4 + header_bytes.len()], header_bytes.as_slice());
        // data frame keeps the varint prefix
        assert_eq!(&out[4 + header_bytes.len()..], &[5, b'f', b'r', b'a', b'm', b'e']);
    }

    #[test]
    fn test_roundtrip() {
        let frames: Vec<Vec<u8>> = vec![b"one".to_vec(), vec![], vec![0xEE; 70_000]];
        let mut writer = PlainTextBackupWriter::new(Vec::new());
        writer.write_header(&header()).unwrap();
        for f in &frames {
            writer.write_frame(f).unwrap();
        }
        assert_eq!(writer.frames_written(), 3);
        let out = writer.into_inner().unwrap();

        let mut reader = PlainTextBackupReader::open(out.as_slice()).unwrap();
        assert_eq!(reader.header(), Some(&header()));
        let decoded: Vec<Vec<u8>> = reader.by_ref().collect::<BackupResult<_>>().unwrap();
        assert_eq!(decoded, frames);
        assert_eq!(reader.frames_read(), 3);
        assert!(matches!(reader.next_frame(), Err(BackupError::NoSuchElement)));
    }

    #[test]
    fn test_empty_source() {
        let reader = PlainTextBackupReader::open(&[][..]).unwrap();
        assert!(reader.header().is_none());
        assert!(!reader.has_next());
    }

    #[test]
    fn test_header_out_of_order() {
        let mut writer = PlainTextBackupWriter::new(Vec::new());
        assert!(matches!(writer.write_frame(b"abc"), Err(BackupError::HeaderOutOfOrder)));
        assert_eq!(writer.frames_written(), 0);

        writer.write_header(&header()).unwrap();
        assert!(matches!(
            writer.write_header(&header()),
            Err(BackupError::HeaderOutOfOrder)
        ));
        writer.write_frame(b"abc").unwrap();

        let out = writer.into_inner().unwrap();
        let reader = PlainTextBackupReader::open(out.as_slice()).unwrap();
        assert_eq!(reader.header(), Some(&header()));
        assert_eq!(reader.collect::<BackupResult<Vec<_>>>().unwrap(), vec![b"abc".to_vec()]);
    }

    #[test]
    fn test_headerless_writer_round_trips_as_empty() {
        let mut writer = PlainTextBackupWriter::new(Vec::new());
        assert!(writer.write_frame(b"abc").is_err());
        let out = writer.into_inner().unwrap();
        assert!(out.is_empty(), "rejected frame left bytes behind");

        let reader = PlainTextBackupReader::open(out.as_slice()).unwrap();
        assert!(reader.header().is_none());
        assert!(!reader.has_next());
    }

    #[test]
    fn test_truncated_header_length() {
        let result = PlainTextBackupReader::open(&[0u8, 0][..]);
        assert!(matches!(
            result,
            Err(BackupError::Truncated { expected: 4, actual: 2 })
        ));

        let lenient =
            PlainTextBackupReader::open_with_truncation(&[0u8, 0][..], TruncationPolicy::EndOfStream)
                .unwrap();
        assert!(lenient.header().is_none());
        assert!(!lenient.has_next());
    }

    #[test]
    fn test_truncated_frame() {
        let mut writer = PlainTextBackupWriter::new(Vec::new());
        writer.write_header(&header()).unwrap();
        writer.write_frame(b"complete").unwrap();
        writer.write_frame(b"cut short").unwrap();
        let mut out = writer.into_inner().unwrap();
        out.truncate(out.len() - 4);

        let mut strict = PlainTextBackupReader::open(out.as_slice()).unwrap();
        assert_eq!(strict.next_frame().unwrap(), b"complete");
        assert!(matches!(strict.next_frame(), Err(BackupError::Truncated { .. })));

        let lenient =
            PlainTextBackupReader::open_with_truncation(out.as_slice(), TruncationPolicy::EndOfStream)
                .unwrap();
        let frames: Vec<Vec<u8>> = lenient.collect::<BackupResult<_>>().unwrap();
        assert_eq!(frames, vec![b"complete".to_vec()]);
    }
}
