//! Streams that authenticate but whose frame stream stops inside a frame.
//!
//! The writer never produces these, so the tests build the pipeline by hand
//! from the lower layers and feed it raw frame bytes.

use std::io::Write;

use bkstream_backup::{EncryptedBackupReader, EncryptedBackupWriter, MemorySource};
use bkstream_core::config::ReaderConfig;
use bkstream_core::{BackupError, BackupHeader, BackupResult, TruncationPolicy};
use bkstream_crypto::{BackupId, BackupKey, CbcEncryptWriter, KeyMaterial, MacWriter, IV_SIZE};
use bkstream_frames::{encode_frame, BucketTable, PaddingGzipSink};
use flate2::Compression;

fn test_key() -> BackupKey {
    BackupKey::from_bytes([42u8; 32])
}

fn test_backup_id() -> BackupId {
    BackupId::from_bytes([7u8; 16])
}

fn material() -> KeyMaterial {
    KeyMaterial::for_backup(&test_key(), &test_backup_id()).unwrap()
}

/// Compress, pad, encrypt and MAC `frame_bytes` under `iv`.
fn seal(frame_bytes: &[u8], iv: &[u8; IV_SIZE]) -> Vec<u8> {
    let material = material();
    let mut mac = MacWriter::new(Vec::new(), material.mac_key()).unwrap();
    mac.write_all(iv).unwrap();
    let cipher = CbcEncryptWriter::new(mac, material.cipher_key(), iv);
    let mut gzip = PaddingGzipSink::new(cipher, Compression::new(6), Some(BucketTable::default()));
    gzip.write_all(frame_bytes).unwrap();
    let (cipher, _) = gzip.finish().unwrap();
    let (mut out, tag) = cipher.finish().unwrap().finalize();
    out.extend_from_slice(&tag);
    out
}

fn header_frame() -> Vec<u8> {
    encode_frame(&BackupHeader::new(1_700_000_000_000).to_bytes()).unwrap()
}

fn open(
    stream: Vec<u8>,
    truncation: TruncationPolicy,
) -> BackupResult<EncryptedBackupReader<impl std::io::Read>> {
    let source = MemorySource::new(stream);
    let config = ReaderConfig {
        truncation,
        ..ReaderConfig::default()
    };
    EncryptedBackupReader::open_with_config(
        &test_key(),
        &test_backup_id(),
        &source,
        source.len(),
        &config,
    )
}

/// Header, one whole frame, then a frame missing its last bytes.
fn truncated_payload_stream() -> Vec<u8> {
    let mut frames = header_frame();
    frames.extend(encode_frame(b"whole frame").unwrap());
    let partial = encode_frame(b"this frame is cut short").unwrap();
    frames.extend_from_slice(&partial[..partial.len() - 5]);
    seal(&frames, material().iv())
}

#[test]
fn hand_sealed_stream_is_equivalent_to_writer_output() {
    let mut frames = header_frame();
    frames.extend(encode_frame(b"whole frame").unwrap());

    let mut writer = EncryptedBackupWriter::open(&test_key(), &test_backup_id(), Vec::new()).unwrap();
    writer.write_header(&BackupHeader::new(1_700_000_000_000)).unwrap();
    writer.write_frame(b"whole frame").unwrap();
    writer.close().unwrap();

    let written = writer.into_inner().unwrap();
    let sealed = seal(&frames, material().iv());
    assert_eq!(sealed.len(), written.len());
    assert_eq!(&sealed[..IV_SIZE], &written[..IV_SIZE]);

    for stream in [sealed, written] {
        let reader = open(stream, TruncationPolicy::Error).unwrap();
        assert_eq!(
            reader.collect::<BackupResult<Vec<_>>>().unwrap(),
            vec![b"whole frame".to_vec()]
        );
    }
}

#[test]
fn reader_uses_stream_iv_not_derived_iv() {
    let mut frames = header_frame();
    frames.extend(encode_frame(b"fresh iv").unwrap());
    let stream = seal(&frames, &[0x5Cu8; IV_SIZE]);

    let reader = open(stream, TruncationPolicy::Error).unwrap();
    assert!(reader.header().is_some());
    assert_eq!(
        reader.collect::<BackupResult<Vec<_>>>().unwrap(),
        vec![b"fresh iv".to_vec()]
    );
}

#[test]
fn strict_policy_surfaces_truncated_payload() {
    let mut reader = open(truncated_payload_stream(), TruncationPolicy::Error).unwrap();
    assert_eq!(reader.next_frame().unwrap(), b"whole frame");
    assert!(reader.has_next(), "the pending error is still to be delivered");
    assert!(matches!(
        reader.next_frame(),
        Err(BackupError::Truncated { .. })
    ));
    assert!(!reader.has_next());
    assert!(matches!(reader.next_frame(), Err(BackupError::NoSuchElement)));
}

#[test]
fn strict_policy_iterator_yields_error_once() {
    let reader = open(truncated_payload_stream(), TruncationPolicy::Error).unwrap();
    let items: Vec<BackupResult<Vec<u8>>> = reader.collect();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), b"whole frame");
    assert!(matches!(items[1], Err(BackupError::Truncated { .. })));
}

#[test]
fn lenient_policy_ends_stream_at_truncation() {
    let reader = open(truncated_payload_stream(), TruncationPolicy::EndOfStream).unwrap();
    let frames = reader.collect::<BackupResult<Vec<_>>>().unwrap();
    assert_eq!(frames, vec![b"whole frame".to_vec()]);
}

#[test]
fn truncated_length_prefix() {
    let mut frames = header_frame();
    frames.extend(encode_frame(b"kept").unwrap());
    // continuation bit set, then nothing
    frames.push(0x80);
    let stream = seal(&frames, material().iv());

    let mut strict = open(stream.clone(), TruncationPolicy::Error).unwrap();
    assert_eq!(strict.next_frame().unwrap(), b"kept");
    assert!(matches!(
        strict.next_frame(),
        Err(BackupError::Truncated { expected: 2, actual: 1 })
    ));

    let lenient = open(stream, TruncationPolicy::EndOfStream).unwrap();
    assert_eq!(lenient.count(), 1);
}

#[test]
fn truncated_header_frame() {
    let header = header_frame();
    let stream = seal(&header[..header.len() - 2], material().iv());

    assert!(matches!(
        open(stream.clone(), TruncationPolicy::Error),
        Err(BackupError::Truncated { .. })
    ));

    let lenient = open(stream, TruncationPolicy::EndOfStream).unwrap();
    assert!(lenient.header().is_none());
    assert!(!lenient.has_next());
}

#[test]
fn undecodable_header_fails_open() {
    // field 1 declared as length-delimited with a length running past the end
    let frames = encode_frame(&[0x0a, 0x7f, 0x01]).unwrap();
    let stream = seal(&frames, material().iv());
    assert!(matches!(
        open(stream, TruncationPolicy::Error),
        Err(BackupError::InvalidHeader(_))
    ));
}
