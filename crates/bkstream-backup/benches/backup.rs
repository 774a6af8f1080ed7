use bkstream_backup::{EncryptedBackupReader, EncryptedBackupWriter, MemorySource};
use bkstream_core::BackupHeader;
use bkstream_crypto::{BackupId, BackupKey};

const FRAME_SIZE: usize = 512;

fn make_frames(total: usize) -> Vec<Vec<u8>> {
    (0..total / FRAME_SIZE)
        .map(|n| {
            (0..FRAME_SIZE)
                .map(|i| ((i * 31 + n * 7) ^ (i >> 2)) as u8)
                .collect()
        })
        .collect()
}

fn keys() -> (BackupKey, BackupId) {
    (
        BackupKey::from_bytes([0xABu8; 32]),
        BackupId::from_bytes([0x01u8; 16]),
    )
}

fn write_stream(key: &BackupKey, id: &BackupId, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = EncryptedBackupWriter::open(key, id, Vec::new()).unwrap();
    writer.write_header(&BackupHeader::new(0)).unwrap();
    for frame in frames {
        writer.write_frame(frame).unwrap();
    }
    writer.close().unwrap();
    writer.into_inner().unwrap()
}

#[divan::bench(args = [65536, 1048576, 8388608])]
fn write_backup(bencher: divan::Bencher, size: usize) {
    let (key, id) = keys();
    let frames = make_frames(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| write_stream(&key, &id, divan::black_box(&frames)));
}

#[divan::bench(args = [65536, 1048576, 8388608])]
fn read_backup(bencher: divan::Bencher, size: usize) {
    let (key, id) = keys();
    let source = MemorySource::new(write_stream(&key, &id, &make_frames(size)));
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let reader =
                EncryptedBackupReader::open(&key, &id, divan::black_box(&source), source.len())
                    .unwrap();
            reader.map(|frame| frame.unwrap().len()).sum::<usize>()
        });
}

fn main() {
    divan::main();
}
