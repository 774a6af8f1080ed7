use std::io::Write;

use bkstream_frames::{write_frame, BucketTable, FrameIter, PaddingGzipSink};
use flate2::Compression;

fn make_data(size: usize) -> Vec<u8> {
    // Semi-realistic data: repeating pattern with some entropy
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn make_frames(total: usize, frame_size: usize) -> Vec<u8> {
    let data = make_data(total);
    let mut stream = Vec::with_capacity(total + total / frame_size * 5 + 5);
    for frame in data.chunks(frame_size) {
        write_frame(&mut stream, frame).unwrap();
    }
    stream
}

#[divan::bench(args = [64, 1024, 65536])]
fn encode_frames(bencher: divan::Bencher, frame_size: usize) {
    let data = make_data(1024 * 1024);
    bencher
        .counter(divan::counter::BytesCount::new(data.len()))
        .bench(|| {
            let mut out = Vec::with_capacity(data.len() + data.len() / frame_size * 5 + 5);
            for frame in divan::black_box(&data).chunks(frame_size) {
                write_frame(&mut out, frame).unwrap();
            }
            out
        });
}

#[divan::bench(args = [64, 1024, 65536])]
fn decode_frames(bencher: divan::Bencher, frame_size: usize) {
    let stream = make_frames(1024 * 1024, frame_size);
    bencher
        .counter(divan::counter::BytesCount::new(stream.len()))
        .bench(|| FrameIter::new(divan::black_box(stream.as_slice())).count());
}

#[divan::bench(args = [1024, 65536, 1048576, 10485760])]
fn padded_gzip(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut sink =
                PaddingGzipSink::new(Vec::new(), Compression::default(), Some(BucketTable::default()));
            sink.write_all(divan::black_box(&data)).unwrap();
            sink.finish().unwrap()
        });
}

fn main() {
    divan::main();
}
