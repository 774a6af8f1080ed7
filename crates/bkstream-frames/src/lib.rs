//! bkstream-frames: frame codec and compression layer of the backup stream
//!
//! # Overview
//! - `frame`: varint32 length-delimited frames (`varint32(len) || payload`)
//! - `padding`: gzip sink that pads the finished stream up to a bucket size
//! - `counting`: byte-counting reader/writer adapters used for sizes and progress

pub mod counting;
pub mod frame;
pub mod padding;

pub use counting::{ByteCounter, CountingReader, CountingWriter};
pub use frame::{
    check_frame_len, encode_frame, read_frame, read_payload, read_varint32, write_frame,
    write_varint32, FrameIter, MAX_FRAME_LEN, MAX_VARINT32_LEN,
};
pub use padding::{BucketTable, PaddingGzipSink, PaddingStats};
