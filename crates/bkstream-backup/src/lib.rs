//! bkstream-backup: encrypted backup stream writer and reader
//!
//! # Overview
//! - `writer`: frames -> gzip + padding -> AES-256-CBC -> HMAC-SHA256 -> sink
//! - `reader`: MAC pass, then IV + decrypt + gunzip into a frame iterator
//! - `source`: re-openable sources for the two-pass reader
//! - `plaintext`: unencrypted fixture format with the same frame stream
//!
//! # Physical layout
//! ```text
//! [0, 16)            IV
//! [16, 16 + N)       AES-256-CBC/PKCS#7 of gzip(frames) + zero padding
//! [16 + N, 48 + N)   HMAC-SHA256 over [0, 16 + N)
//! ```

mod cursor;
pub mod plaintext;
pub mod reader;
pub mod source;
pub mod writer;

pub use plaintext::{PlainTextBackupReader, PlainTextBackupWriter};
pub use reader::EncryptedBackupReader;
pub use source::{FileSource, MemorySource, StreamSource};
pub use writer::EncryptedBackupWriter;
