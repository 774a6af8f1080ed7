//! bkstream-crypto: key material and streaming cipher/MAC layers for backups
//!
//! Physical stream layout:
//! ```text
//! [16 bytes: IV][N bytes: AES-256-CBC/PKCS7 ciphertext][32 bytes: HMAC-SHA256(IV || ciphertext)]
//! ```
//!
//! Key hierarchy:
//! ```text
//! Backup Key (256-bit, caller supplied)
//!   └── HKDF-SHA256(salt=backup_id, info=STREAM_KDF_INFO) -> 80 bytes
//!         ├── mac_key    [0..32)   HMAC-SHA256 over IV || ciphertext
//!         ├── cipher_key [32..64)  AES-256-CBC
//!         └── iv         [64..80)  writer IV (readers take the IV from the stream)
//! ```

pub mod cipher;
pub mod keys;
pub mod mac;

pub use cipher::{CbcDecryptReader, CbcEncryptWriter};
pub use keys::{BackupId, BackupKey, KeyMaterial};
pub use mac::{verify_stream_mac, MacWriter};

/// Size of a backup root key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a backup identifier in bytes
pub const BACKUP_ID_SIZE: usize = 16;

/// Size of the AES-CBC initialization vector
pub const IV_SIZE: usize = 16;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Size of the HMAC-SHA256 trailer
pub const MAC_SIZE: usize = 32;

/// HKDF `info` label binding derived keys to the backup stream format.
///
/// Part of the wire format: changing it invalidates every existing backup.
pub const STREAM_KDF_INFO: &[u8] = b"20250101_BKSTREAM_ENCRYPTED_BACKUP_STREAM_V1:";
