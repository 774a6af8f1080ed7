//! Backup key types and HKDF derivation of per-stream key material

use bkstream_core::{BackupError, BackupResult};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{BACKUP_ID_SIZE, IV_SIZE, KEY_SIZE, STREAM_KDF_INFO};

const DERIVED_LEN: usize = KEY_SIZE + KEY_SIZE + IV_SIZE;

/// The 256-bit backup root key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BackupKey {
    bytes: [u8; KEY_SIZE],
}

impl BackupKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> BackupResult<Self> {
        let bytes: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| BackupError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self { bytes })
    }

    /// Generate a random backup key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for BackupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The 16-byte identifier of the account a backup belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackupId {
    bytes: [u8; BACKUP_ID_SIZE],
}

impl BackupId {
    pub fn from_bytes(bytes: [u8; BACKUP_ID_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> BackupResult<Self> {
        let bytes: [u8; BACKUP_ID_SIZE] =
            bytes
                .try_into()
                .map_err(|_| BackupError::InvalidBackupIdLength {
                    expected: BACKUP_ID_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self { bytes })
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; BACKUP_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; BACKUP_ID_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for BackupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BackupId(")?;
        for b in &self.bytes {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Keys for one stream open/close. Zeroized on drop, never persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    mac_key: [u8; KEY_SIZE],
    cipher_key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl KeyMaterial {
    /// Derive stream keys from a raw root key and optional backup id.
    ///
    /// HKDF-SHA256 with the backup id as salt and [`STREAM_KDF_INFO`] as info
    /// expands to 80 bytes: `mac_key || cipher_key || iv`. Lengths are checked
    /// before any derivation. `None` for the backup id (no salt) is only meant
    /// for fixtures.
    pub fn derive(key: &[u8], backup_id: Option<&[u8]>) -> BackupResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(BackupError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: key.len(),
            });
        }
        if let Some(id) = backup_id {
            if id.len() != BACKUP_ID_SIZE {
                return Err(BackupError::InvalidBackupIdLength {
                    expected: BACKUP_ID_SIZE,
                    actual: id.len(),
                });
            }
        }

        let hkdf = Hkdf::<Sha256>::new(backup_id, key);
        let mut okm = [0u8; DERIVED_LEN];
        hkdf.expand(STREAM_KDF_INFO, &mut okm)
            .map_err(|e| BackupError::Corrupt(format!("HKDF expand failed: {e}")))?;

        let mut material = Self {
            mac_key: [0u8; KEY_SIZE],
            cipher_key: [0u8; KEY_SIZE],
            iv: [0u8; IV_SIZE],
        };
        material.mac_key.copy_from_slice(&okm[..KEY_SIZE]);
        material.cipher_key.copy_from_slice(&okm[KEY_SIZE..2 * KEY_SIZE]);
        material.iv.copy_from_slice(&okm[2 * KEY_SIZE..]);
        okm.zeroize();

        Ok(material)
    }

    /// Derive from typed inputs; cannot fail on length.
    pub fn for_backup(key: &BackupKey, backup_id: &BackupId) -> BackupResult<Self> {
        Self::derive(key.as_bytes(), Some(backup_id.as_bytes()))
    }

    pub fn mac_key(&self) -> &[u8; KEY_SIZE] {
        &self.mac_key
    }

    pub fn cipher_key(&self) -> &[u8; KEY_SIZE] {
        &self.cipher_key
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("mac_key", &"[REDACTED]")
            .field("cipher_key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}
