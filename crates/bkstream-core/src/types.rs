use prost::Message;

use crate::error::BackupResult;

/// Current backup format version written into [`BackupHeader::version`].
pub const BACKUP_FORMAT_VERSION: u64 = 1;

/// Stream-level metadata, always the first frame of a backup when present.
///
/// Encoded as a protobuf message so later fields can be added without
/// breaking older readers.
#[derive(Clone, PartialEq, Message)]
pub struct BackupHeader {
    /// Backup format version
    #[prost(uint64, tag = "1")]
    pub version: u64,
    /// Creation time, milliseconds since the Unix epoch
    #[prost(uint64, tag = "2")]
    pub backup_time_ms: u64,
    /// Key for media referenced by the backup (opaque to the codec)
    #[prost(bytes = "vec", tag = "3")]
    pub media_root_backup_key: Vec<u8>,
    /// Version of the application that produced this backup
    #[prost(string, tag = "4")]
    pub current_app_version: String,
    /// Version of the application that first created the account data
    #[prost(string, tag = "5")]
    pub first_app_version: String,
}

impl BackupHeader {
    pub fn new(backup_time_ms: u64) -> Self {
        Self {
            version: BACKUP_FORMAT_VERSION,
            backup_time_ms,
            ..Default::default()
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> BackupResult<Self> {
        Ok(Self::decode(data)?)
    }
}
