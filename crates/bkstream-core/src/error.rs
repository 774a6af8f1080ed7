use thiserror::Error;

pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid backup id length: expected {expected} bytes, got {actual}")]
    InvalidBackupIdLength { expected: usize, actual: usize },

    #[error("stream too short: {len} bytes (minimum {min})")]
    StreamTooShort { len: u64, min: u64 },

    #[error("MAC verification failed: wrong key or corrupted backup")]
    InvalidMac,

    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// Input ended early: mid-frame, or before the declared stream length.
    #[error("truncated: needed {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("frame too large: {len} bytes (maximum {max})")]
    FrameTooLarge { len: u64, max: u64 },

    #[error("invalid backup header: {0}")]
    InvalidHeader(#[from] prost::DecodeError),

    #[error("MAC not available: stream is not closed or was already closed")]
    MacNotAvailable,

    #[error("stream already closed")]
    Closed,

    #[error("header must be written before any frame, and only once")]
    HeaderOutOfOrder,

    #[error("no more frames")]
    NoSuchElement,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// True for errors caused by API misuse rather than by the stream contents.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            BackupError::MacNotAvailable
                | BackupError::Closed
                | BackupError::HeaderOutOfOrder
                | BackupError::NoSuchElement
        )
    }
}
