pub mod config;
pub mod error;
pub mod types;

pub use config::{BackupStreamConfig, TruncationPolicy};
pub use error::{BackupError, BackupResult};
pub use types::BackupHeader;
