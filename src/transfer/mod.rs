//! Transfer execution.
//!
//! [`TransferExecutor`] runs a plan one unit at a time against a
//! [`TransferApi`] collaborator, promotes finished files into place and
//! records them in the library index. [`http::HttpTransfer`] is the
//! production collaborator.

mod cancel;
mod executor;
pub mod http;
pub mod traits;

pub use cancel::CancelToken;
pub use executor::{ExecutorConfig, RetryPolicy, TransferExecutor};
pub use traits::TransferApi;

use std::path::PathBuf;

use crate::model::Quality;

/// Transfer errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    #[error("Quality {0} not available")]
    QualityUnavailable(Quality),

    #[error("Not entitled: {0}")]
    EntitlementDenied(String),

    #[error("Track removed from catalog")]
    Removed,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Unsupported stream: {0}")]
    UnsupportedStream(String),

    #[error("Cancelled")]
    Cancelled,
}

impl TransferError {
    /// Eligible for retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::Network(_) | TransferError::RateLimited | TransferError::Timeout
        )
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Io(e.to_string())
    }
}

/// A completed transfer sitting at its temporary path.
#[derive(Debug, Clone)]
pub struct TransferredFile {
    /// Where the bytes were written; not yet the final destination
    pub temp_path: PathBuf,
    /// Quality actually served
    pub quality: Quality,
    /// Codec reported by the stream, e.g. `flac` or `mp4a.40.2`
    pub codec: Option<String>,
    pub bytes: u64,
}

impl TransferredFile {
    /// File extension for the final path.
    pub fn extension(&self) -> &'static str {
        match self.codec.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some(c) if c.contains("flac") => "flac",
            Some(_) => "m4a",
            None if self.quality >= Quality::Lossless => "flac",
            None => "m4a",
        }
    }
}
