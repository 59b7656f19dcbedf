//! Transfer collaborator trait and test doubles.

use async_trait::async_trait;
use std::path::Path;

use super::{CancelToken, TransferError, TransferredFile};
use crate::model::{Quality, Track};

/// Fetches the audio of one track at one quality.
#[async_trait]
pub trait TransferApi: Send + Sync {
    /// Write the track's audio to `part_path`.
    ///
    /// Implementations must check `cancel` between chunks and return
    /// [`TransferError::Cancelled`] promptly. The file at `part_path` may be
    /// left partially written on error; the caller removes it.
    async fn transfer(
        &self,
        track: &Track,
        quality: Quality,
        part_path: &Path,
        cancel: &CancelToken,
    ) -> Result<TransferredFile, TransferError>;
}

#[async_trait]
impl TransferApi for super::http::HttpTransfer {
    async fn transfer(
        &self,
        track: &Track,
        quality: Quality,
        part_path: &Path,
        cancel: &CancelToken,
    ) -> Result<TransferredFile, TransferError> {
        self.transfer(track, quality, part_path, cancel).await
    }
}
