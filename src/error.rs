//! Run-level error types.
//!
//! Each subsystem owns a specific error type built with `thiserror`
//! ([`CatalogError`], [`TransferError`], [`IndexError`], [`ConfigError`]).
//! This module aggregates them into [`Error`], which is what the planner and
//! executor return when something is fatal for the whole run. The CLI layer
//! converts into `anyhow` for reporting.
//!
//! # Recoverable vs fatal
//!
//! Catalog and transfer failures are normally recovered locally and surface
//! as planning failures or `Failed` download results. Only failures to read
//! or durably write the library index abort a run.
//!
//! [`CatalogError`]: crate::catalog::CatalogError
//! [`TransferError`]: crate::transfer::TransferError
//! [`IndexError`]: crate::index::IndexError
//! [`ConfigError`]: crate::config::ConfigError

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::index::IndexError;
use crate::transfer::TransferError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Library index could not be opened or queried
    #[error("Library index error: {0}")]
    Index(#[from] IndexError),

    /// A completed transfer could not be recorded durably. Always fatal.
    #[error("Failed to record track {track_id} in the library index: {source}")]
    IndexPersistence {
        track_id: String,
        #[source]
        source: IndexError,
    },

    /// Catalog request failed
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Transfer failed
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Any of the above, with what was being attempted
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an index persistence error for a track.
    pub fn index_persistence(track_id: impl Into<String>, source: IndexError) -> Self {
        Self::IndexPersistence {
            track_id: track_id.into(),
            source,
        }
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error must abort the current run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Index(_) | Self::IndexPersistence { .. } | Self::Io(_) | Self::Config(_) => true,
            Self::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, IndexError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Index(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_display() {
        let err: Error = TransferError::Timeout.into();
        assert_eq!(err.to_string(), "Transfer error: Timed out");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_index_persistence_is_fatal() {
        let err = Error::index_persistence("123", IndexError::Database(sqlx::Error::PoolClosed));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("123"));
    }

    #[test]
    fn test_catalog_error_is_not_fatal() {
        let err: Error = CatalogError::NotFound("album 9".into()).into();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_context_preserves_fatality() {
        let err = Error::index_persistence("1", IndexError::Database(sqlx::Error::PoolClosed))
            .context("while downloading favorites");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("while downloading favorites"));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk full"));
        let with_ctx = result.with_context("promoting track");
        assert!(with_ctx.unwrap_err().to_string().contains("promoting track"));
    }
}
