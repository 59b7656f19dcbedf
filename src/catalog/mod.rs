//! Catalog collaborator: read-only access to the streaming catalog.
//!
//! The planner depends only on the [`CatalogApi`] trait. The production
//! implementation is [`http::HttpCatalog`]; tests use
//! [`traits::mocks::MockCatalog`].
//!
//! Raw API responses are deserialized into loose DTOs and converted into the
//! strongly typed model in one place (`http/adapter.rs`). A response that
//! does not have the expected shape becomes [`CatalogError::InvalidResponse`]
//! rather than leaking malformed data into planning.

pub mod http;
pub mod traits;

pub use traits::CatalogApi;

/// Catalog request errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("API request failed: {0}")]
    Api(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}
