//! HTTP catalog integration for a v1 REST streaming catalog.
//!
//! Split in the usual three layers: `dto` mirrors the wire format, `adapter`
//! validates and converts to model types, `client` performs the requests.

pub(crate) mod adapter;
pub mod dto;
mod client;

pub use client::{HttpCatalog, Session};
