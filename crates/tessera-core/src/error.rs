//! Shared error taxonomy for the data access service.
//!
//! Every crate in the workspace reports failures through [`AccessError`] so
//! the server façade can map them onto a uniform wire status regardless of
//! which component failed.

use thiserror::Error;

pub type Result<T, E = AccessError> = std::result::Result<T, E>;

/// Failure modes of the data access service.
#[derive(Debug, Error)]
pub enum AccessError {
    /// No factory is registered for the requested provider type.
    #[error("unknown provider type: {0}")]
    ProviderNotFound(String),

    /// Provider construction or backend connection failed.
    #[error("provider initialization failed: {0}")]
    ProviderInit(String),

    /// The provider does not expose a table with this name.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The query shape references unknown columns or mistyped literals.
    /// Rejected synchronously, before planning.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A scan request carried an operation the provider never declared
    /// support for. Indicates a planner bug, not a caller mistake.
    #[error("unsupported query shape: {0}")]
    UnsupportedQueryShape(String),

    /// The provider failed while producing rows. Terminates the stream;
    /// batches already delivered remain valid.
    #[error("provider read failed: {0}")]
    ProviderRead(String),

    /// A local buffering bound (sort fallback) was hit.
    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(String),

    /// The consumer dropped the stream. Never surfaced on the wire, but
    /// observable internally for cleanup and accounting.
    #[error("stream cancelled by consumer")]
    Cancelled,
}

impl AccessError {
    /// Short machine-readable tag, used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AccessError::ProviderNotFound(_) => "provider_not_found",
            AccessError::ProviderInit(_) => "provider_init",
            AccessError::TableNotFound(_) => "table_not_found",
            AccessError::InvalidQuery(_) => "invalid_query",
            AccessError::UnsupportedQueryShape(_) => "unsupported_query_shape",
            AccessError::ProviderRead(_) => "provider_read",
            AccessError::ResourceExceeded(_) => "resource_exceeded",
            AccessError::Cancelled => "cancelled",
        }
    }
}
