//! Tessera Server - gRPC data access service
//!
//! Binds the provider registry, pushdown planner, and row stream executor
//! into the wire protocol: registration, schema catalog, and streaming
//! reads, plus Prometheus metrics and an HTTP health endpoint.

pub mod error;
pub mod health;
pub mod metrics;
pub mod service;

pub use error::ServerError;
pub use metrics::ServerMetrics;
pub use service::DataService;
