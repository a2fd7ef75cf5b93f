//! Tessera Providers - pluggable table backends
//!
//! This crate defines the plug-in contract a data source implements
//! ([`TableProvider`] exposing named [`SourceTable`]s), the registry that
//! constructs and caches provider instances, the row stream executor that
//! drives scans with residual evaluation and bounded batching, and the
//! built-in providers:
//! - `mock` - synthetic tables for wiring up and exercising FDW clients
//! - `csv` - local CSV files
//! - in-memory tables, mostly used as fixtures

pub mod catalog;
pub mod csv;
pub mod exec;
pub mod memory;
pub mod mock;
pub mod registry;

pub use csv::CsvFactory;
pub use exec::{execute, ExecOptions};
pub use memory::{MemoryProvider, MemoryTable};
pub use mock::MockFactory;
pub use registry::{default_registry, ProviderDescriptor, ProviderFactory, ProviderRegistry};

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tessera_core::{AccessError, CapabilitySet, Filter, PushdownPlan, Row, RowBatch, TableDef, Value};

/// A lazy, finite, forward-only sequence of rows. Never restartable; a new
/// scan re-queries the provider from the start. Dropping the stream is the
/// cancellation signal and must release any provider-side cursor.
pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row, AccessError>> + Send>>;

/// A lazy sequence of bounded row batches, as produced by the executor.
pub type BatchStream = Pin<Box<dyn Stream<Item = Result<RowBatch, AccessError>> + Send>>;

/// The accepted portion of a pushdown plan, handed to a provider's scan.
/// Carries only operations the table's capability set declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    /// Columns to produce; `None` means all.
    pub columns: Option<Vec<String>>,
    /// Accepted filters, to be applied by the provider.
    pub filters: Vec<Filter>,
    /// Accepted sort keys, to be applied by the provider.
    pub sort: Vec<tessera_core::SortKey>,
    /// Accepted limit; the provider may stop producing rows at this count.
    pub limit: Option<u64>,
}

impl ScanRequest {
    pub fn from_plan(plan: &PushdownPlan) -> Self {
        Self {
            columns: plan.scan_columns.clone(),
            filters: plan.accepted_filters.clone(),
            sort: plan.accepted_sort.clone(),
            limit: plan.accepted_limit,
        }
    }
}

/// A coarse row/byte estimate for planner costing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub rows: u64,
    pub bytes: u64,
}

impl Default for Estimate {
    /// Fixed guess used when a provider has no statistics.
    fn default() -> Self {
        Self {
            rows: 100,
            bytes: 200,
        }
    }
}

/// One table exposed by a provider: schema introspection plus row
/// production. Definitions and capabilities are fixed for the provider
/// instance's lifetime.
#[async_trait]
pub trait SourceTable: Send + Sync {
    fn definition(&self) -> TableDef;

    fn capabilities(&self) -> CapabilitySet;

    /// Row/byte estimate under the given filters and projection.
    fn estimate(&self, _filters: &[Filter], _columns: &[String]) -> Estimate {
        Estimate::default()
    }

    /// Tables that cannot serve concurrent scans return a gate here; the
    /// executor holds it for the lifetime of the stream, serializing
    /// concurrent requests instead of interleaving their rows.
    fn scan_gate(&self) -> Option<Arc<tokio::sync::Mutex<()>>> {
        None
    }

    /// Produce rows honoring exactly the accepted operations in `request`.
    async fn scan(&self, request: ScanRequest) -> Result<RowStream, AccessError>;

    /// Write hooks. `Ok(None)` means the table declines the operation,
    /// which the server surfaces as unimplemented.
    async fn insert(&self, _row: Row) -> Result<Option<Row>, AccessError> {
        Ok(None)
    }

    async fn update(&self, _key: Value, _row: Row) -> Result<Option<Row>, AccessError> {
        Ok(None)
    }

    async fn delete(&self, _key: Value) -> Result<Option<()>, AccessError> {
        Ok(None)
    }
}

/// One logical data source: a named set of tables plus teardown.
///
/// Metadata is shared read-only across concurrent requests; any cursor
/// state lives in the per-request streams, never on the provider itself.
#[async_trait]
pub trait TableProvider: Send + Sync {
    fn tables(&self) -> Vec<Arc<dyn SourceTable>>;

    fn table(&self, name: &str) -> Option<Arc<dyn SourceTable>>;

    /// Release backend resources. Must be safe to call on a provider
    /// whose initialization only partially completed.
    async fn close(&self) {}
}

impl std::fmt::Debug for dyn TableProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn TableProvider")
    }
}
