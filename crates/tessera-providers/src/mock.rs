//! The `mock` provider: synthetic tables for exercising FDW clients.
//!
//! Exposes a small table and a very large one, both with `id`/`name`
//! columns. Rows are generated lazily from the id counter, so scanning the
//! large table stays in bounded memory no matter how much of it a client
//! pulls.

use crate::{
    Estimate, ProviderFactory, RowStream, ScanRequest, SourceTable, TableProvider,
};
use async_trait::async_trait;
use futures::stream;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{
    AccessError, CapabilitySet, ColumnDef, Filter, Row, ScalarType, TableDef, Value, ORDERING_OPS,
};
use tracing::debug;

const SMALL_ROWS: u64 = 10;
const LARGE_ROWS: u64 = 100_000_000;

struct MockTable {
    name: String,
    nrows: u64,
}

fn synth_row(id: u64) -> Row {
    Row::from_pairs([
        ("id", Value::Int(id as i64)),
        ("name", Value::String(format!("mock row #{}", id))),
    ])
}

#[async_trait]
impl SourceTable for MockTable {
    fn definition(&self) -> TableDef {
        TableDef::new(
            self.name.clone(),
            vec![
                ColumnDef::new("id", ScalarType::Int, false).with_description("Primary key"),
                ColumnDef::new("name", ScalarType::String, false).with_description("Name field"),
            ],
        )
        .with_description(format!("A synthetic table with {} rows.", self.nrows))
    }

    fn capabilities(&self) -> CapabilitySet {
        // comparisons on the integer id column, narrowed projection, and
        // limit; ordering is left to the consumer
        CapabilitySet::none()
            .with_filter_ops(ScalarType::Int, ORDERING_OPS)
            .with_projection_pushdown(true)
            .with_limit_pushdown(true)
    }

    fn estimate(&self, _filters: &[Filter], _columns: &[String]) -> Estimate {
        Estimate {
            rows: self.nrows,
            bytes: self.nrows.saturating_mul(24),
        }
    }

    async fn scan(&self, request: ScanRequest) -> Result<RowStream, AccessError> {
        debug!(table = %self.name, ?request.limit, "mock scan starting");
        let nrows = self.nrows;
        let limit = request.limit.unwrap_or(u64::MAX);
        let filters = request.filters;
        let columns = request.columns;

        let rows = (1..=nrows)
            .map(synth_row)
            .filter(move |row| filters.iter().all(|f| f.matches(row)))
            .take(limit as usize)
            .map(move |row| -> Result<Row, AccessError> {
                match &columns {
                    Some(cols) => Ok(row.project(cols)),
                    None => Ok(row),
                }
            });
        Ok(Box::pin(stream::iter(rows)))
    }
}

/// A mock data source holding the two synthetic tables.
pub struct MockProvider {
    tables: Vec<Arc<MockTable>>,
}

impl MockProvider {
    fn new(small_rows: u64) -> Self {
        Self {
            tables: vec![
                Arc::new(MockTable {
                    name: "small_table".to_string(),
                    nrows: small_rows,
                }),
                Arc::new(MockTable {
                    name: "large_table".to_string(),
                    nrows: LARGE_ROWS,
                }),
            ],
        }
    }
}

#[async_trait]
impl TableProvider for MockProvider {
    fn tables(&self) -> Vec<Arc<dyn SourceTable>> {
        self.tables
            .iter()
            .map(|t| t.clone() as Arc<dyn SourceTable>)
            .collect()
    }

    fn table(&self, name: &str) -> Option<Arc<dyn SourceTable>> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.clone() as Arc<dyn SourceTable>)
    }
}

/// Factory for the `mock` provider type.
///
/// Recognizes one option, `rows`, overriding the small table's row count;
/// anything else is ignored for forward compatibility.
pub struct MockFactory;

#[async_trait]
impl ProviderFactory for MockFactory {
    fn provider_type(&self) -> &'static str {
        "mock"
    }

    async fn create(
        &self,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn TableProvider>, AccessError> {
        let small_rows = match options.get("rows") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                AccessError::ProviderInit(format!("option 'rows' is not a row count: '{}'", raw))
            })?,
            None => SMALL_ROWS,
        };
        Ok(Arc::new(MockProvider::new(small_rows)))
    }
}
