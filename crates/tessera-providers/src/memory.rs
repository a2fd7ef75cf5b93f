//! In-memory tables. Used as fixtures throughout the workspace tests and
//! for statically-defined data sets.

use crate::{Estimate, RowStream, ScanRequest, SourceTable, TableProvider};
use async_trait::async_trait;
use futures::stream;
use std::sync::Arc;
use tessera_core::{compare_rows, AccessError, CapabilitySet, Filter, Row, TableDef};

/// A table whose rows live in memory.
///
/// Honors whatever capabilities it is configured with: accepted filters,
/// sort, projection, and limit in a scan request are all applied, so tests
/// can exercise any pushdown split.
pub struct MemoryTable {
    definition: TableDef,
    capabilities: CapabilitySet,
    rows: Vec<Row>,
}

impl MemoryTable {
    pub fn new(definition: TableDef, rows: Vec<Row>) -> Self {
        Self {
            definition,
            capabilities: CapabilitySet::none(),
            rows,
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[async_trait]
impl SourceTable for MemoryTable {
    fn definition(&self) -> TableDef {
        self.definition.clone()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    fn estimate(&self, _filters: &[Filter], _columns: &[String]) -> Estimate {
        Estimate {
            rows: self.rows.len() as u64,
            bytes: self.rows.iter().map(|r| r.approx_size() as u64).sum(),
        }
    }

    async fn scan(&self, request: ScanRequest) -> Result<RowStream, AccessError> {
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|row| request.filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect();
        if !request.sort.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &request.sort));
        }
        if let Some(limit) = request.limit {
            rows.truncate(limit as usize);
        }
        if let Some(columns) = &request.columns {
            rows = rows.iter().map(|r| r.project(columns)).collect();
        }
        let items: Vec<Result<Row, AccessError>> = rows.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

/// A provider over a fixed set of in-memory tables.
pub struct MemoryProvider {
    tables: Vec<Arc<MemoryTable>>,
}

impl MemoryProvider {
    pub fn new(tables: Vec<MemoryTable>) -> Self {
        Self {
            tables: tables.into_iter().map(Arc::new).collect(),
        }
    }
}

#[async_trait]
impl TableProvider for MemoryProvider {
    fn tables(&self) -> Vec<Arc<dyn SourceTable>> {
        self.tables
            .iter()
            .map(|t| t.clone() as Arc<dyn SourceTable>)
            .collect()
    }

    fn table(&self, name: &str) -> Option<Arc<dyn SourceTable>> {
        self.tables
            .iter()
            .find(|t| t.definition.name == name)
            .map(|t| t.clone() as Arc<dyn SourceTable>)
    }
}
