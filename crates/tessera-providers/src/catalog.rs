//! Schema catalog queries against a provider.
//!
//! Read-only: callable repeatedly with no effect on provider data. Results
//! are stable for a provider instance's lifetime; there is no schema-change
//! notification, a provider restart is the refresh path.

use crate::{Estimate, SourceTable, TableProvider};
use std::sync::Arc;
use tessera_core::{AccessError, CapabilitySet, Filter, TableDef};

/// All table definitions the provider exposes.
pub fn list_tables(provider: &dyn TableProvider) -> Vec<TableDef> {
    provider.tables().iter().map(|t| t.definition()).collect()
}

/// One table's definition plus its declared capabilities.
pub fn describe_table(
    provider: &dyn TableProvider,
    name: &str,
) -> Result<(TableDef, CapabilitySet), AccessError> {
    let table = lookup(provider, name)?;
    Ok((table.definition(), table.capabilities()))
}

/// Row/byte estimate for a table under the given filters and projection.
pub fn estimate(
    provider: &dyn TableProvider,
    name: &str,
    filters: &[Filter],
    columns: &[String],
) -> Result<Estimate, AccessError> {
    Ok(lookup(provider, name)?.estimate(filters, columns))
}

pub fn lookup(
    provider: &dyn TableProvider,
    name: &str,
) -> Result<Arc<dyn SourceTable>, AccessError> {
    provider
        .table(name)
        .ok_or_else(|| AccessError::TableNotFound(name.to_string()))
}
