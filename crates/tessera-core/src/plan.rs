//! The pushdown negotiator.
//!
//! [`plan`] splits a query shape into the part the provider executes and
//! the residual the executor applies locally. It is a pure function of the
//! table definition, the declared capabilities, and the shape - no I/O -
//! which is what makes the safety properties directly unit-testable.

use crate::capability::CapabilitySet;
use crate::error::AccessError;
use crate::query::{Filter, QueryShape, SortKey};
use crate::schema::TableDef;
use std::collections::BTreeSet;

/// The negotiated split for one read request. Request-scoped; discarded
/// once the response stream completes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushdownPlan {
    /// Columns the provider should produce. `None` means all columns
    /// (projection not pushed down, or the shape requested everything).
    pub scan_columns: Option<Vec<String>>,
    /// Filters forwarded to the provider.
    pub accepted_filters: Vec<Filter>,
    /// Filters the executor evaluates against streamed rows, in request
    /// order (short-circuit AND).
    pub residual_filters: Vec<Filter>,
    /// Sort keys the provider applies. All-or-nothing.
    pub accepted_sort: Vec<SortKey>,
    /// Sort keys the executor applies via the bounded local fallback.
    pub residual_sort: Vec<SortKey>,
    /// Limit forwarded to the provider; only set when truncating at the
    /// provider cannot drop rows the consumer still needs.
    pub accepted_limit: Option<u64>,
    /// Limit the executor always enforces locally.
    pub output_limit: Option<u64>,
    /// Columns of the final output, in requested order. Empty = all.
    pub output_columns: Vec<String>,
}

impl PushdownPlan {
    /// Re-check the accepted operations against a capability set.
    ///
    /// The planner never produces a violating plan; the executor still
    /// verifies before contacting the provider and treats a violation as
    /// an internal bug rather than forwarding it.
    pub fn verify(&self, table: &TableDef, caps: &CapabilitySet) -> Result<(), AccessError> {
        for filter in &self.accepted_filters {
            let supported = table
                .column(&filter.column)
                .map(|c| caps.supports_filter(c.scalar_type, filter.op))
                .unwrap_or(false);
            if !supported {
                return Err(AccessError::UnsupportedQueryShape(format!(
                    "filter {} accepted but not declared supported",
                    filter
                )));
            }
        }
        if !self.accepted_sort.is_empty() && !caps.sort_pushdown {
            return Err(AccessError::UnsupportedQueryShape(
                "sort accepted but not declared supported".into(),
            ));
        }
        if self.accepted_limit.is_some() && !caps.limit_pushdown {
            return Err(AccessError::UnsupportedQueryShape(
                "limit accepted but not declared supported".into(),
            ));
        }
        if self.scan_columns.is_some() && !caps.projection_pushdown {
            return Err(AccessError::UnsupportedQueryShape(
                "projection accepted but not declared supported".into(),
            ));
        }
        Ok(())
    }

    /// Human-readable plan rendering, served by the explain RPC.
    pub fn explain(&self, table: &str) -> Vec<String> {
        let mut lines = vec![format!("table: {}", table)];
        match &self.scan_columns {
            Some(cols) => lines.push(format!("scan columns: {} (pushed)", cols.join(", "))),
            None => lines.push("scan columns: all".to_string()),
        }
        if !self.accepted_filters.is_empty() {
            lines.push(format!(
                "pushed filters: {}",
                join_filters(&self.accepted_filters)
            ));
        }
        if !self.residual_filters.is_empty() {
            lines.push(format!(
                "residual filters: {}",
                join_filters(&self.residual_filters)
            ));
        }
        if !self.accepted_sort.is_empty() {
            lines.push(format!("sort: pushed ({} keys)", self.accepted_sort.len()));
        }
        if !self.residual_sort.is_empty() {
            lines.push(format!("sort: local ({} keys)", self.residual_sort.len()));
        }
        match (self.accepted_limit, self.output_limit) {
            (Some(n), _) => lines.push(format!("limit: {} (pushed)", n)),
            (None, Some(n)) => lines.push(format!("limit: {} (local)", n)),
            (None, None) => {}
        }
        lines
    }
}

fn join_filters(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Compute the pushdown split for a validated query shape.
///
/// Rules, in order:
/// 1. Filters are partitioned independently, in request order. A filter is
///    accepted when its column's scalar type declares the operator; filters
///    with null literals always stay residual so their never-true semantics
///    are evaluated in exactly one place.
/// 2. Sort is all-or-nothing on `sort_pushdown`. Residual filters do not
///    block sort pushdown: local filtering cannot reorder rows.
/// 3. Limit is accepted only when nothing local can still discard or
///    reorder rows, i.e. no residual filters and no residual sort. The
///    executor enforces the limit locally in every case.
/// 4. Projection is narrowed only when the capability is declared and the
///    shape names columns; the scanned set then also carries the columns
///    residual filters and residual sort need, in definition order.
pub fn plan(table: &TableDef, caps: &CapabilitySet, shape: &QueryShape) -> PushdownPlan {
    let mut accepted_filters = Vec::new();
    let mut residual_filters = Vec::new();
    for filter in &shape.filters {
        let supported = !filter.value.is_null()
            && table
                .column(&filter.column)
                .map(|c| caps.supports_filter(c.scalar_type, filter.op))
                .unwrap_or(false);
        if supported {
            accepted_filters.push(filter.clone());
        } else {
            residual_filters.push(filter.clone());
        }
    }

    let (accepted_sort, residual_sort) = if shape.sort_keys.is_empty() {
        (Vec::new(), Vec::new())
    } else if caps.sort_pushdown {
        (shape.sort_keys.clone(), Vec::new())
    } else {
        (Vec::new(), shape.sort_keys.clone())
    };

    let limit_safe = residual_filters.is_empty() && residual_sort.is_empty();
    let accepted_limit = match shape.limit {
        Some(n) if caps.limit_pushdown && limit_safe => Some(n),
        _ => None,
    };

    let scan_columns = if caps.projection_pushdown && !shape.columns.is_empty() {
        let mut needed: BTreeSet<&str> = shape.columns.iter().map(String::as_str).collect();
        needed.extend(residual_filters.iter().map(|f| f.column.as_str()));
        needed.extend(residual_sort.iter().map(|k| k.column.as_str()));
        Some(
            table
                .columns
                .iter()
                .filter(|c| needed.contains(c.name.as_str()))
                .map(|c| c.name.clone())
                .collect(),
        )
    } else {
        None
    };

    PushdownPlan {
        scan_columns,
        accepted_filters,
        residual_filters,
        accepted_sort,
        residual_sort,
        accepted_limit,
        output_limit: shape.limit,
        output_columns: shape.columns.clone(),
    }
}
