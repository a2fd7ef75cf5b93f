//! Pushdown capabilities a table declares.

use crate::query::CompareOp;
use crate::schema::ScalarType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a table is willing to execute on the provider side.
///
/// The planner never forwards an operation absent from this set; a table
/// declaring nothing gets every operation applied locally instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Comparison operators accepted per scalar type.
    #[serde(default)]
    pub filter_ops: BTreeMap<ScalarType, BTreeSet<CompareOp>>,
    #[serde(default)]
    pub projection_pushdown: bool,
    #[serde(default)]
    pub sort_pushdown: bool,
    #[serde(default)]
    pub limit_pushdown: bool,
}

impl CapabilitySet {
    /// No pushdown at all; everything evaluates locally.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_filter_ops(
        mut self,
        scalar_type: ScalarType,
        ops: impl IntoIterator<Item = CompareOp>,
    ) -> Self {
        self.filter_ops
            .entry(scalar_type)
            .or_default()
            .extend(ops);
        self
    }

    pub fn with_projection_pushdown(mut self, supported: bool) -> Self {
        self.projection_pushdown = supported;
        self
    }

    pub fn with_sort_pushdown(mut self, supported: bool) -> Self {
        self.sort_pushdown = supported;
        self
    }

    pub fn with_limit_pushdown(mut self, supported: bool) -> Self {
        self.limit_pushdown = supported;
        self
    }

    pub fn supports_filter(&self, scalar_type: ScalarType, op: CompareOp) -> bool {
        self.filter_ops
            .get(&scalar_type)
            .map(|ops| ops.contains(&op))
            .unwrap_or(false)
    }
}
