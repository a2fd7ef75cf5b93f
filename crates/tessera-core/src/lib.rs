//! Tessera Core - domain model and pushdown planner
//!
//! This crate holds the pure domain model of the data access service:
//! scalar types, typed values, table definitions, capability sets, query
//! shapes, the pushdown planner, and the bounded row-batch model. Nothing
//! in this crate performs I/O; the planner in particular is a pure function
//! of its inputs so it can be unit tested in isolation.

pub mod batch;
pub mod capability;
pub mod error;
pub mod plan;
pub mod query;
pub mod schema;
pub mod value;

pub use batch::{BatchLimits, Batcher, Row, RowBatch};
pub use capability::CapabilitySet;
pub use error::{AccessError, Result};
pub use plan::{plan, PushdownPlan};
pub use query::{compare_rows, CompareOp, Filter, QueryShape, SortDirection, SortKey, ORDERING_OPS};
pub use schema::{ColumnDef, ScalarType, TableDef};
pub use value::Value;
