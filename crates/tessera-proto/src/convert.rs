//! Conversions between wire messages and domain types.
//!
//! Wire to domain is fallible (`TryFrom`): enums may carry unknown values
//! and optional submessages may be absent. Domain to wire is total.

use crate::v1;
use chrono::{DateTime, Datelike, NaiveDate};
use tessera_core::{
    CapabilitySet, ColumnDef, CompareOp, Filter, QueryShape, Row, RowBatch, ScalarType,
    SortDirection, SortKey, TableDef, Value,
};
use thiserror::Error;

/// Days from 0001-01-01 (CE) to the unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid enum value {value} for {field}")]
    InvalidEnum { field: &'static str, value: i32 },

    #[error("{0} out of representable range")]
    OutOfRange(&'static str),
}

/// Unwraps the optional submessages proto3 generates for message fields.
pub trait FromOptionalField<T> {
    fn required(self, field: &'static str) -> Result<T, ConvertError>;
}

impl<T> FromOptionalField<T> for Option<T> {
    fn required(self, field: &'static str) -> Result<T, ConvertError> {
        self.ok_or(ConvertError::MissingField(field))
    }
}

// --- scalar types ---

impl From<ScalarType> for v1::ScalarKind {
    fn from(value: ScalarType) -> Self {
        match value {
            ScalarType::Bool => v1::ScalarKind::Bool,
            ScalarType::Int => v1::ScalarKind::Int,
            ScalarType::Double => v1::ScalarKind::Double,
            ScalarType::String => v1::ScalarKind::String,
            ScalarType::Date => v1::ScalarKind::Date,
            ScalarType::Timestamp => v1::ScalarKind::Timestamp,
        }
    }
}

impl TryFrom<v1::ScalarKind> for ScalarType {
    type Error = ConvertError;

    fn try_from(value: v1::ScalarKind) -> Result<Self, ConvertError> {
        match value {
            v1::ScalarKind::Bool => Ok(ScalarType::Bool),
            v1::ScalarKind::Int => Ok(ScalarType::Int),
            v1::ScalarKind::Double => Ok(ScalarType::Double),
            v1::ScalarKind::String => Ok(ScalarType::String),
            v1::ScalarKind::Date => Ok(ScalarType::Date),
            v1::ScalarKind::Timestamp => Ok(ScalarType::Timestamp),
            v1::ScalarKind::Unspecified => Err(ConvertError::InvalidEnum {
                field: "scalar kind",
                value: 0,
            }),
        }
    }
}

fn scalar_kind(raw: i32) -> Result<ScalarType, ConvertError> {
    v1::ScalarKind::try_from(raw)
        .map_err(|_| ConvertError::InvalidEnum {
            field: "scalar kind",
            value: raw,
        })?
        .try_into()
}

// --- values ---

impl TryFrom<v1::Value> for Value {
    type Error = ConvertError;

    fn try_from(value: v1::Value) -> Result<Self, ConvertError> {
        use v1::value::Kind;
        match value.kind.required("value kind")? {
            Kind::Null(_) => Ok(Value::Null),
            Kind::Bool(v) => Ok(Value::Bool(v)),
            Kind::Int(v) => Ok(Value::Int(v)),
            Kind::Double(v) => Ok(Value::Double(v)),
            Kind::String(v) => Ok(Value::String(v)),
            Kind::Date(days) => days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map(Value::Date)
                .ok_or(ConvertError::OutOfRange("date")),
            Kind::Timestamp(micros) => DateTime::from_timestamp_micros(micros)
                .map(Value::Timestamp)
                .ok_or(ConvertError::OutOfRange("timestamp")),
        }
    }
}

impl From<Value> for v1::Value {
    fn from(value: Value) -> Self {
        use v1::value::Kind;
        let kind = match value {
            Value::Null => Kind::Null(v1::value::Null {}),
            Value::Bool(v) => Kind::Bool(v),
            Value::Int(v) => Kind::Int(v),
            Value::Double(v) => Kind::Double(v),
            Value::String(v) => Kind::String(v),
            Value::Date(v) => Kind::Date(v.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
            Value::Timestamp(v) => Kind::Timestamp(v.timestamp_micros()),
        };
        v1::Value { kind: Some(kind) }
    }
}

// --- query shapes ---

impl From<CompareOp> for v1::CompareOp {
    fn from(value: CompareOp) -> Self {
        match value {
            CompareOp::Eq => v1::CompareOp::Eq,
            CompareOp::Neq => v1::CompareOp::Neq,
            CompareOp::Lt => v1::CompareOp::Lt,
            CompareOp::Lte => v1::CompareOp::Lte,
            CompareOp::Gt => v1::CompareOp::Gt,
            CompareOp::Gte => v1::CompareOp::Gte,
            CompareOp::Like => v1::CompareOp::Like,
        }
    }
}

fn compare_op(raw: i32) -> Result<CompareOp, ConvertError> {
    let invalid = ConvertError::InvalidEnum {
        field: "compare op",
        value: raw,
    };
    match v1::CompareOp::try_from(raw).map_err(|_| invalid.clone())? {
        v1::CompareOp::Eq => Ok(CompareOp::Eq),
        v1::CompareOp::Neq => Ok(CompareOp::Neq),
        v1::CompareOp::Lt => Ok(CompareOp::Lt),
        v1::CompareOp::Lte => Ok(CompareOp::Lte),
        v1::CompareOp::Gt => Ok(CompareOp::Gt),
        v1::CompareOp::Gte => Ok(CompareOp::Gte),
        v1::CompareOp::Like => Ok(CompareOp::Like),
        v1::CompareOp::Unspecified => Err(invalid),
    }
}

fn sort_direction(raw: i32) -> Result<SortDirection, ConvertError> {
    match v1::SortDirection::try_from(raw) {
        Ok(v1::SortDirection::Asc) => Ok(SortDirection::Asc),
        Ok(v1::SortDirection::Desc) => Ok(SortDirection::Desc),
        _ => Err(ConvertError::InvalidEnum {
            field: "sort direction",
            value: raw,
        }),
    }
}

impl TryFrom<v1::Filter> for Filter {
    type Error = ConvertError;

    fn try_from(value: v1::Filter) -> Result<Self, ConvertError> {
        Ok(Filter {
            column: value.column,
            op: compare_op(value.op)?,
            value: value.value.required("filter value")?.try_into()?,
        })
    }
}

impl From<Filter> for v1::Filter {
    fn from(value: Filter) -> Self {
        v1::Filter {
            column: value.column,
            op: v1::CompareOp::from(value.op) as i32,
            value: Some(value.value.into()),
        }
    }
}

impl TryFrom<v1::SortKey> for SortKey {
    type Error = ConvertError;

    fn try_from(value: v1::SortKey) -> Result<Self, ConvertError> {
        Ok(SortKey {
            column: value.column,
            direction: sort_direction(value.direction)?,
        })
    }
}

impl From<SortKey> for v1::SortKey {
    fn from(value: SortKey) -> Self {
        let direction = match value.direction {
            SortDirection::Asc => v1::SortDirection::Asc,
            SortDirection::Desc => v1::SortDirection::Desc,
        };
        v1::SortKey {
            column: value.column,
            direction: direction as i32,
        }
    }
}

impl TryFrom<v1::Query> for QueryShape {
    type Error = ConvertError;

    fn try_from(value: v1::Query) -> Result<Self, ConvertError> {
        Ok(QueryShape {
            columns: value.columns,
            filters: value
                .filters
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            sort_keys: value
                .sort_keys
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            limit: value.limit,
        })
    }
}

impl From<QueryShape> for v1::Query {
    fn from(value: QueryShape) -> Self {
        v1::Query {
            columns: value.columns,
            filters: value.filters.into_iter().map(Into::into).collect(),
            sort_keys: value.sort_keys.into_iter().map(Into::into).collect(),
            limit: value.limit,
        }
    }
}

// --- schema ---

impl TryFrom<v1::ColumnDefinition> for ColumnDef {
    type Error = ConvertError;

    fn try_from(value: v1::ColumnDefinition) -> Result<Self, ConvertError> {
        Ok(ColumnDef {
            name: value.name,
            scalar_type: scalar_kind(value.kind)?,
            nullable: value.nullable,
            description: value.description,
        })
    }
}

impl From<ColumnDef> for v1::ColumnDefinition {
    fn from(value: ColumnDef) -> Self {
        v1::ColumnDefinition {
            name: value.name,
            kind: v1::ScalarKind::from(value.scalar_type) as i32,
            nullable: value.nullable,
            description: value.description,
        }
    }
}

impl TryFrom<v1::TableDefinition> for TableDef {
    type Error = ConvertError;

    fn try_from(value: v1::TableDefinition) -> Result<Self, ConvertError> {
        Ok(TableDef {
            name: value.name,
            description: value.description,
            columns: value
                .columns
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl From<TableDef> for v1::TableDefinition {
    fn from(value: TableDef) -> Self {
        v1::TableDefinition {
            name: value.name,
            description: value.description,
            columns: value.columns.into_iter().map(Into::into).collect(),
        }
    }
}

// --- capabilities ---

impl TryFrom<v1::TableCapabilities> for CapabilitySet {
    type Error = ConvertError;

    fn try_from(value: v1::TableCapabilities) -> Result<Self, ConvertError> {
        let mut caps = CapabilitySet::none()
            .with_projection_pushdown(value.projection_pushdown)
            .with_sort_pushdown(value.sort_pushdown)
            .with_limit_pushdown(value.limit_pushdown);
        for filter_cap in value.filter_ops {
            let scalar_type = scalar_kind(filter_cap.kind)?;
            let ops = filter_cap
                .ops
                .into_iter()
                .map(compare_op)
                .collect::<Result<Vec<_>, _>>()?;
            caps = caps.with_filter_ops(scalar_type, ops);
        }
        Ok(caps)
    }
}

impl From<CapabilitySet> for v1::TableCapabilities {
    fn from(value: CapabilitySet) -> Self {
        v1::TableCapabilities {
            filter_ops: value
                .filter_ops
                .into_iter()
                .map(|(scalar_type, ops)| v1::FilterCapability {
                    kind: v1::ScalarKind::from(scalar_type) as i32,
                    ops: ops
                        .into_iter()
                        .map(|op| v1::CompareOp::from(op) as i32)
                        .collect(),
                })
                .collect(),
            projection_pushdown: value.projection_pushdown,
            sort_pushdown: value.sort_pushdown,
            limit_pushdown: value.limit_pushdown,
        }
    }
}

// --- rows ---

impl TryFrom<v1::Row> for Row {
    type Error = ConvertError;

    fn try_from(value: v1::Row) -> Result<Self, ConvertError> {
        let columns = value
            .columns
            .into_iter()
            .map(|column| {
                Ok((
                    column.name,
                    column.value.required("row column value")?.try_into()?,
                ))
            })
            .collect::<Result<_, ConvertError>>()?;
        Ok(Row { columns })
    }
}

impl From<Row> for v1::Row {
    fn from(value: Row) -> Self {
        v1::Row {
            columns: value
                .columns
                .into_iter()
                .map(|(name, v)| v1::RowColumn {
                    name,
                    value: Some(v.into()),
                })
                .collect(),
        }
    }
}

impl From<RowBatch> for v1::Rows {
    fn from(value: RowBatch) -> Self {
        v1::Rows {
            rows: value.rows.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<v1::Rows> for RowBatch {
    type Error = ConvertError;

    fn try_from(value: v1::Rows) -> Result<Self, ConvertError> {
        Ok(RowBatch {
            rows: value
                .rows
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
        })
    }
}
