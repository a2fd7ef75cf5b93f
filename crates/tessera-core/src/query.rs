//! Query shapes: filters, sort keys, projection, limit.

use crate::batch::Row;
use crate::error::AccessError;
use crate::schema::{ScalarType, TableDef};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators a filter may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

/// The six ordering comparisons, without `Like`.
pub const ORDERING_OPS: [CompareOp; 6] = [
    CompareOp::Eq,
    CompareOp::Neq,
    CompareOp::Lt,
    CompareOp::Lte,
    CompareOp::Gt,
    CompareOp::Gte,
];

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One qualifier: `column op literal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Evaluate this filter against a row.
    ///
    /// Missing columns, null cells, null literals, and mismatched types
    /// all evaluate to not-true, matching SQL qualifier semantics.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(cell) = row.get(&self.column) else {
            return false;
        };
        match self.op {
            CompareOp::Like => match (cell, &self.value) {
                (Value::String(text), Value::String(pattern)) => like_match(text, pattern),
                _ => false,
            },
            op => match cell.compare(&self.value) {
                Some(ord) => match op {
                    CompareOp::Eq => ord == Ordering::Equal,
                    CompareOp::Neq => ord != Ordering::Equal,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Lte => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Gte => ord != Ordering::Less,
                    CompareOp::Like => unreachable!(),
                },
                None => false,
            },
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op.symbol(), self.value)
    }
}

/// SQL `LIKE` matching: `%` matches any run, `_` matches one character.
///
/// Greedy two-pointer scan with backtracking to the last `%`.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pat.len() && (pat[p] == '_' || pat[p] == text[t]) && pat[p] != '%' {
            t += 1;
            p += 1;
        } else if p < pat.len() && pat[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '%' {
        p += 1;
    }
    p == pat.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Compare two rows under a sort-key sequence; used by the local sort
/// fallback. Missing cells order as `Null`.
pub fn compare_rows(a: &Row, b: &Row, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.column).unwrap_or(&Value::Null);
        let right = b.get(&key.column).unwrap_or(&Value::Null);
        let mut ord = left.sort_cmp(right);
        if key.direction == SortDirection::Desc {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// The query shape a read request carries: requested columns (empty = all),
/// filters in request order, sort keys, and an optional limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryShape {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort_keys: Vec<SortKey>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl QueryShape {
    /// Reject shapes referencing unknown columns or carrying literals a
    /// column's type cannot hold. Runs before planning so the planner and
    /// executor can assume a well-formed shape.
    pub fn validate(&self, table: &TableDef) -> Result<(), AccessError> {
        for name in &self.columns {
            if table.column(name).is_none() {
                return Err(AccessError::InvalidQuery(format!(
                    "unknown column '{}' in projection for table '{}'",
                    name, table.name
                )));
            }
        }
        for filter in &self.filters {
            let Some(column) = table.column(&filter.column) else {
                return Err(AccessError::InvalidQuery(format!(
                    "unknown column '{}' in filter for table '{}'",
                    filter.column, table.name
                )));
            };
            if filter.op == CompareOp::Like {
                let string_sides = column.scalar_type == ScalarType::String
                    && matches!(filter.value, Value::String(_) | Value::Null);
                if !string_sides {
                    return Err(AccessError::InvalidQuery(format!(
                        "LIKE requires string column and pattern, got {} {}",
                        column.scalar_type, filter.value
                    )));
                }
            } else if !filter.value.fits_type(column.scalar_type) {
                return Err(AccessError::InvalidQuery(format!(
                    "filter literal {} does not fit column '{}' of type {}",
                    filter.value, column.name, column.scalar_type
                )));
            }
        }
        for key in &self.sort_keys {
            if table.column(&key.column).is_none() {
                return Err(AccessError::InvalidQuery(format!(
                    "unknown column '{}' in sort for table '{}'",
                    key.column, table.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDef;

    fn row(id: i64, name: &str) -> Row {
        Row::from_pairs([
            ("id", Value::Int(id)),
            ("name", Value::String(name.into())),
        ])
    }

    fn users() -> TableDef {
        TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ScalarType::Int, false),
                ColumnDef::new("name", ScalarType::String, true),
            ],
        )
    }

    // --- filter evaluation ---

    #[test]
    fn eq_and_neq() {
        let r = row(5, "ann");
        assert!(Filter::new("id", CompareOp::Eq, Value::Int(5)).matches(&r));
        assert!(!Filter::new("id", CompareOp::Neq, Value::Int(5)).matches(&r));
        assert!(Filter::new("name", CompareOp::Eq, Value::String("ann".into())).matches(&r));
    }

    #[test]
    fn ordering_ops() {
        let r = row(5, "ann");
        assert!(Filter::new("id", CompareOp::Gt, Value::Int(4)).matches(&r));
        assert!(Filter::new("id", CompareOp::Gte, Value::Int(5)).matches(&r));
        assert!(!Filter::new("id", CompareOp::Lt, Value::Int(5)).matches(&r));
        assert!(Filter::new("id", CompareOp::Lte, Value::Int(5)).matches(&r));
    }

    #[test]
    fn null_literal_never_matches() {
        let r = row(5, "ann");
        for op in ORDERING_OPS {
            assert!(!Filter::new("id", op, Value::Null).matches(&r));
        }
    }

    #[test]
    fn null_cell_never_matches() {
        let r = Row::from_pairs([("name", Value::Null)]);
        assert!(!Filter::new("name", CompareOp::Eq, Value::Null).matches(&r));
        assert!(!Filter::new("name", CompareOp::Eq, Value::String("x".into())).matches(&r));
    }

    #[test]
    fn missing_column_never_matches() {
        let r = row(5, "ann");
        assert!(!Filter::new("ghost", CompareOp::Eq, Value::Int(5)).matches(&r));
    }

    #[test]
    fn mismatched_types_never_match() {
        let r = row(5, "ann");
        assert!(!Filter::new("id", CompareOp::Eq, Value::String("5".into())).matches(&r));
    }

    // --- LIKE ---

    #[test]
    fn like_wildcards() {
        let r = row(1, "annabel");
        let like = |p: &str| Filter::new("name", CompareOp::Like, Value::String(p.into()));
        assert!(like("annabel").matches(&r));
        assert!(like("ann%").matches(&r));
        assert!(like("%bel").matches(&r));
        assert!(like("%nna%").matches(&r));
        assert!(like("a_nabel").matches(&r));
        assert!(like("%").matches(&r));
        assert!(!like("ann").matches(&r));
        assert!(!like("x%").matches(&r));
        assert!(!like("a_abel").matches(&r));
    }

    #[test]
    fn like_empty_cases() {
        assert!(like_match("", ""));
        assert!(like_match("", "%"));
        assert!(!like_match("", "_"));
        assert!(!like_match("a", ""));
    }

    #[test]
    fn like_backtracks_across_repeats() {
        assert!(like_match("abcbcd", "a%bcd"));
        assert!(like_match("aaa", "%a"));
        assert!(!like_match("abc", "%d"));
    }

    // --- sort comparator ---

    #[test]
    fn compare_rows_multi_key() {
        let a = row(1, "zed");
        let b = row(1, "ann");
        let keys = vec![SortKey::asc("id"), SortKey::asc("name")];
        assert_eq!(compare_rows(&a, &b, &keys), Ordering::Greater);
        let keys = vec![SortKey::asc("id"), SortKey::desc("name")];
        assert_eq!(compare_rows(&a, &b, &keys), Ordering::Less);
    }

    #[test]
    fn compare_rows_nulls_first() {
        let a = Row::from_pairs([("id", Value::Null)]);
        let b = row(1, "x");
        assert_eq!(compare_rows(&a, &b, &[SortKey::asc("id")]), Ordering::Less);
        assert_eq!(
            compare_rows(&a, &b, &[SortKey::desc("id")]),
            Ordering::Greater
        );
    }

    // --- validation ---

    #[test]
    fn validate_accepts_well_formed() {
        let shape = QueryShape {
            columns: vec!["id".into()],
            filters: vec![Filter::new("name", CompareOp::Like, Value::String("a%".into()))],
            sort_keys: vec![SortKey::desc("id")],
            limit: Some(10),
        };
        assert!(shape.validate(&users()).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_projection_column() {
        let shape = QueryShape {
            columns: vec!["ghost".into()],
            ..Default::default()
        };
        assert!(matches!(
            shape.validate(&users()),
            Err(AccessError::InvalidQuery(_))
        ));
    }

    #[test]
    fn validate_rejects_unknown_filter_column() {
        let shape = QueryShape {
            filters: vec![Filter::new("ghost", CompareOp::Eq, Value::Int(1))],
            ..Default::default()
        };
        assert!(matches!(
            shape.validate(&users()),
            Err(AccessError::InvalidQuery(_))
        ));
    }

    #[test]
    fn validate_rejects_mistyped_literal() {
        let shape = QueryShape {
            filters: vec![Filter::new("id", CompareOp::Eq, Value::String("5".into()))],
            ..Default::default()
        };
        assert!(matches!(
            shape.validate(&users()),
            Err(AccessError::InvalidQuery(_))
        ));
    }

    #[test]
    fn validate_rejects_like_on_int_column() {
        let shape = QueryShape {
            filters: vec![Filter::new("id", CompareOp::Like, Value::String("5%".into()))],
            ..Default::default()
        };
        assert!(matches!(
            shape.validate(&users()),
            Err(AccessError::InvalidQuery(_))
        ));
    }

    #[test]
    fn validate_rejects_unknown_sort_column() {
        let shape = QueryShape {
            sort_keys: vec![SortKey::asc("ghost")],
            ..Default::default()
        };
        assert!(matches!(
            shape.validate(&users()),
            Err(AccessError::InvalidQuery(_))
        ));
    }

    #[test]
    fn shape_deserializes_with_defaults() {
        let shape: QueryShape =
            serde_json::from_str(r#"{"filters":[{"column":"id","op":"gt","value":{"int":18}}]}"#)
                .unwrap();
        assert!(shape.columns.is_empty());
        assert_eq!(shape.filters.len(), 1);
        assert_eq!(shape.filters[0].op, CompareOp::Gt);
        assert!(shape.limit.is_none());
    }
}
