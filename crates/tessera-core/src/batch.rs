//! Rows and bounded row batches.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// One result row: ordered (column name, value) pairs.
///
/// Order follows the scanned column order so batches marshal onto the wire
/// without re-sorting; lookup by name is linear, which is fine for the
/// column counts foreign tables carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<N, I>(pairs: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Value)>,
    {
        Self {
            columns: pairs.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.columns.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Narrow the row to `columns`, in the requested order. A column the
    /// row does not carry projects to `Null`.
    pub fn project(&self, columns: &[String]) -> Row {
        Row {
            columns: columns
                .iter()
                .map(|name| {
                    let value = self.get(name).cloned().unwrap_or(Value::Null);
                    (name.clone(), value)
                })
                .collect(),
        }
    }

    /// Rough in-memory size, used to bound batch byte sizes.
    pub fn approx_size(&self) -> usize {
        self.columns
            .iter()
            .map(|(n, v)| n.len() + v.approx_size())
            .sum()
    }
}

/// An ordered batch of rows, bounded by [`BatchLimits`]. Produced lazily;
/// a table is never materialized whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    pub rows: Vec<Row>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Bounds on a single streamed batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_rows: usize,
    pub max_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_rows: 1024,
            max_bytes: 1024 * 1024,
        }
    }
}

/// Groups rows into batches no larger than the configured bounds.
#[derive(Debug)]
pub struct Batcher {
    limits: BatchLimits,
    rows: Vec<Row>,
    bytes: usize,
}

impl Batcher {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            rows: Vec::new(),
            bytes: 0,
        }
    }

    /// Append a row. Returns a full batch once either bound is reached.
    pub fn push(&mut self, row: Row) -> Option<RowBatch> {
        self.bytes += row.approx_size();
        self.rows.push(row);
        if self.rows.len() >= self.limits.max_rows.max(1) || self.bytes >= self.limits.max_bytes {
            return self.take();
        }
        None
    }

    /// Drain any buffered rows into a final, possibly partial batch.
    pub fn flush(&mut self) -> Option<RowBatch> {
        if self.rows.is_empty() {
            None
        } else {
            self.take()
        }
    }

    fn take(&mut self) -> Option<RowBatch> {
        self.bytes = 0;
        Some(RowBatch {
            rows: std::mem::take(&mut self.rows),
        })
    }
}
