//! Row stream executor.
//!
//! Drives a table scan using only the accepted portion of a pushdown plan,
//! applies the residual filters/sort/limit locally, and regroups surviving
//! rows into bounded batches. The returned stream is lazy: dropping it
//! cancels the scan, releasing the provider's row stream and (if present)
//! its scan gate with it.

use crate::{BatchStream, ScanRequest, SourceTable};
use async_stream::try_stream;
use futures::StreamExt;
use std::sync::Arc;
use tessera_core::{compare_rows, AccessError, Batcher, BatchLimits, PushdownPlan, Row};

/// Executor tuning knobs, fixed per server instance.
#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    pub batch: BatchLimits,
    /// Upper bound on rows buffered for the local sort fallback. Hitting
    /// it terminates the stream with `ResourceExceeded` instead of
    /// exhausting memory.
    pub sort_buffer_rows: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            batch: BatchLimits::default(),
            sort_buffer_rows: 1_000_000,
        }
    }
}

/// Stream the plan's result batches from `table`.
///
/// Finite and not restartable; call again to re-query from the start.
/// Errors from the provider terminate the sequence, leaving batches
/// already yielded valid.
pub fn execute(table: Arc<dyn SourceTable>, plan: PushdownPlan, opts: ExecOptions) -> BatchStream {
    Box::pin(try_stream! {
        plan.verify(&table.definition(), &table.capabilities())?;

        // Serialize against other scans when the table cannot support
        // concurrent cursors. Held until this stream is dropped.
        let _gate = match table.scan_gate() {
            Some(gate) => Some(gate.lock_owned().await),
            None => None,
        };

        let mut batcher = Batcher::new(opts.batch);
        let mut remaining = plan.output_limit;

        if remaining != Some(0) {
            let mut rows = table.scan(ScanRequest::from_plan(&plan)).await?;

            if plan.residual_sort.is_empty() {
                while let Some(row) = rows.next().await {
                    let row = row?;
                    if !passes_residual(&plan, &row) {
                        continue;
                    }
                    if let Some(batch) = batcher.push(project_output(&plan, row)) {
                        yield batch;
                    }
                    if let Some(rem) = remaining.as_mut() {
                        *rem -= 1;
                        if *rem == 0 {
                            break;
                        }
                    }
                }
            } else {
                // Local sort fallback: buffer surviving rows up to the
                // configured bound, then sort, truncate, and batch.
                let mut buffer: Vec<Row> = Vec::new();
                while let Some(row) = rows.next().await {
                    let row = row?;
                    if !passes_residual(&plan, &row) {
                        continue;
                    }
                    if buffer.len() >= opts.sort_buffer_rows {
                        Err(AccessError::ResourceExceeded(format!(
                            "local sort buffer bound of {} rows reached for table '{}'",
                            opts.sort_buffer_rows,
                            table.definition().name
                        )))?;
                    }
                    buffer.push(row);
                }
                drop(rows);

                buffer.sort_by(|a, b| compare_rows(a, b, &plan.residual_sort));
                if let Some(limit) = plan.output_limit {
                    buffer.truncate(limit as usize);
                }
                for row in buffer {
                    if let Some(batch) = batcher.push(project_output(&plan, row)) {
                        yield batch;
                    }
                }
            }
        }

        if let Some(batch) = batcher.flush() {
            yield batch;
        }
    })
}

fn passes_residual(plan: &PushdownPlan, row: &Row) -> bool {
    // request order, short-circuit AND
    plan.residual_filters.iter().all(|f| f.matches(row))
}

fn project_output(plan: &PushdownPlan, row: Row) -> Row {
    if plan.output_columns.is_empty() {
        row
    } else {
        row.project(&plan.output_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;
    use crate::{Estimate, RowStream};
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tessera_core::{
        plan, CapabilitySet, ColumnDef, CompareOp, Filter, QueryShape, RowBatch, ScalarType,
        SortKey, TableDef, Value, ORDERING_OPS,
    };

    fn nums_def() -> TableDef {
        TableDef::new(
            "nums",
            vec![
                ColumnDef::new("n", ScalarType::Int, false),
                ColumnDef::new("label", ScalarType::String, true),
            ],
        )
    }

    fn num_row(n: i64) -> Row {
        Row::from_pairs([
            ("n", Value::Int(n)),
            ("label", Value::String(format!("row{}", n))),
        ])
    }

    /// Test double that records scan requests, counts produced rows, can
    /// fail mid-stream, and can require serialized scans.
    struct ScriptedTable {
        definition: TableDef,
        capabilities: CapabilitySet,
        nrows: i64,
        fail_after: Option<usize>,
        produced: Arc<AtomicUsize>,
        last_request: Mutex<Option<ScanRequest>>,
        gate: Option<Arc<tokio::sync::Mutex<()>>>,
        active: Arc<AtomicUsize>,
        overlapped: Arc<AtomicBool>,
    }

    impl ScriptedTable {
        fn new(nrows: i64, capabilities: CapabilitySet) -> Self {
            Self {
                definition: nums_def(),
                capabilities,
                nrows,
                fail_after: None,
                produced: Arc::new(AtomicUsize::new(0)),
                last_request: Mutex::new(None),
                gate: None,
                active: Arc::new(AtomicUsize::new(0)),
                overlapped: Arc::new(AtomicBool::new(false)),
            }
        }

        fn failing_after(mut self, rows: usize) -> Self {
            self.fail_after = Some(rows);
            self
        }

        fn single_cursor(mut self) -> Self {
            self.gate = Some(Arc::new(tokio::sync::Mutex::new(())));
            self
        }
    }

    /// Decrements the active-scan counter when the row stream drops.
    struct ScanLease {
        active: Arc<AtomicUsize>,
    }

    impl Drop for ScanLease {
        fn drop(&mut self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SourceTable for ScriptedTable {
        fn definition(&self) -> TableDef {
            self.definition.clone()
        }

        fn capabilities(&self) -> CapabilitySet {
            self.capabilities.clone()
        }

        fn estimate(&self, _filters: &[Filter], _columns: &[String]) -> Estimate {
            Estimate::default()
        }

        fn scan_gate(&self) -> Option<Arc<tokio::sync::Mutex<()>>> {
            self.gate.clone()
        }

        async fn scan(&self, request: ScanRequest) -> Result<RowStream, AccessError> {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            let lease = ScanLease {
                active: self.active.clone(),
            };

            let limit = request.limit;
            *self.last_request.lock().unwrap() = Some(request);

            let mut items: Vec<Result<Row, AccessError>> = match self.fail_after {
                Some(k) => (1..=k as i64)
                    .map(num_row)
                    .map(Ok)
                    .chain([Err(AccessError::ProviderRead("disk gone".into()))])
                    .collect(),
                None => (1..=self.nrows).map(num_row).map(Ok).collect(),
            };
            if let Some(limit) = limit {
                items.truncate(limit as usize);
            }

            let produced = self.produced.clone();
            Ok(Box::pin(futures::stream::iter(items).inspect(move |_| {
                let _ = &lease;
                produced.fetch_add(1, Ordering::SeqCst);
            })))
        }
    }

    async fn collect_rows(stream: BatchStream) -> Vec<Row> {
        let batches: Vec<RowBatch> = stream.try_collect().await.unwrap();
        batches.into_iter().flat_map(|b| b.rows).collect()
    }

    fn small_batches(max_rows: usize) -> ExecOptions {
        ExecOptions {
            batch: BatchLimits {
                max_rows,
                max_bytes: usize::MAX,
            },
            ..Default::default()
        }
    }

    // Scenario: 10 rows, limit 5, limit pushdown supported -> provider is
    // asked for 5 rows and exactly 5 come back.
    #[tokio::test]
    async fn limit_pushdown_reaches_the_provider() {
        let caps = CapabilitySet::none().with_limit_pushdown(true);
        let table = Arc::new(ScriptedTable::new(10, caps.clone()));
        let shape = QueryShape {
            limit: Some(5),
            ..Default::default()
        };
        let p = plan(&table.definition(), &caps, &shape);

        let rows = collect_rows(execute(table.clone(), p, ExecOptions::default())).await;
        assert_eq!(rows.len(), 5);
        let request = table.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.limit, Some(5));
        assert_eq!(table.produced.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn local_limit_stops_pulling_early() {
        // no limit capability: provider is not told to stop, the executor
        // stops pulling once the output limit is satisfied
        let table = Arc::new(ScriptedTable::new(100, CapabilitySet::none()));
        let shape = QueryShape {
            limit: Some(3),
            ..Default::default()
        };
        let p = plan(&table.definition(), &CapabilitySet::none(), &shape);

        let rows = collect_rows(execute(table.clone(), p, ExecOptions::default())).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(table.produced.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn limit_zero_never_contacts_the_provider() {
        let table = Arc::new(ScriptedTable::new(10, CapabilitySet::none()));
        let shape = QueryShape {
            limit: Some(0),
            ..Default::default()
        };
        let p = plan(&table.definition(), &CapabilitySet::none(), &shape);
        let rows = collect_rows(execute(table.clone(), p, ExecOptions::default())).await;
        assert!(rows.is_empty());
        assert!(table.last_request.lock().unwrap().is_none());
    }

    // Equivalence law: pushing the supported filters down and evaluating
    // the rest locally yields the same rows as evaluating everything
    // locally against the raw stream.
    #[tokio::test]
    async fn pushdown_split_is_equivalent_to_local_evaluation() {
        let rows: Vec<Row> = (1..=20).map(num_row).collect();
        let shape = QueryShape {
            filters: vec![
                Filter::new("n", CompareOp::Gt, Value::Int(4)),
                Filter::new("label", CompareOp::Like, Value::String("row1%".into())),
            ],
            ..Default::default()
        };

        let pushing_caps = CapabilitySet::none().with_filter_ops(ScalarType::Int, ORDERING_OPS);
        let split_table = Arc::new(
            MemoryTable::new(nums_def(), rows.clone()).with_capabilities(pushing_caps.clone()),
        );
        let split_plan = plan(&nums_def(), &pushing_caps, &shape);
        assert_eq!(split_plan.accepted_filters.len(), 1);
        assert_eq!(split_plan.residual_filters.len(), 1);

        let local_table = Arc::new(MemoryTable::new(nums_def(), rows));
        let local_plan = plan(&nums_def(), &CapabilitySet::none(), &shape);
        assert!(local_plan.accepted_filters.is_empty());

        let split = collect_rows(execute(split_table, split_plan, ExecOptions::default())).await;
        let local = collect_rows(execute(local_table, local_plan, ExecOptions::default())).await;
        assert_eq!(split, local);
        // rows 10..=19 pass both filters
        assert_eq!(split.len(), 10);
    }

    #[tokio::test]
    async fn residual_sort_orders_and_truncates() {
        let rows = vec![num_row(3), num_row(1), num_row(4), num_row(2)];
        let table = Arc::new(MemoryTable::new(nums_def(), rows));
        let shape = QueryShape {
            sort_keys: vec![SortKey::desc("n")],
            limit: Some(2),
            ..Default::default()
        };
        let p = plan(&nums_def(), &CapabilitySet::none(), &shape);
        assert!(!p.residual_sort.is_empty());
        assert!(p.accepted_limit.is_none());

        let out = collect_rows(execute(table, p, ExecOptions::default())).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("n"), Some(&Value::Int(4)));
        assert_eq!(out[1].get("n"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn sort_buffer_bound_fails_with_resource_exceeded() {
        let table = Arc::new(ScriptedTable::new(10, CapabilitySet::none()));
        let shape = QueryShape {
            sort_keys: vec![SortKey::asc("n")],
            ..Default::default()
        };
        let p = plan(&table.definition(), &CapabilitySet::none(), &shape);

        let opts = ExecOptions {
            sort_buffer_rows: 4,
            ..Default::default()
        };
        let mut stream = execute(table, p, opts);
        let err = loop {
            match stream.next().await {
                Some(Ok(_)) => continue,
                Some(Err(e)) => break e,
                None => panic!("expected ResourceExceeded"),
            }
        };
        assert!(matches!(err, AccessError::ResourceExceeded(_)));
    }

    #[tokio::test]
    async fn projection_narrows_scan_and_output() {
        let caps = CapabilitySet::none().with_projection_pushdown(true);
        let rows = vec![num_row(1), num_row(2)];
        let table = Arc::new(MemoryTable::new(nums_def(), rows).with_capabilities(caps.clone()));
        let shape = QueryShape {
            columns: vec!["label".into()],
            filters: vec![Filter::new("n", CompareOp::Gt, Value::Int(1))],
            ..Default::default()
        };
        let p = plan(&nums_def(), &caps, &shape);
        // residual filter keeps "n" in the scan set
        assert_eq!(
            p.scan_columns,
            Some(vec!["n".to_string(), "label".to_string()])
        );

        let out = collect_rows(execute(table, p, ExecOptions::default())).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].columns.len(), 1);
        assert_eq!(out[0].get("label"), Some(&Value::String("row2".into())));
    }

    // Mid-stream provider failure: batches already delivered stay valid
    // and the stream terminates with the read error, not a bare close.
    #[tokio::test]
    async fn mid_stream_failure_after_delivered_batches() {
        let table = Arc::new(ScriptedTable::new(0, CapabilitySet::none()).failing_after(4));
        let p = plan(
            &table.definition(),
            &CapabilitySet::none(),
            &QueryShape::default(),
        );

        let mut stream = execute(table, p, small_batches(2));
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len() + second.len(), 4);
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AccessError::ProviderRead(_)));
        assert!(stream.next().await.is_none());
    }

    // Dropping the batch stream stops provider pulls promptly: nothing is
    // produced beyond what the first batch needed.
    #[tokio::test]
    async fn cancellation_stops_provider_pulls() {
        let table = Arc::new(ScriptedTable::new(1000, CapabilitySet::none()));
        let p = plan(
            &table.definition(),
            &CapabilitySet::none(),
            &QueryShape::default(),
        );

        let mut stream = execute(table.clone(), p, small_batches(2));
        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        let produced_at_cancel = table.produced.load(Ordering::SeqCst);
        drop(stream);
        assert_eq!(table.produced.load(Ordering::SeqCst), produced_at_cancel);
        assert_eq!(produced_at_cancel, 2);
    }

    // Two concurrent scans of a single-cursor table serialize through the
    // scan gate instead of overlapping.
    #[tokio::test]
    async fn single_cursor_scans_serialize() {
        let table = Arc::new(ScriptedTable::new(50, CapabilitySet::none()).single_cursor());
        let p = plan(
            &table.definition(),
            &CapabilitySet::none(),
            &QueryShape::default(),
        );

        let a = tokio::spawn(collect_rows(execute(
            table.clone(),
            p.clone(),
            small_batches(5),
        )));
        let b = tokio::spawn(collect_rows(execute(
            table.clone(),
            p.clone(),
            small_batches(5),
        )));
        let (rows_a, rows_b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(rows_a.len(), 50);
        assert_eq!(rows_b.len(), 50);
        assert!(!table.overlapped.load(Ordering::SeqCst));
    }

    // A plan claiming acceptance the capabilities never declared is an
    // internal bug and fails before the provider is contacted.
    #[tokio::test]
    async fn forged_plan_is_rejected_before_scanning() {
        let table = Arc::new(ScriptedTable::new(10, CapabilitySet::none()));
        let forged = PushdownPlan {
            accepted_limit: Some(1),
            ..Default::default()
        };
        let mut stream = execute(table.clone(), forged, ExecOptions::default());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AccessError::UnsupportedQueryShape(_)));
        assert!(table.last_request.lock().unwrap().is_none());
    }
}
