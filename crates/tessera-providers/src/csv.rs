//! The `csv` provider: local CSV files exposed as tables.
//!
//! The `path` option names a file or a directory of `.csv` files; each file
//! becomes one table named after its stem. Column types are inferred from
//! the header plus the first data record. Parsing runs on a blocking task
//! feeding a bounded channel, so a dropped stream stops the reader after at
//! most one in-flight row.

use crate::{ProviderFactory, RowStream, ScanRequest, SourceTable, TableProvider};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{
    AccessError, CapabilitySet, ColumnDef, Row, ScalarType, TableDef, Value,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

const CHANNEL_ROWS: usize = 64;

struct CsvTable {
    name: String,
    path: PathBuf,
    definition: TableDef,
}

#[async_trait]
impl SourceTable for CsvTable {
    fn definition(&self) -> TableDef {
        self.definition.clone()
    }

    fn capabilities(&self) -> CapabilitySet {
        // we can skip columns and stop reading early; filtering and
        // ordering stay with the consumer
        CapabilitySet::none()
            .with_projection_pushdown(true)
            .with_limit_pushdown(true)
    }

    async fn scan(&self, request: ScanRequest) -> Result<RowStream, AccessError> {
        debug!(table = %self.name, path = %self.path.display(), "csv scan starting");
        let path = self.path.clone();
        let definition = self.definition.clone();
        let (tx, mut rx) = mpsc::channel::<Result<Row, AccessError>>(CHANNEL_ROWS);

        tokio::task::spawn_blocking(move || {
            let mut reader = match csv::Reader::from_path(&path) {
                Ok(reader) => reader,
                Err(e) => {
                    let _ = tx.blocking_send(Err(read_error(&path, e)));
                    return;
                }
            };

            let mut produced = 0u64;
            for record in reader.records() {
                let record = match record {
                    Ok(record) => record,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(read_error(&path, e)));
                        return;
                    }
                };

                let mut row = Row::new();
                for (idx, column) in definition.columns.iter().enumerate() {
                    let raw = record.get(idx).unwrap_or("");
                    match parse_value(raw, column.scalar_type) {
                        Ok(value) => row.push(column.name.clone(), value),
                        Err(_) => {
                            let _ = tx.blocking_send(Err(AccessError::ProviderRead(format!(
                                "{}: column '{}' expected {}, got '{}'",
                                path.display(),
                                column.name,
                                column.scalar_type,
                                raw
                            ))));
                            return;
                        }
                    }
                }

                if !request.filters.iter().all(|f| f.matches(&row)) {
                    continue;
                }
                let row = match &request.columns {
                    Some(columns) => row.project(columns),
                    None => row,
                };

                // send fails when the consumer dropped the stream
                if tx.blocking_send(Ok(row)).is_err() {
                    return;
                }
                produced += 1;
                if request.limit.is_some_and(|limit| produced >= limit) {
                    return;
                }
            }
        });

        Ok(Box::pin(stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }))
    }
}

fn read_error(path: &Path, e: csv::Error) -> AccessError {
    AccessError::ProviderRead(format!("{}: {}", path.display(), e))
}

/// `""` is null; otherwise the cell must parse as the inferred type.
fn parse_value(raw: &str, scalar_type: ScalarType) -> Result<Value, ()> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    match scalar_type {
        ScalarType::Int => raw.parse::<i64>().map(Value::Int).map_err(|_| ()),
        ScalarType::Double => raw.parse::<f64>().map(Value::Double).map_err(|_| ()),
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Int when every character parses as one, else double, else string.
fn infer_type(raw: &str) -> ScalarType {
    if raw.is_empty() {
        ScalarType::String
    } else if raw.parse::<i64>().is_ok() {
        ScalarType::Int
    } else if raw.parse::<f64>().is_ok() {
        ScalarType::Double
    } else {
        ScalarType::String
    }
}

fn infer_table(path: &Path) -> Result<CsvTable, AccessError> {
    let init_error =
        |e: csv::Error| AccessError::ProviderInit(format!("{}: {}", path.display(), e));

    let mut reader = csv::Reader::from_path(path).map_err(init_error)?;
    let headers = reader.headers().map_err(init_error)?.clone();
    let first = reader.records().next().transpose().map_err(init_error)?;

    let columns = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let scalar_type = first
                .as_ref()
                .and_then(|record| record.get(idx))
                .map(infer_type)
                .unwrap_or(ScalarType::String);
            ColumnDef::new(name, scalar_type, true)
        })
        .collect();

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "table".to_string());

    Ok(CsvTable {
        name: name.clone(),
        path: path.to_path_buf(),
        definition: TableDef::new(name, columns)
            .with_description(format!("CSV file {}", path.display())),
    })
}

/// A provider over one CSV file or a directory of them.
pub struct CsvProvider {
    tables: Vec<Arc<CsvTable>>,
}

#[async_trait]
impl TableProvider for CsvProvider {
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

/// Factory for the `csv` provider type. Requires a `path` option; every
/// other option is ignored.
pub struct CsvFactory;

#[async_trait]
impl ProviderFactory for CsvFactory {
    fn provider_type(&self) -> &'static str {
        "csv"
    }

    async fn create(
        &self,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn TableProvider>, AccessError> {
        let path = options
            .get("path")
            .ok_or_else(|| AccessError::ProviderInit("missing required option 'path'".into()))?;
        let root = PathBuf::from(path);
        let meta = std::fs::metadata(&root).map_err(|e| {
            AccessError::ProviderInit(format!("cannot open '{}': {}", root.display(), e))
        })?;

        let mut files: Vec<PathBuf> = if meta.is_dir() {
            let entries = std::fs::read_dir(&root).map_err(|e| {
                AccessError::ProviderInit(format!("cannot list '{}': {}", root.display(), e))
            })?;
            entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
                .collect()
        } else {
            vec![root]
        };
        files.sort();

        let tables = files
            .iter()
            .map(|file| infer_table(file).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        info!(tables = tables.len(), "csv provider ready");
        Ok(Arc::new(CsvProvider { tables }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt};
    use std::io::Write;
    use tempfile::TempDir;
    use tessera_core::{CompareOp, Filter};

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn options(path: &Path) -> BTreeMap<String, String> {
        BTreeMap::from([("path".to_string(), path.display().to_string())])
    }

    const PEOPLE: &str = "id,score,name\n1,9.5,ann\n2,7.25,bob\n3,,cara\n";

    async fn people_provider(dir: &TempDir) -> Arc<dyn TableProvider> {
        let path = write_file(dir, "people.csv", PEOPLE);
        CsvFactory.create(&options(&path)).await.unwrap()
    }

    #[tokio::test]
    async fn missing_path_option_is_an_init_error() {
        let err = CsvFactory.create(&BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, AccessError::ProviderInit(_)));
    }

    #[tokio::test]
    async fn nonexistent_path_is_an_init_error() {
        let opts = BTreeMap::from([("path".to_string(), "/nonexistent/x.csv".to_string())]);
        let err = CsvFactory.create(&opts).await.unwrap_err();
        assert!(matches!(err, AccessError::ProviderInit(_)));
    }

    #[tokio::test]
    async fn infers_schema_from_first_record() {
        let dir = TempDir::new().unwrap();
        let provider = people_provider(&dir).await;
        let def = provider.table("people").unwrap().definition();
        assert_eq!(def.columns[0].scalar_type, ScalarType::Int);
        assert_eq!(def.columns[1].scalar_type, ScalarType::Double);
        assert_eq!(def.columns[2].scalar_type, ScalarType::String);
        assert!(def.columns.iter().all(|c| c.nullable));
    }

    #[tokio::test]
    async fn scans_typed_rows_with_null_for_empty_cells() {
        let dir = TempDir::new().unwrap();
        let provider = people_provider(&dir).await;
        let table = provider.table("people").unwrap();
        let rows: Vec<Row> = table
            .scan(ScanRequest::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[1].get("score"), Some(&Value::Double(7.25)));
        assert_eq!(rows[2].get("score"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn projection_and_limit_are_honored() {
        let dir = TempDir::new().unwrap();
        let provider = people_provider(&dir).await;
        let table = provider.table("people").unwrap();
        let rows: Vec<Row> = table
            .scan(ScanRequest {
                columns: Some(vec!["name".into()]),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].columns.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::String("ann".into())));
    }

    #[tokio::test]
    async fn accepted_filters_apply_during_the_read() {
        let dir = TempDir::new().unwrap();
        let provider = people_provider(&dir).await;
        let table = provider.table("people").unwrap();
        let rows: Vec<Row> = table
            .scan(ScanRequest {
                filters: vec![Filter::new("id", CompareOp::Gt, Value::Int(1))],
                ..Default::default()
            })
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn mistyped_cell_fails_the_stream() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.csv", "id,name\n1,ann\nnope,bob\n");
        let provider = CsvFactory.create(&options(&path)).await.unwrap();
        let table = provider.table("bad").unwrap();

        let mut stream = table.scan(ScanRequest::default()).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AccessError::ProviderRead(_)));
    }

    #[tokio::test]
    async fn directory_exposes_one_table_per_file() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "b.csv", "x\n1\n");
        write_file(&dir, "a.csv", "y\n2\n");
        write_file(&dir, "notes.txt", "not a table\n");
        let provider = CsvFactory.create(&options(dir.path())).await.unwrap();
        let names: Vec<String> = provider
            .tables()
            .iter()
            .map(|t| t.definition().name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn header_only_file_has_string_columns_and_no_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.csv", "id,name\n");
        let provider = CsvFactory.create(&options(&path)).await.unwrap();
        let table = provider.table("empty").unwrap();
        assert_eq!(table.definition().columns[0].scalar_type, ScalarType::String);
        let rows: Vec<Row> = table
            .scan(ScanRequest::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
