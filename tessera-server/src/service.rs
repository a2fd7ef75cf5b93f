//! The gRPC façade: registration, catalog, and streaming reads.
//!
//! One service struct backs all three wire services. Each RPC has an
//! `*_inner` handler returning the crate error type; the thin tonic trait
//! impls convert failures to a `Status` so the wire sees one uniform
//! taxonomy no matter which component failed.

use crate::error::{Result, ServerError};
use crate::metrics::{RpcLabel, ServerMetrics};
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tessera_core::{plan, QueryShape};
use tessera_providers::{
    catalog, execute, BatchStream, ExecOptions, ProviderDescriptor, ProviderRegistry, SourceTable,
    TableProvider,
};
use tessera_proto::v1::{
    self, health_service_server::HealthService, registration_service_server::RegistrationService,
    tables_service_server::TablesService,
};
use tessera_proto::FromOptionalField;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared server state: the provider registry plus the session map binding
/// wire provider ids to descriptors.
#[derive(Clone)]
pub struct DataService {
    registry: Arc<ProviderRegistry>,
    sessions: Arc<DashMap<String, ProviderDescriptor>>,
    exec_options: ExecOptions,
    metrics: ServerMetrics,
}

impl DataService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        exec_options: ExecOptions,
        metrics: ServerMetrics,
    ) -> Self {
        Self {
            registry,
            sessions: Arc::new(DashMap::new()),
            exec_options,
            metrics,
        }
    }

    fn count(&self, rpc: &'static str) {
        self.metrics.requests.get_or_create(&RpcLabel(rpc)).inc();
    }

    async fn provider(&self, provider_id: &str) -> Result<Arc<dyn TableProvider>> {
        let descriptor = self
            .sessions
            .get(provider_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServerError::UnknownProvider(provider_id.to_string()))?;
        Ok(self.registry.acquire(&descriptor).await?)
    }

    async fn table(&self, provider_id: &str, name: &str) -> Result<Arc<dyn SourceTable>> {
        let provider = self.provider(provider_id).await?;
        Ok(catalog::lookup(provider.as_ref(), name)?)
    }

    // --- registration ---

    async fn register_inner(&self, request: v1::RegisterRequest) -> Result<v1::RegisterResponse> {
        use v1::register_response::Result as RegisterResult;

        let definition = request.definition.required("definition")?;
        let descriptor = ProviderDescriptor::new(definition.provider_type, definition.options);

        let provider_id = match request.provider_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                debug!(provider_id = %id, "register request re-using caller id");
                id
            }
            None => Uuid::new_v4().to_string(),
        };

        // already live: return the existing id unchanged
        if self.sessions.contains_key(&provider_id) {
            info!(provider_id = %provider_id, "provider already registered");
            return Ok(v1::RegisterResponse {
                result: Some(RegisterResult::ProviderId(provider_id)),
            });
        }

        match self.registry.acquire(&descriptor).await {
            Ok(_) => {
                self.sessions.insert(provider_id.clone(), descriptor);
                self.metrics
                    .active_providers
                    .set(self.registry.live_count() as i64);
                info!(provider_id = %provider_id, "provider registered");
                Ok(v1::RegisterResponse {
                    result: Some(RegisterResult::ProviderId(provider_id)),
                })
            }
            // registration failures are data, not transport errors, so the
            // FDW can surface them as-is
            Err(e) => {
                warn!(error = %e, "provider registration failed");
                Ok(v1::RegisterResponse {
                    result: Some(RegisterResult::Error(e.to_string())),
                })
            }
        }
    }

    async fn unregister_inner(
        &self,
        request: v1::UnregisterRequest,
    ) -> Result<v1::UnregisterResponse> {
        let (_, descriptor) = self
            .sessions
            .remove(&request.provider_id)
            .ok_or_else(|| ServerError::UnknownProvider(request.provider_id.clone()))?;

        // keep the instance while other sessions still reference it
        let still_referenced = self.sessions.iter().any(|e| *e.value() == descriptor);
        if !still_referenced {
            self.registry.release(&descriptor).await;
        }
        self.metrics
            .active_providers
            .set(self.registry.live_count() as i64);
        info!(provider_id = %request.provider_id, "provider unregistered");
        Ok(v1::UnregisterResponse {})
    }

    // --- catalog ---

    async fn list_tables_inner(
        &self,
        request: v1::ListTablesRequest,
    ) -> Result<v1::ListTablesResponse> {
        let provider = self.provider(&request.provider_id).await?;
        Ok(v1::ListTablesResponse {
            definitions: catalog::list_tables(provider.as_ref())
                .into_iter()
                .map(Into::into)
                .collect(),
        })
    }

    async fn describe_table_inner(
        &self,
        request: v1::DescribeTableRequest,
    ) -> Result<v1::DescribeTableResponse> {
        let provider = self.provider(&request.provider_id).await?;
        let (definition, capabilities) = catalog::describe_table(provider.as_ref(), &request.table)?;
        Ok(v1::DescribeTableResponse {
            definition: Some(definition.into()),
            capabilities: Some(capabilities.into()),
        })
    }

    async fn estimate_inner(
        &self,
        request: v1::TableEstimateRequest,
    ) -> Result<v1::TableEstimateResponse> {
        let provider = self.provider(&request.provider_id).await?;
        let shape: QueryShape = request
            .query
            .map(TryInto::try_into)
            .transpose()?
            .unwrap_or_default();
        let estimate =
            catalog::estimate(provider.as_ref(), &request.table, &shape.filters, &shape.columns)?;
        Ok(v1::TableEstimateResponse {
            rows: estimate.rows,
            bytes: estimate.bytes,
        })
    }

    async fn explain_inner(
        &self,
        request: v1::ExplainTableRequest,
    ) -> Result<v1::ExplainTableResponse> {
        let table = self.table(&request.provider_id, &request.table).await?;
        let shape: QueryShape = request.query.required("query")?.try_into()?;
        let definition = table.definition();
        shape.validate(&definition)?;
        let pushdown = plan(&definition, &table.capabilities(), &shape);
        Ok(v1::ExplainTableResponse {
            lines: pushdown.explain(&definition.name),
        })
    }

    // --- reads ---

    async fn execute_inner(&self, request: v1::ExecuteTableRequest) -> Result<RowsResponseStream> {
        let table = self.table(&request.provider_id, &request.table).await?;
        let shape: QueryShape = request.query.required("query")?.try_into()?;
        let definition = table.definition();
        shape.validate(&definition)?;

        let pushdown = plan(&definition, &table.capabilities(), &shape);
        debug!(
            table = %definition.name,
            pushed_filters = pushdown.accepted_filters.len(),
            residual_filters = pushdown.residual_filters.len(),
            "starting streaming read"
        );

        Ok(RowsResponseStream {
            batches: execute(table, pushdown, self.exec_options),
            metrics: self.metrics.clone(),
            done: false,
        })
    }

    // --- writes ---

    async fn insert_inner(&self, request: v1::InsertTableRequest) -> Result<v1::InsertTableResponse> {
        let table = self.table(&request.provider_id, &request.table).await?;
        let row: tessera_core::Row = request.row.required("row")?.try_into()?;
        match table.insert(row).await? {
            Some(inserted) => Ok(v1::InsertTableResponse {
                row: Some(inserted.into()),
            }),
            None => Err(ServerError::Unsupported("insert")),
        }
    }

    async fn update_inner(&self, request: v1::UpdateTableRequest) -> Result<v1::UpdateTableResponse> {
        let table = self.table(&request.provider_id, &request.table).await?;
        let key: tessera_core::Value = request.key.required("key")?.try_into()?;
        let row: tessera_core::Row = request.row.required("row")?.try_into()?;
        match table.update(key, row).await? {
            Some(updated) => Ok(v1::UpdateTableResponse {
                row: Some(updated.into()),
            }),
            None => Err(ServerError::Unsupported("update")),
        }
    }

    async fn delete_inner(&self, request: v1::DeleteTableRequest) -> Result<v1::DeleteTableResponse> {
        let table = self.table(&request.provider_id, &request.table).await?;
        let key: tessera_core::Value = request.key.required("key")?.try_into()?;
        match table.delete(key).await? {
            Some(()) => Ok(v1::DeleteTableResponse {}),
            None => Err(ServerError::Unsupported("delete")),
        }
    }
}

/// Adapts the executor's batch stream to wire messages, with streaming
/// metrics and cancellation accounting on drop.
pub struct RowsResponseStream {
    batches: BatchStream,
    metrics: ServerMetrics,
    done: bool,
}

impl Stream for RowsResponseStream {
    type Item = std::result::Result<v1::Rows, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.batches.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(batch))) => {
                self.metrics.batches_streamed.inc();
                self.metrics.rows_streamed.inc_by(batch.len() as u64);
                Poll::Ready(Some(Ok(batch.into())))
            }
            Poll::Ready(Some(Err(e))) => {
                self.done = true;
                self.metrics.streams_failed.inc();
                warn!(kind = e.kind(), error = %e, "streaming read failed");
                Poll::Ready(Some(Err(ServerError::from(e).into())))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RowsResponseStream {
    fn drop(&mut self) {
        if !self.done {
            self.metrics.streams_cancelled.inc();
            debug!("streaming read dropped before completion");
        }
    }
}

// --- tonic service impls ---

#[tonic::async_trait]
impl HealthService for DataService {
    async fn check(
        &self,
        _request: Request<v1::HealthCheckRequest>,
    ) -> std::result::Result<Response<v1::HealthCheckResponse>, Status> {
        self.count("check");
        Ok(Response::new(v1::HealthCheckResponse {
            status: v1::health_check_response::ServingStatus::Serving as i32,
            description: "data access server is healthy".to_string(),
        }))
    }
}

#[tonic::async_trait]
impl RegistrationService for DataService {
    async fn register(
        &self,
        request: Request<v1::RegisterRequest>,
    ) -> std::result::Result<Response<v1::RegisterResponse>, Status> {
        self.count("register");
        let response = self.register_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn unregister(
        &self,
        request: Request<v1::UnregisterRequest>,
    ) -> std::result::Result<Response<v1::UnregisterResponse>, Status> {
        self.count("unregister");
        let response = self.unregister_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }
}

#[tonic::async_trait]
impl TablesService for DataService {
    type ExecuteTableStream = Pin<Box<dyn Stream<Item = std::result::Result<v1::Rows, Status>> + Send>>;

    async fn list_tables(
        &self,
        request: Request<v1::ListTablesRequest>,
    ) -> std::result::Result<Response<v1::ListTablesResponse>, Status> {
        self.count("list_tables");
        let response = self.list_tables_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn describe_table(
        &self,
        request: Request<v1::DescribeTableRequest>,
    ) -> std::result::Result<Response<v1::DescribeTableResponse>, Status> {
        self.count("describe_table");
        let response = self.describe_table_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn get_table_estimate(
        &self,
        request: Request<v1::TableEstimateRequest>,
    ) -> std::result::Result<Response<v1::TableEstimateResponse>, Status> {
        self.count("get_table_estimate");
        let response = self.estimate_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn explain_table(
        &self,
        request: Request<v1::ExplainTableRequest>,
    ) -> std::result::Result<Response<v1::ExplainTableResponse>, Status> {
        self.count("explain_table");
        let response = self.explain_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn execute_table(
        &self,
        request: Request<v1::ExecuteTableRequest>,
    ) -> std::result::Result<Response<Self::ExecuteTableStream>, Status> {
        self.count("execute_table");
        let stream = self.execute_inner(request.into_inner()).await?;
        Ok(Response::new(Box::pin(stream)))
    }

    async fn insert_table(
        &self,
        request: Request<v1::InsertTableRequest>,
    ) -> std::result::Result<Response<v1::InsertTableResponse>, Status> {
        self.count("insert_table");
        let response = self.insert_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn update_table(
        &self,
        request: Request<v1::UpdateTableRequest>,
    ) -> std::result::Result<Response<v1::UpdateTableResponse>, Status> {
        self.count("update_table");
        let response = self.update_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn delete_table(
        &self,
        request: Request<v1::DeleteTableRequest>,
    ) -> std::result::Result<Response<v1::DeleteTableResponse>, Status> {
        self.count("delete_table");
        let response = self.delete_inner(request.into_inner()).await?;
        Ok(Response::new(response))
    }
}
