//! tesserad - the Tessera data access daemon.
//!
//! Serves the gRPC protocol on one port and health/metrics over HTTP on
//! another. Providers are constructed on registration from the built-in
//! factory set (`mock`, `csv`).

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tessera_core::BatchLimits;
use tessera_providers::{default_registry, ExecOptions};
use tessera_proto::v1::health_service_server::HealthServiceServer;
use tessera_proto::v1::registration_service_server::RegistrationServiceServer;
use tessera_proto::v1::tables_service_server::TablesServiceServer;
use tessera_server::health::{health_router, HealthState};
use tessera_server::{DataService, ServerMetrics};
use tonic::transport::Server;
use tracing::info;

#[derive(Parser)]
#[command(name = "tesserad", about = "Tessera data access daemon")]
struct Cli {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "BIND_HOST")]
    bind_host: String,

    /// gRPC port for the data access protocol
    #[arg(long, default_value = "50051", env = "GRPC_PORT")]
    grpc_port: u16,

    /// HTTP port for health and metrics endpoints
    #[arg(long, default_value = "9090", env = "METRICS_PORT")]
    metrics_port: u16,

    /// Maximum rows per streamed batch
    #[arg(long, default_value = "1024", env = "MAX_BATCH_ROWS")]
    max_batch_rows: usize,

    /// Maximum approximate bytes per streamed batch
    #[arg(long, default_value = "1048576", env = "MAX_BATCH_BYTES")]
    max_batch_bytes: usize,

    /// Row bound for the local sort fallback buffer
    #[arg(long, default_value = "1000000", env = "SORT_BUFFER_ROWS")]
    sort_buffer_rows: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let registry = Arc::new(default_registry());
    let metrics = ServerMetrics::new();

    // Health/readiness state plus metrics HTTP server
    let ready = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let health_state = Arc::new(HealthState {
        metrics: metrics.clone(),
        ready,
    });
    let metrics_port = cli.metrics_port;
    let router = health_router(health_state);
    tokio::spawn(async move {
        let addr = format!("0.0.0.0:{}", metrics_port);
        info!("Metrics server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
        axum::serve(listener, router).await.unwrap();
    });

    let exec_options = ExecOptions {
        batch: BatchLimits {
            max_rows: cli.max_batch_rows,
            max_bytes: cli.max_batch_bytes,
        },
        sort_buffer_rows: cli.sort_buffer_rows,
    };
    let service = DataService::new(registry.clone(), exec_options, metrics);

    let addr: SocketAddr = format!("{}:{}", cli.bind_host, cli.grpc_port).parse()?;
    info!("gRPC server listening on {}", addr);
    info!("Services: HealthService, RegistrationService, TablesService");

    Server::builder()
        .add_service(HealthServiceServer::new(service.clone()))
        .add_service(RegistrationServiceServer::new(service.clone()))
        .add_service(TablesServiceServer::new(service))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down gRPC server");
        })
        .await?;

    // tear down any providers still live
    registry.release_all().await;

    Ok(())
}
