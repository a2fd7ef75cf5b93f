//! Prometheus metrics for server observability.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RpcLabel(pub &'static str);

impl prometheus_client::encoding::EncodeLabelSet for RpcLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("rpc", self.0).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ServerMetrics {
    pub requests: Family<RpcLabel, Counter>,
    pub rows_streamed: Counter,
    pub batches_streamed: Counter,
    pub streams_failed: Counter,
    pub streams_cancelled: Counter,
    pub active_providers: Gauge,
    pub registry: Arc<Registry>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests = Family::<RpcLabel, Counter>::default();
        registry.register(
            "tessera_requests_total",
            "Total RPC requests by method",
            requests.clone(),
        );

        let rows_streamed = Counter::default();
        registry.register(
            "tessera_rows_streamed_total",
            "Total rows streamed to clients",
            rows_streamed.clone(),
        );

        let batches_streamed = Counter::default();
        registry.register(
            "tessera_batches_streamed_total",
            "Total row batches streamed to clients",
            batches_streamed.clone(),
        );

        let streams_failed = Counter::default();
        registry.register(
            "tessera_streams_failed_total",
            "Streams terminated by a provider or resource error",
            streams_failed.clone(),
        );

        let streams_cancelled = Counter::default();
        registry.register(
            "tessera_streams_cancelled_total",
            "Streams dropped by the consumer before completion",
            streams_cancelled.clone(),
        );

        let active_providers = Gauge::default();
        registry.register(
            "tessera_active_providers",
            "Live provider instances in the registry",
            active_providers.clone(),
        );

        Self {
            requests,
            rows_streamed,
            batches_streamed,
            streams_failed,
            streams_cancelled,
            active_providers,
            registry: Arc::new(registry),
        }
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).unwrap();
        buf
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
