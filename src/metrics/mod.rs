//! Prometheus metrics for the health monitor and read router
//!
//! Exposes metrics via HTTP endpoint for Prometheus scraping.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Metrics collection shared by both components
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    // Read router metrics
    /// Routing decisions by source (cache, store, store_failed, circuit_open)
    pub decisions_total: IntCounterVec,
    /// Roles handed out to readers
    pub selected_total: IntCounterVec,
    /// Store round trip latency (in seconds)
    pub store_fetch_seconds: Histogram,
    /// Times the circuit breaker opened
    pub circuit_opened_total: IntCounter,

    // Health monitor metrics
    /// Probe verdicts by role and health
    pub probes_total: IntCounterVec,
    /// Publication outcomes by role (written, unchanged, failed)
    pub publish_total: IntCounterVec,
    /// Last observed replication lag per role (milliseconds)
    pub lag_ms: IntGaugeVec,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let decisions_total = IntCounterVec::new(
            Opts::new(
                "replica_router_decisions_total",
                "Total number of read routing decisions by source",
            ),
            &["source"],
        )
        .unwrap();

        let selected_total = IntCounterVec::new(
            Opts::new(
                "replica_router_selected_total",
                "Total number of reads routed to each role",
            ),
            &["role"],
        )
        .unwrap();

        let store_fetch_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "replica_router_store_fetch_seconds",
                "Status store round trip latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
            ]),
        )
        .unwrap();

        let circuit_opened_total = IntCounter::new(
            "replica_router_circuit_opened_total",
            "Total number of times the status store circuit breaker opened",
        )
        .unwrap();

        let probes_total = IntCounterVec::new(
            Opts::new(
                "health_monitor_probes_total",
                "Total number of node probes by verdict",
            ),
            &["role", "healthy"],
        )
        .unwrap();

        let publish_total = IntCounterVec::new(
            Opts::new(
                "health_monitor_publish_total",
                "Total number of health record publications by outcome",
            ),
            &["role", "outcome"],
        )
        .unwrap();

        let lag_ms = IntGaugeVec::new(
            Opts::new(
                "health_monitor_lag_ms",
                "Last observed replication lag in milliseconds",
            ),
            &["role"],
        )
        .unwrap();

        registry
            .register(Box::new(decisions_total.clone()))
            .unwrap();
        registry
            .register(Box::new(selected_total.clone()))
            .unwrap();
        registry
            .register(Box::new(store_fetch_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(circuit_opened_total.clone()))
            .unwrap();
        registry.register(Box::new(probes_total.clone())).unwrap();
        registry.register(Box::new(publish_total.clone())).unwrap();
        registry.register(Box::new(lag_ms.clone())).unwrap();

        Self {
            registry,
            decisions_total,
            selected_total,
            store_fetch_seconds,
            circuit_opened_total,
            probes_total,
            publish_total,
            lag_ms,
        }
    }

    /// Record a routing decision
    pub fn record_decision(&self, source: &str, role: &str, store_latency: Option<Duration>) {
        self.decisions_total.with_label_values(&[source]).inc();
        self.selected_total.with_label_values(&[role]).inc();
        if let Some(latency) = store_latency {
            self.store_fetch_seconds.observe(latency.as_secs_f64());
        }
    }

    pub fn record_circuit_opened(&self) {
        self.circuit_opened_total.inc();
    }

    /// Record a probe verdict
    pub fn record_probe(&self, role: &str, healthy: bool, lag_ms: Option<u64>) {
        let healthy_label = if healthy { "true" } else { "false" };
        self.probes_total
            .with_label_values(&[role, healthy_label])
            .inc();
        if let Some(lag) = lag_ms {
            self.lag_ms
                .with_label_values(&[role])
                .set(i64::try_from(lag).unwrap_or(i64::MAX));
        }
    }

    /// Record a publication outcome
    pub fn record_publish(&self, role: &str, outcome: &str) {
        self.publish_total.with_label_values(&[role, outcome]).inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(addr: &str) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tracing::{error, info};

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (status, content_type, body) = match req.uri().path() {
            "/metrics" => (
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                metrics().gather(),
            ),
            "/health" => (StatusCode::OK, "text/plain", "OK".to_string()),
            _ => (StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
        };

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static(content_type),
        );
        Ok(response)
    }

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!(error = %e, "Metrics server connection error");
            }
        });
    }
}
