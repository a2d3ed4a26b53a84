use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::bind_addr;

const NAMESPACE: &str = "shipdock";

/// Prometheus metrics for the collector and the dashboard.
///
/// All metrics use the "shipdock" namespace. Each process only moves the
/// metrics of its own role.
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    // === Collector ===
    /// Readings accepted by the table store (201 Created).
    pub readings_posted: Counter,
    /// Readings the table store refused or that failed in transit.
    pub readings_rejected: Counter,
    /// Iterations that produced no reading (silent buffer, sensor error).
    pub readings_skipped: Counter,
    /// WiFi connection attempts, successful or not.
    pub connect_attempts: Counter,
    /// Insert request duration.
    pub post_duration: Histogram,
    /// Noise level of the last reading in dB.
    pub last_noise_level_db: Gauge,
    /// Temperature of the last reading in °F.
    pub last_temperature_f: Gauge,

    // === Dashboard ===
    /// Data package loads that succeeded.
    pub package_loads: Counter,
    /// Data package loads that failed.
    pub package_load_errors: Counter,
    /// Time to fetch both tables and build the package.
    pub package_load_duration: Histogram,
    /// Charts rendered by view.
    pub chart_renders: CounterVec,
    /// Table store requests by table and status.
    pub store_requests: CounterVec,
    /// Table store request duration by table.
    pub store_request_duration: HistogramVec,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        // === Collector ===
        let readings_posted = Counter::with_opts(
            Opts::new(
                "readings_posted_total",
                "Total readings accepted by the table store.",
            )
            .namespace(NAMESPACE),
        )?;
        let readings_rejected = Counter::with_opts(
            Opts::new(
                "readings_rejected_total",
                "Total readings rejected by the table store or lost in transit.",
            )
            .namespace(NAMESPACE),
        )?;
        let readings_skipped = Counter::with_opts(
            Opts::new(
                "readings_skipped_total",
                "Total collector iterations that produced no reading.",
            )
            .namespace(NAMESPACE),
        )?;
        let connect_attempts = Counter::with_opts(
            Opts::new("connect_attempts_total", "Total WiFi connection attempts.")
                .namespace(NAMESPACE),
        )?;
        let post_duration = Histogram::with_opts(
            HistogramOpts::new("post_duration_seconds", "Insert request duration.")
                .namespace(NAMESPACE)
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        let last_noise_level_db = Gauge::with_opts(
            Opts::new("last_noise_level_db", "Noise level of the last reading in dB.")
                .namespace(NAMESPACE),
        )?;
        let last_temperature_f = Gauge::with_opts(
            Opts::new(
                "last_temperature_f",
                "Temperature of the last reading in degrees Fahrenheit.",
            )
            .namespace(NAMESPACE),
        )?;

        // === Dashboard ===
        let package_loads = Counter::with_opts(
            Opts::new("package_loads_total", "Total successful data package loads.")
                .namespace(NAMESPACE),
        )?;
        let package_load_errors = Counter::with_opts(
            Opts::new(
                "package_load_errors_total",
                "Total failed data package loads.",
            )
            .namespace(NAMESPACE),
        )?;
        let package_load_duration = Histogram::with_opts(
            HistogramOpts::new(
                "package_load_duration_seconds",
                "Time to fetch both tables and build the data package.",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        let chart_renders = CounterVec::new(
            Opts::new("chart_renders_total", "Total charts rendered by view.")
                .namespace(NAMESPACE),
            &["view"],
        )?;
        let store_requests = CounterVec::new(
            Opts::new(
                "store_requests_total",
                "Total table store requests by table and status.",
            )
            .namespace(NAMESPACE),
            &["table", "status"],
        )?;
        let store_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "store_request_duration_seconds",
                "Table store request duration by table.",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["table"],
        )?;

        registry.register(Box::new(readings_posted.clone()))?;
        registry.register(Box::new(readings_rejected.clone()))?;
        registry.register(Box::new(readings_skipped.clone()))?;
        registry.register(Box::new(connect_attempts.clone()))?;
        registry.register(Box::new(post_duration.clone()))?;
        registry.register(Box::new(last_noise_level_db.clone()))?;
        registry.register(Box::new(last_temperature_f.clone()))?;

        registry.register(Box::new(package_loads.clone()))?;
        registry.register(Box::new(package_load_errors.clone()))?;
        registry.register(Box::new(package_load_duration.clone()))?;
        registry.register(Box::new(chart_renders.clone()))?;
        registry.register(Box::new(store_requests.clone()))?;
        registry.register(Box::new(store_request_duration.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            readings_posted,
            readings_rejected,
            readings_skipped,
            connect_attempts,
            post_duration,
            last_noise_level_db,
            last_temperature_f,
            package_loads,
            package_load_errors,
            package_load_duration,
            chart_renders,
            store_requests,
            store_request_duration,
        })
    }

    /// Records one table store request.
    pub fn observe_store_request(&self, table: &str, status: &str, duration: std::time::Duration) {
        self.store_requests
            .with_label_values(&[table, status])
            .inc();
        self.store_request_duration
            .with_label_values(&[table])
            .observe(duration.as_secs_f64());
    }

    /// Records one data package load.
    pub fn observe_package_load(&self, status: &str, duration: std::time::Duration) {
        if status == "success" {
            self.package_loads.inc();
        } else {
            self.package_load_errors.inc();
        }
        self.package_load_duration.observe(duration.as_secs_f64());
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        encode_registry(&self.registry)
    }

    /// Starts the HTTP server for /metrics and /healthz.
    pub async fn start(&self) -> Result<()> {
        let bind_addr = bind_addr(&self.addr, ":9090");

        let app_state = Arc::new(AppState {
            registry: self.registry.clone(),
        });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "health metrics server started");

            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "health metrics server error");
            }
        });

        Ok(())
    }

    /// Gracefully shuts down the health metrics server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

fn encode_registry(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("encoding metrics")?;
    String::from_utf8(buffer).context("converting metrics to string")
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match encode_registry(&state.registry) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "encoding metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}
