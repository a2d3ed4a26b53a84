//! Dashboard web app: one page with a chart selector, plus a JSON view API.

pub mod render;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::analysis::cache::SessionCache;
use crate::analysis::{DataPackage, MitigationPeriod, ViewName};
use crate::config::bind_addr;
use crate::export::health::HealthMetrics;
use crate::store::TableStore;

const PAGE_TITLE: &str = "Warehouse Defect Analysis";

/// The charts offered by the selector, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartKind {
    #[default]
    TemperatureDefectRate,
    NoiseDefectRate,
    TotalDefectRate,
    PreMitigationHeatmap,
    PostMitigationHeatmap,
}

impl ChartKind {
    pub const ALL: [Self; 5] = [
        Self::TemperatureDefectRate,
        Self::NoiseDefectRate,
        Self::TotalDefectRate,
        Self::PreMitigationHeatmap,
        Self::PostMitigationHeatmap,
    ];

    /// Query-string value.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::TemperatureDefectRate => "temperature",
            Self::NoiseDefectRate => "noise",
            Self::TotalDefectRate => "total",
            Self::PreMitigationHeatmap => "heatmap-pre",
            Self::PostMitigationHeatmap => "heatmap-post",
        }
    }

    /// Selector option text.
    pub const fn option_label(self) -> &'static str {
        match self {
            Self::TemperatureDefectRate => "Temperature Defect Rate",
            Self::NoiseDefectRate => "Noise Defect Rate",
            Self::TotalDefectRate => "Total Defect Rate",
            Self::PreMitigationHeatmap => "Pre-Mitigation Heatmap",
            Self::PostMitigationHeatmap => "Post-Mitigation Heatmap",
        }
    }

    /// Chart title.
    pub const fn title(self) -> &'static str {
        match self {
            Self::TemperatureDefectRate => "Temperature Defect Rate",
            Self::NoiseDefectRate => "Noise Level Defect Rate",
            Self::TotalDefectRate => "Total Defect Rate",
            Self::PreMitigationHeatmap => "Defect Rate Heatmap (Pre-Mitigation)",
            Self::PostMitigationHeatmap => "Defect Rate Heatmap (Post-Mitigation)",
        }
    }

    /// The view this chart draws.
    pub const fn view(self) -> ViewName {
        match self {
            Self::TemperatureDefectRate => ViewName::GroupedTemp,
            Self::NoiseDefectRate => ViewName::GroupedNoise,
            Self::TotalDefectRate => ViewName::GroupedAllDefects,
            Self::PreMitigationHeatmap => ViewName::PivotPre,
            Self::PostMitigationHeatmap => ViewName::PivotPost,
        }
    }

    /// Renders the chart as SVG.
    pub fn render(self, package: &DataPackage) -> String {
        match self {
            Self::TemperatureDefectRate => {
                render::range_bar_chart(self.title(), &package.grouped_temp).to_svg()
            }
            Self::NoiseDefectRate => {
                render::range_bar_chart(self.title(), &package.grouped_noise).to_svg()
            }
            Self::TotalDefectRate => {
                render::total_bar_chart(self.title(), &package.grouped_all_defects).to_svg()
            }
            Self::PreMitigationHeatmap => {
                render::heatmap(self.title(), package.pivot(MitigationPeriod::Pre)).to_svg()
            }
            Self::PostMitigationHeatmap => {
                render::heatmap(self.title(), package.pivot(MitigationPeriod::Post)).to_svg()
            }
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option_label())
    }
}

/// Error for an unknown chart slug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown chart {0:?}")]
pub struct UnknownChart(pub String);

impl FromStr for ChartKind {
    type Err = UnknownChart;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.slug() == s)
            .ok_or_else(|| UnknownChart(s.to_string()))
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage {
    page_title: &'static str,
    options: Vec<ChartOption>,
    chart_svg: String,
    error: Option<String>,
}

struct ChartOption {
    slug: &'static str,
    label: &'static str,
    selected: bool,
}

/// Shared state for axum handlers.
struct AppState<S> {
    cache: SessionCache<S>,
    health: Arc<HealthMetrics>,
}

/// Dashboard HTTP server.
///
/// All requests share one [`SessionCache`], so the data is fetched on the
/// first request and reused until the process exits.
pub struct Dashboard<S> {
    addr: String,
    state: Arc<AppState<S>>,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,
}

impl<S: TableStore + 'static> Dashboard<S> {
    pub fn new(addr: &str, cache: SessionCache<S>, health: Arc<HealthMetrics>) -> Self {
        Self {
            addr: addr.to_string(),
            state: Arc::new(AppState { cache, health }),
            shutdown: parking_lot::Mutex::new(None),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index_handler::<S>))
            .route("/api/views/:name", get(view_handler::<S>))
            .route("/healthz", get(healthz_handler))
            .with_state(Arc::clone(&self.state))
    }

    /// Starts serving; returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let bind_addr = bind_addr(&self.addr, ":8501");
        let app = self.router();

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            info!(addr = %local_addr, "dashboard server started");

            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await;

            if let Err(e) = result {
                error!(error = %e, "dashboard server error");
            }
        });

        Ok(local_addr)
    }

    /// Gracefully shuts down the server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    chart: Option<String>,
}

/// GET / - the dashboard page.
async fn index_handler<S: TableStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chart = match query.chart.as_deref() {
        None | Some("") => ChartKind::default(),
        Some(slug) => match slug.parse::<ChartKind>() {
            Ok(chart) => chart,
            Err(e) => {
                return render_page(
                    StatusCode::BAD_REQUEST,
                    ChartKind::default(),
                    String::new(),
                    Some(e.to_string()),
                );
            }
        },
    };

    match state.cache.get().await {
        Ok(package) => {
            state
                .health
                .chart_renders
                .with_label_values(&[chart.view().as_str()])
                .inc();
            render_page(StatusCode::OK, chart, chart.render(&package), None)
        }
        Err(e) => render_page(
            StatusCode::INTERNAL_SERVER_ERROR,
            chart,
            String::new(),
            Some(e.to_string()),
        ),
    }
}

fn render_page(
    status: StatusCode,
    chart: ChartKind,
    chart_svg: String,
    error: Option<String>,
) -> Response {
    let page = DashboardPage {
        page_title: PAGE_TITLE,
        options: ChartKind::ALL
            .into_iter()
            .map(|c| ChartOption {
                slug: c.slug(),
                label: c.option_label(),
                selected: c == chart,
            })
            .collect(),
        chart_svg,
        error,
    };

    match page.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!(error = %e, "rendering dashboard page");
            (StatusCode::INTERNAL_SERVER_ERROR, "template error").into_response()
        }
    }
}

/// GET /api/views/:name - one view of the data package as JSON.
async fn view_handler<S: TableStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(name): Path<String>,
) -> Response {
    let view = match name.parse::<ViewName>() {
        Ok(view) => view,
        Err(e) => return json_error(StatusCode::NOT_FOUND, e.to_string()),
    };

    let package = match state.cache.get().await {
        Ok(package) => package,
        Err(e) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    match package.view_json(view) {
        Ok(value) => Json(value).into_response(),
        Err(e) => {
            error!(error = %e, view = %view, "encoding view");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}
