use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::net::SocketAddr;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::control::ControlCommand;
use crate::export;
use crate::history::{DateRange, HistoryQuery, Record};
use crate::series::{Metric, Sample};
use crate::session::SharedSession;
use crate::stats::statistics;

const INDEX_HTML: &str = include_str!("ui/index.html");

#[derive(Clone)]
pub struct AppState {
    pub session: SharedSession,
    pub commands: mpsc::Sender<ControlCommand>,
    pub display_limit: usize,
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RangeParams {
    fn range(&self) -> Option<DateRange> {
        DateRange::parse(self.start.as_deref(), self.end.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub value: String,
}

#[derive(Serialize)]
struct SeriesResponse {
    metric: Metric,
    window: usize,
    samples: Vec<Sample>,
}

#[derive(Serialize)]
struct HistoryResponse<'a> {
    filtered: bool,
    no_data: bool,
    total: usize,
    showing: usize,
    records: &'a [Record],
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "error": msg.into() }))).into_response()
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/series/{metric}", get(api_series))
        .route("/api/history", get(api_history))
        .route("/api/statistics", get(api_statistics))
        .route("/api/control/{target}", post(api_control))
        .route("/api/reset", post(api_reset))
        .route("/api/export/history.csv", get(export_history))
        .route("/api/export/summary.csv", get(export_summary))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    let st = state.session.read().await;
    Json(st.to_status())
}

async fn api_series(State(state): State<AppState>, Path(metric): Path<String>) -> Response {
    let metric: Metric = match metric.parse() {
        Ok(m) => m,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e),
    };
    let st = state.session.read().await;
    Json(SeriesResponse {
        metric,
        window: st.series.window(),
        samples: st.series.snapshot(metric),
    })
    .into_response()
}

async fn select(state: &AppState, params: &RangeParams) -> HistoryQuery {
    let st = state.session.read().await;
    st.history.query(params.range().as_ref())
}

async fn api_history(State(state): State<AppState>, Query(params): Query<RangeParams>) -> Response {
    let q = select(&state, &params).await;
    let shown = q.display(state.display_limit);
    Json(HistoryResponse {
        filtered: q.is_filtered(),
        no_data: q.is_no_data(),
        total: q.total(),
        showing: shown.len(),
        records: shown,
    })
    .into_response()
}

async fn api_statistics(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> impl IntoResponse {
    let q = select(&state, &params).await;
    Json(statistics(q.records()))
}

async fn api_control(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Json(req): Json<ControlRequest>,
) -> Response {
    let cmd = match ControlCommand::parse(&target, &req.value) {
        Ok(cmd) => cmd,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let mode = state.session.read().await.current_mode();
    if let Err(e) = cmd.check_allowed(mode) {
        return error_response(StatusCode::CONFLICT, e.to_string());
    }

    if let Err(e) = state.commands.try_send(cmd) {
        tracing::warn!(%cmd, error = %e, "control queue rejected command");
        let mut st = state.session.write().await;
        st.record_error(format!("could not queue {cmd}: {e}"));
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "control queue unavailable");
    }

    state
        .session
        .write()
        .await
        .record_control(format!("{cmd} requested"));

    (
        StatusCode::ACCEPTED,
        Json(json!({ "target": cmd.target(), "value": cmd.payload() })),
    )
        .into_response()
}

async fn api_reset(State(state): State<AppState>) -> impl IntoResponse {
    state.session.write().await.reset();
    Json(json!({ "reset": true }))
}

fn csv_attachment(kind: &str, body: Vec<u8>) -> Response {
    let filename = export::export_filename(kind, OffsetDateTime::now_utc());
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_history(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Response {
    let q = select(&state, &params).await;
    if q.total() == 0 {
        return error_response(StatusCode::NOT_FOUND, "no data to export");
    }
    match export::records_csv(q.records()) {
        Ok(body) => csv_attachment("History", body),
        Err(e) => {
            tracing::error!(error = %e, "history export failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "export failed")
        }
    }
}

async fn export_summary(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Response {
    let q = select(&state, &params).await;
    if q.total() == 0 {
        return error_response(StatusCode::NOT_FOUND, "no data to export");
    }
    match export::summary_csv(&statistics(q.records())) {
        Ok(body) => csv_attachment("Summary", body),
        Err(e) => {
            tracing::error!(error = %e, "summary export failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "export failed")
        }
    }
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState) -> Result<()> {
    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {addr}"))?;

    tracing::info!("web ui listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
