//! Axum router and all HTTP handlers for tbk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Days, NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::{error, warn};

use crate::{
    api_types::{CatalogSyncResponse, ErrorResponse, HealthResponse, SyncRunResponse},
    state::AppState,
    sync,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/sync/run", post(sync_run))
        .route("/v1/catalog/sync", post(catalog_sync))
        .route("/v1/reports/reconciliation", get(reconciliation_report))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/sync/run
// ---------------------------------------------------------------------------

/// Trigger one ingestion run.
///
/// # Gate
/// Returns `409 Conflict` when a run is already in flight: two concurrent
/// runs would race the watermark read-modify-write. The permit is held
/// until the run finishes, success or failure.
pub(crate) async fn sync_run(State(st): State<Arc<AppState>>) -> Response {
    let Some(_permit) = st.sync_gate.try_acquire() else {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "an ingestion run is already in flight".to_string(),
            }),
        )
            .into_response();
    };

    match sync::run_ingestion(&st.pool, &st.commerce).await {
        Ok(summary) => {
            let message = format!(
                "ingested {} transactions ({} written, {} voided skipped)",
                summary.fetched, summary.written, summary.skipped_voided
            );
            (
                StatusCode::OK,
                Json(SyncRunResponse {
                    message,
                    run_id: summary.run_id,
                    fetched: summary.fetched,
                    written: summary.written,
                    skipped_voided: summary.skipped_voided,
                    warnings: summary.warnings,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "ingestion run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("{e:#}"),
                }),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/catalog/sync
// ---------------------------------------------------------------------------

pub(crate) async fn catalog_sync(State(st): State<Arc<AppState>>) -> Response {
    match sync::run_catalog_sync(&st.pool, &st.commerce).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(CatalogSyncResponse {
                message: format!(
                    "catalog synced: {} products fetched, {} written",
                    summary.fetched, summary.written
                ),
                fetched: summary.fetched,
                written: summary.written,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %format!("{e:#}"), "catalog sync failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("{e:#}"),
                }),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/reports/reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ReportParams {
    from: Option<String>,
    to: Option<String>,
}

/// Build the monthly reconciliation report for `[from, to]` (dates
/// inclusive). Read-only: loads persisted orders and recomputes the report
/// in memory on every request.
pub(crate) async fn reconciliation_report(
    State(st): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Response {
    let (from, to) = match parse_report_range(&params) {
        Ok(range) => range,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
                .into_response();
        }
    };

    // Load [from 00:00, to+1d 00:00) so the whole `to` date is included.
    let from_dt = from.and_time(NaiveTime::MIN).and_utc();
    let Some(to_excl) = to.checked_add_days(Days::new(1)) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("'to' date out of range: {to}"),
            }),
        )
            .into_response();
    };
    let to_dt = to_excl.and_time(NaiveTime::MIN).and_utc();

    match tbk_db::load_orders_in_range(&st.pool, from_dt, to_dt).await {
        Ok(orders) => {
            let report = tbk_recon::build_report(&orders, from, to);
            let unbalanced = report.unbalanced_months();
            if !unbalanced.is_empty() {
                warn!(?unbalanced, "reconciliation cross-check nonzero");
            }
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "reconciliation report failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("{e:#}"),
                }),
            )
                .into_response()
        }
    }
}

fn parse_report_range(params: &ReportParams) -> Result<(NaiveDate, NaiveDate), String> {
    let from_s = params
        .from
        .as_deref()
        .ok_or_else(|| "missing query parameter 'from'".to_string())?;
    let to_s = params
        .to
        .as_deref()
        .ok_or_else(|| "missing query parameter 'to'".to_string())?;

    let from = NaiveDate::parse_from_str(from_s, "%Y-%m-%d")
        .map_err(|e| format!("invalid 'from' date {from_s:?}: {e}"))?;
    let to = NaiveDate::parse_from_str(to_s, "%Y-%m-%d")
        .map_err(|e| format!("invalid 'to' date {to_s:?}: {e}"))?;

    if from > to {
        return Err(format!("'from' ({from}) must not be after 'to' ({to})"));
    }

    Ok((from, to))
}
