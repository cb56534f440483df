//! Response types for the tbk-daemon HTTP endpoints.
//!
//! JSON-encoded by Axum; tests decode through `serde_json::Value`. No
//! business logic lives here.

use serde::Serialize;
use uuid::Uuid;

use crate::sync::RunWarning;

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Error body (409 / 400 / 500)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// POST /v1/sync/run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunResponse {
    pub message: String,
    pub run_id: Uuid,
    pub fetched: usize,
    pub written: usize,
    pub skipped_voided: usize,
    /// Persisted records that carried data-quality issues.
    pub warnings: Vec<RunWarning>,
}

// ---------------------------------------------------------------------------
// POST /v1/catalog/sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSyncResponse {
    pub message: String,
    pub fetched: usize,
    pub written: usize,
}
