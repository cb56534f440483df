//! Shared runtime state for tbk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself.

use sqlx::PgPool;
use tbk_commerce::CommerceClient;

use crate::gate::RunGate;

/// Static build metadata included in the health response.
#[derive(Clone, Copy, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub commerce: CommerceClient,
    /// Single-flight exclusion for ingestion runs.
    pub sync_gate: RunGate,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(pool: PgPool, commerce: CommerceClient) -> Self {
        Self {
            pool,
            commerce,
            sync_gate: RunGate::new(),
            build: BuildInfo {
                service: "tbk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
