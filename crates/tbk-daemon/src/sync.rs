//! Ingestion and catalog-sync run orchestration.
//!
//! One ingestion run is strictly phased: watermark window -> full fetch ->
//! paced batch normalization -> upsert -> watermark advance. The phases
//! never interleave; the only parallelism is inside a batch chunk. Callers
//! must hold a [`crate::gate::RunPermit`] for the whole run.
//!
//! The new watermark value is the `now` captured when the run **starts**
//! (not at write time), so the next run's window begins exactly where this
//! fetch began: no gap, and any overlap is absorbed by the idempotent
//! upsert. On any failure the error propagates and the watermark is left
//! untouched, making the run safely re-triggerable (at-least-once).

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tbk_commerce::CommerceClient;
use tbk_ingest::{process_all, Normalizer, Pacing, SkuCatalog};
use tracing::info;
use uuid::Uuid;

/// Window start when no run has ever completed (fresh database).
pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;

// ---------------------------------------------------------------------------
// Run summaries
// ---------------------------------------------------------------------------

/// One persisted record that carried data-quality issues.
#[derive(Debug, Clone, Serialize)]
pub struct RunWarning {
    pub transaction_id: String,
    pub order_id: Option<String>,
    pub date: DateTime<Utc>,
    pub issues: Vec<String>,
}

/// Outcome of a successful ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub fetched: usize,
    pub written: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped_voided: usize,
    pub failed: usize,
    pub warnings: Vec<RunWarning>,
}

/// Outcome of a successful catalog sync.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CatalogSummary {
    pub fetched: usize,
    pub written: usize,
}

// ---------------------------------------------------------------------------
// Ingestion run
// ---------------------------------------------------------------------------

/// Execute one full ingestion run.
pub async fn run_ingestion(pool: &PgPool, commerce: &CommerceClient) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let window_end = Utc::now();
    let window_start = tbk_db::watermark_get(pool)
        .await?
        .unwrap_or_else(|| window_end - Duration::days(DEFAULT_LOOKBACK_DAYS));
    info!(%run_id, %window_start, %window_end, "ingestion run started");

    let transactions = commerce.list_transactions(window_start, window_end).await?;
    let fetched = transactions.len();
    info!(%run_id, fetched, "windowed fetch complete");

    let catalog = SkuCatalog::from_skus(tbk_db::load_catalog_skus(pool).await?);
    let normalizer = Normalizer::new(commerce, &catalog);
    let outcome = process_all(&normalizer, &transactions, Pacing::Strict).await;

    let stats = tbk_db::upsert_orders(pool, &outcome.orders).await?;
    tbk_db::watermark_advance(pool, window_end).await?;

    let warnings: Vec<RunWarning> = outcome
        .orders
        .iter()
        .filter(|o| !o.issues.is_empty())
        .map(|o| RunWarning {
            transaction_id: o.transaction_id.clone(),
            order_id: o.order_id.clone(),
            date: o.date,
            issues: o.issue_messages(),
        })
        .collect();

    info!(
        %run_id,
        written = stats.written,
        inserted = stats.inserted,
        updated = stats.updated,
        skipped_voided = outcome.skipped_voided,
        failed = outcome.failed,
        warnings = warnings.len(),
        "ingestion run complete"
    );

    Ok(RunSummary {
        run_id,
        fetched,
        written: stats.written,
        inserted: stats.inserted,
        updated: stats.updated,
        skipped_voided: outcome.skipped_voided,
        failed: outcome.failed,
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Catalog sync
// ---------------------------------------------------------------------------

/// Refresh the reference product catalog from the storefront.
pub async fn run_catalog_sync(pool: &PgPool, commerce: &CommerceClient) -> Result<CatalogSummary> {
    let products = commerce.list_products().await?;
    let fetched = products.len();
    let written = tbk_db::upsert_products(pool, &products).await?;
    info!(fetched, written, "catalog sync complete");
    Ok(CatalogSummary { fetched, written })
}
