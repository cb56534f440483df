//! Chunked, paced normalization over a fetched transaction set.
//!
//! The processor partitions the input into fixed-size chunks, normalizes
//! every item of a chunk concurrently, and pauses between chunks to respect
//! the upstream rate budget. Each item's outcome is captured independently:
//! one transaction whose order-detail lookup blows up must not suppress
//! persistence of its chunk-mates, so failures become stub records with a
//! synthetic issue instead of aborting the batch.

use futures_util::future::join_all;
use tbk_commerce::types::SourceTransaction;
use tbk_commerce::OrderLookup;
use tbk_schemas::{CanonicalOrder, OrderIssue};
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::{debug, warn};

use crate::normalize::{Normalizer, FALLBACK_SKU};

/// Items normalized concurrently per chunk.
pub const BATCH_SIZE: usize = 5;
/// Pause between chunks (not after the last one).
pub const BATCH_PACING: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// Pacing policy
// ---------------------------------------------------------------------------

/// When the inter-chunk pause is measured from.
///
/// `Strict` sleeps the full pacing interval after the chunk completes, so
/// the rate floor holds regardless of how fast the chunk ran. `Overlapped`
/// starts the timer with the chunk's work and sleeps only the remainder:
/// cheaper wall-clock, weaker floor. The daemon runs `Strict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    #[default]
    Strict,
    Overlapped,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of processing one fetched window.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Orders ready for persistence, in input order. Includes stub records
    /// for items whose normalization failed.
    pub orders: Vec<CanonicalOrder>,
    /// Voided transactions skipped (expected, not an error).
    pub skipped_voided: usize,
    /// Items that failed normalization and were stubbed.
    pub failed: usize,
}

/// Normalize all transactions in fixed-size chunks with inter-chunk pacing.
pub async fn process_all<L: OrderLookup>(
    normalizer: &Normalizer<'_, L>,
    transactions: &[SourceTransaction],
    pacing: Pacing,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let chunks: Vec<&[SourceTransaction]> = transactions.chunks(BATCH_SIZE).collect();
    let last = chunks.len().saturating_sub(1);

    for (index, chunk) in chunks.iter().enumerate() {
        let chunk_started = Instant::now();

        let results = join_all(chunk.iter().map(|tx| normalizer.normalize(tx))).await;
        for (tx, result) in chunk.iter().zip(results) {
            match result {
                Ok(Some(order)) => outcome.orders.push(order),
                Ok(None) => outcome.skipped_voided += 1,
                Err(e) => {
                    warn!(
                        transaction_id = %tx.raw.id,
                        error = %format!("{e:#}"),
                        "normalization failed; persisting stub record"
                    );
                    outcome.failed += 1;
                    outcome.orders.push(stub_order(tx, &e));
                }
            }
        }

        debug!(chunk = index + 1, of = chunks.len(), "chunk normalized");
        if index != last {
            match pacing {
                Pacing::Strict => sleep(BATCH_PACING).await,
                Pacing::Overlapped => sleep_until(chunk_started + BATCH_PACING).await,
            }
        }
    }

    outcome
}

/// Minimal record for a transaction whose normalization failed: top-level
/// fields only, a single fallback split, and a synthetic issue describing
/// the failure. Persisting the stub keeps the transaction visible and lets
/// a later re-run overwrite it via the idempotent upsert.
fn stub_order(tx: &SourceTransaction, error: &anyhow::Error) -> CanonicalOrder {
    let raw = &tx.raw;
    let email = raw
        .customer_email
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let amount_cents = tbk_schemas::money::parse_money_cents(&raw.total.value).unwrap_or(0);

    CanonicalOrder {
        transaction_id: raw.id.clone(),
        order_id: tx.order_id().map(str::to_string),
        date: raw.created_on,
        created_at: raw.created_on,
        updated_at: raw.modified_on,
        amount_cents,
        fee_cents: 0,
        platform: tbk_schemas::PaymentPlatform::Mail,
        skus: vec![FALLBACK_SKU.to_string()],
        names: vec![email.clone()],
        emails: vec![email],
        amounts_cents: vec![amount_cents],
        issues: vec![OrderIssue::new(format!("normalization failed: {error:#}"))],
        member_pids: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::SkuCatalog;
    use crate::testutil::{donation, order_backed, MapLookup};

    fn donations(n: usize) -> Vec<SourceTransaction> {
        (0..n)
            .map(|i| donation(&format!("txn-{i}"), "donor@example.org", "10.00", "0.30", "STRIPE"))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn twelve_items_make_three_chunks_and_two_pacing_delays() {
        let lookup = MapLookup::default();
        let catalog = SkuCatalog::from_skus(["X"]);
        let normalizer = Normalizer::new(&lookup, &catalog);
        let txns = donations(12);

        let started = Instant::now();
        let outcome = process_all(&normalizer, &txns, Pacing::Strict).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.orders.len(), 12);
        // 3 chunks -> 2 inter-chunk delays, none after the last chunk.
        assert!(
            elapsed >= Duration::from_millis(2000) && elapsed < Duration::from_millis(3000),
            "expected exactly 2 pacing delays, got {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_chunk_has_no_pacing_delay() {
        let lookup = MapLookup::default();
        let catalog = SkuCatalog::from_skus(["X"]);
        let normalizer = Normalizer::new(&lookup, &catalog);
        let txns = donations(5);

        let started = Instant::now();
        let outcome = process_all(&normalizer, &txns, Pacing::Strict).await;

        assert_eq!(outcome.orders.len(), 5);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    /// Order lookup that takes a fixed amount of (virtual) time, so the two
    /// pacing modes become distinguishable.
    struct SlowLookup {
        inner: MapLookup,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl tbk_commerce::OrderLookup for SlowLookup {
        async fn fetch_order(&self, order_id: &str) -> anyhow::Result<tbk_commerce::OrderDetail> {
            sleep(self.delay).await;
            self.inner.fetch_order(order_id).await
        }
    }

    fn slow_order_batch(n: usize, delay: Duration) -> (SlowLookup, Vec<SourceTransaction>) {
        let mut inner = MapLookup::default();
        let mut txns = Vec::new();
        for i in 0..n {
            let order_id = format!("ord-{i}");
            inner.insert(
                &order_id,
                tbk_commerce::OrderDetail {
                    id: order_id.clone(),
                    line_items: vec![],
                    shipping_total: None,
                },
            );
            txns.push(order_backed(
                &format!("txn-{i}"),
                &order_id,
                "b@example.org",
                "10.00",
                "0.30",
                "STRIPE",
            ));
        }
        (SlowLookup { inner, delay }, txns)
    }

    #[tokio::test(start_paused = true)]
    async fn overlapped_pacing_sleeps_only_the_remainder() {
        // Two chunks of work at 400 ms each, one inter-chunk delay.
        // Overlapped: 400 + 600 (remainder) + 400 = 1400 ms.
        let (lookup, txns) = slow_order_batch(6, Duration::from_millis(400));
        let catalog = SkuCatalog::from_skus(["X"]);
        let normalizer = Normalizer::new(&lookup, &catalog);

        let started = Instant::now();
        let outcome = process_all(&normalizer, &txns, Pacing::Overlapped).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.orders.len(), 6);
        assert!(
            elapsed >= Duration::from_millis(1400) && elapsed < Duration::from_millis(1800),
            "overlapped pacing should absorb chunk time: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn strict_pacing_waits_the_full_interval_after_the_chunk() {
        // Same shape as above but strict: 400 + 1000 + 400 = 1800 ms.
        let (lookup, txns) = slow_order_batch(6, Duration::from_millis(400));
        let catalog = SkuCatalog::from_skus(["X"]);
        let normalizer = Normalizer::new(&lookup, &catalog);

        let started = Instant::now();
        let outcome = process_all(&normalizer, &txns, Pacing::Strict).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.orders.len(), 6);
        assert!(
            elapsed >= Duration::from_millis(1800),
            "strict pacing must not overlap chunk time: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_item_does_not_suppress_chunk_mates() {
        // txn-bad is order-backed with no order detail registered: its
        // lookup errors while the other four donations normalize fine.
        let lookup = MapLookup::default();
        let catalog = SkuCatalog::from_skus(["X"]);
        let normalizer = Normalizer::new(&lookup, &catalog);

        let mut txns = donations(4);
        txns.insert(
            2,
            order_backed("txn-bad", "ord-missing", "b@example.org", "50.00", "1.75", "STRIPE"),
        );

        let outcome = process_all(&normalizer, &txns, Pacing::Strict).await;

        assert_eq!(outcome.orders.len(), 5);
        assert_eq!(outcome.failed, 1);

        let stub = outcome
            .orders
            .iter()
            .find(|o| o.transaction_id == "txn-bad")
            .expect("stub record must be present");
        assert_eq!(stub.issues.len(), 1);
        assert!(
            stub.issues[0].message.starts_with("normalization failed:"),
            "{}",
            stub.issues[0].message
        );
        assert!(stub.has_equal_split_lengths());
        assert_eq!(stub.amount_cents, 5_000);

        // The four good records carry no synthetic issue.
        let clean = outcome
            .orders
            .iter()
            .filter(|o| o.transaction_id != "txn-bad")
            .all(|o| o.issues.is_empty());
        assert!(clean);
    }

    #[tokio::test(start_paused = true)]
    async fn voided_items_are_counted_not_persisted() {
        let lookup = MapLookup::default();
        let catalog = SkuCatalog::from_skus(["X"]);
        let normalizer = Normalizer::new(&lookup, &catalog);

        let mut txns = donations(3);
        txns[1].raw.voided = true;

        let outcome = process_all(&normalizer, &txns, Pacing::Strict).await;
        assert_eq!(outcome.orders.len(), 2);
        assert_eq!(outcome.skipped_voided, 1);
        assert_eq!(outcome.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_preserve_input_order() {
        let lookup = MapLookup::default();
        let catalog = SkuCatalog::from_skus(["X"]);
        let normalizer = Normalizer::new(&lookup, &catalog);
        let txns = donations(7);

        let outcome = process_all(&normalizer, &txns, Pacing::Strict).await;
        let ids: Vec<&str> = outcome
            .orders
            .iter()
            .map(|o| o.transaction_id.as_str())
            .collect();
        assert_eq!(ids, vec!["txn-0", "txn-1", "txn-2", "txn-3", "txn-4", "txn-5", "txn-6"]);
    }
}
