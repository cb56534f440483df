//! Report row types produced by the reconciliation engine.

use serde::{Deserialize, Serialize};
use tbk_schemas::PaymentPlatform;

/// Calendar months per report, indexed 0–11.
pub const MONTHS_PER_YEAR: usize = 12;

/// One platform's money totals for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub platform: PaymentPlatform,
    /// Calendar month, 0–11.
    pub month0: u32,
    pub gross_cents: i64,
    /// Signed (<= 0 under correct data).
    pub fee_cents: i64,
    /// `gross + fee`: what the processor actually deposits.
    pub net_cents: i64,
    /// `fee / gross * 100` rendered to 2 decimal places; `"--"` when gross
    /// is zero.
    pub fee_percent: String,
}

/// Cross-check of the storefront's net sales against the payout platforms'
/// summed nets for one calendar month.
///
/// `cross_check_cents` is zero under correct all-card data; a persistent
/// nonzero value signals an ingestion or mapping defect and is surfaced,
/// never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    /// Calendar month, 0–11.
    pub month0: u32,
    pub net_sales_cents: i64,
    pub stripe_net_cents: i64,
    pub paypal_net_cents: i64,
    pub total_payout_cents: i64,
    pub cross_check_cents: i64,
}

/// Full report: per-platform monthly aggregates plus the reconciliation
/// cross-check rows. Recomputed on every request, held only in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconReport {
    pub monthly: Vec<MonthlyAggregate>,
    pub reconciliation: Vec<ReconciliationRow>,
}

impl ReconReport {
    /// `true` when every month's cross-check is exactly zero.
    pub fn is_balanced(&self) -> bool {
        self.reconciliation.iter().all(|r| r.cross_check_cents == 0)
    }

    /// Months (0–11) whose cross-check is nonzero, for logging.
    pub fn unbalanced_months(&self) -> Vec<u32> {
        self.reconciliation
            .iter()
            .filter(|r| r.cross_check_cents != 0)
            .map(|r| r.month0)
            .collect()
    }
}
