//! tbk-recon
//!
//! Pure reconciliation engine: monthly money aggregation per payment
//! platform and the payout cross-check rows. No IO, no clock; callers load
//! orders from the store and hand them in.

pub mod engine;
pub mod types;

pub use engine::{
    build_report, monthly_aggregates, net_sales_by_month, platform_net_by_month,
    reconciliation_rows,
};
pub use types::{MonthlyAggregate, ReconReport, ReconciliationRow, MONTHS_PER_YEAR};
