//! Monthly aggregation and payout reconciliation over persisted orders.
//!
//! All functions are pure and deterministic: the caller loads orders (see
//! `tbk_db::load_orders_in_range`), this module only sums and compares.
//! Nothing here mutates stored data.
//!
//! The storefront's own record (every persisted order) is the designated
//! net-sales source of truth. `STRIPE` and `PAYPAL` are the payout
//! platforms; `MAIL` never has a processor payout, so mail activity in a
//! month legitimately shows up in the cross-check instead of being folded
//! away.

use chrono::{Datelike, NaiveDate};
use tbk_schemas::{CanonicalOrder, PaymentPlatform};

use crate::types::{MonthlyAggregate, ReconReport, ReconciliationRow, MONTHS_PER_YEAR};

// ---------------------------------------------------------------------------
// Report entry point
// ---------------------------------------------------------------------------

/// Build the full report for orders whose `date` falls inside
/// `[from, to]` (both dates inclusive).
///
/// Orders are bucketed by calendar month of `date`; a range spanning more
/// than one year folds onto the same 12 buckets.
pub fn build_report(orders: &[CanonicalOrder], from: NaiveDate, to: NaiveDate) -> ReconReport {
    let in_range: Vec<&CanonicalOrder> = orders
        .iter()
        .filter(|o| {
            let d = o.date.date_naive();
            d >= from && d <= to
        })
        .collect();

    let net_sales = net_sales_by_month(&in_range);
    let stripe = platform_net_by_month(&in_range, PaymentPlatform::Stripe);
    let paypal = platform_net_by_month(&in_range, PaymentPlatform::Paypal);

    ReconReport {
        monthly: monthly_aggregates(&in_range),
        reconciliation: reconciliation_rows(&net_sales, &stripe, &paypal),
    }
}

// ---------------------------------------------------------------------------
// Monthly aggregates
// ---------------------------------------------------------------------------

/// Per-platform, per-month totals. Every platform contributes all 12 month
/// rows, zero months included, in deterministic `(platform, month)` order.
pub fn monthly_aggregates(orders: &[&CanonicalOrder]) -> Vec<MonthlyAggregate> {
    let mut out = Vec::with_capacity(PaymentPlatform::ALL.len() * MONTHS_PER_YEAR);

    for platform in PaymentPlatform::ALL {
        let mut gross = [0i64; MONTHS_PER_YEAR];
        let mut fee = [0i64; MONTHS_PER_YEAR];
        for o in orders.iter().filter(|o| o.platform == platform) {
            let m = o.date.month0() as usize;
            gross[m] += o.amount_cents;
            fee[m] += o.fee_cents;
        }
        for month0 in 0..MONTHS_PER_YEAR {
            out.push(MonthlyAggregate {
                platform,
                month0: month0 as u32,
                gross_cents: gross[month0],
                fee_cents: fee[month0],
                net_cents: gross[month0] + fee[month0],
                fee_percent: fee_percent(gross[month0], fee[month0]),
            });
        }
    }

    out
}

/// Commerce net (`amount + fee`) per month across **all** orders: the
/// source-of-truth series the payouts are checked against.
pub fn net_sales_by_month(orders: &[&CanonicalOrder]) -> [i64; MONTHS_PER_YEAR] {
    let mut out = [0i64; MONTHS_PER_YEAR];
    for o in orders {
        out[o.date.month0() as usize] += o.amount_cents + o.fee_cents;
    }
    out
}

/// One platform's net (`amount + fee`) per month.
pub fn platform_net_by_month(
    orders: &[&CanonicalOrder],
    platform: PaymentPlatform,
) -> [i64; MONTHS_PER_YEAR] {
    let mut out = [0i64; MONTHS_PER_YEAR];
    for o in orders.iter().filter(|o| o.platform == platform) {
        out[o.date.month0() as usize] += o.amount_cents + o.fee_cents;
    }
    out
}

// ---------------------------------------------------------------------------
// Reconciliation rows
// ---------------------------------------------------------------------------

/// Cross-check the net-sales series against the two payout series.
///
/// Pure arithmetic over the three monthly series, so callers (and tests)
/// can perturb one payout independently of the others.
pub fn reconciliation_rows(
    net_sales: &[i64; MONTHS_PER_YEAR],
    stripe_net: &[i64; MONTHS_PER_YEAR],
    paypal_net: &[i64; MONTHS_PER_YEAR],
) -> Vec<ReconciliationRow> {
    (0..MONTHS_PER_YEAR)
        .map(|m| {
            let total_payout = stripe_net[m] + paypal_net[m];
            ReconciliationRow {
                month0: m as u32,
                net_sales_cents: net_sales[m],
                stripe_net_cents: stripe_net[m],
                paypal_net_cents: paypal_net[m],
                total_payout_cents: total_payout,
                cross_check_cents: net_sales[m] - total_payout,
            }
        })
        .collect()
}

/// `fee / gross * 100` to two decimal places, `"--"` when gross is zero.
/// Display-only; money math everywhere else stays in integer cents.
fn fee_percent(gross_cents: i64, fee_cents: i64) -> String {
    if gross_cents == 0 {
        return "--".to_string();
    }
    format!("{:.2}", (fee_cents as f64) / (gross_cents as f64) * 100.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
