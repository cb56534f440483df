//! Canonical-order normalization for storefront transactions.
//!
//! Converts one raw transaction (order-backed or donation-backed) into a
//! [`CanonicalOrder`] plus its list of data-quality issues. Record-level
//! problems (missing email, unknown SKU, amount mismatch) are recorded as
//! issues and never block the record; only genuinely broken input (an
//! unreachable order-detail lookup, an unparseable total) surfaces as `Err`,
//! which the batch processor isolates per item.
//!
//! This module does **not** fetch transaction pages, write to the database,
//! or decide pacing.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tbk_commerce::types::{LineItem, RawPayment, RawTransaction, SourceTransaction, TransactionKind};
use tbk_commerce::OrderLookup;
use tbk_schemas::money::{format_cents, parse_money_cents};
use tbk_schemas::{CanonicalOrder, OrderIssue, PaymentPlatform};

/// Synthetic SKU carried by donation splits; exempt from the catalog check.
pub const DONATION_SKU: &str = "DONATION";

/// Placeholder SKU for order-backed records with no usable line-item SKU.
/// Never present in the catalog, so it surfaces as an unknown-sku issue
/// instead of vanishing.
pub const FALLBACK_SKU: &str = "UNKNOWN";

// ---------------------------------------------------------------------------
// SkuCatalog
// ---------------------------------------------------------------------------

/// In-memory view of the reference product catalog, keyed by SKU.
#[derive(Debug, Clone, Default)]
pub struct SkuCatalog {
    skus: BTreeSet<String>,
}

impl SkuCatalog {
    pub fn from_skus<I, S>(skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skus: skus.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_known(&self, sku: &str) -> bool {
        self.skus.contains(sku)
    }

    pub fn len(&self) -> usize {
        self.skus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skus.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Converts raw transactions into canonical orders.
///
/// Holds the order-detail lookup seam and the SKU catalog for the duration
/// of one ingestion run.
pub struct Normalizer<'a, L: OrderLookup> {
    lookup: &'a L,
    catalog: &'a SkuCatalog,
}

impl<'a, L: OrderLookup> Normalizer<'a, L> {
    pub fn new(lookup: &'a L, catalog: &'a SkuCatalog) -> Self {
        Self { lookup, catalog }
    }

    /// Normalize one transaction.
    ///
    /// Returns `Ok(None)` for voided transactions: an expected skip, not an
    /// error and not an issue. Returns `Err` only when the record cannot be
    /// represented at all (the batch processor converts that into a stub
    /// record with a synthetic issue).
    pub async fn normalize(&self, tx: &SourceTransaction) -> Result<Option<CanonicalOrder>> {
        let raw = &tx.raw;
        if raw.voided {
            return Ok(None);
        }

        let amount_cents = parse_money_cents(&raw.total.value)
            .with_context(|| format!("transaction {} total", raw.id))?;
        let fee_cents =
            fee_cents(&raw.payments).with_context(|| format!("transaction {} fees", raw.id))?;
        let (platform, mut issues) = resolve_platform(&raw.payments);

        let email = customer_email(raw);
        if email.is_none() {
            issues.push(OrderIssue::new("missing email"));
        }
        let fallback_email = email.unwrap_or_default();

        let splits = match &tx.kind {
            TransactionKind::OrderBacked { order_id } => {
                let detail = self
                    .lookup
                    .fetch_order(order_id)
                    .await
                    .with_context(|| format!("transaction {} order detail", raw.id))?;
                if detail.line_items.is_empty() {
                    top_level_split(&fallback_email, amount_cents, FALLBACK_SKU)
                } else {
                    line_item_splits(&detail.line_items, &fallback_email)?
                }
            }
            TransactionKind::Donation => {
                top_level_split(&fallback_email, amount_cents, DONATION_SKU)
            }
        };

        for sku in &splits.skus {
            if sku != DONATION_SKU && !self.catalog.is_known(sku) {
                issues.push(OrderIssue::new(format!("unknown sku {sku}")));
            }
        }

        // Per-participant amounts must reconcile with the transaction total
        // within rounding tolerance (1 cent per split).
        let split_sum: i64 = splits.amounts_cents.iter().sum();
        let tolerance = splits.amounts_cents.len() as i64;
        if (split_sum - amount_cents).abs() > tolerance {
            issues.push(OrderIssue::new(format!(
                "amount mismatch: splits total {} but transaction total is {}",
                format_cents(split_sum),
                format_cents(amount_cents)
            )));
        }

        Ok(Some(CanonicalOrder {
            transaction_id: raw.id.clone(),
            order_id: tx.order_id().map(str::to_string),
            date: raw.created_on,
            created_at: raw.created_on,
            updated_at: raw.modified_on,
            amount_cents,
            fee_cents,
            platform,
            skus: splits.skus,
            names: splits.names,
            emails: splits.emails,
            amounts_cents: splits.amounts_cents,
            issues,
            member_pids: Vec::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Split construction
// ---------------------------------------------------------------------------

/// Parallel participant arrays under construction. Lengths are equal by
/// construction: every push goes through [`Splits::push`].
#[derive(Debug, Default)]
struct Splits {
    skus: Vec<String>,
    names: Vec<String>,
    emails: Vec<String>,
    amounts_cents: Vec<i64>,
}

impl Splits {
    fn push(&mut self, sku: String, name: String, email: String, amount_cents: i64) {
        self.skus.push(sku);
        self.names.push(name);
        self.emails.push(email);
        self.amounts_cents.push(amount_cents);
    }
}

/// Single split derived from the top-level transaction fields: the
/// donation shape, and the fallback when an order carries no line items.
fn top_level_split(email: &str, amount_cents: i64, sku: &str) -> Splits {
    let mut splits = Splits::default();
    splits.push(
        sku.to_string(),
        email.to_string(),
        email.to_string(),
        amount_cents,
    );
    splits
}

/// One split per line item, with participant name/email taken from the
/// checkout form-submission fields and the customer email as fallback.
fn line_item_splits(items: &[LineItem], fallback_email: &str) -> Result<Splits> {
    let mut splits = Splits::default();
    for item in items {
        let amount = parse_money_cents(&item.line_total.value)
            .with_context(|| format!("line item {:?} total", item.sku))?;
        let sku = item
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_SKU)
            .to_string();
        let name = customization_value(item, "name")
            .unwrap_or(fallback_email)
            .to_string();
        let email = customization_value(item, "email")
            .unwrap_or(fallback_email)
            .to_string();
        splits.push(sku, name, email, amount);
    }
    Ok(splits)
}

/// First non-empty customization whose label contains `label_fragment`
/// (case-insensitive). Checkout forms vary ("Name", "Participant Name",
/// "Camper name"), so substring matching is the stable contract.
fn customization_value<'i>(item: &'i LineItem, label_fragment: &str) -> Option<&'i str> {
    item.customizations
        .iter()
        .find(|c| {
            c.label.to_ascii_lowercase().contains(label_fragment) && !c.value.trim().is_empty()
        })
        .map(|c| c.value.trim())
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn customer_email(raw: &RawTransaction) -> Option<&str> {
    raw.customer_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
}

/// Processing fee across all payments, signed negative. A refunded fee
/// portion is credited back.
fn fee_cents(payments: &[RawPayment]) -> Result<i64> {
    let mut fee = 0i64;
    for payment in payments {
        for f in &payment.processing_fees {
            fee -= parse_money_cents(&f.amount.value).context("processing fee amount")?;
            if let Some(refund) = &f.refunded_amount {
                fee += parse_money_cents(&refund.value).context("refunded fee amount")?;
            }
        }
    }
    Ok(fee)
}

/// Resolve the payment platform from the first labeled payment.
///
/// Labels outside the closed set are a record-level issue; the order falls
/// back to `MAIL` (the manual-entry platform) rather than failing the run.
fn resolve_platform(payments: &[RawPayment]) -> (PaymentPlatform, Vec<OrderIssue>) {
    let label = payments
        .iter()
        .find_map(|p| p.provider.as_deref())
        .unwrap_or("")
        .trim();

    match PaymentPlatform::parse(label) {
        Some(platform) => (platform, Vec::new()),
        None if label.is_empty() => (PaymentPlatform::Mail, Vec::new()),
        None => (
            PaymentPlatform::Mail,
            vec![OrderIssue::new(format!(
                "unknown payment provider '{label}'"
            ))],
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{donation, order_backed, MapLookup};
    use tbk_commerce::types::{Customization, Money, OrderDetail};

    fn catalog() -> SkuCatalog {
        SkuCatalog::from_skus(["CAMP-2024", "PASS-ADULT", "PASS-CHILD"])
    }

    fn line_item(sku: &str, total: &str, customizations: &[(&str, &str)]) -> LineItem {
        LineItem {
            sku: Some(sku.to_string()),
            quantity: 1,
            line_total: Money::new(total, "USD"),
            customizations: customizations
                .iter()
                .map(|(label, value)| Customization {
                    label: label.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn donation_produces_single_split_from_top_level_fields() {
        let lookup = MapLookup::default();
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let tx = donation("txn-1", "donor@example.org", "25.00", "0.55", "STRIPE");
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();

        assert_eq!(order.transaction_id, "txn-1");
        assert_eq!(order.order_id, None);
        assert_eq!(order.amount_cents, 2_500);
        assert_eq!(order.fee_cents, -55);
        assert_eq!(order.platform, PaymentPlatform::Stripe);
        assert_eq!(order.skus, vec![DONATION_SKU.to_string()]);
        assert_eq!(order.names, vec!["donor@example.org".to_string()]);
        assert_eq!(order.emails, vec!["donor@example.org".to_string()]);
        assert_eq!(order.amounts_cents, vec![2_500]);
        assert!(order.issues.is_empty());
        assert!(order.member_pids.is_empty());
    }

    #[tokio::test]
    async fn order_backed_splits_per_line_item_with_form_names() {
        let detail = OrderDetail {
            id: "ord-1".to_string(),
            line_items: vec![
                line_item(
                    "PASS-ADULT",
                    "60.00",
                    &[("Participant Name", "Alex Doe"), ("Participant Email", "alex@example.org")],
                ),
                line_item("PASS-CHILD", "40.00", &[("Camper name", "Sam Doe")]),
            ],
            shipping_total: None,
        };
        let lookup = MapLookup::with_order("ord-1", detail);
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let tx = order_backed("txn-2", "ord-1", "buyer@example.org", "100.00", "3.20", "PayPal");
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();

        assert_eq!(order.order_id.as_deref(), Some("ord-1"));
        assert_eq!(order.platform, PaymentPlatform::Paypal);
        assert_eq!(order.skus, vec!["PASS-ADULT", "PASS-CHILD"]);
        assert_eq!(order.names, vec!["Alex Doe", "Sam Doe"]);
        // Second item has no email customization: customer email fallback.
        assert_eq!(order.emails, vec!["alex@example.org", "buyer@example.org"]);
        assert_eq!(order.amounts_cents, vec![6_000, 4_000]);
        assert!(order.has_equal_split_lengths());
        assert!(order.issues.is_empty());
    }

    #[tokio::test]
    async fn voided_transaction_is_skipped_without_issue() {
        let lookup = MapLookup::default();
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let mut tx = donation("txn-3", "donor@example.org", "25.00", "0.55", "STRIPE");
        tx.raw.voided = true;
        assert!(normalizer.normalize(&tx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_email_recorded_as_issue_record_still_produced() {
        let lookup = MapLookup::default();
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let mut tx = donation("txn-4", "", "25.00", "0.55", "STRIPE");
        tx.raw.customer_email = None;
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();

        assert_eq!(order.issue_messages(), vec!["missing email".to_string()]);
        // Fallback split still satisfies the array-length invariant.
        assert!(order.has_equal_split_lengths());
        assert_eq!(order.split_len(), 1);
    }

    #[tokio::test]
    async fn unknown_sku_recorded_as_issue() {
        let detail = OrderDetail {
            id: "ord-5".to_string(),
            line_items: vec![line_item("RETIRED-SKU", "50.00", &[("Name", "Alex Doe")])],
            shipping_total: None,
        };
        let lookup = MapLookup::with_order("ord-5", detail);
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let tx = order_backed("txn-5", "ord-5", "buyer@example.org", "50.00", "1.75", "STRIPE");
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();
        assert_eq!(
            order.issue_messages(),
            vec!["unknown sku RETIRED-SKU".to_string()]
        );
    }

    #[tokio::test]
    async fn amount_mismatch_recorded_when_splits_disagree_with_total() {
        let detail = OrderDetail {
            id: "ord-6".to_string(),
            line_items: vec![line_item("PASS-ADULT", "60.00", &[("Name", "Alex Doe")])],
            shipping_total: None,
        };
        let lookup = MapLookup::with_order("ord-6", detail);
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        // Transaction says 100.00 but the single split totals 60.00.
        let tx = order_backed("txn-6", "ord-6", "buyer@example.org", "100.00", "3.20", "STRIPE");
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();

        let messages = order.issue_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("amount mismatch"), "{}", messages[0]);
        assert!(messages[0].contains("60.00"));
        assert!(messages[0].contains("100.00"));
    }

    #[tokio::test]
    async fn amount_within_tolerance_is_not_an_issue() {
        // Two splits, so tolerance is 2 cents; totals differ by exactly 2.
        let detail = OrderDetail {
            id: "ord-7".to_string(),
            line_items: vec![
                line_item("PASS-ADULT", "33.33", &[("Name", "A")]),
                line_item("PASS-CHILD", "33.33", &[("Name", "B")]),
            ],
            shipping_total: None,
        };
        let lookup = MapLookup::with_order("ord-7", detail);
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let tx = order_backed("txn-7", "ord-7", "buyer@example.org", "66.68", "2.00", "STRIPE");
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();
        assert!(order.issues.is_empty(), "{:?}", order.issues);
    }

    #[tokio::test]
    async fn empty_line_items_fall_back_to_single_top_level_split() {
        let detail = OrderDetail {
            id: "ord-8".to_string(),
            line_items: vec![],
            shipping_total: None,
        };
        let lookup = MapLookup::with_order("ord-8", detail);
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let tx = order_backed("txn-8", "ord-8", "buyer@example.org", "50.00", "1.75", "STRIPE");
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();
        assert_eq!(order.split_len(), 1);
        assert_eq!(order.skus, vec![FALLBACK_SKU.to_string()]);
        assert_eq!(order.amounts_cents, vec![5_000]);
        assert!(order.has_equal_split_lengths());
        // The placeholder SKU is not in the catalog, so it is surfaced.
        assert_eq!(
            order.issue_messages(),
            vec![format!("unknown sku {FALLBACK_SKU}")]
        );
    }

    #[tokio::test]
    async fn unknown_provider_label_falls_back_to_mail_with_issue() {
        let lookup = MapLookup::default();
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let tx = donation("txn-9", "donor@example.org", "25.00", "0.00", "VENMO");
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();
        assert_eq!(order.platform, PaymentPlatform::Mail);
        assert_eq!(
            order.issue_messages(),
            vec!["unknown payment provider 'VENMO'".to_string()]
        );
    }

    #[tokio::test]
    async fn refunded_fee_portion_credited_back() {
        let mut tx = donation("txn-10", "donor@example.org", "25.00", "1.00", "STRIPE");
        tx.raw.payments[0].processing_fees[0].refunded_amount = Some(Money::new("0.40", "USD"));

        let lookup = MapLookup::default();
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);
        let order = normalizer.normalize(&tx).await.unwrap().unwrap();
        assert_eq!(order.fee_cents, -60);
    }

    #[tokio::test]
    async fn failed_order_lookup_propagates_as_error() {
        // Lookup map has no entry for ord-missing.
        let lookup = MapLookup::default();
        let cat = catalog();
        let normalizer = Normalizer::new(&lookup, &cat);

        let tx = order_backed("txn-11", "ord-missing", "b@example.org", "50.00", "1.75", "STRIPE");
        let err = normalizer.normalize(&tx).await.unwrap_err();
        assert!(err.to_string().contains("txn-11"), "{err:#}");
    }
}
