//! tbk-schemas
//!
//! Shared canonical types for the Tillbook pipeline: the canonical order
//! record, the closed payment-platform set, record-level data-quality
//! issues, and minor-unit money parsing.
//!
//! This crate is pure data. No IO, no clock, no storage logic belong here.

pub mod money;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PaymentPlatform
// ---------------------------------------------------------------------------

/// The closed set of payment platforms an order can settle through.
///
/// `Stripe` and `Paypal` are the payout platforms (a processor deposits the
/// net amount); `Mail` covers manually entered checks/cash and never has a
/// processor payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentPlatform {
    Stripe,
    Paypal,
    Mail,
}

impl PaymentPlatform {
    /// All platforms, in deterministic report order.
    pub const ALL: [PaymentPlatform; 3] = [
        PaymentPlatform::Stripe,
        PaymentPlatform::Paypal,
        PaymentPlatform::Mail,
    ];

    /// Canonical uppercase label used in storage and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPlatform::Stripe => "STRIPE",
            PaymentPlatform::Paypal => "PAYPAL",
            PaymentPlatform::Mail => "MAIL",
        }
    }

    /// Case-insensitive parse of an upstream provider label.
    ///
    /// Returns `None` for labels outside the closed set; callers decide
    /// whether that is a record-level issue or a hard error.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRIPE" => Some(PaymentPlatform::Stripe),
            "PAYPAL" => Some(PaymentPlatform::Paypal),
            "MAIL" => Some(PaymentPlatform::Mail),
            _ => None,
        }
    }

    /// `true` when a processor pays out the net amount for this platform.
    pub fn is_payout(&self) -> bool {
        !matches!(self, PaymentPlatform::Mail)
    }
}

// ---------------------------------------------------------------------------
// OrderIssue
// ---------------------------------------------------------------------------

/// A non-fatal data-quality finding recorded during normalization.
///
/// Issues never block persistence; they ride along on the order and are
/// surfaced in the ingestion run's warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIssue {
    pub message: String,
}

impl OrderIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CanonicalOrder
// ---------------------------------------------------------------------------

/// The internal unit of record: one commerce transaction after
/// normalization.
///
/// Participant attribution uses parallel arrays: index *i* of
/// `names`/`emails`/`amounts_cents`/`skus` describes one person's share of
/// the transaction. The four arrays always have equal, nonzero length; when
/// no participant detail is available the arrays hold a single split derived
/// from the top-level transaction fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    /// External transaction id: the idempotent upsert key.
    pub transaction_id: String,
    /// External order id; `None` for donation-backed transactions.
    pub order_id: Option<String>,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Transaction total in cents.
    pub amount_cents: i64,
    /// Processing fee in cents, stored signed (<= 0).
    pub fee_cents: i64,
    pub platform: PaymentPlatform,
    /// One SKU per participant split.
    pub skus: Vec<String>,
    pub names: Vec<String>,
    pub emails: Vec<String>,
    pub amounts_cents: Vec<i64>,
    /// Data-quality findings; non-empty does not block persistence.
    pub issues: Vec<OrderIssue>,
    /// Resolved member identifiers. Populated by a later matching step;
    /// always empty at ingestion time.
    pub member_pids: Vec<String>,
}

impl CanonicalOrder {
    /// Number of participant splits.
    pub fn split_len(&self) -> usize {
        self.skus.len()
    }

    /// `true` when the four parallel arrays have equal length.
    pub fn has_equal_split_lengths(&self) -> bool {
        let n = self.skus.len();
        self.names.len() == n && self.emails.len() == n && self.amounts_cents.len() == n
    }

    /// Sum of the per-participant amounts.
    pub fn participant_sum_cents(&self) -> i64 {
        self.amounts_cents.iter().sum()
    }

    pub fn push_issue(&mut self, message: impl Into<String>) {
        self.issues.push(OrderIssue::new(message));
    }

    /// Issue messages flattened to plain strings (the storage shape).
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// CatalogProduct
// ---------------------------------------------------------------------------

/// One row of the reference product catalog (SKU -> description/type),
/// consumed by the normalizer's unknown-SKU check and by reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub sku: String,
    pub description: String,
    pub product_type: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
