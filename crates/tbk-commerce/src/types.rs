//! Raw wire documents for the storefront commerce API.
//!
//! Everything here mirrors the upstream JSON shape (camelCase fields,
//! decimal-string amounts) and is immutable as received. Nothing in this
//! module is persisted verbatim; the normalizer in `tbk-ingest` converts
//! these into canonical orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Money (wire form)
// ---------------------------------------------------------------------------

/// An amount as delivered by the API: decimal string plus currency code.
/// Conversion to integer cents happens downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub value: String,
    pub currency: String,
}

impl Money {
    pub fn new(value: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            currency: currency.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction documents
// ---------------------------------------------------------------------------

/// One commerce transaction exactly as listed by the windowed transactions
/// endpoint. Order-backed transactions carry `sales_order_id`; donations
/// do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub id: String,
    #[serde(default)]
    pub sales_order_id: Option<String>,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub voided: bool,
    pub total: Money,
    #[serde(default)]
    pub payments: Vec<RawPayment>,
    #[serde(default)]
    pub discounts: Vec<RawDiscount>,
    #[serde(default)]
    pub shipping_total: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPayment {
    /// Processor label as reported upstream (e.g. `"STRIPE"`, `"PayPal"`).
    #[serde(default)]
    pub provider: Option<String>,
    pub amount: Money,
    #[serde(default)]
    pub processing_fees: Vec<RawProcessingFee>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProcessingFee {
    pub amount: Money,
    /// Portion of the fee returned by the processor after a refund.
    #[serde(default)]
    pub refunded_amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDiscount {
    pub amount: Money,
    #[serde(default)]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Transaction kind
// ---------------------------------------------------------------------------

/// The shape of a transaction, resolved once at fetch time so downstream
/// stages match on a tagged variant instead of probing optional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionKind {
    /// Backed by a storefront order; detail must be fetched by id.
    OrderBacked { order_id: String },
    /// A donation: all detail lives on the transaction document itself.
    Donation,
}

/// A raw transaction paired with its resolved kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTransaction {
    pub kind: TransactionKind,
    pub raw: RawTransaction,
}

impl SourceTransaction {
    /// Resolve the transaction's shape from the presence of an order
    /// reference. An empty-string reference counts as absent.
    pub fn resolve(raw: RawTransaction) -> Self {
        let kind = match raw.sales_order_id.as_deref().map(str::trim) {
            Some(order_id) if !order_id.is_empty() => TransactionKind::OrderBacked {
                order_id: order_id.to_string(),
            },
            _ => TransactionKind::Donation,
        };
        Self { kind, raw }
    }

    pub fn order_id(&self) -> Option<&str> {
        match &self.kind {
            TransactionKind::OrderBacked { order_id } => Some(order_id),
            TransactionKind::Donation => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Order detail documents
// ---------------------------------------------------------------------------

/// Full order document fetched by id for order-backed transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    pub id: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub shipping_total: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub line_total: Money,
    /// Form-submission fields captured at checkout; the participant
    /// name/email source.
    #[serde(default)]
    pub customizations: Vec<Customization>,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    pub label: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Product documents
// ---------------------------------------------------------------------------

/// A storefront product as listed by the products endpoint; each variant
/// carries the SKU the catalog is keyed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDoc {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub product_type: String,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    #[serde(default)]
    pub sku: Option<String>,
}

// ---------------------------------------------------------------------------
// Pagination envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub next_page_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionListResponse {
    #[serde(default)]
    pub documents: Vec<RawTransaction>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductListResponse {
    #[serde(default)]
    pub documents: Vec<ProductDoc>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
