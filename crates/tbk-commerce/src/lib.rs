//! tbk-commerce
//!
//! Storefront commerce API boundary: the retrying transport, the raw wire
//! documents, and the authenticated client (windowed transaction listing,
//! order detail lookup, product listing).
//!
//! This crate does **not** normalize records, touch the database, or decide
//! run policy; it fetches and decodes, nothing more.

pub mod client;
pub mod transport;
pub mod types;

pub use client::{CommerceClient, OrderLookup, ENV_COMMERCE_API_KEY, ENV_COMMERCE_BASE_URL};
pub use transport::{RetryingTransport, TransportExhausted, DEFAULT_MAX_RETRIES};
pub use types::{
    Customization, LineItem, Money, OrderDetail, RawDiscount, RawPayment, RawProcessingFee,
    RawTransaction, SourceTransaction, TransactionKind,
};
