//! Shared fixtures for the normalizer and batch-processor tests.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tbk_commerce::types::{
    Money, OrderDetail, RawPayment, RawProcessingFee, RawTransaction, SourceTransaction,
};
use tbk_commerce::OrderLookup;

/// In-process order-detail lookup backed by a map. Missing ids error, which
/// is exactly the failure shape the batch processor must isolate.
#[derive(Debug, Default)]
pub(crate) struct MapLookup {
    orders: HashMap<String, OrderDetail>,
}

impl MapLookup {
    pub(crate) fn with_order(order_id: &str, detail: OrderDetail) -> Self {
        let mut lookup = Self::default();
        lookup.insert(order_id, detail);
        lookup
    }

    pub(crate) fn insert(&mut self, order_id: &str, detail: OrderDetail) {
        self.orders.insert(order_id.to_string(), detail);
    }
}

#[async_trait]
impl OrderLookup for MapLookup {
    async fn fetch_order(&self, order_id: &str) -> Result<OrderDetail> {
        self.orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| anyhow!("order {order_id} not found"))
    }
}

pub(crate) fn raw_transaction(
    id: &str,
    sales_order_id: Option<&str>,
    email: &str,
    total: &str,
    fee: &str,
    provider: &str,
) -> RawTransaction {
    let ts = Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap();
    RawTransaction {
        id: id.to_string(),
        sales_order_id: sales_order_id.map(str::to_string),
        created_on: ts,
        modified_on: ts,
        customer_email: Some(email.to_string()),
        voided: false,
        total: Money::new(total, "USD"),
        payments: vec![RawPayment {
            provider: Some(provider.to_string()),
            amount: Money::new(total, "USD"),
            processing_fees: vec![RawProcessingFee {
                amount: Money::new(fee, "USD"),
                refunded_amount: None,
            }],
        }],
        discounts: vec![],
        shipping_total: None,
    }
}

pub(crate) fn donation(
    id: &str,
    email: &str,
    total: &str,
    fee: &str,
    provider: &str,
) -> SourceTransaction {
    SourceTransaction::resolve(raw_transaction(id, None, email, total, fee, provider))
}

pub(crate) fn order_backed(
    id: &str,
    order_id: &str,
    email: &str,
    total: &str,
    fee: &str,
    provider: &str,
) -> SourceTransaction {
    SourceTransaction::resolve(raw_transaction(id, Some(order_id), email, total, fee, provider))
}
