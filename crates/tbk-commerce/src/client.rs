//! Storefront API client: windowed transaction listing with cursor
//! pagination, order detail lookup, and product listing.
//!
//! All requests go through the [`RetryingTransport`]; any failure from the
//! transport or a non-2xx status aborts the whole operation, so no partial
//! page state leaks to callers. Deduplication is **not** performed here;
//! uniqueness is enforced downstream by the transaction-id upsert.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use tbk_schemas::CatalogProduct;
use tracing::debug;

use crate::transport::RetryingTransport;
use crate::types::{
    OrderDetail, Pagination, ProductListResponse, SourceTransaction, TransactionListResponse,
};

/// Env var holding the storefront API key.
pub const ENV_COMMERCE_API_KEY: &str = "TBK_COMMERCE_API_KEY";
/// Env var overriding the storefront API base URL (tests, staging).
pub const ENV_COMMERCE_BASE_URL: &str = "TBK_COMMERCE_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api.storefront.example.com";
const USER_AGENT: &str = concat!("tillbook/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// OrderLookup seam
// ---------------------------------------------------------------------------

/// Order-detail lookup contract, split out so the normalizer can be tested
/// against an in-process mock instead of a live API.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn fetch_order(&self, order_id: &str) -> Result<OrderDetail>;
}

// ---------------------------------------------------------------------------
// CommerceClient
// ---------------------------------------------------------------------------

/// Authenticated storefront API client.
///
/// API key is read by the caller and passed in; do not log it.
#[derive(Debug, Clone)]
pub struct CommerceClient {
    transport: RetryingTransport,
    base_url: String,
    api_key: String,
}

impl CommerceClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn new_with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            transport: RetryingTransport::new(reqwest::Client::new()),
            base_url,
            api_key,
        }
    }

    /// Rebuild with a different retry budget (tests use 1 for fast failure).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.transport = RetryingTransport::with_max_retries(reqwest::Client::new(), max_retries);
        self
    }

    /// Build a client from `TBK_COMMERCE_API_KEY` / `TBK_COMMERCE_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_COMMERCE_API_KEY)
            .with_context(|| format!("missing env var {ENV_COMMERCE_API_KEY}"))?;
        Ok(match std::env::var(ENV_COMMERCE_BASE_URL) {
            Ok(base_url) => Self::new_with_base_url(api_key, base_url),
            Err(_) => Self::new(api_key),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(path);
        let resp = self
            .transport
            .send(|http| {
                http.get(&url)
                    .bearer_auth(&self.api_key)
                    .header(reqwest::header::USER_AGENT, USER_AGENT)
                    .query(query)
            })
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(anyhow!(
                "storefront http error status={} body={}",
                status.as_u16(),
                snippet
            ));
        }

        resp.json::<T>()
            .await
            .context("storefront response json decode failed")
    }

    /// Fetch all transactions whose `modifiedOn` falls inside
    /// `[start, end)`, walking every cursor page in order.
    ///
    /// Each document's shape (order-backed vs. donation) is resolved here,
    /// once, into [`SourceTransaction`].
    pub async fn list_transactions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SourceTransaction>> {
        let mut out: Vec<SourceTransaction> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0usize;

        loop {
            page += 1;
            // The API rejects window filters combined with a cursor; the
            // cursor alone pins the window on follow-up pages.
            let query: Vec<(&str, String)> = match &cursor {
                Some(c) => vec![("cursor", c.clone())],
                None => vec![
                    ("modifiedAfter", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("modifiedBefore", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ],
            };

            let body: TransactionListResponse =
                self.get_json("1.0/commerce/transactions", &query).await?;
            let fetched = body.documents.len();
            debug!(page, fetched, "transactions page fetched");

            out.extend(body.documents.into_iter().map(SourceTransaction::resolve));

            match next_cursor(body.pagination) {
                Some(c) => {
                    if fetched == 0 {
                        bail!(
                            "pagination stuck: page {page} returned 0 documents \
                             but a next page was advertised"
                        );
                    }
                    cursor = Some(c);
                }
                None => break,
            }
        }

        Ok(out)
    }

    /// Fetch the full product list, flattened to catalog rows (one per
    /// variant SKU).
    pub async fn list_products(&self) -> Result<Vec<CatalogProduct>> {
        let mut out: Vec<CatalogProduct> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0usize;

        loop {
            page += 1;
            let query: Vec<(&str, String)> = match &cursor {
                Some(c) => vec![("cursor", c.clone())],
                None => vec![],
            };

            let body: ProductListResponse = self.get_json("1.0/commerce/products", &query).await?;
            let fetched = body.documents.len();
            debug!(page, fetched, "products page fetched");

            for doc in body.documents {
                for variant in &doc.variants {
                    let Some(sku) = variant.sku.as_deref().map(str::trim) else {
                        continue;
                    };
                    if sku.is_empty() {
                        continue;
                    }
                    out.push(CatalogProduct {
                        sku: sku.to_string(),
                        description: doc.name.clone(),
                        product_type: doc.product_type.clone(),
                    });
                }
            }

            match next_cursor(body.pagination) {
                Some(c) => {
                    if fetched == 0 {
                        bail!(
                            "pagination stuck: page {page} returned 0 documents \
                             but a next page was advertised"
                        );
                    }
                    cursor = Some(c);
                }
                None => break,
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl OrderLookup for CommerceClient {
    async fn fetch_order(&self, order_id: &str) -> Result<OrderDetail> {
        self.get_json(&format!("1.0/commerce/orders/{order_id}"), &[])
            .await
            .with_context(|| format!("order detail lookup failed for {order_id}"))
    }
}

fn next_cursor(pagination: Option<Pagination>) -> Option<String> {
    let p = pagination?;
    if !p.has_next_page {
        return None;
    }
    p.next_page_cursor
}
