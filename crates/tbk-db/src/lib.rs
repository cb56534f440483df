//! tbk-db
//!
//! Postgres store for the ingestion pipeline: the canonical `orders` table
//! (idempotent upsert keyed by external transaction id), the single-row
//! sync watermark, and the reference product catalog.
//!
//! Conventions:
//! - `sqlx::query` + binds (no macros).
//! - Inserted-vs-updated discrimination via `returning (xmax = 0)`.
//! - The watermark surface is intentionally narrow: `watermark_get` /
//!   `watermark_advance`, nothing else. Only a successful ingestion run's
//!   final step calls `watermark_advance`.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tbk_schemas::{CanonicalOrder, CatalogProduct, OrderIssue, PaymentPlatform};

pub const ENV_DB_URL: &str = "TBK_DATABASE_URL";

/// Connect to Postgres using TBK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Order rows
// ---------------------------------------------------------------------------

/// Flattened storage shape of a [`CanonicalOrder`]: platform as its
/// canonical label, issues reduced to message strings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub transaction_id: String,
    pub order_id: Option<String>,
    pub order_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub platform: String,
    pub skus: Vec<String>,
    pub user_names: Vec<String>,
    pub user_emails: Vec<String>,
    pub user_amounts_cents: Vec<i64>,
    pub issues: Vec<String>,
    pub member_pids: Vec<String>,
}

impl OrderRow {
    pub fn from_canonical(order: &CanonicalOrder) -> Self {
        Self {
            transaction_id: order.transaction_id.clone(),
            order_id: order.order_id.clone(),
            order_date: order.date,
            created_at: order.created_at,
            updated_at: order.updated_at,
            amount_cents: order.amount_cents,
            fee_cents: order.fee_cents,
            platform: order.platform.as_str().to_string(),
            skus: order.skus.clone(),
            user_names: order.names.clone(),
            user_emails: order.emails.clone(),
            user_amounts_cents: order.amounts_cents.clone(),
            issues: order.issue_messages(),
            member_pids: order.member_pids.clone(),
        }
    }

    pub fn into_canonical(self) -> Result<CanonicalOrder> {
        let platform = PaymentPlatform::parse(&self.platform).ok_or_else(|| {
            anyhow!(
                "orders row {} has platform label outside the closed set: '{}'",
                self.transaction_id,
                self.platform
            )
        })?;
        Ok(CanonicalOrder {
            transaction_id: self.transaction_id,
            order_id: self.order_id,
            date: self.order_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
            amount_cents: self.amount_cents,
            fee_cents: self.fee_cents,
            platform,
            skus: self.skus,
            names: self.user_names,
            emails: self.user_emails,
            amounts_cents: self.user_amounts_cents,
            issues: self.issues.into_iter().map(OrderIssue::new).collect(),
            member_pids: self.member_pids,
        })
    }
}

/// Counters returned by [`upsert_orders`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub written: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Idempotently upsert a batch of canonical orders.
///
/// Re-running the same window yields the same final rows: a matching
/// `transaction_id` is updated in place, never duplicated. `member_pids` is
/// left out of the conflict update so matching results survive a re-ingest.
pub async fn upsert_orders(pool: &PgPool, orders: &[CanonicalOrder]) -> Result<UpsertStats> {
    let mut stats = UpsertStats::default();

    for order in orders {
        let row = OrderRow::from_canonical(order);
        // inserted = (xmax = 0) in Postgres (true on insert, false on update).
        let inserted: bool = sqlx::query_scalar(
            r#"
            insert into orders (
              transaction_id, order_id, order_date, created_at, updated_at,
              amount_cents, fee_cents, platform,
              skus, user_names, user_emails, user_amounts_cents,
              issues, member_pids
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
            on conflict (transaction_id) do update set
              order_id = excluded.order_id,
              order_date = excluded.order_date,
              created_at = excluded.created_at,
              updated_at = excluded.updated_at,
              amount_cents = excluded.amount_cents,
              fee_cents = excluded.fee_cents,
              platform = excluded.platform,
              skus = excluded.skus,
              user_names = excluded.user_names,
              user_emails = excluded.user_emails,
              user_amounts_cents = excluded.user_amounts_cents,
              issues = excluded.issues
            returning (xmax = 0)
            "#,
        )
        .bind(&row.transaction_id)
        .bind(&row.order_id)
        .bind(row.order_date)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.amount_cents)
        .bind(row.fee_cents)
        .bind(&row.platform)
        .bind(&row.skus)
        .bind(&row.user_names)
        .bind(&row.user_emails)
        .bind(&row.user_amounts_cents)
        .bind(&row.issues)
        .bind(&row.member_pids)
        .fetch_one(pool)
        .await
        .with_context(|| format!("upsert orders row failed for {}", row.transaction_id))?;

        stats.written += 1;
        if inserted {
            stats.inserted += 1;
        } else {
            stats.updated += 1;
        }
    }

    Ok(stats)
}

/// Load canonical orders whose `order_date` falls inside `[from, to)`,
/// in stable `(order_date, transaction_id)` order.
pub async fn load_orders_in_range(
    pool: &PgPool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<CanonicalOrder>> {
    let rows = sqlx::query(
        r#"
        select
          transaction_id, order_id, order_date, created_at, updated_at,
          amount_cents, fee_cents, platform,
          skus, user_names, user_emails, user_amounts_cents,
          issues, member_pids
        from orders
        where order_date >= $1
          and order_date < $2
        order by order_date asc, transaction_id asc
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("load_orders_in_range query failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let row = OrderRow {
            transaction_id: r.try_get("transaction_id").context("orders.transaction_id")?,
            order_id: r.try_get("order_id").context("orders.order_id")?,
            order_date: r.try_get("order_date").context("orders.order_date")?,
            created_at: r.try_get("created_at").context("orders.created_at")?,
            updated_at: r.try_get("updated_at").context("orders.updated_at")?,
            amount_cents: r.try_get("amount_cents").context("orders.amount_cents")?,
            fee_cents: r.try_get("fee_cents").context("orders.fee_cents")?,
            platform: r.try_get("platform").context("orders.platform")?,
            skus: r.try_get("skus").context("orders.skus")?,
            user_names: r.try_get("user_names").context("orders.user_names")?,
            user_emails: r.try_get("user_emails").context("orders.user_emails")?,
            user_amounts_cents: r
                .try_get("user_amounts_cents")
                .context("orders.user_amounts_cents")?,
            issues: r.try_get("issues").context("orders.issues")?,
            member_pids: r.try_get("member_pids").context("orders.member_pids")?,
        };
        out.push(row.into_canonical()?);
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Sync watermark
// ---------------------------------------------------------------------------

/// Read the end of the last successfully ingested window, if any run has
/// ever completed.
pub async fn watermark_get(pool: &PgPool) -> Result<Option<DateTime<Utc>>> {
    let row = sqlx::query(
        r#"
        select last_synced_at from sync_state where id = 1
        "#,
    )
    .fetch_optional(pool)
    .await
    .context("watermark_get query failed")?;

    match row {
        Some(r) => Ok(Some(
            r.try_get("last_synced_at").context("sync_state.last_synced_at")?,
        )),
        None => Ok(None),
    }
}

/// Advance the watermark to `ts`. Called exactly once per successful
/// ingestion run, after the whole batch write has succeeded.
pub async fn watermark_advance(pool: &PgPool, ts: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        insert into sync_state (id, last_synced_at)
        values (1, $1)
        on conflict (id) do update set
          last_synced_at = excluded.last_synced_at
        "#,
    )
    .bind(ts)
    .execute(pool)
    .await
    .context("watermark_advance failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Product catalog
// ---------------------------------------------------------------------------

/// Upsert the product catalog rows fetched from the storefront. Returns the
/// number of rows written.
pub async fn upsert_products(pool: &PgPool, products: &[CatalogProduct]) -> Result<usize> {
    for p in products {
        sqlx::query(
            r#"
            insert into products (sku, description, product_type)
            values ($1, $2, $3)
            on conflict (sku) do update set
              description = excluded.description,
              product_type = excluded.product_type
            "#,
        )
        .bind(&p.sku)
        .bind(&p.description)
        .bind(&p.product_type)
        .execute(pool)
        .await
        .with_context(|| format!("upsert products row failed for {}", p.sku))?;
    }
    Ok(products.len())
}

/// All catalog SKUs, for the normalizer's unknown-SKU check.
pub async fn load_catalog_skus(pool: &PgPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        select sku from products order by sku asc
        "#,
    )
    .fetch_all(pool)
    .await
    .context("load_catalog_skus query failed")?;

    rows.into_iter()
        .map(|r| r.try_get::<String, _>("sku").context("products.sku"))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
