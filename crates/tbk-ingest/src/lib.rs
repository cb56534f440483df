//! tbk-ingest
//!
//! Normalization stage of the ingestion pipeline: converts raw storefront
//! transactions into canonical orders (with record-level data-quality
//! issues) and drives that conversion over a fetched window in paced,
//! bounded-parallel chunks.
//!
//! Fetching lives in `tbk-commerce`; persistence lives in `tbk-db`.

pub mod batch;
pub mod normalize;

#[cfg(test)]
pub(crate) mod testutil;

pub use batch::{process_all, BatchOutcome, Pacing, BATCH_PACING, BATCH_SIZE};
pub use normalize::{Normalizer, SkuCatalog, DONATION_SKU, FALLBACK_SKU};
