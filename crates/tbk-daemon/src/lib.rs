//! tbk-daemon
//!
//! HTTP control plane for the Tillbook pipeline: ingestion and catalog-sync
//! triggers, the reconciliation report endpoint, and health. Run
//! orchestration lives in [`sync`]; mutual exclusion for runs lives in
//! [`gate`].

pub mod api_types;
pub mod gate;
pub mod routes;
pub mod state;
pub mod sync;
