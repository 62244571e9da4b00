//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM over SQLite with compile-time query
//! checking.

pub mod diesel_context;
pub mod diesel_models;
pub mod diesel_tender;
pub mod pool;
pub mod util;

use async_trait::async_trait;

use crate::models::{TenderFields, UpsertOutcome};

pub use diesel_context::DieselDbContext;
pub use diesel_tender::DieselTenderRepository;
pub use pool::{DbPool, DieselError};

/// Persistence contract used by the pipeline.
///
/// Implementations must be idempotent per `tender_id`: upserting the same
/// fields twice leaves one row whose identity and creation time are
/// unchanged. Concurrent calls must all succeed; the SQLite implementation
/// serializes them within the process.
#[async_trait]
pub trait TenderStore: Send + Sync {
    async fn upsert(&self, fields: &TenderFields) -> Result<UpsertOutcome, DieselError>;
}
