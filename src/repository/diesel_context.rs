//! Diesel database context for managing the connection pool and repository access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::diesel_tender::DieselTenderRepository;
use super::pool::{DbPool, DieselError};

/// Diesel database context that owns the pool and hands out repositories.
///
/// Create one context per command or service, then use it to access
/// repositories.
///
/// # Example
/// ```ignore
/// let ctx = DieselDbContext::new(&db_path);
/// ctx.init_schema().await?;
/// let total = ctx.tenders().count().await?;
/// ```
#[derive(Clone)]
pub struct DieselDbContext {
    pool: DbPool,
    tenders: DieselTenderRepository,
}

impl DieselDbContext {
    /// Create a new database context from a file path.
    pub fn new(db_path: &Path) -> Self {
        Self::with_pool(DbPool::from_path(db_path))
    }

    /// Create a new database context from a URL such as `sqlite:path/to/db`.
    pub fn from_url(database_url: &str) -> Self {
        Self::with_pool(DbPool::new(database_url))
    }

    /// Create a context with an existing pool.
    pub fn with_pool(pool: DbPool) -> Self {
        let tenders = DieselTenderRepository::new(pool.clone());
        Self { pool, tenders }
    }

    /// Get the tender repository.
    ///
    /// Clones share one write lock, so upserts issued through any of them
    /// are serialized within this process.
    pub fn tenders(&self) -> DieselTenderRepository {
        self.tenders.clone()
    }

    /// Create tables and indexes if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS tenders (
                uuid TEXT PRIMARY KEY,
                tender_id TEXT NOT NULL,
                announcement_number TEXT NOT NULL DEFAULT '',
                announcement_type TEXT NOT NULL DEFAULT '',
                order_name TEXT NOT NULL DEFAULT '',
                contracting_authority TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                authority_city TEXT NOT NULL DEFAULT '',
                authority_region TEXT NOT NULL DEFAULT '',
                publication_date TEXT NOT NULL,
                submission_deadline TEXT,
                details_url TEXT NOT NULL DEFAULT '',
                client_type TEXT,
                order_type TEXT,
                tender_type TEXT,
                notice_type_ted TEXT,
                notice_type_display_name TEXT,
                bzp_number TEXT,
                is_tender_amount_below_eu BOOLEAN,
                cpv_code TEXT,
                procedure_result TEXT,
                authority_country TEXT,
                authority_national_id TEXT,
                user_id TEXT,
                organization_id TEXT,
                mo_identifier TEXT,
                is_manually_linked_with_tender BOOLEAN,
                html_body TEXT,
                contractors TEXT,
                bzp_tender_plan_number TEXT,
                base_notice_mo_identifier TEXT,
                technical_notice_mo_identifier TEXT,
                outdated BOOLEAN,
                object_id TEXT,
                pdf_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_tenders_tender_id ON tenders(tender_id);
            CREATE INDEX IF NOT EXISTS idx_tenders_publication_date ON tenders(publication_date);
            CREATE INDEX IF NOT EXISTS idx_tenders_submission_deadline ON tenders(submission_deadline);
            "#,
        )
        .await
    }

    /// Get list of all tables in the database.
    pub async fn list_tables(&self) -> Result<Vec<String>, DieselError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<TableName> = diesel_async::RunQueryDsl::load(
            diesel::sql_query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            ),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }
}

#[derive(diesel::QueryableByName)]
struct TableName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}
