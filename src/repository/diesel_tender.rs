//! Diesel-based tender repository for SQLite.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! while keeping Diesel's compile-time query checking.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::diesel_models::{NewTender, TenderColumns, TenderRecord};
use super::pool::{DbPool, DieselError};
use super::util::{format_date, parse_date, parse_datetime, to_diesel_error};
use super::TenderStore;
use crate::models::{
    Tender, TenderFields, TenderOrderField, TenderOrdering, TenderQuery, UpsertOutcome,
};
use crate::schema::tenders;

/// Convert a database record to a domain model.
///
/// A stored publication date that no longer parses is an error rather than
/// a silent default.
impl TryFrom<TenderRecord> for Tender {
    type Error = DieselError;

    fn try_from(record: TenderRecord) -> Result<Self, Self::Error> {
        let publication_date = parse_date(&record.publication_date).ok_or_else(|| {
            to_diesel_error(format!(
                "Tender {} has invalid stored publication_date '{}'",
                record.tender_id, record.publication_date
            ))
        })?;
        let fields = TenderFields {
            tender_id: record.tender_id,
            announcement_number: record.announcement_number,
            announcement_type: record.announcement_type,
            order_name: record.order_name,
            contracting_authority: record.contracting_authority,
            description: record.description,
            authority_city: record.authority_city,
            authority_region: record.authority_region,
            publication_date,
            submission_deadline: record.submission_deadline.as_deref().and_then(parse_date),
            details_url: record.details_url,
            client_type: record.client_type,
            order_type: record.order_type,
            tender_type: record.tender_type,
            notice_type_ted: record.notice_type_ted,
            notice_type_display_name: record.notice_type_display_name,
            bzp_number: record.bzp_number,
            is_tender_amount_below_eu: record.is_tender_amount_below_eu,
            cpv_code: record.cpv_code,
            procedure_result: record.procedure_result,
            authority_country: record.authority_country,
            authority_national_id: record.authority_national_id,
            user_id: record.user_id,
            organization_id: record.organization_id,
            mo_identifier: record.mo_identifier,
            is_manually_linked_with_tender: record.is_manually_linked_with_tender,
            html_body: record.html_body,
            contractors: record
                .contractors
                .and_then(|raw| serde_json::from_str(&raw).ok()),
            bzp_tender_plan_number: record.bzp_tender_plan_number,
            base_notice_mo_identifier: record.base_notice_mo_identifier,
            technical_notice_mo_identifier: record.technical_notice_mo_identifier,
            outdated: record.outdated,
            object_id: record.object_id,
            pdf_url: record.pdf_url,
        };
        Ok(Tender {
            uuid: record.uuid,
            fields,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        })
    }
}

/// Diesel-based tender repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselTenderRepository {
    pool: DbPool,
    /// Serializes writers in this process. SQLite cannot upgrade a deferred
    /// read transaction to a write while another connection writes, and
    /// `busy_timeout` does not cover that case.
    write_lock: Arc<Mutex<()>>,
}

impl DieselTenderRepository {
    /// Create a new tender repository with an existing pool.
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Insert or fully overwrite the tender keyed by `fields.tender_id`.
    ///
    /// Runs in one transaction. An existing row keeps its `uuid` and
    /// `created_at`; every other column is replaced.
    pub async fn upsert(&self, fields: &TenderFields) -> Result<UpsertOutcome, DieselError> {
        let publication_date = format_date(fields.publication_date);
        let submission_deadline = fields.submission_deadline.map(format_date);
        let contractors = fields
            .contractors
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(to_diesel_error)?;
        let now = Utc::now().to_rfc3339();
        let now = now.as_str();
        let tender_id = fields.tender_id.as_str();
        let columns = TenderColumns::new(
            fields,
            &publication_date,
            submission_deadline.as_deref(),
            contractors.as_deref(),
            now,
        );

        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.get().await?;

        let (record, created) = conn
            .transaction(|conn| {
                Box::pin(async move {
                    let existing: Option<String> = tenders::table
                        .filter(tenders::tender_id.eq(tender_id))
                        .select(tenders::uuid)
                        .first(conn)
                        .await
                        .optional()?;

                    let (uuid, created) = match existing {
                        Some(uuid) => {
                            diesel::update(tenders::table.find(&uuid))
                                .set(&columns)
                                .execute(conn)
                                .await?;
                            (uuid, false)
                        }
                        None => {
                            let uuid = Uuid::new_v4().to_string();
                            diesel::insert_into(tenders::table)
                                .values(NewTender {
                                    uuid: &uuid,
                                    tender_id,
                                    created_at: now,
                                    columns,
                                })
                                .execute(conn)
                                .await?;
                            (uuid, true)
                        }
                    };

                    let record = tenders::table
                        .find(&uuid)
                        .select(TenderRecord::as_select())
                        .first(conn)
                        .await?;

                    Ok::<_, DieselError>((record, created))
                })
            })
            .await?;

        Ok(UpsertOutcome {
            tender: Tender::try_from(record)?,
            created,
        })
    }

    /// Get a tender by its external identifier.
    pub async fn get_by_tender_id(&self, tender_id: &str) -> Result<Option<Tender>, DieselError> {
        let mut conn = self.pool.get().await?;

        tenders::table
            .filter(tenders::tender_id.eq(tender_id))
            .select(TenderRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Tender::try_from)
            .transpose()
    }

    /// List tenders matching a query.
    pub async fn list(&self, query: &TenderQuery) -> Result<Vec<Tender>, DieselError> {
        let mut conn = self.pool.get().await?;

        let mut sql = tenders::table
            .select(TenderRecord::as_select())
            .into_boxed();

        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            // SQLite LIKE is case-insensitive for ASCII.
            let pattern = format!("%{}%", search);
            sql = sql.filter(
                tenders::tender_id
                    .like(pattern.clone())
                    .or(tenders::order_name.like(pattern.clone()))
                    .or(tenders::description.like(pattern.clone()))
                    .or(tenders::contracting_authority.like(pattern)),
            );
        }

        sql = match query.ordering {
            TenderOrdering {
                field: TenderOrderField::PublicationDate,
                descending: true,
            } => sql.order(tenders::publication_date.desc()),
            TenderOrdering {
                field: TenderOrderField::PublicationDate,
                descending: false,
            } => sql.order(tenders::publication_date.asc()),
            TenderOrdering {
                field: TenderOrderField::SubmissionDeadline,
                descending: true,
            } => sql.order(tenders::submission_deadline.desc()),
            TenderOrdering {
                field: TenderOrderField::SubmissionDeadline,
                descending: false,
            } => sql.order(tenders::submission_deadline.asc()),
            TenderOrdering {
                field: TenderOrderField::CreatedAt,
                descending: true,
            } => sql.order(tenders::created_at.desc()),
            TenderOrdering {
                field: TenderOrderField::CreatedAt,
                descending: false,
            } => sql.order(tenders::created_at.asc()),
        };

        sql.then_order_by(tenders::tender_id.asc())
            .limit(query.limit)
            .load::<TenderRecord>(&mut conn)
            .await?
            .into_iter()
            .map(Tender::try_from)
            .collect()
    }

    /// Count stored tenders.
    pub async fn count(&self) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;

        tenders::table.count().get_result(&mut conn).await
    }

    /// Most recent publication date stored, if any.
    pub async fn latest_publication_date(&self) -> Result<Option<NaiveDate>, DieselError> {
        let mut conn = self.pool.get().await?;

        let latest: Option<String> = tenders::table
            .select(diesel::dsl::max(tenders::publication_date))
            .first(&mut conn)
            .await?;

        Ok(latest.as_deref().and_then(parse_date))
    }
}

#[async_trait]
impl TenderStore for DieselTenderRepository {
    async fn upsert(&self, fields: &TenderFields) -> Result<UpsertOutcome, DieselError> {
        DieselTenderRepository::upsert(self, fields).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DieselDbContext;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DieselTenderRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DieselDbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (ctx.tenders(), dir)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample(tender_id: &str) -> TenderFields {
        let mut fields = TenderFields::new(tender_id, date(2024, 6, 1));
        fields.order_name = "Road resurfacing".to_string();
        fields.description = "Road resurfacing".to_string();
        fields.contracting_authority = "Gmina Testowo".to_string();
        fields.details_url = format!("https://example.test/notice/{tender_id}");
        fields.cpv_code = Some("45233142-6".to_string());
        fields.contractors = Some(json!([{"name": "ACME", "nip": "123"}]));
        fields
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (repo, _dir) = setup_test_db().await;
        let fields = sample("T-1");

        let first = repo.upsert(&fields).await.unwrap();
        assert!(first.created);

        let second = repo.upsert(&fields).await.unwrap();
        assert!(!second.created);

        assert_eq!(first.tender.uuid, second.tender.uuid);
        assert_eq!(first.tender.created_at, second.tender.created_at);
        assert_eq!(first.tender.fields, second.tender.fields);
        assert_eq!(second.tender.fields, fields);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_optionals_with_null() {
        let (repo, _dir) = setup_test_db().await;
        let fields = sample("T-2");
        repo.upsert(&fields).await.unwrap();

        let mut later = fields.clone();
        later.cpv_code = None;
        later.contractors = None;
        later.order_name = "Road resurfacing, stage 2".to_string();
        later.submission_deadline = Some(date(2024, 7, 15));
        let outcome = repo.upsert(&later).await.unwrap();
        assert!(!outcome.created);

        let stored = repo.get_by_tender_id("T-2").await.unwrap().unwrap();
        assert_eq!(stored.fields.cpv_code, None);
        assert_eq!(stored.fields.contractors, None);
        assert_eq!(stored.fields.order_name, "Road resurfacing, stage 2");
        assert_eq!(stored.fields.submission_deadline, Some(date(2024, 7, 15)));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_distinct_ids() {
        let (repo, _dir) = setup_test_db().await;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.upsert(&sample(&format!("T-{i}"))).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().created);
        }

        assert_eq!(repo.count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_list_search_and_ordering() {
        let (repo, _dir) = setup_test_db().await;

        let mut a = sample("A-1");
        a.publication_date = date(2024, 6, 1);
        a.order_name = "School catering".to_string();
        let mut b = sample("B-2");
        b.publication_date = date(2024, 6, 3);
        let mut c = sample("C-3");
        c.publication_date = date(2024, 6, 2);
        for fields in [&a, &b, &c] {
            repo.upsert(fields).await.unwrap();
        }

        let newest_first = repo.list(&TenderQuery::default()).await.unwrap();
        let ids: Vec<_> = newest_first.iter().map(|t| t.tender_id()).collect();
        assert_eq!(ids, vec!["B-2", "C-3", "A-1"]);

        let query = TenderQuery {
            search: Some("catering".to_string()),
            ordering: TenderOrdering::parse("publication_date").unwrap(),
            limit: 10,
        };
        let found = repo.list(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tender_id(), "A-1");

        assert_eq!(
            repo.latest_publication_date().await.unwrap(),
            Some(date(2024, 6, 3))
        );
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_same_id_leave_one_row() {
        let (repo, _dir) = setup_test_db().await;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                let mut fields = sample("T-same");
                fields.order_name = format!("Revision {i}");
                tokio::spawn(async move { repo.upsert(&fields).await })
            })
            .collect();
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_stored_date_is_an_error() {
        let (repo, _dir) = setup_test_db().await;
        repo.upsert(&sample("T-bad")).await.unwrap();

        let mut conn = repo.pool.get().await.unwrap();
        diesel::sql_query("UPDATE tenders SET publication_date = 'last tuesday'")
            .execute(&mut conn)
            .await
            .unwrap();

        let err = repo.get_by_tender_id("T-bad").await.unwrap_err();
        assert!(err.to_string().contains("last tuesday"));
        assert!(repo.list(&TenderQuery::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (repo, _dir) = setup_test_db().await;
        assert!(repo.get_by_tender_id("nope").await.unwrap().is_none());
        assert_eq!(repo.latest_publication_date().await.unwrap(), None);
    }
}
