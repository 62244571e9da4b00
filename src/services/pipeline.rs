//! Fetch, normalize and upsert one window of tenders.
//!
//! A run walks the search endpoint page by page. Records of a page are
//! normalized and stored concurrently; a bad record is counted and logged
//! but never aborts the run. A page that cannot be fetched ends the run
//! with whatever was accumulated so far.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::repository::TenderStore;
use crate::scrapers::pagination::{DEFAULT_API_BASE_URL, DEFAULT_PAGE_SIZE};
use crate::scrapers::{ConcurrencyGate, Fetcher, Paginator, SearchQuery, StopReason};
use crate::services::normalize::Normalizer;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub api_base_url: String,
    pub page_size: u32,
    /// Pause between page requests.
    pub page_delay: Duration,
    /// Records of one page processed at the same time.
    pub record_concurrency: usize,
    pub cpv_code: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::from_secs(1),
            record_concurrency: 4,
            cpv_code: None,
        }
    }
}

/// Aggregate counts of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Raw records received.
    pub fetched: usize,
    /// Records stored (created or updated).
    pub processed: usize,
    /// Of `processed`, records seen for the first time.
    pub created: usize,
    /// Records without any identifier.
    pub skipped: usize,
    /// Records rejected by normalization or the store.
    pub failed: usize,
    /// Pages that yielded records.
    pub pages: u32,
    pub stop_reason: Option<StopReason>,
}

enum RecordOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

/// Wires fetcher, normalizer and store into a single run.
pub struct TenderPipeline {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn TenderStore>,
    gate: ConcurrencyGate,
    normalizer: Normalizer,
    api_base_url: Url,
    config: PipelineConfig,
}

impl TenderPipeline {
    /// Build a pipeline. Fails only if the configured endpoint is not a URL.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn TenderStore>,
        gate: ConcurrencyGate,
        normalizer: Normalizer,
        config: PipelineConfig,
    ) -> Result<Self, url::ParseError> {
        let api_base_url = Url::parse(&config.api_base_url)?;
        Ok(Self {
            fetcher,
            store,
            gate,
            normalizer,
            api_base_url,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingest everything published in the last `days_back` days, reading at
    /// most `max_pages` pages.
    ///
    /// Upstream and per-record failures are reflected in the summary; this
    /// never fails.
    pub async fn run(&self, days_back: u32, max_pages: u32) -> RunSummary {
        let query = SearchQuery::for_url(
            self.api_base_url.clone(),
            Utc::now(),
            days_back,
            self.config.page_size,
        )
        .with_cpv_code(self.config.cpv_code.clone());

        info!(
            "Starting run via {} (since {}, max {} pages)",
            self.fetcher.name(),
            query.publication_date_from(),
            max_pages
        );

        let mut pages = Paginator::new(self.fetcher.clone(), self.gate.clone(), query, max_pages)
            .with_page_delay(self.config.page_delay);
        let today = Local::now().date_naive();
        let mut summary = RunSummary::default();

        while let Some(records) = pages.next_page().await {
            summary.fetched += records.len();

            // Futures are built up front so the stream holds no borrowing closure.
            let pending: Vec<_> = records
                .iter()
                .map(|raw| self.process_record(raw, today))
                .collect();
            let outcomes: Vec<RecordOutcome> = stream::iter(pending)
                .buffer_unordered(self.config.record_concurrency.max(1))
                .collect()
                .await;

            for outcome in outcomes {
                match outcome {
                    RecordOutcome::Created => {
                        summary.processed += 1;
                        summary.created += 1;
                    }
                    RecordOutcome::Updated => summary.processed += 1,
                    RecordOutcome::Skipped => summary.skipped += 1,
                    RecordOutcome::Failed => summary.failed += 1,
                }
            }

            info!(
                "Progress: {} fetched, {} processed",
                summary.fetched, summary.processed
            );
        }

        summary.pages = pages.pages_fetched();
        summary.stop_reason = pages.stop_reason();
        if let Some(error) = pages.last_error() {
            warn!("Run ended early: {}", error);
        }

        info!(
            "Run finished ({}): {} fetched, {} processed ({} new), {} skipped, {} failed over {} pages",
            summary
                .stop_reason
                .map(|r| r.as_str())
                .unwrap_or("unknown"),
            summary.fetched,
            summary.processed,
            summary.created,
            summary.skipped,
            summary.failed,
            summary.pages
        );

        summary
    }

    async fn process_record(&self, raw: &Value, today: NaiveDate) -> RecordOutcome {
        let fields = match self.normalizer.normalize(raw, today) {
            Ok(Some(fields)) => fields,
            Ok(None) => return RecordOutcome::Skipped,
            Err(e) => {
                warn!("Rejected record: {}", e);
                return RecordOutcome::Failed;
            }
        };

        match self.store.upsert(&fields).await {
            Ok(outcome) if outcome.created => {
                debug!("Created tender {}", fields.tender_id);
                RecordOutcome::Created
            }
            Ok(_) => {
                debug!("Updated tender {}", fields.tender_id);
                RecordOutcome::Updated
            }
            Err(e) => {
                warn!("Failed to store tender {}: {}", fields.tender_id, e);
                RecordOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tender, TenderFields, UpsertOutcome};
    use crate::repository::{DieselError, util::to_diesel_error};
    use crate::scrapers::{AttemptError, FetchError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns prepared pages in order, then errors.
    struct ScriptedFetcher {
        pages: Mutex<Vec<Result<Value, ()>>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Result<Value, ()>>) -> Arc<Self> {
            let mut pages = pages;
            pages.reverse();
            Arc::new(Self {
                pages: Mutex::new(pages),
            })
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
            match self.pages.lock().unwrap().pop() {
                Some(Ok(value)) => Ok(value),
                _ => Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: 3,
                    last_error: AttemptError::Status(503),
                }),
            }
        }

        async fn fetch_html(&self, _url: &str) -> Result<String, FetchError> {
            Ok(String::new())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    /// In-memory store that can be told to fail for specific ids.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<String, TenderFields>>,
        fail_ids: Vec<String>,
    }

    #[async_trait]
    impl TenderStore for MemoryStore {
        async fn upsert(&self, fields: &TenderFields) -> Result<UpsertOutcome, DieselError> {
            if self.fail_ids.contains(&fields.tender_id) {
                return Err(to_diesel_error("database is locked"));
            }
            let created = self
                .rows
                .lock()
                .unwrap()
                .insert(fields.tender_id.clone(), fields.clone())
                .is_none();
            let now = Utc::now();
            Ok(UpsertOutcome {
                tender: Tender {
                    uuid: format!("uuid-{}", fields.tender_id),
                    fields: fields.clone(),
                    created_at: now,
                    updated_at: now,
                },
                created,
            })
        }
    }

    fn pipeline(fetcher: Arc<ScriptedFetcher>, store: Arc<MemoryStore>) -> TenderPipeline {
        TenderPipeline::new(
            fetcher,
            store,
            ConcurrencyGate::default(),
            Normalizer::default(),
            PipelineConfig::default(),
        )
        .unwrap()
    }

    fn record(id: usize) -> Value {
        json!({
            "tenderId": format!("T-{id}"),
            "orderObject": format!("Order {id}"),
            "publicationDate": "2024-06-01T00:00:00.000Z"
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_record_is_isolated() {
        let mut records: Vec<Value> = (1..=10).map(record).collect();
        records[4] = json!({"tenderId": "T-5", "publicationDate": "not-a-date"});
        let fetcher = ScriptedFetcher::new(vec![Ok(Value::Array(records)), Ok(json!([]))]);
        let store = Arc::new(MemoryStore::default());

        let summary = pipeline(fetcher, store.clone()).run(7, 100).await;

        assert_eq!(summary.fetched, 10);
        assert_eq!(summary.processed, 9);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.stop_reason, Some(StopReason::Exhausted));
        assert_eq!(store.rows.lock().unwrap().len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_and_store_failures_are_counted() {
        let records = vec![record(1), json!({"orderObject": "anonymous"}), record(3)];
        let fetcher = ScriptedFetcher::new(vec![Ok(Value::Array(records))]);
        let store = Arc::new(MemoryStore {
            fail_ids: vec!["T-3".to_string()],
            ..Default::default()
        });

        let summary = pipeline(fetcher, store).run(7, 1).await;

        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.stop_reason, Some(StopReason::PageCap));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_keeps_accumulated_counts() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(json!({"items": [record(1), record(2)], "totalPages": 5})),
            Err(()),
        ]);
        let store = Arc::new(MemoryStore::default());

        let summary = pipeline(fetcher, store).run(7, 100).await;

        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.stop_reason, Some(StopReason::FetchFailed));
    }

    #[tokio::test]
    async fn test_run_can_be_spawned() {
        let fetcher = ScriptedFetcher::new(vec![Ok(Value::Array(vec![record(1), record(2)]))]);
        let store = Arc::new(MemoryStore::default());
        let pipeline = Arc::new(pipeline(fetcher, store.clone()));

        let summary = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.run(7, 1).await }
        })
        .await
        .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_updates_instead_of_creating() {
        let store = Arc::new(MemoryStore::default());
        let page = || Ok(Value::Array(vec![record(1), record(2)]));

        let first = pipeline(ScriptedFetcher::new(vec![page()]), store.clone())
            .run(7, 1)
            .await;
        let second = pipeline(ScriptedFetcher::new(vec![page()]), store.clone())
            .run(7, 1)
            .await;

        assert_eq!(first.created, 2);
        assert_eq!(second.processed, 2);
        assert_eq!(second.created, 0);
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }
}
