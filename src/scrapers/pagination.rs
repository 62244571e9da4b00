//! Paginated walk over the board search endpoint.
//!
//! Pages are requested strictly in order, one at a time, with a fixed delay
//! between requests. The walk ends on the first of: page cap, fetch failure,
//! empty page, or the last page reported by the server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::gate::ConcurrencyGate;
use super::Fetcher;

/// Default upstream search endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://ezamowienia.gov.pl/mo-board/api/v1/Board/Search";

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Query parameters for one run of the search endpoint.
///
/// The publication window's lower bound is fixed when the query is built,
/// so every page of a run sees the same window.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    base_url: Url,
    publication_date_from: String,
    page_size: u32,
    cpv_code: Option<String>,
}

impl SearchQuery {
    /// Query for records published in the last `days_back` days.
    pub fn new(base_url: &str, days_back: u32, page_size: u32) -> Result<Self, url::ParseError> {
        Self::at(base_url, Utc::now(), days_back, page_size)
    }

    /// Like `new`, with an explicit notion of "now".
    pub fn at(
        base_url: &str,
        now: DateTime<Utc>,
        days_back: u32,
        page_size: u32,
    ) -> Result<Self, url::ParseError> {
        Ok(Self::for_url(Url::parse(base_url)?, now, days_back, page_size))
    }

    /// Build from an already parsed endpoint URL.
    pub fn for_url(base_url: Url, now: DateTime<Utc>, days_back: u32, page_size: u32) -> Self {
        let from = now - chrono::Duration::days(i64::from(days_back));
        Self {
            base_url,
            publication_date_from: from.format("%Y-%m-%dT00:00:00.000Z").to_string(),
            page_size: page_size.max(1),
            cpv_code: None,
        }
    }

    /// Restrict results to one CPV classification code.
    pub fn with_cpv_code(mut self, cpv_code: Option<String>) -> Self {
        self.cpv_code = cpv_code.filter(|c| !c.is_empty());
        self
    }

    pub fn publication_date_from(&self) -> &str {
        &self.publication_date_from
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// URL for a 1-based page number.
    pub fn page_url(&self, page: u32) -> String {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("publicationDateFrom", &self.publication_date_from);
            if let Some(ref cpv) = self.cpv_code {
                pairs.append_pair("cpvCode", cpv);
            }
            pairs
                .append_pair("SortingColumnName", "PublicationDate")
                .append_pair("SortingDirection", "DESC")
                .append_pair("PageNumber", &page.to_string())
                .append_pair("PageSize", &self.page_size.to_string());
        }
        url.into()
    }
}

/// Why a pagination walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured page cap was reached.
    PageCap,
    /// A page could not be fetched after all retries.
    FetchFailed,
    /// The server returned an empty page.
    Exhausted,
    /// The server's reported page count was reached.
    LastPage,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::PageCap => "page_cap",
            StopReason::FetchFailed => "fetch_failed",
            StopReason::Exhausted => "exhausted",
            StopReason::LastPage => "last_page",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a response into its records and the total page count, if reported.
///
/// Accepts a bare array or an object with an `items` array and optional
/// `totalPages`. Anything else is treated as an empty page.
pub fn parse_page(value: Value) -> (Vec<Value>, Option<u32>) {
    match value {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => {
            let total = map
                .get("totalPages")
                .and_then(Value::as_u64)
                .map(|t| u32::try_from(t).unwrap_or(u32::MAX));
            match map.remove("items") {
                Some(Value::Array(items)) => (items, total),
                _ => (Vec::new(), total),
            }
        }
        _ => (Vec::new(), None),
    }
}

/// Streams pages of raw records from the search endpoint.
pub struct Paginator {
    fetcher: Arc<dyn Fetcher>,
    gate: ConcurrencyGate,
    query: SearchQuery,
    max_pages: u32,
    page_delay: Duration,
    page: u32,
    total_pages: Option<u32>,
    pages_fetched: u32,
    requests_issued: u32,
    stop_reason: Option<StopReason>,
    last_error: Option<String>,
}

impl Paginator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        gate: ConcurrencyGate,
        query: SearchQuery,
        max_pages: u32,
    ) -> Self {
        Self {
            fetcher,
            gate,
            query,
            max_pages,
            page_delay: Duration::from_secs(1),
            page: 1,
            total_pages: None,
            pages_fetched: 0,
            requests_issued: 0,
            stop_reason: None,
            last_error: None,
        }
    }

    /// Delay slept before every request after the first.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Fetch the next page, or `None` once the walk has ended.
    pub async fn next_page(&mut self) -> Option<Vec<Value>> {
        if self.stop_reason.is_some() {
            return None;
        }

        if self.page > self.max_pages {
            info!("Reached page cap ({})", self.max_pages);
            return self.stop(StopReason::PageCap);
        }
        if let Some(total) = self.total_pages {
            if self.page > total {
                info!("Reached last page ({})", total);
                return self.stop(StopReason::LastPage);
            }
        }

        if self.requests_issued > 0 && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        let url = self.query.page_url(self.page);
        debug!("Fetching page {}: {}", self.page, url);

        let permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Concurrency gate closed before page {}: {}", self.page, e);
                self.last_error = Some(e.to_string());
                return self.stop(StopReason::FetchFailed);
            }
        };
        self.requests_issued += 1;
        let result = self.fetcher.fetch_json(&url).await;
        drop(permit);

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                warn!("Page {} failed, stopping: {}", self.page, e);
                self.last_error = Some(e.to_string());
                return self.stop(StopReason::FetchFailed);
            }
        };

        let (items, total) = parse_page(value);
        if items.is_empty() {
            info!("Page {} is empty, no more results", self.page);
            return self.stop(StopReason::Exhausted);
        }
        if total.is_some() {
            self.total_pages = total;
        }

        info!(
            "Page {}{}: {} records",
            self.page,
            self.total_pages
                .map(|t| format!("/{}", t))
                .unwrap_or_default(),
            items.len()
        );

        self.pages_fetched += 1;
        self.page += 1;
        Some(items)
    }

    /// Drain every remaining page into one list.
    pub async fn collect_all(&mut self) -> Vec<Value> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await {
            all.extend(items);
        }
        all
    }

    fn stop(&mut self, reason: StopReason) -> Option<Vec<Value>> {
        self.stop_reason = Some(reason);
        None
    }

    /// Why the walk ended, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Pages that yielded records.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Requests sent, including the one that ended the walk.
    pub fn requests_issued(&self) -> u32 {
        self.requests_issued
    }

    /// Message of the error that ended the walk, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::{AttemptError, FetchError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves canned responses by page number and records requested URLs.
    struct PagedFetcher {
        respond: Box<dyn Fn(u32) -> Result<Value, FetchError> + Send + Sync>,
        urls: Mutex<Vec<String>>,
    }

    impl PagedFetcher {
        fn new(respond: impl Fn(u32) -> Result<Value, FetchError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                respond: Box::new(respond),
                urls: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> usize {
            self.urls.lock().unwrap().len()
        }
    }

    fn page_number(url: &str) -> u32 {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "PageNumber")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap()
    }

    #[async_trait]
    impl Fetcher for PagedFetcher {
        async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
            self.urls.lock().unwrap().push(url.to_string());
            (self.respond)(page_number(url))
        }

        async fn fetch_html(&self, _url: &str) -> Result<String, FetchError> {
            Ok(String::new())
        }

        fn name(&self) -> &'static str {
            "paged"
        }
    }

    fn query() -> SearchQuery {
        let now = Utc.with_ymd_and_hms(2024, 6, 8, 15, 30, 0).unwrap();
        SearchQuery::at("https://api.example.test/Board/Search", now, 7, 10).unwrap()
    }

    fn paginator(fetcher: Arc<PagedFetcher>, max_pages: u32) -> Paginator {
        Paginator::new(fetcher, ConcurrencyGate::new(8), query(), max_pages)
    }

    #[test]
    fn test_page_url_parameters() {
        let url = query().with_cpv_code(Some("45000000-7".into())).page_url(3);
        assert_eq!(
            url,
            "https://api.example.test/Board/Search?publicationDateFrom=2024-06-01T00%3A00%3A00.000Z\
             &cpvCode=45000000-7&SortingColumnName=PublicationDate&SortingDirection=DESC\
             &PageNumber=3&PageSize=10"
        );
    }

    #[test]
    fn test_parse_page_shapes() {
        let (items, total) = parse_page(json!([{"a": 1}]));
        assert_eq!((items.len(), total), (1, None));

        let (items, total) = parse_page(json!({"items": [{"a": 1}, {"b": 2}], "totalPages": 4}));
        assert_eq!((items.len(), total), (2, Some(4)));

        let (items, total) = parse_page(json!({"message": "nope"}));
        assert_eq!((items.len(), total), (0, None));

        let (items, _) = parse_page(json!("string"));
        assert!(items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_reported_last_page() {
        let fetcher = PagedFetcher::new(|page| {
            Ok(json!({"items": [{"tenderId": format!("T-{page}")}], "totalPages": 3}))
        });
        let mut pages = paginator(fetcher.clone(), 100);

        let records = pages.collect_all().await;

        assert_eq!(records.len(), 3);
        assert_eq!(fetcher.requests(), 3);
        assert_eq!(pages.pages_fetched(), 3);
        assert_eq!(pages.stop_reason(), Some(StopReason::LastPage));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_page_cap() {
        let fetcher = PagedFetcher::new(|page| Ok(json!([{"tenderId": format!("T-{page}")}])));
        let mut pages = paginator(fetcher.clone(), 5);

        let records = pages.collect_all().await;

        assert_eq!(records.len(), 5);
        assert_eq!(fetcher.requests(), 5);
        assert_eq!(pages.stop_reason(), Some(StopReason::PageCap));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_empty_page() {
        let fetcher = PagedFetcher::new(|page| {
            if page < 3 {
                Ok(json!([{"tenderId": format!("T-{page}")}]))
            } else {
                Ok(json!([]))
            }
        });
        let mut pages = paginator(fetcher.clone(), 100);

        assert_eq!(pages.collect_all().await.len(), 2);
        assert_eq!(pages.requests_issued(), 3);
        assert_eq!(pages.stop_reason(), Some(StopReason::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_ends_walk_without_advancing() {
        let fetcher = PagedFetcher::new(|page| {
            if page == 1 {
                Ok(json!([{"tenderId": "T-1"}]))
            } else {
                Err(FetchError::Exhausted {
                    url: "u".into(),
                    attempts: 3,
                    last_error: AttemptError::Status(500),
                })
            }
        });
        let mut pages = paginator(fetcher.clone(), 100);

        assert!(pages.next_page().await.is_some());
        assert!(pages.next_page().await.is_none());
        assert!(pages.next_page().await.is_none());

        assert_eq!(fetcher.requests(), 2);
        assert_eq!(pages.pages_fetched(), 1);
        assert_eq!(pages.stop_reason(), Some(StopReason::FetchFailed));
        assert!(pages.last_error().unwrap().contains("500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_pages_only() {
        let fetcher = PagedFetcher::new(|page| Ok(json!([{"tenderId": format!("T-{page}")}])));
        let mut pages = paginator(fetcher, 3);
        let started = tokio::time::Instant::now();

        pages.collect_all().await;

        // Three requests, two gaps.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
