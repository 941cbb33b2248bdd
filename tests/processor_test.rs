use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ordertracker::config::FetchConfig;
use ordertracker::email::{
    BodyPart, ExtractionQuery, MailSource, MessagePage, OrderEmailProcessor, RawMessage, SourceFuture,
};
use ordertracker::error::MailError;
use ordertracker::extract::{FieldExtractors, OrderStatus};

/// In-memory mailbox with scripted failures
struct FakeSource {
    ids: Vec<String>,
    page_size: usize,
    /// Errors returned by successive fetches of a message before it succeeds
    failures: Mutex<HashMap<String, VecDeque<MailError>>>,
    /// Messages that always fail with this error
    broken: HashMap<String, MailError>,
    list_error: Option<MailError>,
    fetches: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
}

impl FakeSource {
    fn new(count: usize) -> Self {
        FakeSource {
            ids: (1..=count).map(|i| format!("m{}", i)).collect(),
            page_size: 2,
            failures: Mutex::new(HashMap::new()),
            broken: HashMap::new(),
            list_error: None,
            fetches: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    fn failing_then_ok(self, id: &str, errors: Vec<MailError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(id.to_string(), errors.into_iter().collect());
        self
    }

    fn broken(mut self, id: &str, error: MailError) -> Self {
        self.broken.insert(id.to_string(), error);
        self
    }

    fn fetch_count(&self, id: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|f| f.as_str() == id).count()
    }

    fn message(id: &str) -> RawMessage {
        let index: u32 = id.trim_start_matches('m').parse().unwrap_or(0);
        RawMessage {
            id: id.to_string(),
            subject: format!("Your order {} has shipped", index),
            from: "Shop <orders@shop.example>".to_string(),
            date: Utc.with_ymd_and_hms(2026, 6, index.max(1), 12, 0, 0).single(),
            parts: vec![BodyPart::plain(&format!(
                "Order #: A{:05}\nTracking number: TRK{:08}",
                index, index
            ))],
        }
    }
}

impl MailSource for FakeSource {
    fn list_page<'a>(
        &'a self,
        _query: &'a ExtractionQuery,
        page_token: Option<&'a str>,
        page_size: usize,
    ) -> SourceFuture<'a, MessagePage> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.list_error {
                return Err(err.clone());
            }
            let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (offset + page_size.min(self.page_size)).min(self.ids.len());
            Ok(MessagePage {
                ids: self.ids[offset..end].to_vec(),
                next_page_token: (end < self.ids.len()).then(|| end.to_string()),
            })
        })
    }

    fn fetch<'a>(&'a self, message_id: &'a str) -> SourceFuture<'a, RawMessage> {
        Box::pin(async move {
            self.fetches.lock().unwrap().push(message_id.to_string());
            if let Some(err) = self.broken.get(message_id) {
                return Err(err.clone());
            }
            if let Some(err) = self
                .failures
                .lock()
                .unwrap()
                .get_mut(message_id)
                .and_then(|queue| queue.pop_front())
            {
                return Err(err);
            }
            Ok(Self::message(message_id))
        })
    }

    fn source_name(&self) -> &str {
        "fake"
    }
}

fn fetch_config(max_retries: u32) -> FetchConfig {
    FetchConfig {
        max_retries,
        initial_backoff_ms: 0,
    }
}

fn processor(source: FakeSource, max_retries: u32) -> OrderEmailProcessor<FakeSource> {
    OrderEmailProcessor::new(source, FieldExtractors::with_defaults().unwrap(), fetch_config(max_retries)).unwrap()
}

fn query(max_results: usize) -> ExtractionQuery {
    ExtractionQuery {
        keywords: vec!["your order".to_string()],
        excluded: Vec::new(),
        after: None,
        before: None,
        max_results,
    }
}

fn record_ids(run: &ordertracker::email::ExtractionRun) -> Vec<String> {
    let mut ids: Vec<String> = run.table.records().iter().map(|r| r.message_id.clone()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_not_found_message_is_skipped() {
    let source = FakeSource::new(5).broken("m3", MailError::NotFound("m3".to_string()));
    let p = processor(source, 3);

    let run = p.run(&query(100)).await.unwrap();

    assert_eq!(run.candidates, 5);
    assert_eq!(run.table.len(), 4);
    assert_eq!(record_ids(&run), vec!["m1", "m2", "m4", "m5"]);
    assert_eq!(run.skipped.len(), 1);
    assert_eq!(run.skipped[0].message_id, "m3");
    assert_eq!(run.skipped[0].error, MailError::NotFound("m3".to_string()));
    // Not retryable
    assert_eq!(p.source().fetch_count("m3"), 1);
}

#[tokio::test]
async fn test_rate_limited_fetch_is_retried() {
    let source = FakeSource::new(2).failing_then_ok(
        "m1",
        vec![
            MailError::RateLimited("429".to_string()),
            MailError::Transient("503".to_string()),
        ],
    );
    let p = processor(source, 3);

    let run = p.run(&query(100)).await.unwrap();

    assert!(!run.is_partial());
    assert_eq!(run.table.len(), 2);
    assert_eq!(p.source().fetch_count("m1"), 3);
}

#[tokio::test]
async fn test_exhausted_retries_skip_message() {
    let source = FakeSource::new(3).broken("m2", MailError::RateLimited("429".to_string()));
    let p = processor(source, 2);

    let run = p.run(&query(100)).await.unwrap();

    assert_eq!(record_ids(&run), vec!["m1", "m3"]);
    assert_eq!(run.skipped.len(), 1);
    assert!(matches!(run.skipped[0].error, MailError::RateLimited(_)));
    assert_eq!(p.source().fetch_count("m2"), 3);
}

#[tokio::test]
async fn test_auth_failure_stops_fetching() {
    let source = FakeSource::new(5).broken("m2", MailError::Auth("token revoked".to_string()));
    let p = processor(source, 3);

    let run = p.run(&query(100)).await.unwrap();

    assert_eq!(record_ids(&run), vec!["m1"]);
    let skipped: Vec<&str> = run.skipped.iter().map(|s| s.message_id.as_str()).collect();
    assert_eq!(skipped, vec!["m2", "m3", "m4", "m5"]);
    assert!(run.needs_reauthentication());
    assert_eq!(p.source().fetch_count("m2"), 1);
    assert_eq!(p.source().fetch_count("m3"), 0);
}

#[tokio::test]
async fn test_search_failure_is_an_error() {
    let mut source = FakeSource::new(3);
    source.list_error = Some(MailError::Auth("consent declined".to_string()));
    let p = processor(source, 3);

    let result = p.run(&query(100)).await;
    assert_eq!(result.unwrap_err(), MailError::Auth("consent declined".to_string()));
}

#[tokio::test]
async fn test_empty_search_is_not_an_error() {
    let p = processor(FakeSource::new(0), 3);
    let run = p.run(&query(100)).await.unwrap();
    assert!(run.table.is_empty());
    assert_eq!(run.candidates, 0);
}

#[tokio::test]
async fn test_records_carry_extracted_fields() {
    let p = processor(FakeSource::new(1), 3);
    let run = p.run(&query(100)).await.unwrap();

    let record = &run.table.records()[0];
    assert_eq!(record.order_id.as_deref(), Some("A00001"));
    assert_eq!(record.tracking_number.as_deref(), Some("TRK00000001"));
    assert_eq!(record.status, OrderStatus::Shipped);
    assert_eq!(record.seller, "orders@shop.example");
    assert_eq!(record.seller_name, "Shop");
}

#[tokio::test]
async fn test_search_is_restartable() {
    let source = FakeSource::new(5);
    let q = query(100);

    let mut pager = source.search(&q);
    let first = pager.collect_ids().await.unwrap();
    assert_eq!(first, vec!["m1", "m2", "m3", "m4", "m5"]);
    assert_eq!(source.list_calls.load(Ordering::SeqCst), 3);

    // Exhausted until restarted
    assert_eq!(pager.next_page().await.unwrap(), None);

    pager.restart();
    let second = pager.collect_ids().await.unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_search_is_lazy_and_capped() {
    let source = FakeSource::new(5);
    let q = query(3);

    tokio_test::block_on(async {
        let mut pager = source.search(&q);
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 0);

        assert_eq!(pager.next_page().await.unwrap(), Some(vec!["m1".to_string(), "m2".to_string()]));
        assert_eq!(pager.next_page().await.unwrap(), Some(vec!["m3".to_string()]));
        assert_eq!(pager.next_page().await.unwrap(), None);
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);
    });
}
