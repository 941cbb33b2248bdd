use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashSet;

use crate::config::FetchConfig;
use crate::email::common::{ExtractionRun, RawMessage, SkippedMessage};
use crate::email::query::ExtractionQuery;
use crate::email::source::MailSource;
use crate::error::MailError;
use crate::extract::FieldExtractors;
use crate::normalizer::ContentNormalizer;
use crate::records::{assemble, MessageMetadata, OrderRecord, OrderTable};

/// Runs the whole pipeline for one mail source:
/// search → fetch → normalize → extract → assemble, one message at a time.
pub struct OrderEmailProcessor<S: MailSource> {
    source: S,
    normalizer: ContentNormalizer,
    extractors: FieldExtractors,
    fetch: FetchConfig,
}

impl<S: MailSource> OrderEmailProcessor<S> {
    pub fn new(source: S, extractors: FieldExtractors, fetch: FetchConfig) -> Result<Self> {
        info!("Initializing order email processor for {}", source.source_name());

        let normalizer = ContentNormalizer::new().context("Unable to initialize content normalizer")?;

        Ok(OrderEmailProcessor {
            source,
            normalizer,
            extractors,
            fetch,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run one extraction.
    ///
    /// Only a failed search is an error. Messages that cannot be fetched are
    /// reported in [`ExtractionRun::skipped`]; an authentication failure stops
    /// fetching and the remaining messages are skipped as well.
    pub async fn run(&self, query: &ExtractionQuery) -> Result<ExtractionRun, MailError> {
        info!("🔍 Searching {} for order emails", self.source.source_name());
        debug!("Query: {:?}", query);

        let listed = self.source.search(query).collect_ids().await?;

        let mut seen = HashSet::new();
        let message_ids: Vec<String> = listed.into_iter().filter(|id| seen.insert(id.clone())).collect();

        if message_ids.is_empty() {
            info!("No order emails found");
            return Ok(ExtractionRun {
                table: OrderTable::default(),
                skipped: Vec::new(),
                candidates: 0,
            });
        }

        info!("✅ Found {} candidate email(s)", message_ids.len());

        let mut records = Vec::with_capacity(message_ids.len());
        let mut skipped = Vec::new();
        let mut auth_failure: Option<MailError> = None;

        for (index, message_id) in message_ids.iter().enumerate() {
            if let Some(err) = &auth_failure {
                skipped.push(SkippedMessage {
                    message_id: message_id.clone(),
                    error: err.clone(),
                });
                continue;
            }

            debug!("📧 Email {}/{} (ID: {})", index + 1, message_ids.len(), message_id);

            match self.fetch_with_retry(message_id).await {
                Ok(message) => {
                    let record = self.process_message(message_id, &message);
                    debug!(
                        "Email {} → order {:?}, status {}",
                        message_id, record.order_id, record.status
                    );
                    records.push(record);
                }
                Err(err @ MailError::Auth(_)) => {
                    error!("❌ Authentication failed while fetching {}: {}", message_id, err);
                    skipped.push(SkippedMessage {
                        message_id: message_id.clone(),
                        error: err.clone(),
                    });
                    auth_failure = Some(err);
                }
                Err(err) => {
                    warn!("⚠️  Skipping email {}: {}", message_id, err);
                    skipped.push(SkippedMessage {
                        message_id: message_id.clone(),
                        error: err,
                    });
                }
            }
        }

        info!(
            "Extraction completed: {} record(s), {} skipped out of {}",
            records.len(),
            skipped.len(),
            message_ids.len()
        );

        Ok(ExtractionRun {
            table: OrderTable::from_records(records),
            skipped,
            candidates: message_ids.len(),
        })
    }

    /// Fetch with exponential backoff on rate limits and transient failures
    async fn fetch_with_retry(&self, message_id: &str) -> Result<RawMessage, MailError> {
        let mut backoff = self.fetch.initial_backoff();
        let mut attempt = 0;

        loop {
            match self.source.fetch(message_id).await {
                Ok(message) => return Ok(message),
                Err(err) if err.is_retryable() && attempt < self.fetch.max_retries => {
                    attempt += 1;
                    warn!(
                        "⚠️  Fetching {} failed ({}), retry {}/{} in {:?}",
                        message_id, err, attempt, self.fetch.max_retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Turn one fetched message into a record. Never fails.
    pub fn process_message(&self, message_id: &str, message: &RawMessage) -> OrderRecord {
        let body = self.normalizer.normalize(message);
        let text = if message.subject.is_empty() {
            body
        } else {
            format!("{}\n{}", message.subject, body)
        };

        let received = message.date.unwrap_or_else(|| {
            warn!("No date in email {}, using current date", message_id);
            Utc::now()
        });

        let fields = self
            .extractors
            .extract(&text, &message.from, received.date_naive());

        let metadata = MessageMetadata {
            sender: message.from.clone(),
            subject: message.subject.clone(),
            received,
        };

        assemble(message_id, metadata, fields)
    }
}
