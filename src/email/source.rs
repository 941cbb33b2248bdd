use log::debug;
use std::future::Future;
use std::pin::Pin;

use crate::email::common::RawMessage;
use crate::email::query::ExtractionQuery;
use crate::error::MailError;

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, MailError>> + Send + 'a>>;

/// One page of a message listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// A mailbox that can be searched and read.
///
/// Implementations never retry on their own: rate limits and transient
/// failures are reported to the caller, which decides on backoff.
pub trait MailSource: Send + Sync {
    /// Fetch one page of message IDs matching `query`, starting at `page_token`
    fn list_page<'a>(
        &'a self,
        query: &'a ExtractionQuery,
        page_token: Option<&'a str>,
        page_size: usize,
    ) -> SourceFuture<'a, MessagePage>;

    /// Fetch the full payload of one message
    fn fetch<'a>(&'a self, message_id: &'a str) -> SourceFuture<'a, RawMessage>;

    /// Name of this source (for logging)
    fn source_name(&self) -> &str;

    /// Lazy listing of every message matching `query`
    fn search<'a>(&'a self, query: &'a ExtractionQuery) -> SearchPager<'a, Self>
    where
        Self: Sized,
    {
        SearchPager::new(self, query)
    }
}

/// Walks the pages of a search on demand.
///
/// Nothing is requested until [`next_page`](Self::next_page) is called, and
/// [`restart`](Self::restart) goes back to the first page. The pager stops
/// after `query.max_results` IDs.
pub struct SearchPager<'a, S: MailSource> {
    source: &'a S,
    query: &'a ExtractionQuery,
    next_token: Option<String>,
    exhausted: bool,
    yielded: usize,
}

impl<'a, S: MailSource> SearchPager<'a, S> {
    pub const MAX_PAGE_SIZE: usize = 500;

    pub fn new(source: &'a S, query: &'a ExtractionQuery) -> Self {
        SearchPager {
            source,
            query,
            next_token: None,
            exhausted: false,
            yielded: 0,
        }
    }

    pub fn restart(&mut self) {
        self.next_token = None;
        self.exhausted = false;
        self.yielded = 0;
    }

    /// Next page of IDs, or `None` once the listing is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<String>>, MailError> {
        if self.exhausted {
            return Ok(None);
        }

        let remaining = self.query.max_results.saturating_sub(self.yielded);
        if remaining == 0 {
            self.exhausted = true;
            return Ok(None);
        }

        let page_size = remaining.min(Self::MAX_PAGE_SIZE);
        let page = self
            .source
            .list_page(self.query, self.next_token.as_deref(), page_size)
            .await?;

        let mut ids = page.ids;
        ids.truncate(remaining);
        self.yielded += ids.len();

        debug!(
            "{}: page of {} message ID(s), {} so far",
            self.source.source_name(),
            ids.len(),
            self.yielded
        );

        match page.next_page_token {
            Some(token) if Some(&token) != self.next_token.as_ref() => {
                self.next_token = Some(token);
            }
            _ => self.exhausted = true,
        }

        Ok(Some(ids))
    }

    /// Drain the remaining pages into one list
    pub async fn collect_ids(&mut self) -> Result<Vec<String>, MailError> {
        let mut all = Vec::new();
        while let Some(ids) = self.next_page().await? {
            all.extend(ids);
        }
        Ok(all)
    }
}
