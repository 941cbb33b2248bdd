//! Offline mail source reading exported messages from a directory.
//!
//! `<id>.eml` files hold RFC 822 messages, `<id>.json` files hold Gmail API
//! messages in `format=full`. The file stem is the message ID and listing is
//! in ID order, so repeated searches return the same sequence.

use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::email::common::RawMessage;
use crate::email::query::ExtractionQuery;
use crate::email::source::{MailSource, MessagePage, SourceFuture};
use crate::error::MailError;

const EXTENSIONS: [&str; 2] = ["eml", "json"];

pub struct MailboxDir {
    root: PathBuf,
    page_size: usize,
}

impl MailboxDir {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_page_size(root, Self::DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(root: impl AsRef<Path>, page_size: usize) -> Self {
        let root = root.as_ref().to_path_buf();
        info!("📁 Using mailbox directory {}", root.display());
        MailboxDir {
            root,
            page_size: page_size.max(1),
        }
    }

    async fn message_ids(&self) -> Result<Vec<String>, MailError> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            MailError::Transient(format!("unable to read {}: {}", self.root.display(), e))
        })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MailError::Transient(format!("unable to read {}: {}", self.root.display(), e)))?
        {
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_lowercase().as_str()));
            if !known {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn list(&self, page_token: Option<&str>, page_size: usize) -> Result<MessagePage, MailError> {
        let ids = self.message_ids().await?;

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| MailError::Malformed(format!("invalid page token '{}'", token)))?,
            None => 0,
        };
        let size = page_size.min(self.page_size).max(1);
        let end = (offset + size).min(ids.len());

        let page: Vec<String> = ids.get(offset..end).map(<[String]>::to_vec).unwrap_or_default();
        let next_page_token = (end < ids.len()).then(|| end.to_string());

        debug!("{}: listed {} of {} message(s) from offset {}", self.root.display(), page.len(), ids.len(), offset);

        Ok(MessagePage {
            ids: page,
            next_page_token,
        })
    }

    async fn read(&self, message_id: &str) -> Result<RawMessage, MailError> {
        for ext in EXTENSIONS {
            let path = self.root.join(format!("{}.{}", message_id, ext));
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(MailError::Transient(format!("unable to read {}: {}", path.display(), e)))
                }
            };

            let message = match ext {
                "json" => RawMessage::from_gmail_json(message_id, &bytes),
                _ => RawMessage::from_rfc822(message_id, &bytes),
            };
            return message.ok_or_else(|| MailError::Malformed(format!("unable to parse {}", path.display())));
        }

        Err(MailError::NotFound(message_id.to_string()))
    }
}

impl MailSource for MailboxDir {
    fn list_page<'a>(
        &'a self,
        _query: &'a ExtractionQuery,
        page_token: Option<&'a str>,
        page_size: usize,
    ) -> SourceFuture<'a, MessagePage> {
        Box::pin(self.list(page_token, page_size))
    }

    fn fetch<'a>(&'a self, message_id: &'a str) -> SourceFuture<'a, RawMessage> {
        Box::pin(self.read(message_id))
    }

    fn source_name(&self) -> &str {
        "mailbox directory"
    }
}
