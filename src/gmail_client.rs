use anyhow::Result;
use google_gmail1::api::Scope;
use google_gmail1::{hyper, hyper_rustls, Gmail};
use log::{debug, info};

use crate::auth::AuthSession;
use crate::email::common::RawMessage;
use crate::email::query::ExtractionQuery;
use crate::email::source::{MailSource, MessagePage, SourceFuture};
use crate::error::MailError;

pub struct GmailClient {
    hub: Gmail<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>,
}

impl GmailClient {
    pub fn new(session: &AuthSession) -> Result<Self> {
        info!("Connecting to Gmail API via OAuth2 (account '{}')", session.account());

        // Create HTTP client
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();

        let client = hyper::Client::builder().build(connector);

        let hub = Gmail::new(client, session.authenticator());

        info!("✅ Gmail API connection established successfully");

        Ok(GmailClient { hub })
    }

    async fn list_messages(
        &self,
        query: &ExtractionQuery,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<MessagePage, MailError> {
        let q = query.to_gmail_query();
        debug!("Search criteria: {}", q);

        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .q(&q)
            .max_results(u32::try_from(page_size).unwrap_or(u32::MAX))
            .add_scope(Scope::Readonly);
        if let Some(token) = page_token {
            call = call.page_token(token);
        }

        let (_, response) = call
            .doit()
            .await
            .map_err(|e| classify_error(e, "message search"))?;

        let ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| msg.id)
            .collect();

        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn fetch_message(&self, message_id: &str) -> Result<RawMessage, MailError> {
        debug!("Complete email retrieval for ID: {}", message_id);

        let (_, message) = self
            .hub
            .users()
            .messages_get("me", message_id)
            .format("raw")
            .add_scope(Scope::Readonly)
            .doit()
            .await
            .map_err(|e| classify_error(e, message_id))?;

        // Already decoded by the API client (RFC822 bytes)
        let raw = message
            .raw
            .ok_or_else(|| MailError::Malformed(format!("no raw content in email {}", message_id)))?;

        debug!("Email retrieved, size: {} bytes", raw.len());

        RawMessage::from_rfc822(message_id, &raw)
            .ok_or_else(|| MailError::Malformed(format!("unable to parse email {}", message_id)))
    }
}

impl MailSource for GmailClient {
    fn list_page<'a>(
        &'a self,
        query: &'a ExtractionQuery,
        page_token: Option<&'a str>,
        page_size: usize,
    ) -> SourceFuture<'a, MessagePage> {
        Box::pin(self.list_messages(query, page_token, page_size))
    }

    fn fetch<'a>(&'a self, message_id: &'a str) -> SourceFuture<'a, RawMessage> {
        Box::pin(self.fetch_message(message_id))
    }

    fn source_name(&self) -> &str {
        "Gmail"
    }
}

/// Map a Gmail API failure onto [`MailError`]
pub fn classify_error(err: google_gmail1::Error, context: &str) -> MailError {
    match err {
        google_gmail1::Error::BadRequest(body) => {
            let (code, reason) = error_status(&body);
            match code {
                Some(code) => MailError::from_status(code, reason.as_deref(), context),
                None => MailError::Malformed(format!("{}: {}", context, body)),
            }
        }
        google_gmail1::Error::Failure(response) => {
            MailError::from_status(response.status().as_u16(), None, context)
        }
        google_gmail1::Error::MissingToken(e) => MailError::Auth(format!("{}: {}", context, e)),
        google_gmail1::Error::HttpError(e) => MailError::Transient(format!("{}: {}", context, e)),
        google_gmail1::Error::Io(e) => MailError::Transient(format!("{}: {}", context, e)),
        other => MailError::Malformed(format!("{}: {}", context, other)),
    }
}

/// HTTP code and first `reason` of a Google API error body
pub fn error_status(body: &serde_json::Value) -> (Option<u16>, Option<String>) {
    let error = &body["error"];
    let code = error["code"].as_u64().and_then(|c| u16::try_from(c).ok());
    let reason = error["errors"][0]["reason"]
        .as_str()
        .or_else(|| error["status"].as_str())
        .map(str::to_string);
    (code, reason)
}
