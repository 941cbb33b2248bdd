/// Common structures for email processing
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use mail_parser::{MessageParser, PartType};
use serde::Deserialize;

use crate::error::MailError;
use crate::records::OrderTable;

/// Media type of a body part; other parts (attachments, images) are never kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    PlainText,
    Html,
}

/// Transfer encoding still applied to a part's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// Bytes are the decoded content
    Identity,
    /// Bytes are base64 text, standard or URL-safe alphabet, padding optional
    Base64,
}

#[derive(Debug, Clone)]
pub struct BodyPart {
    pub media_type: MediaType,
    pub encoding: TransferEncoding,
    pub data: Vec<u8>,
}

impl BodyPart {
    pub fn plain(text: &str) -> Self {
        BodyPart {
            media_type: MediaType::PlainText,
            encoding: TransferEncoding::Identity,
            data: text.as_bytes().to_vec(),
        }
    }

    pub fn html(html: &str) -> Self {
        BodyPart {
            media_type: MediaType::Html,
            encoding: TransferEncoding::Identity,
            data: html.as_bytes().to_vec(),
        }
    }
}

/// Raw message payload as returned by a mail source
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub subject: String,
    /// Raw `From` header value
    pub from: String,
    pub date: Option<DateTime<Utc>>,
    pub parts: Vec<BodyPart>,
}

impl RawMessage {
    /// Parse an RFC 822 message (Gmail `format=raw`, `.eml` files)
    pub fn from_rfc822(id: &str, raw: &[u8]) -> Option<RawMessage> {
        let parsed = MessageParser::default().parse(raw)?;

        let date = parsed
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

        let from = parsed
            .from()
            .and_then(|addrs| addrs.first())
            .map(|addr| match (&addr.name, &addr.address) {
                (Some(name), Some(email)) => format!("{} <{}>", name, email),
                (None, Some(email)) => email.to_string(),
                (Some(name), None) => name.to_string(),
                _ => String::new(),
            })
            .unwrap_or_default();

        let subject = parsed.subject().unwrap_or_default().to_string();

        // text_body may point at an HTML part when there is no text/plain alternative
        let mut part_ids: Vec<usize> = parsed.text_body.clone();
        for id in &parsed.html_body {
            if !part_ids.contains(id) {
                part_ids.push(*id);
            }
        }

        let mut parts = Vec::new();
        for part_id in part_ids {
            let Some(part) = parsed.parts.get(part_id) else {
                continue;
            };
            match &part.body {
                PartType::Text(text) => parts.push(BodyPart::plain(text)),
                PartType::Html(html) => parts.push(BodyPart::html(html)),
                _ => {}
            }
        }

        debug!("Parsed RFC 822 message {}: {} body part(s)", id, parts.len());

        Some(RawMessage {
            id: id.to_string(),
            subject,
            from,
            date,
            parts,
        })
    }

    /// Parse a Gmail API message in `format=full` JSON (base64url body data)
    pub fn from_gmail_json(id: &str, raw: &[u8]) -> Option<RawMessage> {
        let message: GmailMessageJson = serde_json::from_slice(raw).ok()?;
        let payload = message.payload?;

        let mut subject = String::new();
        let mut from = String::new();
        let mut date_header = None;

        for header in payload.headers.iter().flatten() {
            match header.name.to_ascii_lowercase().as_str() {
                "subject" => subject = header.value.clone(),
                "from" => from = header.value.clone(),
                "date" => date_header = Some(header.value.clone()),
                _ => {}
            }
        }

        let date = date_header
            .as_deref()
            .and_then(parse_date_header)
            .or_else(|| {
                message
                    .internal_date
                    .as_deref()
                    .and_then(|ms| ms.parse::<i64>().ok())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            });

        let mut parts = Vec::new();
        collect_json_parts(&payload, &mut parts);

        Some(RawMessage {
            id: message.id.unwrap_or_else(|| id.to_string()),
            subject,
            from,
            date,
            parts,
        })
    }
}

/// RFC 2822 date, tolerating a trailing comment such as ` (UTC)`
pub fn parse_date_header(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let value = match value.find(" (") {
        Some(pos) => &value[..pos],
        None => value,
    };
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn collect_json_parts(part: &GmailPartJson, out: &mut Vec<BodyPart>) {
    let media_type = match part.mime_type.as_deref() {
        Some("text/plain") => Some(MediaType::PlainText),
        Some("text/html") => Some(MediaType::Html),
        _ => None,
    };

    if let (Some(media_type), Some(data)) = (media_type, part.body.as_ref().and_then(|b| b.data.as_ref())) {
        out.push(BodyPart {
            media_type,
            encoding: TransferEncoding::Base64,
            data: data.as_bytes().to_vec(),
        });
    }

    for child in part.parts.iter().flatten() {
        collect_json_parts(child, out);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageJson {
    id: Option<String>,
    internal_date: Option<String>,
    payload: Option<GmailPartJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPartJson {
    mime_type: Option<String>,
    headers: Option<Vec<GmailHeaderJson>>,
    body: Option<GmailBodyJson>,
    parts: Option<Vec<GmailPartJson>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeaderJson {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBodyJson {
    data: Option<String>,
}

/// A candidate message that did not make it into the result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMessage {
    pub message_id: String,
    pub error: MailError,
}

/// Result of one extraction run
#[derive(Debug)]
pub struct ExtractionRun {
    pub table: OrderTable,
    pub skipped: Vec<SkippedMessage>,
    pub candidates: usize,
}

impl ExtractionRun {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// True when the run stopped because the session was rejected
    pub fn needs_reauthentication(&self) -> bool {
        self.skipped
            .iter()
            .any(|s| matches!(s.error, MailError::Auth(_)))
    }
}
