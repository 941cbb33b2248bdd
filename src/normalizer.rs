use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use regex::{Captures, Regex};

use crate::email::{BodyPart, MediaType, RawMessage, TransferEncoding};

/// Turns a message payload into one plain-text string.
///
/// The text/plain alternative wins when it has any content; otherwise the
/// HTML alternative is stripped of markup. Normalization never fails: a body
/// that cannot be decoded comes out as an empty string.
pub struct ContentNormalizer {
    hidden_blocks: Regex,
    block_breaks: Regex,
    cell_breaks: Regex,
    /// Closing tag directly followed by an opening tag
    element_gaps: Regex,
    tags: Regex,
    entities: Regex,
}

impl ContentNormalizer {
    pub fn new() -> Result<Self> {
        Ok(ContentNormalizer {
            hidden_blocks: Regex::new(
                r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<head\b.*?</head\s*>|<!--.*?-->",
            )?,
            block_breaks: Regex::new(
                r"(?i)<br\s*/?>|</?(?:p|div|tr|li|ul|ol|table|tbody|thead|h[1-6]|section|article|header|footer|blockquote|center)\b[^>]*>",
            )?,
            cell_breaks: Regex::new(r"(?i)</t[dh]\s*>")?,
            element_gaps: Regex::new(r"(?i)(</[a-z][a-z0-9]*\s*>)(<[a-z])")?,
            tags: Regex::new(r"<[^>]*>")?,
            entities: Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")?,
        })
    }

    pub fn normalize(&self, message: &RawMessage) -> String {
        let plain = self.join_parts(&message.parts, MediaType::PlainText);
        if !plain.trim().is_empty() {
            debug!("Message {}: using text/plain body", message.id);
            return collapse_whitespace(&plain);
        }

        let html = self.join_parts(&message.parts, MediaType::Html);
        if !html.trim().is_empty() {
            debug!("Message {}: no text/plain body, stripping HTML", message.id);
            return self.html_to_text(&html);
        }

        debug!("Message {}: empty body", message.id);
        String::new()
    }

    pub fn html_to_text(&self, html: &str) -> String {
        let text = self.hidden_blocks.replace_all(html, " ");
        let text = self.block_breaks.replace_all(&text, "\n");
        let text = self.cell_breaks.replace_all(&text, " ");
        let text = self.element_gaps.replace_all(&text, "$1 $2");
        let text = self.tags.replace_all(&text, "");
        let text = self.decode_entities(&text);
        collapse_whitespace(&text)
    }

    /// Decode named and numeric character references in a single pass
    pub fn decode_entities(&self, text: &str) -> String {
        self.entities
            .replace_all(text, |caps: &Captures| {
                let entity = &caps[1];
                decode_entity(entity).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn join_parts(&self, parts: &[BodyPart], media_type: MediaType) -> String {
        parts
            .iter()
            .filter(|p| p.media_type == media_type)
            .filter_map(decode_part)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn decode_part(part: &BodyPart) -> Option<String> {
    match part.encoding {
        TransferEncoding::Identity => Some(String::from_utf8_lossy(&part.data).into_owned()),
        TransferEncoding::Base64 => match decode_base64(&part.data) {
            Some(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            None => {
                warn!("Undecodable base64 body part ({} bytes), ignoring it", part.data.len());
                None
            }
        },
    }
}

/// Accepts both alphabets, with or without padding, ignoring line breaks
pub fn decode_base64(data: &[u8]) -> Option<Vec<u8>> {
    let cleaned: String = String::from_utf8_lossy(data)
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let unpadded = cleaned.trim_end_matches('=');
    general_purpose::STANDARD_NO_PAD.decode(unpadded).ok()
}

fn decode_entity(entity: &str) -> Option<String> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(|c| c.to_string());
    }

    let decoded = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" | "ensp" | "emsp" | "thinsp" => " ",
        "zwnj" | "zwj" | "shy" => "",
        "ndash" => "–",
        "mdash" => "—",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        "hellip" => "…",
        "bull" => "•",
        "middot" => "·",
        "copy" => "©",
        "reg" => "®",
        "trade" => "™",
        "euro" => "€",
        "pound" => "£",
        "yen" => "¥",
        "cent" => "¢",
        "deg" => "°",
        "times" => "×",
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Collapse runs of whitespace inside lines and drop blank lines
pub fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
