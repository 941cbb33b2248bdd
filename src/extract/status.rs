use anyhow::{Context, Result};
use log::debug;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::patterns::PatternTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Cancelled,
    Delivered,
    OutForDelivery,
    Shipped,
    Confirmed,
    Unknown,
}

impl OrderStatus {
    /// Higher wins when several keyword sets match: the most terminal state
    pub fn priority(self) -> u8 {
        match self {
            OrderStatus::Cancelled => 5,
            OrderStatus::Delivered => 4,
            OrderStatus::OutForDelivery => 3,
            OrderStatus::Shipped => 2,
            OrderStatus::Confirmed => 1,
            OrderStatus::Unknown => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Delivered => "delivered",
            OrderStatus::OutForDelivery => "out for delivery",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        match key.as_str() {
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            "delivered" => Ok(OrderStatus::Delivered),
            "out for delivery" => Ok(OrderStatus::OutForDelivery),
            "shipped" => Ok(OrderStatus::Shipped),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "unknown" => Ok(OrderStatus::Unknown),
            _ => anyhow::bail!("Unknown order status: {}", s),
        }
    }
}

/// Keyword-set classifier for the order status
pub struct StatusClassifier {
    exclusions: Option<Regex>,
    rules: Vec<(OrderStatus, Regex)>,
}

impl StatusClassifier {
    pub fn new(table: &PatternTable) -> Result<Self> {
        let exclusions = if table.status_exclusions.is_empty() {
            None
        } else {
            Some(keyword_regex(&table.status_exclusions)?)
        };

        let mut rules = Vec::new();
        for set in &table.status {
            if set.keywords.is_empty() {
                continue;
            }
            let re = keyword_regex(&set.keywords)
                .with_context(|| format!("Invalid keywords for status '{}'", set.status))?;
            rules.push((set.status, re));
        }

        Ok(StatusClassifier { exclusions, rules })
    }

    pub fn classify(&self, text: &str) -> OrderStatus {
        let text = match &self.exclusions {
            Some(re) => re.replace_all(text, " "),
            None => std::borrow::Cow::Borrowed(text),
        };

        let status = self
            .rules
            .iter()
            .filter(|(_, re)| re.is_match(&text))
            .map(|(status, _)| *status)
            .max_by_key(|status| status.priority())
            .unwrap_or(OrderStatus::Unknown);

        debug!("Classified status: {}", status);
        status
    }
}

/// Whole-word, case-insensitive alternation of literal phrases
fn keyword_regex(keywords: &[String]) -> Result<Regex> {
    let alternation = keywords
        .iter()
        .map(|k| k.split_whitespace().map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    let re = RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
        .case_insensitive(true)
        .build()?;
    Ok(re)
}
