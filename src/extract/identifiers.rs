use anyhow::{Context, Result};
use log::debug;
use regex::{Regex, RegexBuilder};

/// Recognizes one kind of identifier (order ID, tracking number).
///
/// Every pattern is scanned; the candidate that starts first in the text
/// wins, ties going to the longer candidate and then to the earlier pattern.
/// Candidates without a digit are words caught by a label, not identifiers.
pub struct IdentifierExtractor {
    field: &'static str,
    patterns: Vec<Regex>,
}

impl IdentifierExtractor {
    pub fn new(field: &'static str, patterns: &[&str]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("Invalid {} pattern: {}", field, p))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(IdentifierExtractor { field, patterns })
    }

    pub fn extract(&self, text: &str) -> Option<String> {
        let mut best: Option<(usize, usize, &str)> = None;

        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                let value = m.as_str().trim_end_matches(['-', '_']);
                if value.is_empty() || !value.chars().any(|c| c.is_ascii_digit()) {
                    continue;
                }

                let better = match best {
                    None => true,
                    Some((start, len, _)) => m.start() < start || (m.start() == start && value.len() > len),
                };
                if better {
                    best = Some((m.start(), value.len(), value));
                }
                // Later matches of this pattern start further right
                break;
            }
        }

        let found = best.map(|(_, _, value)| value.to_string());
        match &found {
            Some(value) => debug!("Found {}: {}", self.field, value),
            None => debug!("No {} found", self.field),
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::patterns::PatternTable;

    fn order_ids() -> IdentifierExtractor {
        let table = PatternTable::default();
        IdentifierExtractor::new("order ID", &table.order_id_patterns()).unwrap()
    }

    fn tracking() -> IdentifierExtractor {
        let table = PatternTable::default();
        IdentifierExtractor::new("tracking number", &table.tracking_patterns()).unwrap()
    }

    #[test]
    fn test_labeled_order_ids() {
        let e = order_ids();
        assert_eq!(e.extract("Order# 408-1234567-8901234").as_deref(), Some("408-1234567-8901234"));
        assert_eq!(e.extract("Order ID: MYN1234567890").as_deref(), Some("MYN1234567890"));
        assert_eq!(e.extract("Your order number is below. Order no. A1B2C3D4").as_deref(), Some("A1B2C3D4"));
        assert_eq!(e.extract("Confirmation #: XK-99812").as_deref(), Some("XK-99812"));
    }

    #[test]
    fn test_label_words_are_not_ids() {
        let e = order_ids();
        assert_eq!(e.extract("Your Amazon.in order has been shipped!"), None);
        assert_eq!(e.extract("Order notification for your account"), None);
        assert_eq!(e.extract(""), None);
    }

    #[test]
    fn test_first_by_position_wins() {
        let e = order_ids();
        let text = "Flipkart OD123456789012345678 replaces order 111-2222222-3333333";
        assert_eq!(e.extract(text).as_deref(), Some("OD123456789012345678"));

        let text = "Refund for 111-2222222-3333333 then OD123456789012345678";
        assert_eq!(e.extract(text).as_deref(), Some("111-2222222-3333333"));
    }

    #[test]
    fn test_tracking_numbers() {
        let e = tracking();
        assert_eq!(e.extract("Tracking number: 1Z999AA10123456784").as_deref(), Some("1Z999AA10123456784"));
        assert_eq!(e.extract("AWB No. 7845123690 via Delhivery").as_deref(), Some("7845123690"));
        assert_eq!(e.extract("Your parcel EE123456789IN is on its way").as_deref(), Some("EE123456789IN"));
        assert_eq!(e.extract("Track your package here"), None);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(IdentifierExtractor::new("order ID", &["(unclosed"]).is_err());
    }
}
