use chrono::{Duration, NaiveDate};

/// Phrases that identify order confirmations rather than marketing
pub const ORDER_PHRASES: &[&str] = &[
    "order confirmation",
    "purchase confirmation",
    "your order",
    "order number",
    "tracking number",
    "shipment confirmation",
    "delivery confirmation",
    "order receipt",
    "thank you for your order",
];

/// Terms that mark promotional mail
pub const PROMOTIONAL_TERMS: &[&str] = &[
    "unsubscribe",
    "promotional",
    "sale",
    "deal",
    "offer",
    "discount",
    "newsletter",
];

/// Search filter selecting candidate messages for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionQuery {
    /// Any of these phrases must appear
    pub keywords: Vec<String>,
    /// None of these terms may appear
    pub excluded: Vec<String>,
    /// Inclusive lower bound on the received date
    pub after: Option<NaiveDate>,
    /// Inclusive upper bound on the received date
    pub before: Option<NaiveDate>,
    pub max_results: usize,
}

impl ExtractionQuery {
    /// Order emails received in the last `days_back` days up to and including `today`
    pub fn order_emails(today: NaiveDate, days_back: u32, max_results: usize) -> Self {
        ExtractionQuery {
            keywords: ORDER_PHRASES.iter().map(|s| s.to_string()).collect(),
            excluded: PROMOTIONAL_TERMS.iter().map(|s| s.to_string()).collect(),
            after: Some(today - Duration::days(i64::from(days_back))),
            before: Some(today),
            max_results,
        }
    }

    /// Render as Gmail search syntax
    pub fn to_gmail_query(&self) -> String {
        let mut terms = Vec::new();

        if let Some(after) = self.after {
            terms.push(format!("after:{}", after.format("%Y/%m/%d")));
        }
        if let Some(before) = self.before {
            // Gmail's before: is exclusive
            let exclusive = before + Duration::days(1);
            terms.push(format!("before:{}", exclusive.format("%Y/%m/%d")));
        }

        let keywords: Vec<String> = self
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| quote_term(k))
            .collect();
        match keywords.len() {
            0 => {}
            1 => terms.push(keywords[0].clone()),
            _ => terms.push(format!("({})", keywords.join(" OR "))),
        }

        for term in self.excluded.iter().filter(|t| !t.trim().is_empty()) {
            terms.push(format!("-{}", quote_term(term)));
        }

        terms.join(" ")
    }
}

fn quote_term(term: &str) -> String {
    let term = term.trim().replace('"', "");
    if term.contains(char::is_whitespace) {
        format!("\"{}\"", term)
    } else {
        term
    }
}
