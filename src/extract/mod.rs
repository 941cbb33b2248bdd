//! Independent per-field recognizers.
//!
//! Each field is extracted on its own; a field that is not recognized is
//! `None` (or `OrderStatus::Unknown`) and never prevents the others.

pub mod delivery_date;
pub mod identifiers;
pub mod patterns;
pub mod seller;
pub mod status;

use anyhow::{Context, Result};
use chrono::NaiveDate;

pub use delivery_date::DeliveryDateExtractor;
pub use identifiers::IdentifierExtractor;
pub use patterns::{PatternTable, StatusKeywords, VendorPatterns};
pub use seller::{extract_seller, SellerInfo};
pub use status::{OrderStatus, StatusClassifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub order_id: Option<String>,
    pub tracking_number: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub status: OrderStatus,
    pub seller: SellerInfo,
}

pub struct FieldExtractors {
    order_id: IdentifierExtractor,
    tracking_number: IdentifierExtractor,
    delivery_date: DeliveryDateExtractor,
    status: StatusClassifier,
}

impl FieldExtractors {
    pub fn new(table: &PatternTable) -> Result<Self> {
        Ok(FieldExtractors {
            order_id: IdentifierExtractor::new("order ID", &table.order_id_patterns())
                .context("Invalid order ID patterns")?,
            tracking_number: IdentifierExtractor::new("tracking number", &table.tracking_patterns())
                .context("Invalid tracking number patterns")?,
            delivery_date: DeliveryDateExtractor::new(&table.delivery_keywords)
                .context("Invalid delivery keywords")?,
            status: StatusClassifier::new(table).context("Invalid status keywords")?,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(&PatternTable::default())
    }

    pub fn order_id(&self, text: &str) -> Option<String> {
        self.order_id.extract(text)
    }

    pub fn tracking_number(&self, text: &str) -> Option<String> {
        self.tracking_number.extract(text)
    }

    pub fn delivery_date(&self, text: &str, reference: NaiveDate) -> Option<NaiveDate> {
        self.delivery_date.extract(text, reference)
    }

    pub fn status(&self, text: &str) -> OrderStatus {
        self.status.classify(text)
    }

    /// Run every extractor over `text`; the seller comes from `from_header` only
    pub fn extract(&self, text: &str, from_header: &str, reference: NaiveDate) -> ExtractedFields {
        ExtractedFields {
            order_id: self.order_id(text),
            tracking_number: self.tracking_number(text),
            delivery_date: self.delivery_date(text, reference),
            status: self.status(text),
            seller: extract_seller(from_header),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_all_fields() {
        let extractors = FieldExtractors::with_defaults().unwrap();
        let text = "Your order has shipped!\n\
                    Order #: 111-2222222-3333333\n\
                    Tracking number: 1Z999AA10123456784\n\
                    Estimated delivery: June 15, 2026";
        let reference = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();

        let fields = extractors.extract(text, "Amazon <ship-confirm@amazon.com>", reference);
        assert_eq!(fields.order_id.as_deref(), Some("111-2222222-3333333"));
        assert_eq!(fields.tracking_number.as_deref(), Some("1Z999AA10123456784"));
        assert_eq!(fields.delivery_date, NaiveDate::from_ymd_opt(2026, 6, 15));
        assert_eq!(fields.status, OrderStatus::Shipped);
        assert_eq!(fields.seller.address, "ship-confirm@amazon.com");
        assert_eq!(fields.seller.display_name, "Amazon");
    }

    #[test]
    fn test_extract_nothing() {
        let extractors = FieldExtractors::with_defaults().unwrap();
        let reference = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        let fields = extractors.extract("", "", reference);
        assert_eq!(fields.order_id, None);
        assert_eq!(fields.tracking_number, None);
        assert_eq!(fields.delivery_date, None);
        assert_eq!(fields.status, OrderStatus::Unknown);
    }
}
