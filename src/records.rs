use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::io::Write;
use std::str::FromStr;

use crate::extract::{ExtractedFields, OrderStatus};

/// Header data attached to every record regardless of what extraction found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    /// Raw `From` header
    pub sender: String,
    pub subject: String,
    pub received: DateTime<Utc>,
}

/// One row of output, one per fetched message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRecord {
    pub message_id: String,
    pub order_id: Option<String>,
    pub tracking_number: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub status: OrderStatus,
    pub seller: String,
    pub seller_name: String,
    pub subject: String,
    pub received: DateTime<Utc>,
}

/// Combine a message's metadata and extracted fields. Never fails.
pub fn assemble(message_id: &str, metadata: MessageMetadata, fields: ExtractedFields) -> OrderRecord {
    OrderRecord {
        message_id: message_id.to_string(),
        order_id: fields.order_id,
        tracking_number: fields.tracking_number,
        delivery_date: fields.delivery_date,
        status: fields.status,
        seller: fields.seller.address,
        seller_name: fields.seller.display_name,
        subject: metadata.subject,
        received: metadata.received,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Received,
    DeliveryDate,
    Seller,
    OrderId,
    Status,
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "received" | "date" => Ok(SortKey::Received),
            "delivery-date" | "delivery" => Ok(SortKey::DeliveryDate),
            "seller" => Ok(SortKey::Seller),
            "order-id" | "order" => Ok(SortKey::OrderId),
            "status" => Ok(SortKey::Status),
            _ => anyhow::bail!(
                "Unknown sort column '{}' (expected received, delivery-date, seller, order-id or status)",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableSummary {
    pub total: usize,
    pub unique_sellers: usize,
    pub delivered: usize,
    pub cancelled: usize,
    /// Neither delivered nor cancelled
    pub pending: usize,
}

/// Records of one run; message IDs are unique
#[derive(Debug, Clone, Default)]
pub struct OrderTable {
    records: Vec<OrderRecord>,
}

impl OrderTable {
    /// Build a table in the default order: most recently received first.
    /// A repeated message ID keeps its first record.
    pub fn from_records(records: Vec<OrderRecord>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|r| seen.insert(r.message_id.clone()))
            .collect();
        let mut table = OrderTable { records };
        table.sort_by(SortKey::Received);
        table
    }

    pub fn records(&self) -> &[OrderRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sort descending on `key`; records without a value go last
    pub fn sort_by(&mut self, key: SortKey) {
        self.records.sort_by(|a, b| match key {
            SortKey::Received => b.received.cmp(&a.received),
            SortKey::DeliveryDate => descending_present_first(&a.delivery_date, &b.delivery_date),
            SortKey::Seller => b.seller_name.to_lowercase().cmp(&a.seller_name.to_lowercase()),
            SortKey::OrderId => descending_present_first(&a.order_id, &b.order_id),
            SortKey::Status => b.status.priority().cmp(&a.status.priority()),
        });
    }

    /// Keep records matching any of `sellers` and any of `statuses`; an empty list matches all.
    /// Sellers match case-insensitively against the address or the display name.
    pub fn filter(&self, sellers: &[String], statuses: &[OrderStatus]) -> OrderTable {
        let sellers: Vec<String> = sellers.iter().map(|s| s.trim().to_lowercase()).collect();

        let records = self
            .records
            .iter()
            .filter(|r| {
                sellers.is_empty()
                    || sellers.iter().any(|s| {
                        r.seller.to_lowercase().contains(s.as_str())
                            || r.seller_name.to_lowercase() == *s
                    })
            })
            .filter(|r| statuses.is_empty() || statuses.contains(&r.status))
            .cloned()
            .collect();

        OrderTable { records }
    }

    pub fn summary(&self) -> TableSummary {
        let sellers: HashSet<&str> = self.records.iter().map(|r| r.seller.as_str()).collect();
        let delivered = self.count_status(OrderStatus::Delivered);
        let cancelled = self.count_status(OrderStatus::Cancelled);

        TableSummary {
            total: self.records.len(),
            unique_sellers: sellers.len(),
            delivered,
            cancelled,
            pending: self.records.len() - delivered - cancelled,
        }
    }

    fn count_status(&self, status: OrderStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "Message ID",
            "Order ID",
            "Tracking Number",
            "Delivery Date",
            "Status",
            "Seller",
            "Seller Name",
            "Subject",
            "Received",
        ])?;

        for r in &self.records {
            let delivery_date = r.delivery_date.map(|d| d.to_string()).unwrap_or_default();
            let received = r.received.format("%Y-%m-%d %H:%M:%S").to_string();
            csv_writer.write_record([
                r.message_id.as_str(),
                r.order_id.as_deref().unwrap_or(""),
                r.tracking_number.as_deref().unwrap_or(""),
                delivery_date.as_str(),
                r.status.as_str(),
                r.seller.as_str(),
                r.seller_name.as_str(),
                r.subject.as_str(),
                received.as_str(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    pub fn export_csv(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Unable to create CSV file {}", path))?;
        self.write_csv(file)
            .with_context(|| format!("Unable to write CSV file {}", path))?;
        info!("✅ Exported {} record(s) to {}", self.records.len(), path);
        Ok(())
    }
}

fn descending_present_first<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, day: u32, status: OrderStatus, seller: &str, delivery: Option<u32>) -> OrderRecord {
        OrderRecord {
            message_id: id.to_string(),
            order_id: None,
            tracking_number: None,
            delivery_date: delivery.and_then(|d| NaiveDate::from_ymd_opt(2026, 6, d)),
            status,
            seller: seller.to_string(),
            seller_name: crate::extract::extract_seller(seller).display_name,
            subject: format!("Subject {}", id),
            received: Utc.with_ymd_and_hms(2026, 6, day, 9, 0, 0).unwrap(),
        }
    }

    fn sample() -> OrderTable {
        OrderTable::from_records(vec![
            record("a", 1, OrderStatus::Shipped, "ship@amazon.in", Some(5)),
            record("b", 3, OrderStatus::Delivered, "updates@myntra.com", None),
            record("c", 2, OrderStatus::Cancelled, "ship@amazon.in", Some(9)),
            record("d", 4, OrderStatus::Unknown, "news@shop.com", None),
        ])
    }

    fn ids(table: &OrderTable) -> Vec<&str> {
        table.records().iter().map(|r| r.message_id.as_str()).collect()
    }

    #[test]
    fn test_default_order_is_received_descending() {
        assert_eq!(ids(&sample()), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_duplicate_message_ids_are_dropped() {
        let table = OrderTable::from_records(vec![
            record("a", 1, OrderStatus::Shipped, "ship@amazon.in", None),
            record("a", 2, OrderStatus::Delivered, "ship@amazon.in", None),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].status, OrderStatus::Shipped);
    }

    #[test]
    fn test_sort_by_delivery_date_puts_absent_last() {
        let mut table = sample();
        table.sort_by(SortKey::DeliveryDate);
        let sorted = ids(&table);
        assert_eq!(&sorted[..2], &["c", "a"]);
    }

    #[test]
    fn test_filter_and_summary() {
        let table = sample();
        let amazon = table.filter(&["amazon".to_string()], &[]);
        assert_eq!(ids(&amazon), vec!["c", "a"]);

        let delivered = table.filter(&[], &[OrderStatus::Delivered]);
        assert_eq!(ids(&delivered), vec!["b"]);

        let summary = table.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.unique_sellers, 3);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.pending, 2);
    }

    #[test]
    fn test_write_csv() {
        let table = OrderTable::from_records(vec![record("a", 1, OrderStatus::OutForDelivery, "ship@amazon.in", Some(5))]);
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let csv = String::from_utf8(out).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("Message ID,Order ID"));
        assert_eq!(
            lines.next().unwrap(),
            "a,,,2026-06-05,out for delivery,ship@amazon.in,Amazon,Subject a,2026-06-01 09:00:00"
        );
    }

    #[test]
    fn test_parse_sort_key() {
        assert_eq!("delivery_date".parse::<SortKey>().unwrap(), SortKey::DeliveryDate);
        assert_eq!("Order-ID".parse::<SortKey>().unwrap(), SortKey::OrderId);
        assert!("price".parse::<SortKey>().is_err());
    }
}
