//! Pattern table driving the field extractors.
//!
//! The table is plain data so that new vendors can be added from a JSON file
//! (`ORDER_PATTERNS_PATH`) without touching code. Every identifier pattern is
//! compiled case-insensitively; capture group 1 (or the whole match when the
//! pattern has no group) is the extracted value.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use super::status::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorPatterns {
    pub name: String,
    #[serde(default)]
    pub order_id: Vec<String>,
    #[serde(default)]
    pub tracking_number: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusKeywords {
    pub status: OrderStatus,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternTable {
    /// Labeled order-number patterns ("Order #", "Order ID:")
    pub order_id: Vec<String>,
    /// Labeled tracking-number patterns ("Tracking:", "AWB No.")
    pub tracking_number: Vec<String>,
    /// Vendor and carrier specific formats
    pub vendors: Vec<VendorPatterns>,
    /// Phrases after which a delivery date is expected
    pub delivery_keywords: Vec<String>,
    /// Keyword sets per status; priority comes from the status itself
    pub status: Vec<StatusKeywords>,
    /// Phrases removed before status classification
    #[serde(default)]
    pub status_exclusions: Vec<String>,
}

impl PatternTable {
    /// Load a JSON table from disk
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read pattern table {}", path))?;
        let table: PatternTable = serde_json::from_str(&content)
            .with_context(|| format!("Invalid pattern table {}", path))?;
        info!(
            "📋 Loaded pattern table from {} ({} vendor(s))",
            path,
            table.vendors.len()
        );
        Ok(table)
    }

    /// Custom table when a path is configured, built-in table otherwise
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn order_id_patterns(&self) -> Vec<&str> {
        self.order_id
            .iter()
            .chain(self.vendors.iter().flat_map(|v| v.order_id.iter()))
            .map(String::as_str)
            .collect()
    }

    pub fn tracking_patterns(&self) -> Vec<&str> {
        self.tracking_number
            .iter()
            .chain(self.vendors.iter().flat_map(|v| v.tracking_number.iter()))
            .map(String::as_str)
            .collect()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for PatternTable {
    fn default() -> Self {
        PatternTable {
            order_id: strings(&[
                r"\border\s*(?:#|no\b\.?|number\b|id\b)\s*:?\s*#?\s*([A-Z0-9][A-Z0-9\-_]{3,29})",
                r"\border\s*:\s*#?\s*([A-Z0-9][A-Z0-9\-_]{3,29})",
                r"\b(?:confirmation|reference|purchase|transaction)\s*(?:#|no\b\.?|number\b|id\b|code\b)\s*:?\s*#?\s*([A-Z0-9][A-Z0-9\-_]{3,29})",
            ]),
            tracking_number: strings(&[
                r"\b(?:tracking|track|awb|waybill|consignment)\s*(?:#|no\b\.?|number\b|id\b|code\b)?\s*:?\s*#?\s*([A-Z0-9][A-Z0-9\-]{7,34})",
            ]),
            vendors: vec![
                VendorPatterns {
                    name: "Amazon".to_string(),
                    order_id: strings(&[
                        r"\b(\d{3}-\d{7}-\d{7})\b",
                        r"\b([A-Z]\d{2}-\d{7}-\d{7})\b",
                    ]),
                    tracking_number: Vec::new(),
                },
                VendorPatterns {
                    name: "Myntra".to_string(),
                    order_id: strings(&[r"\b(MYN\d{8,12})\b"]),
                    tracking_number: Vec::new(),
                },
                VendorPatterns {
                    name: "Flipkart".to_string(),
                    order_id: strings(&[r"\b(OD\d{15,21})\b"]),
                    tracking_number: Vec::new(),
                },
                VendorPatterns {
                    name: "eBay".to_string(),
                    order_id: strings(&[r"\b(\d{2}-\d{5}-\d{5})\b"]),
                    tracking_number: Vec::new(),
                },
                VendorPatterns {
                    name: "UPS".to_string(),
                    order_id: Vec::new(),
                    tracking_number: strings(&[r"\b(1Z[0-9A-Z]{16})\b"]),
                },
                VendorPatterns {
                    name: "USPS".to_string(),
                    order_id: Vec::new(),
                    tracking_number: strings(&[r"\b(9[2-5]\d{20})\b"]),
                },
                VendorPatterns {
                    name: "India Post".to_string(),
                    order_id: Vec::new(),
                    tracking_number: strings(&[r"\b([A-Z]{2}\d{9}IN)\b"]),
                },
            ],
            delivery_keywords: strings(&[
                r"(?:expected|estimated|scheduled)\s+(?:delivery|arrival)(?:\s+date)?",
                r"deliver(?:y|ed)\s+(?:date|by|on)",
                r"delivery\s*:",
                r"will\s+be\s+delivered(?:\s+(?:by|on))?",
                r"\barriv(?:ing|es|e)\b(?:\s+(?:by|on))?",
            ]),
            status: vec![
                StatusKeywords {
                    status: OrderStatus::Cancelled,
                    keywords: strings(&["cancelled", "canceled"]),
                },
                StatusKeywords {
                    status: OrderStatus::Delivered,
                    keywords: strings(&["delivered"]),
                },
                StatusKeywords {
                    status: OrderStatus::OutForDelivery,
                    keywords: strings(&["out for delivery"]),
                },
                StatusKeywords {
                    status: OrderStatus::Shipped,
                    keywords: strings(&["shipped", "dispatched", "in transit", "on its way", "on the way"]),
                },
                StatusKeywords {
                    status: OrderStatus::Confirmed,
                    keywords: strings(&[
                        "confirmed",
                        "order placed",
                        "order confirmation",
                        "thank you for your order",
                        "processing",
                    ]),
                },
            ],
            status_exclusions: strings(&[
                // Failed delivery attempts
                "could not be delivered",
                "couldn't be delivered",
                "cannot be delivered",
                "can't be delivered",
                "unable to be delivered",
                "has not been delivered",
                "not yet delivered",
                "not delivered",
                // Cancellation offers
                "can be cancelled",
                "can be canceled",
                // Future delivery
                "will be delivered",
                "to be delivered",
                "should be delivered",
                "can be delivered",
                "once delivered",
            ]),
        }
    }
}
