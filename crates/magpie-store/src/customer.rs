//! Synced customer records and the invoice linkage attached to them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Structured mailing address, as far as the upstream record carries one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl PostalAddress {
    pub fn is_empty(&self) -> bool {
        self.line1.is_none()
            && self.line2.is_none()
            && self.locality.is_none()
            && self.region.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
    }
}

/// The most recent invoice joined onto a customer, enriched with fields from
/// its originating order.
///
/// "Most recent" is whichever invoice appears first in the newest-first
/// search order, not an explicit date comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLinkage {
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub status: Option<String>,
    /// Total of the invoice's payment requests, in minor currency units.
    pub amount: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,

    pub order_id: Option<String>,
    pub order_created_at: Option<DateTime<Utc>>,
    pub order_updated_at: Option<DateTime<Utc>>,

    /// Fulfillment details; when an order carries several fulfillments the
    /// last entry wins.
    pub pickup_at: Option<DateTime<Utc>>,
    pub pickup_note: Option<String>,
    pub delivery_at: Option<DateTime<Utc>>,
    pub delivery_note: Option<String>,
}

impl InvoiceLinkage {
    /// A linkage carrying only invoice-side fields.
    pub fn for_invoice(invoice_id: impl Into<String>) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            invoice_number: None,
            status: None,
            amount: None,
            due_date: None,
            created_at: None,
            updated_at: None,
            scheduled_at: None,
            order_id: None,
            order_created_at: None,
            order_updated_at: None,
            pickup_at: None,
            pickup_note: None,
            delivery_at: None,
            delivery_note: None,
        }
    }
}

/// One synced customer, keyed by the upstream customer id within a tenant.
///
/// The whole collection is replaced on every sync; rows are never merged
/// incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub company_name: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub birthday: Option<String>,
    pub note: Option<String>,
    pub reference_id: Option<String>,
    pub group_ids: Vec<String>,
    pub segment_ids: Vec<String>,
    /// Opaque upstream preference blob, stored as received.
    pub preferences: Option<serde_json::Value>,
    /// Upstream optimistic-concurrency token.
    pub version: Option<i64>,
    /// Attached by the invoice linker, not by the upstream API.
    pub latest_invoice: Option<InvoiceLinkage>,
}

impl CustomerRecord {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            ..Self::default()
        }
    }
}
