//! Shared builders for Square API integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use wiremock::{Request, Respond, ResponseTemplate};

/// A customer created and updated `days_ago` days before now.
pub fn recent_customer(id: &str, days_ago: i64) -> Value {
    let ts = (Utc::now() - Duration::days(days_ago)).to_rfc3339();
    json!({
        "id": id,
        "given_name": "Test",
        "family_name": "Customer",
        "created_at": ts,
        "updated_at": ts
    })
}

/// A customer with explicit timestamps.
pub fn customer_with_timestamps(id: &str, created_at: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "created_at": created_at,
        "updated_at": updated_at
    })
}

/// Wraps customers in a search/listing page, with an optional cursor.
pub fn customer_page(customers: Vec<Value>, cursor: Option<&str>) -> Value {
    let mut page = json!({ "customers": customers });
    if let Some(cursor) = cursor {
        page["cursor"] = json!(cursor);
    }
    page
}

/// Wraps invoices in a search page.
pub fn invoice_page(invoices: Vec<Value>, cursor: Option<&str>) -> Value {
    let mut page = json!({ "invoices": invoices });
    if let Some(cursor) = cursor {
        page["cursor"] = json!(cursor);
    }
    page
}

/// Square's error envelope.
pub fn square_error(code: &str, detail: &str) -> Value {
    json!({
        "errors": [{
            "category": "AUTHENTICATION_ERROR",
            "code": code,
            "detail": detail
        }]
    })
}

/// Responds with each template in turn; once exhausted, repeats the last.
///
/// Square carries pagination cursors in the request body, so successive pages
/// cannot be told apart by URL matchers; sequential responses model the
/// cursor walk instead.
pub struct SequentialResponder {
    responses: Vec<ResponseTemplate>,
    position: AtomicUsize,
}

impl SequentialResponder {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses,
            position: AtomicUsize::new(0),
        }
    }

    /// Sequential 200 responses from JSON bodies.
    pub fn from_json(pages: Vec<Value>) -> Self {
        Self::new(
            pages
                .into_iter()
                .map(|page| ResponseTemplate::new(200).set_body_json(page))
                .collect(),
        )
    }
}

impl Respond for SequentialResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let index = self.position.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_else(|| ResponseTemplate::new(200).set_body_json(json!({})))
    }
}
