//! Customer retrieval with date-window filtering and endpoint fallback.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use magpie_store::{CustomerRecord, PostalAddress};

use crate::client::SquareClient;
use crate::error::{SquareError, SquareResult};

/// Parses a Square timestamp, tolerating the trailing `Z` form.
///
/// Malformed input yields `None`; callers exclude such records instead of
/// failing the fetch.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Reads and parses a timestamp field off a wire record.
pub(crate) fn timestamp_field(record: &Value, key: &str) -> Option<DateTime<Utc>> {
    record.get(key).and_then(Value::as_str).and_then(parse_timestamp)
}

fn str_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(String::from)
}

fn str_list_field(record: &Value, key: &str) -> Vec<String> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// True when the record was created *or* updated inside the window.
///
/// The double condition catches customers created long ago but touched
/// recently, which a server-side `created_at` filter alone would miss. A
/// record whose timestamps are all missing or malformed is excluded.
pub(crate) fn within_window(record: &Value, cutoff: DateTime<Utc>) -> bool {
    timestamp_field(record, "created_at").is_some_and(|ts| ts >= cutoff)
        || timestamp_field(record, "updated_at").is_some_and(|ts| ts >= cutoff)
}

/// Maps a wire customer into the domain record.
///
/// # Errors
///
/// Returns an error only when the record has no id; every other field is
/// optional and defaulted.
pub fn map_customer(record: &Value) -> SquareResult<CustomerRecord> {
    let customer_id = record
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| SquareError::Shape("missing customer id".into()))?
        .to_string();

    let address = record.get("address").map(|addr| PostalAddress {
        line1: str_field(addr, "address_line_1"),
        line2: str_field(addr, "address_line_2"),
        locality: str_field(addr, "locality"),
        region: str_field(addr, "administrative_district_level_1"),
        postal_code: str_field(addr, "postal_code"),
        country: str_field(addr, "country"),
    });

    Ok(CustomerRecord {
        customer_id,
        given_name: str_field(record, "given_name"),
        family_name: str_field(record, "family_name"),
        company_name: str_field(record, "company_name"),
        nickname: str_field(record, "nickname"),
        email: str_field(record, "email_address"),
        phone: str_field(record, "phone_number"),
        address: address.filter(|a| !a.is_empty()),
        created_at: timestamp_field(record, "created_at"),
        updated_at: timestamp_field(record, "updated_at"),
        birthday: str_field(record, "birthday"),
        note: str_field(record, "note"),
        reference_id: str_field(record, "reference_id"),
        group_ids: str_list_field(record, "group_ids"),
        segment_ids: str_list_field(record, "segment_ids"),
        preferences: record.get("preferences").cloned(),
        version: record.get("version").and_then(Value::as_i64),
        latest_invoice: None,
    })
}

/// Retrieves a tenant's customers from the last `history_window_days`.
///
/// The primary path is the search endpoint with a server-side `created_at`
/// filter; when its first page fails, the plain listing endpoint is used as
/// a fallback. Both paths apply the client-side window filter.
pub struct CustomerFetcher<'a> {
    client: &'a SquareClient,
    history_window_days: i64,
    page_limit: u32,
    max_records: usize,
}

impl<'a> CustomerFetcher<'a> {
    pub fn new(
        client: &'a SquareClient,
        history_window_days: i64,
        page_limit: u32,
        max_records: usize,
    ) -> Self {
        Self {
            client,
            history_window_days,
            page_limit,
            max_records,
        }
    }

    /// Fetches, window-filters, and maps the tenant's customers.
    ///
    /// # Errors
    ///
    /// Errors only when nothing could be retrieved at all (both the search
    /// endpoint and the fallback listing failed on their first page). A
    /// mid-pagination failure on either path returns what was accumulated.
    #[instrument(skip(self, access_token), fields(window_days = self.history_window_days))]
    pub async fn fetch(&self, access_token: &str) -> SquareResult<Vec<CustomerRecord>> {
        let cutoff = Utc::now() - Duration::days(self.history_window_days);

        let body = json!({
            "limit": self.page_limit,
            "query": {
                "filter": {
                    "created_at": {
                        "start_at": cutoff.to_rfc3339()
                    }
                }
            }
        });

        let raw = match self
            .client
            .search_paginated(
                "/v2/customers/search",
                access_token,
                body,
                "customers",
                self.max_records,
            )
            .await
        {
            Ok(raw) => raw,
            // The listing endpoint only stands in when the search endpoint is
            // unusable outright; a walk that broke partway keeps its pages.
            Err(failure) if failure.is_first_page() => {
                warn!(
                    error = %failure.error,
                    "customer search failed on the first page, falling back to listing endpoint"
                );
                self.fetch_fallback(access_token).await?
            }
            Err(failure) => {
                warn!(
                    error = %failure.error,
                    page = failure.page,
                    fetched = failure.items.len(),
                    "customer search failed mid-pagination, keeping accumulated records"
                );
                failure.items
            }
        };

        let mut customers = Vec::new();
        let mut skipped = 0usize;
        for record in raw.iter().filter(|record| within_window(record, cutoff)) {
            match map_customer(record) {
                Ok(customer) => customers.push(customer),
                Err(err) => {
                    skipped += 1;
                    warn!(error = %err, "skipping unparseable customer record");
                }
            }
        }

        info!(
            count = customers.len(),
            skipped,
            window_days = self.history_window_days,
            "customer fetch complete"
        );
        Ok(customers)
    }

    /// Unfiltered listing endpoint, paged with query-string cursors.
    ///
    /// Errors only when the very first page fails; a later page failure
    /// returns the records accumulated so far.
    async fn fetch_fallback(&self, access_token: &str) -> SquareResult<Vec<Value>> {
        let mut items: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let endpoint = match &cursor {
                Some(cursor) => {
                    format!("/v2/customers?limit={}&cursor={}", self.page_limit, cursor)
                }
                None => format!("/v2/customers?limit={}", self.page_limit),
            };

            debug!(fetched = items.len(), "fetching fallback page");
            let page: Value = match self.client.get(&endpoint, access_token).await {
                Ok(page) => page,
                Err(err) if items.is_empty() => return Err(err),
                Err(err) => {
                    warn!(
                        error = %err,
                        fetched = items.len(),
                        "fallback listing failed mid-pagination, keeping accumulated records"
                    );
                    break;
                }
            };

            if let Some(page_items) = page.get("customers").and_then(Value::as_array) {
                items.extend(page_items.iter().cloned());
            }

            if items.len() >= self.max_records {
                warn!(
                    fetched = items.len(),
                    cap = self.max_records,
                    "pagination safety cap reached, stopping early"
                );
                break;
            }

            match page.get("cursor").and_then(Value::as_str) {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        Ok(items)
    }
}
