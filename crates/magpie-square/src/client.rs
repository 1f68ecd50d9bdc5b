//! Square HTTP client with cursor pagination.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{SquareError, SquareResult};

/// A cursor walk that failed partway through.
#[derive(Debug)]
pub struct PagedFailure {
    /// Zero-based index of the page the failure occurred on.
    pub page: usize,
    /// Items accumulated from the pages before the failure.
    pub items: Vec<Value>,
    pub error: SquareError,
}

impl PagedFailure {
    /// True when not even the first page could be fetched.
    pub fn is_first_page(&self) -> bool {
        self.page == 0
    }
}

/// Square's error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    errors: Vec<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    category: Option<String>,
    code: String,
    #[serde(default)]
    detail: Option<String>,
}

/// Thin authenticated client for the Square API.
///
/// Every request carries bearer auth and the pinned `Square-Version` header.
/// The client performs no retries of its own; retry policy belongs to the
/// sync cycle that calls it.
#[derive(Debug, Clone)]
pub struct SquareClient {
    http_client: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl SquareClient {
    /// Creates a new client against the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, api_version: impl Into<String>) -> SquareResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SquareError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Performs a GET request against an endpoint path (e.g. `/v2/locations`).
    #[instrument(skip(self, access_token))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> SquareResult<T> {
        self.execute(reqwest::Method::GET, endpoint, access_token, None)
            .await
    }

    /// Performs a POST request with a JSON body.
    #[instrument(skip(self, access_token, body))]
    pub async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        endpoint: &str,
        access_token: &str,
        body: &B,
    ) -> SquareResult<T> {
        let body = serde_json::to_value(body)?;
        self.execute(reqwest::Method::POST, endpoint, access_token, Some(body))
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        access_token: &str,
        body: Option<Value>,
    ) -> SquareResult<T> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request = self
            .http_client
            .request(method, &url)
            .bearer_auth(access_token)
            .header("Square-Version", &self.api_version);

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(SquareError::from);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(1);
            return Err(SquareError::RateLimited { retry_after_secs });
        }

        let raw = response.text().await.unwrap_or_default();
        let (code, detail) = decode_error_body(&raw, status.as_u16());

        match status {
            reqwest::StatusCode::UNAUTHORIZED => Err(SquareError::Auth(detail)),
            reqwest::StatusCode::FORBIDDEN => Err(SquareError::PermissionDenied(detail)),
            reqwest::StatusCode::NOT_FOUND => Err(SquareError::NotFound(detail)),
            _ => Err(SquareError::Api {
                status: status.as_u16(),
                code,
                detail,
            }),
        }
    }

    /// Drives a cursor-paginated search endpoint to completion.
    ///
    /// Square's search endpoints take the cursor in the request body and
    /// return it next to the result array. The loop re-issues the request
    /// with the returned cursor attached until no cursor comes back, or the
    /// accumulated count reaches `max_records` (a defensive cap, not a
    /// correctness rule).
    ///
    /// # Errors
    ///
    /// A page failure returns a [`PagedFailure`] carrying the failing page
    /// index and the items accumulated from the pages before it, so callers
    /// can tell a dead endpoint from a walk that broke partway.
    #[instrument(skip(self, access_token, body))]
    pub async fn search_paginated(
        &self,
        endpoint: &str,
        access_token: &str,
        mut body: Value,
        items_key: &str,
        max_records: usize,
    ) -> Result<Vec<Value>, PagedFailure> {
        let mut items: Vec<Value> = Vec::new();
        let mut page_index = 0usize;

        loop {
            debug!(page = page_index, fetched = items.len(), "fetching page");
            let page: Value = match self
                .execute(
                    reqwest::Method::POST,
                    endpoint,
                    access_token,
                    Some(body.clone()),
                )
                .await
            {
                Ok(page) => page,
                Err(error) => {
                    return Err(PagedFailure {
                        page: page_index,
                        items,
                        error,
                    });
                }
            };
            page_index += 1;

            if let Some(page_items) = page.get(items_key).and_then(Value::as_array) {
                items.extend(page_items.iter().cloned());
            }

            if items.len() >= max_records {
                warn!(
                    fetched = items.len(),
                    cap = max_records,
                    "pagination safety cap reached, stopping early"
                );
                break;
            }

            match page.get("cursor").and_then(Value::as_str) {
                Some(cursor) => {
                    body["cursor"] = Value::String(cursor.to_string());
                }
                None => break,
            }
        }

        Ok(items)
    }
}

/// Decodes Square's `{"errors":[{category, code, detail}]}` envelope,
/// falling back to the raw body when it does not parse.
fn decode_error_body(raw: &str, status: u16) -> (String, String) {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(raw) {
        if let Some(first) = envelope.errors.first() {
            let detail = first
                .detail
                .clone()
                .or_else(|| first.category.clone())
                .unwrap_or_else(|| first.code.clone());
            return (first.code.clone(), detail);
        }
    }
    (status.to_string(), raw.to_string())
}
