//! Merchant profile lookup.

use serde_json::Value;
use tracing::instrument;

use crate::client::SquareClient;
use crate::error::SquareResult;

/// Fetches the merchant's business name for display purposes.
///
/// Returns `None` when the profile carries no name; only transport and API
/// failures are errors.
#[instrument(skip(client, access_token))]
pub async fn fetch_business_name(
    client: &SquareClient,
    access_token: &str,
) -> SquareResult<Option<String>> {
    let response: Value = client.get("/v2/merchants", access_token).await?;

    Ok(response
        .get("merchant")
        .and_then(Value::as_array)
        .and_then(|merchants| merchants.first())
        .and_then(|merchant| merchant.get("business_name"))
        .and_then(Value::as_str)
        .map(String::from))
}
