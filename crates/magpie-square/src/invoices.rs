//! Invoice → order → customer linking.
//!
//! Produces at most one [`InvoiceLinkage`] per customer: invoices are
//! searched newest first, so the first invoice that resolves to a customer
//! wins.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use magpie_store::{CredentialStore, InvoiceLinkage, TenantCredential};

use crate::client::SquareClient;
use crate::customers::timestamp_field;
use crate::error::SquareResult;

fn str_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(String::from)
}

/// Tunables for the linker.
#[derive(Debug, Clone)]
pub struct LinkerOptions {
    pub page_limit: u32,
    pub max_records: usize,
    /// Orders batch-retrieve chunk size; the endpoint bounds request size.
    pub order_batch_size: usize,
    /// Pause between order batches so a large tenant does not trip rate
    /// limits.
    pub order_batch_delay: Duration,
}

impl Default for LinkerOptions {
    fn default() -> Self {
        Self {
            page_limit: 100,
            max_records: 2000,
            order_batch_size: 25,
            order_batch_delay: Duration::from_millis(200),
        }
    }
}

/// Joins a tenant's invoices to their originating orders and maps the result
/// onto customer ids.
pub struct InvoiceLinker<'a> {
    client: &'a SquareClient,
    credentials: &'a dyn CredentialStore,
    options: LinkerOptions,
}

impl<'a> InvoiceLinker<'a> {
    pub fn new(
        client: &'a SquareClient,
        credentials: &'a dyn CredentialStore,
        options: LinkerOptions,
    ) -> Self {
        Self {
            client,
            credentials,
            options,
        }
    }

    /// Builds the `customer_id -> InvoiceLinkage` map for the given customer
    /// set.
    ///
    /// An empty map means "no invoices matched" and is not an error. A tenant
    /// with no resolvable locations also yields an empty map.
    ///
    /// # Errors
    ///
    /// Propagates API failures (including permission denials) so the caller
    /// can degrade the whole linkage while still persisting customers.
    #[instrument(skip_all, fields(tenant_id = %tenant.tenant_id, customers = customer_ids.len()))]
    pub async fn link(
        &self,
        tenant: &TenantCredential,
        customer_ids: &HashSet<String>,
        access_token: &str,
    ) -> SquareResult<HashMap<String, InvoiceLinkage>> {
        let location_ids = self.resolve_location_ids(tenant, access_token).await?;
        if location_ids.is_empty() {
            info!("tenant has no locations, skipping invoice linking");
            return Ok(HashMap::new());
        }

        let body = json!({
            "limit": self.options.page_limit,
            "query": {
                "filter": { "location_ids": location_ids },
                "sort": { "field": "INVOICE_SORT_DATE", "order": "DESC" }
            }
        });

        // A partial invoice list would silently unlink the customers on the
        // missing pages, so any page failure degrades the whole linkage.
        let invoices = self
            .client
            .search_paginated(
                "/v2/invoices/search",
                access_token,
                body,
                "invoices",
                self.options.max_records,
            )
            .await
            .map_err(|failure| failure.error)?;

        if invoices.is_empty() {
            info!("no invoices found for tenant");
            return Ok(HashMap::new());
        }

        let order_ids = collect_order_ids(&invoices);
        let orders = self.fetch_orders(&order_ids, access_token).await?;

        let mut linkages: HashMap<String, InvoiceLinkage> = HashMap::new();
        for invoice in &invoices {
            let order = invoice
                .get("order_id")
                .and_then(Value::as_str)
                .and_then(|id| orders.get(id));

            let Some(customer_id) = resolve_customer_id(invoice, order) else {
                continue;
            };
            if !customer_ids.contains(&customer_id) || linkages.contains_key(&customer_id) {
                continue;
            }

            match build_linkage(invoice, order) {
                Some(linkage) => {
                    linkages.insert(customer_id, linkage);
                }
                None => warn!("skipping invoice without an id"),
            }
        }

        info!(
            invoices = invoices.len(),
            orders = orders.len(),
            linked = linkages.len(),
            "invoice linking complete"
        );
        Ok(linkages)
    }

    /// Returns the tenant's location ids, fetching and caching them when the
    /// credential row carries none (self-healing cache).
    async fn resolve_location_ids(
        &self,
        tenant: &TenantCredential,
        access_token: &str,
    ) -> SquareResult<Vec<String>> {
        if !tenant.location_ids.is_empty() {
            debug!(count = tenant.location_ids.len(), "using cached location ids");
            return Ok(tenant.location_ids.clone());
        }

        let response: Value = self.client.get("/v2/locations", access_token).await?;
        let location_ids: Vec<String> = response
            .get("locations")
            .and_then(Value::as_array)
            .map(|locations| {
                locations
                    .iter()
                    .filter_map(|loc| loc.get("id").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        if !location_ids.is_empty() {
            if let Err(err) = self
                .credentials
                .cache_location_ids(&tenant.tenant_id, &location_ids)
                .await
            {
                // The cache is an optimization; linking proceeds without it.
                warn!(error = %err, "failed to cache location ids");
            }
        }

        Ok(location_ids)
    }

    /// Batch-retrieves full order objects, chunked with an inter-batch delay.
    async fn fetch_orders(
        &self,
        order_ids: &[String],
        access_token: &str,
    ) -> SquareResult<HashMap<String, Value>> {
        let mut orders = HashMap::new();
        let chunks: Vec<&[String]> = order_ids.chunks(self.options.order_batch_size).collect();
        let total_chunks = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            debug!(batch = index + 1, total = total_chunks, "retrieving order batch");
            let body = json!({ "order_ids": chunk });
            let response: Value = self
                .client
                .post("/v2/orders/batch-retrieve", access_token, &body)
                .await?;

            if let Some(list) = response.get("orders").and_then(Value::as_array) {
                for order in list {
                    if let Some(id) = order.get("id").and_then(Value::as_str) {
                        orders.insert(id.to_string(), order.clone());
                    }
                }
            }

            if index + 1 < total_chunks {
                tokio::time::sleep(self.options.order_batch_delay).await;
            }
        }

        Ok(orders)
    }
}

/// Referenced order ids, deduplicated, in invoice order.
fn collect_order_ids(invoices: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    invoices
        .iter()
        .filter_map(|invoice| invoice.get("order_id").and_then(Value::as_str))
        .filter(|id| seen.insert(id.to_string()))
        .map(String::from)
        .collect()
}

/// Resolves the customer an invoice belongs to.
///
/// Square has carried the reference in several shapes over API versions;
/// candidates are tried in priority order and the first non-empty id wins:
/// the primary recipient, the recipients list, then the order's own customer
/// reference.
fn resolve_customer_id(invoice: &Value, order: Option<&Value>) -> Option<String> {
    if let Some(id) = invoice
        .get("primary_recipient")
        .and_then(|recipient| recipient.get("customer_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
    {
        return Some(id.to_string());
    }

    if let Some(recipients) = invoice.get("recipients").and_then(Value::as_array) {
        for recipient in recipients {
            if let Some(id) = recipient
                .get("customer_id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
            {
                return Some(id.to_string());
            }
        }
    }

    order
        .and_then(|order| order.get("customer_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(String::from)
}

/// Merges invoice-level and order-level fields into one linkage.
///
/// Returns `None` when the invoice has no id.
fn build_linkage(invoice: &Value, order: Option<&Value>) -> Option<InvoiceLinkage> {
    let invoice_id = invoice.get("id").and_then(Value::as_str)?;
    let mut linkage = InvoiceLinkage::for_invoice(invoice_id);

    linkage.invoice_number = str_field(invoice, "invoice_number");
    linkage.status = str_field(invoice, "status");
    linkage.created_at = timestamp_field(invoice, "created_at");
    linkage.updated_at = timestamp_field(invoice, "updated_at");
    linkage.scheduled_at = timestamp_field(invoice, "scheduled_at");
    linkage.order_id = str_field(invoice, "order_id");

    if let Some(requests) = invoice.get("payment_requests").and_then(Value::as_array) {
        let mut total: Option<i64> = None;
        for request in requests {
            if let Some(amount) = request
                .get("computed_amount_money")
                .and_then(|money| money.get("amount"))
                .and_then(Value::as_i64)
            {
                total = Some(total.unwrap_or(0) + amount);
            }
            if linkage.due_date.is_none() {
                linkage.due_date = request
                    .get("due_date")
                    .and_then(Value::as_str)
                    .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());
            }
        }
        linkage.amount = total;
    }

    if let Some(order) = order {
        linkage.order_created_at = timestamp_field(order, "created_at");
        linkage.order_updated_at = timestamp_field(order, "updated_at");

        if let Some(fulfillments) = order.get("fulfillments").and_then(Value::as_array) {
            // Orders can carry several fulfillments; the last entry wins.
            for fulfillment in fulfillments {
                if let Some(pickup) = fulfillment.get("pickup_details") {
                    linkage.pickup_at = timestamp_field(pickup, "pickup_at");
                    linkage.pickup_note = str_field(pickup, "note");
                }
                if let Some(delivery) = fulfillment.get("delivery_details") {
                    linkage.delivery_at = timestamp_field(delivery, "deliver_at");
                    linkage.delivery_note = str_field(delivery, "note");
                }
            }
        }
    }

    Some(linkage)
}
