//! Per-tenant sync procedure.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use magpie_square::{
    CustomerFetcher, InvoiceLinker, LinkerOptions, OAuthClient, SquareClient, SquareError,
};
use magpie_store::{CredentialStore, RecordStore};

use crate::error::SyncError;
use crate::report::SyncReport;
use crate::settings::SyncSettings;

/// Runs the sync state machine for one tenant at a time.
///
/// Steps are strictly sequential — customers, then invoice linking, then the
/// atomic collection replace, then the status update — because each depends
/// on the previous result. A failure in linking degrades the run to Partial;
/// it never aborts customer persistence.
pub struct TenantSyncOrchestrator {
    client: SquareClient,
    oauth: Arc<OAuthClient>,
    credentials: Arc<dyn CredentialStore>,
    records: Arc<dyn RecordStore>,
    settings: Arc<SyncSettings>,
    /// Advisory locks so at most one sync per tenant runs concurrently.
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TenantSyncOrchestrator {
    pub fn new(
        client: SquareClient,
        oauth: Arc<OAuthClient>,
        credentials: Arc<dyn CredentialStore>,
        records: Arc<dyn RecordStore>,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            client,
            oauth,
            credentials,
            records,
            settings,
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Synchronizes one tenant, rejecting concurrent runs for the same id.
    pub async fn sync_tenant(&self, tenant_id: &str) -> SyncReport {
        let run_id = Uuid::new_v4();

        let lock = self.tenant_lock(tenant_id).await;
        let Ok(_guard) = lock.try_lock_owned() else {
            warn!(tenant_id, "rejecting concurrent sync request");
            return SyncReport::failed(
                run_id,
                tenant_id,
                "sync already in progress".to_string(),
                "retry",
            );
        };

        self.run(run_id, tenant_id).await
    }

    /// Refreshes the tenant's token pair and stores it.
    ///
    /// Square does not always rotate the refresh token; the stored one is
    /// kept when the grant omits it.
    #[instrument(skip(self))]
    pub async fn refresh_tenant_token(&self, tenant_id: &str) -> Result<(), SyncError> {
        let Some(credential) = self.credentials.get(tenant_id).await? else {
            return Err(SyncError::Square(SquareError::NotFound(format!(
                "no credentials stored for tenant {tenant_id}"
            ))));
        };

        let grant = self.oauth.refresh(&credential.refresh_token).await?;
        let refresh_token = grant
            .refresh_token
            .unwrap_or_else(|| credential.refresh_token.clone());

        self.credentials
            .upsert(
                tenant_id,
                &grant.access_token,
                &refresh_token,
                credential.display_name.as_deref(),
                None,
            )
            .await?;

        info!(tenant_id, "token pair refreshed");
        Ok(())
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn run(&self, run_id: Uuid, tenant_id: &str) -> SyncReport {
        let credential = match self.credentials.get(tenant_id).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                return SyncReport::failed(
                    run_id,
                    tenant_id,
                    "no credentials stored for tenant".to_string(),
                    "reauthorize",
                );
            }
            Err(err) => {
                return SyncReport::failed(
                    run_id,
                    tenant_id,
                    format!("credential lookup failed: {err}"),
                    "retry",
                );
            }
        };

        // The soft deadline is split across the two network phases so a slow
        // linker cannot starve persistence.
        let phase_budget = self.settings.sync_deadline / 2;

        let fetcher = CustomerFetcher::new(
            &self.client,
            self.settings.history_window_days,
            self.settings.page_limit,
            self.settings.max_records,
        );
        let mut customers = match timeout(phase_budget, fetcher.fetch(&credential.access_token))
            .await
        {
            Err(_) => {
                return SyncReport::failed(
                    run_id,
                    tenant_id,
                    "customer fetch exceeded the sync deadline".to_string(),
                    "retry",
                );
            }
            Ok(Err(err)) => {
                let advice = if err.is_auth() { "reauthorize" } else { "retry" };
                return SyncReport::failed(
                    run_id,
                    tenant_id,
                    format!("customer fetch failed: {err}"),
                    advice,
                );
            }
            Ok(Ok(customers)) => customers,
        };

        // An empty collection is valid (a brand-new tenant); the full-replace
        // still runs so the store mirrors upstream.
        let mut degraded: Option<String> = None;
        if !customers.is_empty() {
            let customer_ids: HashSet<String> = customers
                .iter()
                .map(|customer| customer.customer_id.clone())
                .collect();

            let linker = InvoiceLinker::new(
                &self.client,
                self.credentials.as_ref(),
                LinkerOptions {
                    page_limit: self.settings.page_limit,
                    max_records: self.settings.max_records,
                    order_batch_size: self.settings.order_batch_size,
                    order_batch_delay: self.settings.order_batch_delay,
                },
            );

            match timeout(
                phase_budget,
                linker.link(&credential, &customer_ids, &credential.access_token),
            )
            .await
            {
                Err(_) => {
                    degraded = Some("invoice linking exceeded the sync deadline".to_string());
                }
                Ok(Err(err)) => {
                    warn!(tenant_id, error = %err, "invoice linking degraded to empty");
                    degraded = Some(format!("invoice linking failed: {err}"));
                }
                Ok(Ok(linkages)) => {
                    for customer in &mut customers {
                        customer.latest_invoice = linkages.get(&customer.customer_id).cloned();
                    }
                }
            }
        }

        if let Err(err) = self.records.replace_customers(tenant_id, &customers).await {
            return SyncReport::failed(
                run_id,
                tenant_id,
                format!("persisting customers failed: {err}"),
                "retry",
            );
        }

        let record_count = customers.len();
        if let Err(err) = self
            .credentials
            .update_sync_status(tenant_id, record_count as i64)
            .await
        {
            warn!(tenant_id, error = %err, "sync status update failed");
            degraded.get_or_insert_with(|| format!("sync status update failed: {err}"));
        }

        match degraded {
            Some(reason) => {
                info!(tenant_id, records = record_count, reason = %reason, "sync partially succeeded");
                SyncReport::partial(run_id, tenant_id, record_count, reason)
            }
            None => {
                info!(tenant_id, records = record_count, "sync succeeded");
                SyncReport::success(run_id, tenant_id, record_count)
            }
        }
    }

    async fn tenant_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
