//! Recurring sync scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use magpie_store::CredentialStore;

use crate::error::SyncError;
use crate::orchestrator::TenantSyncOrchestrator;
use crate::policy;
use crate::report::{CycleSummary, SyncOutcome, SyncReport};
use crate::settings::SyncSettings;

/// Decides when each tenant is refreshed and synced, and spaces the work to
/// respect external rate limits.
///
/// Tenants are processed sequentially with a fixed delay between them; that
/// spacing is the rate-limit strategy, not an accident.
pub struct SyncScheduler {
    orchestrator: Arc<TenantSyncOrchestrator>,
    credentials: Arc<dyn CredentialStore>,
    settings: Arc<SyncSettings>,
    shutdown: AtomicBool,
}

impl SyncScheduler {
    pub fn new(
        orchestrator: Arc<TenantSyncOrchestrator>,
        credentials: Arc<dyn CredentialStore>,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            orchestrator,
            credentials,
            settings,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Request a graceful stop; the loop exits after the current tenant.
    pub fn shutdown(&self) {
        info!("scheduler shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Long-lived background loop.
    ///
    /// Runs a cycle, sleeps the configured interval, repeats. A cycle-level
    /// error (store unreachable) logs and cools down instead of terminating;
    /// only shutdown ends the loop.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            interval_secs = self.settings.sync_interval.as_secs(),
            threshold_days = self.settings.sync_threshold_days,
            "background sync loop started"
        );

        loop {
            if self.is_shutdown() {
                break;
            }

            match self.run_cycle(false).await {
                Ok(summary) => {
                    info!(
                        synced = summary.synced,
                        refreshed = summary.refreshed,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "sync cycle complete"
                    );
                    self.sleep_interruptible(self.settings.sync_interval).await;
                }
                Err(err) => {
                    error!(error = %err, "sync cycle failed, cooling down");
                    self.sleep_interruptible(self.settings.error_cooldown).await;
                }
            }
        }

        info!("background sync loop stopped");
    }

    /// One scheduler pass over all active tenants.
    ///
    /// `force` bypasses the staleness gate (tokens still refresh only when
    /// due). Per-tenant failures are counted, never propagated.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, force: bool) -> Result<CycleSummary, SyncError> {
        let now = Utc::now();
        let tenants = self.credentials.list_active().await?;
        info!(tenants = tenants.len(), force, "starting sync cycle");

        let mut summary = CycleSummary::default();
        for (index, tenant) in tenants.iter().enumerate() {
            if self.is_shutdown() {
                break;
            }

            if policy::should_refresh_token(
                tenant.token_updated_at,
                self.settings.token_refresh_threshold_days,
                now,
            ) {
                match self.orchestrator.refresh_tenant_token(&tenant.tenant_id).await {
                    Ok(()) => summary.refreshed += 1,
                    Err(err) => {
                        // The tenant stays stale until the next cycle; a
                        // non-advancing last_sync_at is the operator signal.
                        warn!(tenant_id = %tenant.tenant_id, error = %err, "token refresh failed");
                    }
                }
            }

            let due = force
                || policy::should_sync(
                    tenant.last_sync_at,
                    self.settings.sync_threshold_days,
                    now,
                );
            if !due {
                summary.skipped += 1;
                continue;
            }

            let report = self.orchestrator.sync_tenant(&tenant.tenant_id).await;
            match report.outcome {
                SyncOutcome::Failed => summary.failed += 1,
                _ => summary.synced += 1,
            }

            if index + 1 < tenants.len() {
                self.sleep_interruptible(self.settings.tenant_delay).await;
            }
        }

        Ok(summary)
    }

    /// Synchronous single-tenant sync for the HTTP layer.
    pub async fn sync_one(&self, tenant_id: &str) -> SyncReport {
        self.orchestrator.sync_tenant(tenant_id).await
    }

    /// Manual refresh-and-sync: rotate the tenant's token pair, then sync
    /// with the fresh token.
    ///
    /// A failed refresh fails the run outright: the caller asked for a fresh
    /// token, and syncing with the stale one would mask the problem.
    pub async fn refresh_one(&self, tenant_id: &str) -> SyncReport {
        if let Err(err) = self.orchestrator.refresh_tenant_token(tenant_id).await {
            warn!(tenant_id, error = %err, "manual token refresh failed");
            return SyncReport::failed(
                Uuid::new_v4(),
                tenant_id,
                format!("token refresh failed: {err}"),
                "reauthorize",
            );
        }

        self.orchestrator.sync_tenant(tenant_id).await
    }

    /// Synchronous sync over every active tenant.
    ///
    /// With `force` the staleness gate is ignored and every tenant syncs;
    /// tokens still refresh only when due, as in the background cycle.
    pub async fn sync_all(&self, force: bool) -> Result<Vec<SyncReport>, SyncError> {
        let now = Utc::now();
        let tenants = self.credentials.list_active().await?;
        let mut reports = Vec::new();

        for (index, tenant) in tenants.iter().enumerate() {
            if policy::should_refresh_token(
                tenant.token_updated_at,
                self.settings.token_refresh_threshold_days,
                now,
            ) {
                if let Err(err) = self.orchestrator.refresh_tenant_token(&tenant.tenant_id).await
                {
                    warn!(tenant_id = %tenant.tenant_id, error = %err, "token refresh failed");
                }
            }

            let due = force
                || policy::should_sync(
                    tenant.last_sync_at,
                    self.settings.sync_threshold_days,
                    now,
                );
            if !due {
                continue;
            }

            reports.push(self.orchestrator.sync_tenant(&tenant.tenant_id).await);

            if index + 1 < tenants.len() {
                self.sleep_interruptible(self.settings.tenant_delay).await;
            }
        }

        Ok(reports)
    }

    /// Entry point for an external cron system: verify the shared secret,
    /// run one cycle synchronously, and return its summary.
    pub async fn cron_trigger(&self, presented_secret: &str) -> Result<CycleSummary, SyncError> {
        let Some(expected) = &self.settings.cron_shared_secret else {
            return Err(SyncError::TriggerDisabled);
        };
        if !secrets_match(presented_secret, expected.expose_secret()) {
            return Err(SyncError::Unauthorized);
        }

        self.run_cycle(false).await
    }

    /// Sleeps in one-second slices so shutdown does not wait out a 12-hour
    /// interval.
    async fn sleep_interruptible(&self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_shutdown() {
                return;
            }
            let slice = remaining.min(Duration::from_secs(1));
            tokio::time::sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }
    }
}

fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();
    presented.len() == expected.len() && bool::from(presented.ct_eq(expected))
}
