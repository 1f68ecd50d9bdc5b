//! Sync run reports and cycle summaries.

use serde::Serialize;
use uuid::Uuid;

/// Terminal state of one per-tenant sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Customers fetched, linked, persisted, and status updated.
    Success,
    /// Customers persisted, but linking or finalization degraded.
    Partial,
    /// Nothing was persisted.
    Failed,
}

/// What one sync run did, in a shape the HTTP layer can return directly.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub outcome: SyncOutcome,
    /// Customer records persisted by this run.
    pub records: usize,
    /// Human-readable cause for Partial/Failed outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Operator next step, e.g. "reauthorize" or "retry".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<&'static str>,
}

impl SyncReport {
    pub fn success(run_id: Uuid, tenant_id: &str, records: usize) -> Self {
        Self {
            run_id,
            tenant_id: tenant_id.to_string(),
            outcome: SyncOutcome::Success,
            records,
            reason: None,
            advice: None,
        }
    }

    pub fn partial(run_id: Uuid, tenant_id: &str, records: usize, reason: String) -> Self {
        Self {
            run_id,
            tenant_id: tenant_id.to_string(),
            outcome: SyncOutcome::Partial,
            records,
            reason: Some(reason),
            advice: Some("retry"),
        }
    }

    pub fn failed(
        run_id: Uuid,
        tenant_id: &str,
        reason: String,
        advice: &'static str,
    ) -> Self {
        Self {
            run_id,
            tenant_id: tenant_id.to_string(),
            outcome: SyncOutcome::Failed,
            records: 0,
            reason: Some(reason),
            advice: Some(advice),
        }
    }
}

/// Aggregate of one scheduler cycle.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CycleSummary {
    /// Tenants whose token pair was refreshed.
    pub refreshed: usize,
    /// Tenants synced (Success or Partial).
    pub synced: usize,
    /// Tenants skipped by the staleness gate.
    pub skipped: usize,
    /// Tenants whose sync run failed.
    pub failed: usize,
}
