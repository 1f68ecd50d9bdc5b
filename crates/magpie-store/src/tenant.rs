//! Per-tenant credential rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a credential row is usable for syncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Tokens are live; the tenant participates in scheduled syncs.
    Active,
    /// Authorization was withdrawn; the row is kept for history but skipped.
    Revoked,
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown tenant status: {other}")),
        }
    }
}

/// OAuth credentials and sync bookkeeping for one connected merchant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantCredential {
    /// Square merchant id; unique key across active rows.
    pub tenant_id: String,
    /// Current bearer token for API calls.
    pub access_token: String,
    /// Token used to obtain a fresh access token without re-authorization.
    pub refresh_token: String,
    /// When the token pair was last written; drives the refresh policy.
    pub token_updated_at: Option<DateTime<Utc>>,
    pub status: TenantStatus,
    /// Merchant business name, when the profile lookup succeeded.
    pub display_name: Option<String>,
    /// `None` means the tenant has never completed a sync.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Cached location ids so the linker does not hit the locations endpoint
    /// on every run.
    pub location_ids: Vec<String>,
    /// Last known synced-record count. Advisory only.
    pub record_count: i64,
}

impl TenantCredential {
    /// A fresh row for a tenant that has just authorized.
    pub fn new(
        tenant_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_updated_at: Some(Utc::now()),
            status: TenantStatus::Active,
            display_name: None,
            last_sync_at: None,
            location_ids: Vec::new(),
            record_count: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_credential_defaults() {
        let cred = TenantCredential::new("M1", "at", "rt");
        assert!(cred.is_active());
        assert!(cred.last_sync_at.is_none());
        assert!(cred.location_ids.is_empty());
        assert_eq!(cred.record_count, 0);
        assert!(cred.token_updated_at.is_some());
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(
            "active".parse::<TenantStatus>().unwrap(),
            TenantStatus::Active
        );
        assert_eq!(
            "revoked".parse::<TenantStatus>().unwrap(),
            TenantStatus::Revoked
        );
        assert!("deleted".parse::<TenantStatus>().is_err());
        assert_eq!(TenantStatus::Active.to_string(), "active");
        assert_eq!(TenantStatus::Revoked.to_string(), "revoked");
    }
}
