//! Store contracts.
//!
//! Any tabular backend that can upsert a row by key, replace a collection
//! atomically, and list rows distinct by key can implement these traits.

use async_trait::async_trait;

use crate::customer::CustomerRecord;
use crate::error::StoreResult;
use crate::tenant::TenantCredential;

/// Persistent mapping of tenant → OAuth credentials and sync bookkeeping.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up the active credential for a tenant.
    ///
    /// Returns `Ok(None)` when the tenant is unknown or revoked; that is not
    /// an error.
    async fn get(&self, tenant_id: &str) -> StoreResult<Option<TenantCredential>>;

    /// Insert or update the credential row for a tenant.
    ///
    /// When an active row exists, the token fields and `token_updated_at` are
    /// updated in place, preserving `last_sync_at`, `record_count`, and the
    /// cached `location_ids` unless replacements are passed explicitly.
    /// Otherwise a fresh row is inserted with `last_sync_at = None` and
    /// `record_count = 0`.
    ///
    /// Implementations must perform this as one logical find-then-update-or-
    /// insert: repeated calls for one tenant never produce a second active
    /// row.
    async fn upsert(
        &self,
        tenant_id: &str,
        access_token: &str,
        refresh_token: &str,
        display_name: Option<&str>,
        location_ids: Option<&[String]>,
    ) -> StoreResult<()>;

    /// All active tenants, deduplicated by `tenant_id` (first occurrence
    /// wins) even if the backing rows contain duplicates.
    async fn list_active(&self) -> StoreResult<Vec<TenantCredential>>;

    /// Record a completed sync: `last_sync_at = now`, `record_count` updated.
    async fn update_sync_status(&self, tenant_id: &str, record_count: i64) -> StoreResult<()>;

    /// Write the cached location ids for a tenant.
    async fn cache_location_ids(&self, tenant_id: &str, location_ids: &[String]) -> StoreResult<()>;

    /// Flip the tenant's status to revoked. The row stays for history.
    async fn mark_revoked(&self, tenant_id: &str) -> StoreResult<()>;

    /// Administrative repair: keep the first row per `tenant_id`, delete the
    /// rest. Returns the number of rows removed. Never run implicitly.
    async fn remove_duplicates(&self) -> StoreResult<u64>;
}

/// Persistent tabular store for synced customer collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Atomically replace the tenant's entire customer collection, creating
    /// it if absent. Readers never observe a half-written collection.
    async fn replace_customers(
        &self,
        tenant_id: &str,
        records: &[CustomerRecord],
    ) -> StoreResult<()>;

    /// Read back the tenant's synced customers.
    async fn list_customers(&self, tenant_id: &str) -> StoreResult<Vec<CustomerRecord>>;

    /// Number of rows currently stored for the tenant.
    async fn customer_count(&self, tenant_id: &str) -> StoreResult<u64>;
}
