//! In-memory store backend.
//!
//! Backs tests and local development. Rows live in a plain vector so the
//! store can faithfully represent a polluted backing table (duplicate rows
//! seeded by earlier non-conforming writers) and exercise the dedup and
//! repair paths.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::customer::CustomerRecord;
use crate::error::StoreResult;
use crate::store::{CredentialStore, RecordStore};
use crate::tenant::{TenantCredential, TenantStatus};

/// In-memory implementation of both store traits.
#[derive(Default)]
pub struct MemoryStore {
    tenants: RwLock<Vec<TenantCredential>>,
    customers: RwLock<HashMap<String, Vec<CustomerRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a raw credential row without the upsert's duplicate protection.
    ///
    /// Test hook for simulating a store polluted by a non-conforming writer.
    pub async fn seed_raw_row(&self, credential: TenantCredential) {
        self.tenants.write().await.push(credential);
    }

    /// Number of raw rows, duplicates included.
    pub async fn raw_row_count(&self) -> usize {
        self.tenants.read().await.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, tenant_id: &str) -> StoreResult<Option<TenantCredential>> {
        let rows = self.tenants.read().await;
        Ok(rows
            .iter()
            .find(|row| row.tenant_id == tenant_id && row.is_active())
            .cloned())
    }

    async fn upsert(
        &self,
        tenant_id: &str,
        access_token: &str,
        refresh_token: &str,
        display_name: Option<&str>,
        location_ids: Option<&[String]>,
    ) -> StoreResult<()> {
        // Single write lock makes find-then-update-or-insert one logical
        // operation; concurrent upserts cannot both take the insert branch.
        let mut rows = self.tenants.write().await;

        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.tenant_id == tenant_id && row.is_active())
        {
            row.access_token = access_token.to_string();
            row.refresh_token = refresh_token.to_string();
            row.token_updated_at = Some(Utc::now());
            if let Some(name) = display_name {
                row.display_name = Some(name.to_string());
            }
            if let Some(ids) = location_ids {
                row.location_ids = ids.to_vec();
            }
            return Ok(());
        }

        let mut row = TenantCredential::new(tenant_id, access_token, refresh_token);
        row.display_name = display_name.map(str::to_string);
        if let Some(ids) = location_ids {
            row.location_ids = ids.to_vec();
        }
        rows.push(row);
        Ok(())
    }

    async fn list_active(&self) -> StoreResult<Vec<TenantCredential>> {
        let rows = self.tenants.read().await;
        let mut seen = HashSet::new();
        Ok(rows
            .iter()
            .filter(|row| row.is_active())
            .filter(|row| seen.insert(row.tenant_id.clone()))
            .cloned()
            .collect())
    }

    async fn update_sync_status(&self, tenant_id: &str, record_count: i64) -> StoreResult<()> {
        let mut rows = self.tenants.write().await;
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.tenant_id == tenant_id && row.is_active())
        {
            row.last_sync_at = Some(Utc::now());
            row.record_count = record_count;
        }
        Ok(())
    }

    async fn cache_location_ids(&self, tenant_id: &str, location_ids: &[String]) -> StoreResult<()> {
        let mut rows = self.tenants.write().await;
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.tenant_id == tenant_id && row.is_active())
        {
            row.location_ids = location_ids.to_vec();
        }
        Ok(())
    }

    async fn mark_revoked(&self, tenant_id: &str) -> StoreResult<()> {
        let mut rows = self.tenants.write().await;
        for row in rows
            .iter_mut()
            .filter(|row| row.tenant_id == tenant_id && row.is_active())
        {
            row.status = TenantStatus::Revoked;
        }
        Ok(())
    }

    async fn remove_duplicates(&self) -> StoreResult<u64> {
        let mut rows = self.tenants.write().await;
        let before = rows.len();
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(row.tenant_id.clone()));
        Ok((before - rows.len()) as u64)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn replace_customers(
        &self,
        tenant_id: &str,
        records: &[CustomerRecord],
    ) -> StoreResult<()> {
        // Single map-entry swap; readers see the old collection or the new
        // one, never a mix.
        self.customers
            .write()
            .await
            .insert(tenant_id.to_string(), records.to_vec());
        Ok(())
    }

    async fn list_customers(&self, tenant_id: &str) -> StoreResult<Vec<CustomerRecord>> {
        Ok(self
            .customers
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn customer_count(&self, tenant_id: &str) -> StoreResult<u64> {
        Ok(self
            .customers
            .read()
            .await
            .get(tenant_id)
            .map_or(0, |rows| rows.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let store = MemoryStore::new();

        store
            .upsert("M1", "at-1", "rt-1", Some("Sunrise Bakery"), None)
            .await
            .unwrap();
        let cred = store.get("M1").await.unwrap().unwrap();
        assert_eq!(cred.access_token, "at-1");
        assert_eq!(cred.display_name.as_deref(), Some("Sunrise Bakery"));
        assert!(cred.last_sync_at.is_none());

        store.update_sync_status("M1", 42).await.unwrap();

        // Second upsert updates tokens but preserves sync bookkeeping.
        store.upsert("M1", "at-2", "rt-2", None, None).await.unwrap();
        let cred = store.get("M1").await.unwrap().unwrap();
        assert_eq!(cred.access_token, "at-2");
        assert_eq!(cred.refresh_token, "rt-2");
        assert_eq!(cred.record_count, 42);
        assert!(cred.last_sync_at.is_some());
        assert_eq!(cred.display_name.as_deref(), Some("Sunrise Bakery"));
        assert_eq!(store.raw_row_count().await, 1);
    }

    #[tokio::test]
    async fn test_repeated_upserts_never_duplicate() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store
                .upsert("M1", &format!("at-{i}"), "rt", None, None)
                .await
                .unwrap();
        }
        assert_eq!(store.raw_row_count().await, 1);
        assert_eq!(store.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_active_dedups_polluted_rows() {
        let store = MemoryStore::new();
        let mut first = TenantCredential::new("M1", "at-old", "rt");
        first.record_count = 7;
        store.seed_raw_row(first).await;
        store
            .seed_raw_row(TenantCredential::new("M1", "at-dup", "rt"))
            .await;
        store
            .seed_raw_row(TenantCredential::new("M2", "at", "rt"))
            .await;

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 2);
        // First occurrence wins.
        let m1 = active.iter().find(|c| c.tenant_id == "M1").unwrap();
        assert_eq!(m1.record_count, 7);
    }

    #[tokio::test]
    async fn test_list_active_skips_revoked() {
        let store = MemoryStore::new();
        store.upsert("M1", "at", "rt", None, None).await.unwrap();
        store.upsert("M2", "at", "rt", None, None).await.unwrap();
        store.mark_revoked("M1").await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tenant_id, "M2");
        assert!(store.get("M1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_duplicates_keeps_first() {
        let store = MemoryStore::new();
        store
            .seed_raw_row(TenantCredential::new("M1", "at-keep", "rt"))
            .await;
        store
            .seed_raw_row(TenantCredential::new("M1", "at-drop", "rt"))
            .await;
        store
            .seed_raw_row(TenantCredential::new("M1", "at-drop2", "rt"))
            .await;
        store
            .seed_raw_row(TenantCredential::new("M2", "at", "rt"))
            .await;

        let removed = store.remove_duplicates().await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.raw_row_count().await, 2);
        let m1 = store.get("M1").await.unwrap().unwrap();
        assert_eq!(m1.access_token, "at-keep");
    }

    #[tokio::test]
    async fn test_cache_location_ids() {
        let store = MemoryStore::new();
        store.upsert("M1", "at", "rt", None, None).await.unwrap();
        store
            .cache_location_ids("M1", &["L1".to_string(), "L2".to_string()])
            .await
            .unwrap();

        let cred = store.get("M1").await.unwrap().unwrap();
        assert_eq!(cred.location_ids, vec!["L1", "L2"]);

        // Upsert without explicit location ids preserves the cache.
        store.upsert("M1", "at-2", "rt-2", None, None).await.unwrap();
        let cred = store.get("M1").await.unwrap().unwrap();
        assert_eq!(cred.location_ids, vec!["L1", "L2"]);
    }

    #[tokio::test]
    async fn test_replace_customers_overwrites() {
        let store = MemoryStore::new();
        let first = vec![
            CustomerRecord::new("C1"),
            CustomerRecord::new("C2"),
            CustomerRecord::new("C3"),
        ];
        store.replace_customers("M1", &first).await.unwrap();
        assert_eq!(store.customer_count("M1").await.unwrap(), 3);

        let second = vec![CustomerRecord::new("C9")];
        store.replace_customers("M1", &second).await.unwrap();
        let rows = store.list_customers("M1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].customer_id, "C9");
    }

    #[tokio::test]
    async fn test_unknown_tenant_reads() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        assert!(store.list_customers("missing").await.unwrap().is_empty());
        assert_eq!(store.customer_count("missing").await.unwrap(), 0);
    }
}
