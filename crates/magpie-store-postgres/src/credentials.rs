//! Credential store queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use magpie_store::{CredentialStore, StoreResult, TenantCredential, TenantStatus};

use crate::{db_err, PgStore};

/// Database row for a tenant credential.
#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    tenant_id: String,
    access_token: String,
    refresh_token: String,
    token_updated_at: Option<DateTime<Utc>>,
    status: String,
    display_name: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
    location_ids: Vec<String>,
    record_count: i64,
}

impl CredentialRow {
    fn into_credential(self) -> TenantCredential {
        TenantCredential {
            tenant_id: self.tenant_id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_updated_at: self.token_updated_at,
            // An unknown status is treated as revoked so a bad row cannot
            // re-enter the sync rotation.
            status: self.status.parse().unwrap_or(TenantStatus::Revoked),
            display_name: self.display_name,
            last_sync_at: self.last_sync_at,
            location_ids: self.location_ids,
            record_count: self.record_count,
        }
    }
}

const CREDENTIAL_COLUMNS: &str = "tenant_id, access_token, refresh_token, token_updated_at, \
     status, display_name, last_sync_at, location_ids, record_count";

#[async_trait]
impl CredentialStore for PgStore {
    #[instrument(skip(self))]
    async fn get(&self, tenant_id: &str) -> StoreResult<Option<TenantCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS}
             FROM magpie_tenant_credentials
             WHERE tenant_id = $1 AND status = 'active'
             ORDER BY id
             LIMIT 1"
        ))
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(CredentialRow::into_credential))
    }

    #[instrument(skip(self, access_token, refresh_token))]
    async fn upsert(
        &self,
        tenant_id: &str,
        access_token: &str,
        refresh_token: &str,
        display_name: Option<&str>,
        location_ids: Option<&[String]>,
    ) -> StoreResult<()> {
        // The partial unique index on active rows makes this a single
        // find-then-update-or-insert; a concurrent insert loses the race and
        // lands on the DO UPDATE arm instead of creating a duplicate.
        sqlx::query(
            "INSERT INTO magpie_tenant_credentials
                 (tenant_id, access_token, refresh_token, token_updated_at, status,
                  display_name, location_ids)
             VALUES ($1, $2, $3, NOW(), 'active', $4, COALESCE($5, '{}'))
             ON CONFLICT (tenant_id) WHERE status = 'active' DO UPDATE SET
                 access_token = EXCLUDED.access_token,
                 refresh_token = EXCLUDED.refresh_token,
                 token_updated_at = NOW(),
                 display_name = COALESCE($4, magpie_tenant_credentials.display_name),
                 location_ids = COALESCE($5, magpie_tenant_credentials.location_ids)",
        )
        .bind(tenant_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(display_name)
        .bind(location_ids.map(<[String]>::to_vec))
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_active(&self) -> StoreResult<Vec<TenantCredential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT DISTINCT ON (tenant_id) {CREDENTIAL_COLUMNS}
             FROM magpie_tenant_credentials
             WHERE status = 'active'
             ORDER BY tenant_id, id"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(CredentialRow::into_credential).collect())
    }

    #[instrument(skip(self))]
    async fn update_sync_status(&self, tenant_id: &str, record_count: i64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE magpie_tenant_credentials
             SET last_sync_at = NOW(), record_count = $2
             WHERE tenant_id = $1 AND status = 'active'",
        )
        .bind(tenant_id)
        .bind(record_count)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    #[instrument(skip(self, location_ids))]
    async fn cache_location_ids(&self, tenant_id: &str, location_ids: &[String]) -> StoreResult<()> {
        sqlx::query(
            "UPDATE magpie_tenant_credentials
             SET location_ids = $2
             WHERE tenant_id = $1 AND status = 'active'",
        )
        .bind(tenant_id)
        .bind(location_ids.to_vec())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_revoked(&self, tenant_id: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE magpie_tenant_credentials
             SET status = 'revoked'
             WHERE tenant_id = $1 AND status = 'active'",
        )
        .bind(tenant_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_duplicates(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM magpie_tenant_credentials a
             USING magpie_tenant_credentials b
             WHERE a.tenant_id = b.tenant_id AND a.id > b.id",
        )
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}
