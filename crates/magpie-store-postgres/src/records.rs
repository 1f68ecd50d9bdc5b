//! Customer collection queries.

use async_trait::async_trait;
use tracing::instrument;

use magpie_store::{CustomerRecord, RecordStore, StoreError, StoreResult};

use crate::{db_err, PgStore};

#[async_trait]
impl RecordStore for PgStore {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn replace_customers(
        &self,
        tenant_id: &str,
        records: &[CustomerRecord],
    ) -> StoreResult<()> {
        // Delete and re-insert inside one transaction: readers see the old
        // collection or the new one, never a mix.
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM magpie_customers WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for record in records {
            let payload = serde_json::to_value(record).map_err(|e| {
                StoreError::write_failed_with_source("failed to encode customer record", e)
            })?;

            sqlx::query(
                "INSERT INTO magpie_customers (tenant_id, customer_id, record, synced_at)
                 VALUES ($1, $2, $3, NOW())
                 ON CONFLICT (tenant_id, customer_id) DO UPDATE SET
                     record = EXCLUDED.record,
                     synced_at = NOW()",
            )
            .bind(tenant_id)
            .bind(&record.customer_id)
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    #[instrument(skip(self))]
    async fn list_customers(&self, tenant_id: &str) -> StoreResult<Vec<CustomerRecord>> {
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT record FROM magpie_customers WHERE tenant_id = $1 ORDER BY customer_id",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|payload| {
                serde_json::from_value(payload).map_err(|e| StoreError::CorruptRow {
                    key: tenant_id.to_string(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn customer_count(&self, tenant_id: &str) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM magpie_customers WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(count.max(0) as u64)
    }
}
