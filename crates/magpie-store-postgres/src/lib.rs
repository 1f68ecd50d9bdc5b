//! Postgres backend for the Magpie store contracts.
//!
//! Credential rows live in `magpie_tenant_credentials` with a partial unique
//! index guaranteeing at most one active row per tenant; customer collections
//! live in `magpie_customers` as JSONB rows and are replaced inside one
//! transaction so readers never observe a half-written sync.

mod credentials;
mod records;

use sqlx::PgPool;

use magpie_store::StoreError;

/// Embedded schema migrations; run at startup via [`MIGRATOR`].
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Postgres implementation of both store traits.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::unavailable_with_source("query failed", err)
}
