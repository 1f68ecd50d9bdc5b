//! Domain records and store contracts for Magpie.
//!
//! This crate defines the persistent shapes the sync engine works with — the
//! per-tenant credential row and the synced customer record — together with
//! the async [`CredentialStore`] and [`RecordStore`] traits every backend
//! implements. An in-memory backend lives in [`memory`] for tests and local
//! development; the production Postgres backend lives in
//! `magpie-store-postgres`.

mod customer;
mod error;
pub mod memory;
mod store;
mod tenant;

pub use customer::{CustomerRecord, InvoiceLinkage, PostalAddress};
pub use error::{StoreError, StoreResult};
pub use store::{CredentialStore, RecordStore};
pub use tenant::{TenantCredential, TenantStatus};
