//! Shared harness for sync integration tests.
//!
//! Builds the full service graph — Square client, OAuth client, orchestrator
//! — against a wiremock server and the in-memory store.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::MockServer;

use magpie_square::{OAuthClient, SquareClient, SquareCredentials};
use magpie_store::memory::MemoryStore;
use magpie_store::{CredentialStore, RecordStore, TenantCredential};
use magpie_sync::{SyncScheduler, SyncSettings, TenantSyncOrchestrator};

pub fn test_settings() -> SyncSettings {
    SyncSettings {
        client_id: "app-id".to_string(),
        client_secret: SecretString::from("app-secret".to_string()),
        api_base_url: String::new(),
        api_version: "2023-10-18".to_string(),
        redirect_uri: None,
        sync_interval: Duration::from_secs(3600),
        sync_threshold_days: 3,
        token_refresh_threshold_days: 25,
        history_window_days: 365,
        tenant_delay: Duration::from_millis(0),
        error_cooldown: Duration::from_secs(1),
        sync_deadline: Duration::from_secs(5),
        page_limit: 100,
        max_records: 2000,
        order_batch_size: 25,
        order_batch_delay: Duration::from_millis(0),
        cron_shared_secret: Some(SecretString::from("cron-secret".to_string())),
    }
}

pub struct Harness {
    pub server: MockServer,
    pub store: Arc<MemoryStore>,
    pub settings: Arc<SyncSettings>,
    pub orchestrator: Arc<TenantSyncOrchestrator>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    pub async fn with_settings(tweak: impl FnOnce(&mut SyncSettings)) -> Self {
        let server = MockServer::start().await;

        let mut settings = test_settings();
        tweak(&mut settings);
        let settings = Arc::new(settings);

        let store = Arc::new(MemoryStore::new());
        let client = SquareClient::new(server.uri(), settings.api_version.clone()).unwrap();
        let oauth = Arc::new(
            OAuthClient::new(
                server.uri(),
                SquareCredentials {
                    client_id: settings.client_id.clone(),
                    client_secret: settings.client_secret.clone(),
                },
            )
            .unwrap(),
        );

        let credentials: Arc<dyn CredentialStore> = store.clone();
        let records: Arc<dyn RecordStore> = store.clone();
        let orchestrator = Arc::new(TenantSyncOrchestrator::new(
            client,
            oauth,
            credentials,
            records,
            settings.clone(),
        ));

        Self {
            server,
            store,
            settings,
            orchestrator,
        }
    }

    pub fn scheduler(&self) -> SyncScheduler {
        let credentials: Arc<dyn CredentialStore> = self.store.clone();
        SyncScheduler::new(self.orchestrator.clone(), credentials, self.settings.clone())
    }

    /// Seed a tenant whose token pair is old enough to need a refresh.
    pub async fn seed_tenant_with_old_token(&self, tenant_id: &str, access_token: &str) {
        let mut credential = TenantCredential::new(tenant_id, access_token, "rt-old");
        credential.token_updated_at = Some(Utc::now() - chrono::Duration::days(40));
        self.store.seed_raw_row(credential).await;
    }
}

pub fn recent_customer(id: &str) -> Value {
    let ts = (Utc::now() - chrono::Duration::days(5)).to_rfc3339();
    json!({
        "id": id,
        "given_name": "Test",
        "family_name": "Customer",
        "created_at": ts,
        "updated_at": ts
    })
}

pub fn customers_page(customers: Vec<Value>) -> Value {
    json!({ "customers": customers })
}

pub fn empty_customers_page() -> Value {
    json!({ "customers": [] })
}

pub fn square_error(code: &str, detail: &str) -> Value {
    json!({
        "errors": [{
            "category": "AUTHENTICATION_ERROR",
            "code": code,
            "detail": detail
        }]
    })
}
