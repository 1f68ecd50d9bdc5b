//! Magpie sync daemon.
//!
//! Wires the service graph together, spawns the background scheduler, and
//! serves the HTTP trigger surface.

mod routes;
mod state;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use magpie_square::{OAuthClient, SquareClient, SquareCredentials};
use magpie_store::{CredentialStore, RecordStore};
use magpie_store_postgres::{PgStore, MIGRATOR};
use magpie_sync::{SyncScheduler, SyncSettings, TenantSyncOrchestrator};

use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,magpie_sync=debug,magpie_square=debug")
            }),
        )
        .init();

    let settings = SyncSettings::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });
    let settings = Arc::new(settings);

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        eprintln!("Configuration error: missing required environment variable: DATABASE_URL");
        std::process::exit(1);
    });
    let listen_addr =
        std::env::var("MAGPIE_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    tracing::info!(
        api_base_url = %settings.api_base_url,
        sync_interval_secs = settings.sync_interval.as_secs(),
        sync_threshold_days = settings.sync_threshold_days,
        history_window_days = settings.history_window_days,
        "starting magpie-syncd"
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Database connection error: {e}");
            std::process::exit(1);
        });

    MIGRATOR.run(&pool).await.unwrap_or_else(|e| {
        eprintln!("Migration error: {e}");
        std::process::exit(1);
    });

    let store = Arc::new(PgStore::new(pool));
    let credentials: Arc<dyn CredentialStore> = store.clone();
    let records: Arc<dyn RecordStore> = store;

    let client = SquareClient::new(settings.api_base_url.clone(), settings.api_version.clone())
        .unwrap_or_else(|e| {
            eprintln!("Client error: {e}");
            std::process::exit(1);
        });
    let oauth = Arc::new(
        OAuthClient::new(
            settings.api_base_url.clone(),
            SquareCredentials {
                client_id: settings.client_id.clone(),
                client_secret: settings.client_secret.clone(),
            },
        )
        .unwrap_or_else(|e| {
            eprintln!("Client error: {e}");
            std::process::exit(1);
        }),
    );

    let orchestrator = Arc::new(TenantSyncOrchestrator::new(
        client.clone(),
        oauth.clone(),
        credentials.clone(),
        records.clone(),
        settings.clone(),
    ));
    let scheduler = Arc::new(SyncScheduler::new(
        orchestrator,
        credentials.clone(),
        settings.clone(),
    ));

    let background = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    let app = routes::router(AppState {
        scheduler: scheduler.clone(),
        credentials,
        records,
        client,
        oauth,
        settings,
    });

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind {listen_addr}: {e}");
            std::process::exit(1);
        });
    tracing::info!(%listen_addr, "magpie-syncd listening");

    let shutdown = {
        let scheduler = scheduler.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            scheduler.shutdown();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        });

    // Let the loop notice the shutdown flag before the process exits.
    scheduler.shutdown();
    let _ = background.await;
}
