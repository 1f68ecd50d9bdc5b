//! HTTP surface: health, the OAuth connect flow, and the sync triggers.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use magpie_square::fetch_business_name;
use magpie_store::CustomerRecord;
use magpie_sync::{CycleSummary, SyncError, SyncReport};

use crate::state::AppState;

type ApiError = (StatusCode, String);

fn internal(err: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/signin", get(signin))
        .route("/oauth/callback", get(oauth_callback))
        .route("/api/sync/{tenant_id}", post(sync_one))
        .route("/api/refresh/{tenant_id}", post(refresh_one))
        .route("/api/sync-all", post(sync_all))
        .route("/api/cron", post(cron_trigger))
        .route("/api/tenants", get(list_tenants))
        .route("/api/export/{tenant_id}", get(export_customers))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

const OAUTH_SCOPE: &str = "CUSTOMERS_READ MERCHANT_PROFILE_READ INVOICES_READ ORDERS_READ";

async fn signin(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let Some(redirect_uri) = &state.settings.redirect_uri else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "SQUARE_REDIRECT_URI is not configured".to_string(),
        ));
    };

    let authorize_url = format!(
        "{}/oauth2/authorize?client_id={}&redirect_uri={}&scope={}&response_type=code",
        state.settings.api_base_url,
        state.settings.client_id,
        urlencoding::encode(redirect_uri),
        urlencoding::encode(OAUTH_SCOPE),
    );

    Ok(Redirect::temporary(&authorize_url))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(error) = params.error {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("authorization denied: {error}"),
        ));
    }
    let Some(code) = params.code else {
        return Err((
            StatusCode::BAD_REQUEST,
            "no authorization code provided".to_string(),
        ));
    };
    let Some(redirect_uri) = state.settings.redirect_uri.clone() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "SQUARE_REDIRECT_URI is not configured".to_string(),
        ));
    };

    let grant = state
        .oauth
        .exchange_code(&code, &redirect_uri)
        .await
        .map_err(|err| (StatusCode::BAD_GATEWAY, format!("token exchange failed: {err}")))?;

    let Some(tenant_id) = grant.merchant_id.clone() else {
        return Err((
            StatusCode::BAD_GATEWAY,
            "token grant carried no merchant id".to_string(),
        ));
    };

    let display_name = match fetch_business_name(&state.client, &grant.access_token).await {
        Ok(name) => name,
        Err(err) => {
            warn!(error = %err, "could not fetch merchant profile");
            None
        }
    };

    state
        .credentials
        .upsert(
            &tenant_id,
            &grant.access_token,
            grant.refresh_token.as_deref().unwrap_or_default(),
            display_name.as_deref(),
            None,
        )
        .await
        .map_err(internal)?;

    // Kick the first sync without holding the callback open.
    let scheduler = state.scheduler.clone();
    let initial_tenant = tenant_id.clone();
    tokio::spawn(async move {
        let report = scheduler.sync_one(&initial_tenant).await;
        info!(
            tenant_id = %initial_tenant,
            outcome = ?report.outcome,
            records = report.records,
            "initial sync finished"
        );
    });

    Ok(Json(json!({
        "tenant_id": tenant_id,
        "display_name": display_name,
        "status": "connected",
        "initial_sync": "started"
    })))
}

async fn sync_one(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<SyncReport> {
    Json(state.scheduler.sync_one(&tenant_id).await)
}

/// Rotate the tenant's token pair, then sync with the fresh token; no
/// re-authorization required while the refresh token is still valid.
async fn refresh_one(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<SyncReport> {
    Json(state.scheduler.refresh_one(&tenant_id).await)
}

#[derive(Debug, Deserialize)]
struct SyncAllParams {
    #[serde(default)]
    force: bool,
}

async fn sync_all(
    State(state): State<AppState>,
    Query(params): Query<SyncAllParams>,
) -> Result<Json<Vec<SyncReport>>, ApiError> {
    state
        .scheduler
        .sync_all(params.force)
        .await
        .map(Json)
        .map_err(internal)
}

async fn cron_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CycleSummary>, ApiError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();

    match state.scheduler.cron_trigger(presented).await {
        Ok(summary) => Ok(Json(summary)),
        Err(SyncError::Unauthorized) => Err((
            StatusCode::UNAUTHORIZED,
            "invalid trigger secret".to_string(),
        )),
        Err(SyncError::TriggerDisabled) => Err((
            StatusCode::NOT_FOUND,
            "external trigger is not configured".to_string(),
        )),
        Err(err) => Err(internal(err)),
    }
}

/// Dashboard-safe view of a credential row; tokens never leave the store.
#[derive(Debug, Serialize)]
struct TenantSummary {
    tenant_id: String,
    display_name: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
    record_count: i64,
}

async fn list_tenants(
    State(state): State<AppState>,
) -> Result<Json<Vec<TenantSummary>>, ApiError> {
    let tenants = state.credentials.list_active().await.map_err(internal)?;

    Ok(Json(
        tenants
            .into_iter()
            .map(|tenant| TenantSummary {
                tenant_id: tenant.tenant_id,
                display_name: tenant.display_name,
                last_sync_at: tenant.last_sync_at,
                record_count: tenant.record_count,
            })
            .collect(),
    ))
}

async fn export_customers(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Vec<CustomerRecord>>, ApiError> {
    state
        .records
        .list_customers(&tenant_id)
        .await
        .map(Json)
        .map_err(internal)
}
