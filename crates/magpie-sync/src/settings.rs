//! Environment-driven settings for the sync service.

use std::time::Duration;

use secrecy::SecretString;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// All tunables the sync engine consumes.
///
/// The history window and the staleness thresholds drifted across earlier
/// revisions of this service (90 vs 365 days, 1 vs 3 days); they are named
/// settings here rather than constants.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// OAuth application id.
    pub client_id: String,
    /// OAuth application secret.
    pub client_secret: SecretString,
    /// Square API base URL.
    pub api_base_url: String,
    /// Pinned `Square-Version` header value.
    pub api_version: String,
    /// OAuth callback URI for the connect flow.
    pub redirect_uri: Option<String>,

    /// Interval between background sync cycles.
    pub sync_interval: Duration,
    /// A tenant syncs when `last_sync_at` is at least this old.
    pub sync_threshold_days: i64,
    /// A tenant's token refreshes when `token_updated_at` is at least this old.
    pub token_refresh_threshold_days: i64,
    /// Customer/invoice retrieval window.
    pub history_window_days: i64,
    /// Spacing between tenants within a cycle.
    pub tenant_delay: Duration,
    /// Pause after a failed cycle before the loop retries.
    pub error_cooldown: Duration,
    /// Soft per-tenant deadline for one sync run.
    pub sync_deadline: Duration,

    /// Search page size.
    pub page_limit: u32,
    /// Pagination safety cap.
    pub max_records: usize,
    /// Orders batch-retrieve chunk size.
    pub order_batch_size: usize,
    /// Pause between order batches.
    pub order_batch_delay: Duration,

    /// Shared secret for the external cron trigger; the trigger is disabled
    /// when unset.
    pub cron_shared_secret: Option<SecretString>,
}

impl SyncSettings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load settings from a custom variable reader.
    ///
    /// Lets tests supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let client_id = reader("SQUARE_CLIENT_ID")
            .map_err(|_| ConfigError::MissingVar("SQUARE_CLIENT_ID".into()))?;
        let client_secret = SecretString::from(
            reader("SQUARE_CLIENT_SECRET")
                .map_err(|_| ConfigError::MissingVar("SQUARE_CLIENT_SECRET".into()))?,
        );

        let api_base_url = reader("SQUARE_API_BASE_URL")
            .unwrap_or_else(|_| "https://connect.squareup.com".to_string());
        let api_version =
            reader("SQUARE_API_VERSION").unwrap_or_else(|_| "2023-10-18".to_string());
        let redirect_uri = reader("SQUARE_REDIRECT_URI").ok();

        let sync_interval_hours = parse_var(&reader, "SYNC_INTERVAL_HOURS", 12u64)?;
        let sync_threshold_days = parse_var(&reader, "SYNC_THRESHOLD_DAYS", 3i64)?;
        let token_refresh_threshold_days =
            parse_var(&reader, "TOKEN_REFRESH_THRESHOLD_DAYS", 25i64)?;
        let history_window_days = parse_var(&reader, "HISTORY_WINDOW_DAYS", 365i64)?;
        let tenant_delay_secs = parse_var(&reader, "TENANT_DELAY_SECS", 10u64)?;
        let error_cooldown_secs = parse_var(&reader, "ERROR_COOLDOWN_SECS", 3600u64)?;
        let sync_deadline_secs = parse_var(&reader, "SYNC_DEADLINE_SECS", 900u64)?;
        let page_limit = parse_var(&reader, "PAGE_LIMIT", 100u32)?;
        let max_records = parse_var(&reader, "MAX_RECORDS", 2000usize)?;
        let order_batch_size = parse_var(&reader, "ORDER_BATCH_SIZE", 25usize)?;
        let order_batch_delay_ms = parse_var(&reader, "ORDER_BATCH_DELAY_MS", 200u64)?;

        let cron_shared_secret = reader("CRON_SHARED_SECRET").ok().map(SecretString::from);

        Ok(Self {
            client_id,
            client_secret,
            api_base_url,
            api_version,
            redirect_uri,
            sync_interval: Duration::from_secs(sync_interval_hours * 60 * 60),
            sync_threshold_days,
            token_refresh_threshold_days,
            history_window_days,
            tenant_delay: Duration::from_secs(tenant_delay_secs),
            error_cooldown: Duration::from_secs(error_cooldown_secs),
            sync_deadline: Duration::from_secs(sync_deadline_secs),
            page_limit,
            max_records,
            order_batch_size,
            order_batch_delay: Duration::from_millis(order_batch_delay_ms),
            cron_shared_secret,
        })
    }
}

fn parse_var<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
    }
}
