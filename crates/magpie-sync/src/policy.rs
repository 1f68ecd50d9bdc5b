//! Staleness policy.
//!
//! Pure predicates deciding when a tenant needs a token refresh or a data
//! sync. Both fail open: a missing timestamp means "act now" so stale data is
//! never skipped silently.

use chrono::{DateTime, Duration, Utc};

fn is_stale(timestamp: Option<DateTime<Utc>>, threshold_days: i64, now: DateTime<Utc>) -> bool {
    match timestamp {
        None => true,
        Some(ts) => now.signed_duration_since(ts) >= Duration::days(threshold_days),
    }
}

/// True when the token pair is old enough to refresh, or its age is unknown.
pub fn should_refresh_token(
    token_updated_at: Option<DateTime<Utc>>,
    threshold_days: i64,
    now: DateTime<Utc>,
) -> bool {
    is_stale(token_updated_at, threshold_days, now)
}

/// True when the tenant's data is old enough to sync, or has never synced.
pub fn should_sync(
    last_sync_at: Option<DateTime<Utc>>,
    threshold_days: i64,
    now: DateTime<Utc>,
) -> bool {
    is_stale(last_sync_at, threshold_days, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_timestamp_fails_open() {
        assert!(should_sync(None, 3, now()));
        assert!(should_refresh_token(None, 25, now()));
    }

    #[test]
    fn test_fresh_timestamp_is_not_stale() {
        let yesterday = now() - Duration::days(1);
        assert!(!should_sync(Some(yesterday), 3, now()));
        assert!(!should_refresh_token(Some(yesterday), 25, now()));
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let exactly = now() - Duration::days(3);
        assert!(should_sync(Some(exactly), 3, now()));

        let just_under = now() - Duration::days(3) + Duration::seconds(1);
        assert!(!should_sync(Some(just_under), 3, now()));
    }

    #[test]
    fn test_old_timestamp_is_stale() {
        let last_month = now() - Duration::days(30);
        assert!(should_sync(Some(last_month), 3, now()));
        assert!(should_refresh_token(Some(last_month), 25, now()));
    }

    #[test]
    fn test_future_timestamp_is_not_stale() {
        // Clock skew between writers must not trigger a refresh storm.
        let tomorrow = now() + Duration::days(1);
        assert!(!should_sync(Some(tomorrow), 3, now()));
    }
}
