//! Shared handler state.

use std::sync::Arc;

use magpie_square::{OAuthClient, SquareClient};
use magpie_store::{CredentialStore, RecordStore};
use magpie_sync::{SyncScheduler, SyncSettings};

/// Service graph handed to every handler.
///
/// Built once in `main` and injected; nothing here is a global.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SyncScheduler>,
    pub credentials: Arc<dyn CredentialStore>,
    pub records: Arc<dyn RecordStore>,
    pub client: SquareClient,
    pub oauth: Arc<OAuthClient>,
    pub settings: Arc<SyncSettings>,
}
