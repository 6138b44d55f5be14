// src/lib.rs
// Public library surface for integration tests, the HTTP binary and the watcher bin.

pub mod api;
pub mod config;
pub mod error;
pub mod genai;
pub mod market;
pub mod metrics;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod sync;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{SyncError, SyncStep};
pub use crate::model::{NewsRecord, Quote};
pub use crate::reconcile::{ReconcilerState, Watcher};
pub use crate::sync::{SyncOrchestrator, SyncOutcome, SyncReport};

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{Credentials, SyncSettings};
use crate::market::finnhub::FinnhubClient;
use crate::store::supabase::SupabaseStore;

/// Wire the production collaborators from the environment and build the router.
///
/// Missing credentials do not stop startup: every `/sync` call reports them as a
/// configuration error before touching the network.
pub async fn app() -> anyhow::Result<axum::Router> {
    let credentials = Credentials::from_env();
    let settings = SyncSettings::load_default()?;

    // Safe diagnostics: only which keys are missing.
    let missing = credentials.missing();
    if missing.is_empty() {
        info!(target: "api", ?settings, "sync configuration loaded");
    } else {
        warn!(target: "api", ?missing, "credentials incomplete; /sync will refuse to run");
    }

    let market = FinnhubClient::new(credentials.finnhub_api_key.clone().unwrap_or_default())?;
    let generator = genai::build_generator(&credentials, &settings)?;
    let store = Arc::new(
        SupabaseStore::new(
            credentials.supabase_url.as_deref().unwrap_or_default(),
            credentials.supabase_key.clone().unwrap_or_default(),
            &settings.table,
        )
        .context("building store client")?,
    );

    let orchestrator = SyncOrchestrator::new(
        credentials,
        settings,
        Arc::new(market),
        generator,
        store.clone(),
    );
    Ok(router(AppState {
        orchestrator: Arc::new(orchestrator),
        store,
    }))
}
