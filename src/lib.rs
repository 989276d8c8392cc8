//! Surgenda — the scheduling and workflow core of a hospital
//! surgical-admission system.
//!
//! What lives here: conflict-free slot booking (one live appointment per
//! doctor+date+time, enforced by a unique index, not just a pre-check), the
//! per-appointment workflow status engine (anesthesia evaluation, AIH
//! administrative pipeline, billing liberation, confirmation, and the two
//! attachment-derived readiness gates), and the department read views built
//! on top. Rendering, report export, attachment byte storage, and transport
//! are the hosting application's concern.

pub mod cases;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notifier;
pub mod scheduling;
pub mod workflow;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for a hosting binary. Call once at startup.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
