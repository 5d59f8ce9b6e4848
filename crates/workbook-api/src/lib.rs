//! workbook-api: HTTP exposition for the Workbook exporter.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Runs one scrape, Prometheus text format |
//! | GET | `/healthz` | Liveness, never touches Workbook |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use workbook_metrics::SnapshotCollector;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub collector: Arc<SnapshotCollector>,
}

/// Build the exporter router.
pub fn build_router(collector: Arc<SnapshotCollector>) -> Router {
    let state = ApiState { collector };

    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
