use crate::streams::handler;
use axum::{
    routing::get,
    Router,
};
use mediamtx_monitor_collector::Cache;
use mediamtx_monitor_config::{
    Config,
    FrontendConfig,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn Cache>,
    pub snapshot_key: String,
    pub frontend: FrontendConfig,
}

impl AppState {
    pub fn new(config: &Config, cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            snapshot_key: config.snapshot_key.clone(),
            frontend: config.frontend.clone(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/streams", get(handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
