use crate::{
    error::AppError,
    router::AppState,
};
use axum::{
    extract::State,
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize, PartialEq)]
pub struct StreamsResponse {
    pub streams: Vec<Value>,
    pub snapshot_refresh_ms: u64,
    pub streamlist_refresh_ms: u64,
}

/// Serves the latest snapshot as published, plus the UI refresh hints.
///
/// No snapshot yet, or one that does not decode as a list, is served as empty.
pub async fn handler(State(state): State<AppState>) -> Result<Json<StreamsResponse>, AppError> {
    let streams: Vec<Value> = match state.cache.get(&state.snapshot_key)? {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(key = %state.snapshot_key, %err, "Stored snapshot is not a list");
            Vec::new()
        }),
        None => Vec::new(),
    };

    Ok(Json(StreamsResponse {
        streams,
        snapshot_refresh_ms: state.frontend.snapshot_refresh_ms,
        streamlist_refresh_ms: state.frontend.streamlist_refresh_ms,
    }))
}
