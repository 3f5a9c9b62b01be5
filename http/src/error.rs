use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
};
use mediamtx_monitor_collector::CacheError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Reading the snapshot from the cache failed: {0}")]
    Cache(#[from] CacheError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("{self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
