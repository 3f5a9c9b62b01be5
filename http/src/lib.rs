//! Read API over the published snapshot.
//!
//! `GET /healthz` answers `ok`, `GET /api/streams` returns the latest snapshot
//! together with the refresh intervals the web UI should poll with.

#[macro_use]
extern crate tracing;

pub mod error;
pub mod router;
mod streams;

pub use router::{
    create_router,
    AppState,
};
pub use streams::StreamsResponse;

use eyre::{
    Context as _,
    Result,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serves the read API on `address` until `cancel` fires.
pub async fn serve(address: SocketAddr, state: AppState, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .wrap_err_with(|| format!("Failed to listen on {address}"))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .wrap_err("The read API server failed")
}
