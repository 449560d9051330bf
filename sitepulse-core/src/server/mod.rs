//! Ingestion HTTP server
//!
//! Exposes the endpoint the collector delivers to:
//! - `POST /api/analytics` - accept a batch
//! - `GET /api/analytics?sessionId=...` - stored batches for one session
//! - `GET /api/analytics` - aggregate counters
//! - `GET /health` - liveness

mod routes;

pub use routes::{build_router, ApiError, AppState};

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::error::Result;

/// Bind `addr` and serve until ctrl-c.
pub async fn run_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Ingestion server listening");

    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    })
    .await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
