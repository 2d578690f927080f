use anyhow::Result;
use axum::Router;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

/// Plain GET file serving of the rendered sticker pages.
pub fn router(dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(dir))
        .layer(TraceLayer::new_for_http())
}

/// Serves `dir` on `0.0.0.0:<port>` until `shutdown` fires.
pub async fn serve(dir: PathBuf, port: u16, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Sticker page server listening on http://{}", addr);

    axum::serve(listener, router(&dir))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Sticker page server shut down");
    Ok(())
}
