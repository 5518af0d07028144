//! HTTP server lifecycle — bind, build the router, spawn axum in a
//! background task, return a handle with a shutdown channel.
//!
//! Pattern mirrors the request/response shape of the rest of this crate:
//! bind → spawn background task → return handle with shutdown channel.

use std::net::SocketAddr;

use tokio::sync::oneshot;

use super::router::build_router;
use super::types::ApiContext;

/// Handle to a running HTTP server. Dropping it does not stop the server;
/// call `shutdown` explicitly.
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ServerHandle {
    /// Signals the server to stop accepting new connections and finish
    /// in-flight requests. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }
}

/// Binds `addr`, mounts the full `/api` router, and serves it in a spawned
/// task. `ConnectInfo<SocketAddr>` is threaded through via
/// `into_make_service_with_connect_info` so the feedback rate limiter can see
/// the caller's IP.
pub async fn serve(addr: SocketAddr, ctx: ApiContext) -> std::io::Result<ServerHandle> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(%local_addr, "API server binding");

    let app = build_router(ctx).into_make_service_with_connect_info::<SocketAddr>();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%local_addr, "API server started");
        if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await {
            tracing::error!(error = %err, "API server error");
        }
        tracing::info!("API server stopped");
    });

    Ok(ServerHandle { local_addr, shutdown_tx: Some(shutdown_tx) })
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    use super::*;
    use crate::crypto::Cipher;
    use crate::db::pool::open_pool;
    use crate::jobs::CancelRegistry;
    use crate::queue::memory::InMemoryTaskQueue;
    use crate::queue::worker::JobHandler;

    struct NoopHandler;

    #[async_trait::async_trait]
    impl JobHandler for NoopHandler {
        async fn handle(&self, _job_id: i64) -> Result<(), crate::error::AppError> {
            Ok(())
        }
        async fn handle_timeout(&self, _job_id: i64) {}
    }

    struct NoopFeedbackQueue;

    #[async_trait::async_trait]
    impl crate::queue::FeedbackQueue for NoopFeedbackQueue {
        async fn enqueue(&self, _feedback_id: i64) -> Result<String, crate::error::AppError> {
            Ok("noop".into())
        }
    }

    fn test_context() -> ApiContext {
        let pool = open_pool(":memory:").unwrap();
        ApiContext::new(
            pool,
            Cipher::disabled(),
            Arc::new(InMemoryTaskQueue::new(Arc::new(NoopHandler))),
            Arc::new(NoopFeedbackQueue),
            CancelRegistry::default(),
            10 * 1024 * 1024,
        )
    }

    #[tokio::test]
    async fn server_binds_and_serves_health() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let mut handle = serve(addr, test_context()).await.unwrap();
        assert!(handle.local_addr.port() > 0);

        let url = format!("http://127.0.0.1:{}/api/health", handle.local_addr.port());
        let response = reqwest::get(&url).await.unwrap();
        assert!(response.status().is_success());

        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let mut handle = serve(addr, test_context()).await.unwrap();
        handle.shutdown();
        handle.shutdown();
    }
}
