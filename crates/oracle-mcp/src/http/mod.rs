//! HTTP Server
//!
//! The HTTP/JSON API over the same engine the tool protocol uses, plus the
//! single-live-instance lifecycle: logging tables (created with the schema
//! at store open), a stale-indexing-flag reset, the instance lock, the PID
//! file, and cooperative shutdown on SIGINT/SIGTERM.

pub mod handlers;
pub mod lifecycle;

use std::net::SocketAddr;
use std::sync::Arc;

use std::time::Duration;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use oracle_core::Result;

use crate::state::Oracle;
use lifecycle::{shutdown_signal, InstanceLock, PidFile};

/// Build the API router.
pub fn router(oracle: Arc<Oracle>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/search", get(handlers::search))
        .route("/api/consult", get(handlers::consult))
        .route("/api/reflect", get(handlers::reflect))
        .route("/api/stats", get(handlers::stats))
        .route("/api/list", get(handlers::list))
        .route("/api/graph", get(handlers::graph))
        .route("/api/concepts", get(handlers::concepts))
        .route("/api/learn", post(handlers::learn))
        .route("/api/file", get(handlers::file))
        .route("/api/dashboard", get(handlers::dashboard_summary))
        .route("/api/dashboard/summary", get(handlers::dashboard_summary))
        .route("/api/dashboard/activity", get(handlers::dashboard_activity))
        .route("/api/dashboard/growth", get(handlers::dashboard_growth))
        .route("/api/session/stats", get(handlers::session_stats))
        .route("/api/threads", get(handlers::threads))
        .route("/api/thread", post(handlers::post_thread))
        .route("/api/thread/{id}", get(handlers::get_thread))
        .route("/api/thread/{id}/status", patch(handlers::patch_thread_status))
        .route(
            "/api/decisions",
            get(handlers::decisions_list).post(handlers::decisions_create),
        )
        .route(
            "/api/decisions/{id}",
            get(handlers::decisions_get).patch(handlers::decisions_patch),
        )
        .route(
            "/api/decisions/{id}/transition",
            post(handlers::decisions_transition),
        )
        .route(
            "/api/trace",
            get(handlers::traces_list).post(handlers::traces_create),
        )
        .route("/api/trace/{id}", get(handlers::traces_get))
        .layer(CorsLayer::permissive())
        .with_state(oracle)
}

/// Run the HTTP server to completion (until SIGINT/SIGTERM).
pub async fn serve(oracle: Arc<Oracle>) -> Result<()> {
    // Startup order matters: log tables exist (store open applied the
    // schema), then the stale indexing flag is cleared on the presumption
    // that if we are starting, nothing is indexing.
    oracle.store.reset_indexing_flag()?;

    let _lock = InstanceLock::acquire(&oracle.config.lock_file())?;
    let _pid = PidFile::write(&oracle.config.pid_file(), oracle.config.port)?;

    // Pre-warm the embedding child before requests arrive
    oracle.vector.prewarm().await;

    let addr: SocketAddr = ([127, 0, 0, 1], oracle.config.port).into();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Oracle HTTP server listening on http://{}", addr);

    let app = router(Arc::clone(&oracle));

    // Stop accepting on signal; in-flight requests get a bounded grace
    // window before the server is dropped outright.
    let (grace_tx, grace_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = grace_tx.send(());
            })
            .await
    };

    tokio::select! {
        result = serving => result?,
        _ = async {
            let _ = grace_rx.await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!("oracle: grace window elapsed with requests still in flight");
        }
    }

    info!("Oracle HTTP server shutting down");
    oracle.vector.shutdown().await;
    // Lock and PID file are removed by Drop
    Ok(())
}

/// In-flight request allowance after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// TESTS
// ============================================================================
