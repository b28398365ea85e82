//! # stealthmax-api
//!
//! JSON over HTTP for operators and front ends.
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/` | greeting |
//! | GET | `/health` | liveness |
//! | POST | `/api/register` | register a subname |
//! | POST | `/api/derive-address` | legacy-mode address for a parameter |
//! | GET | `/api/names` | names under the domain |
//! | GET | `/api/monitoring-status` | monitored addresses |
//! | GET | `/api/monitoring-details` | monitored addresses with text records |
//! | POST | `/api/intmax/deposit` | manual deposit |
//! | GET | `/api/intmax/balances/:parameter` | per-name rollup balances |
//! | GET | `/api/intmax/deposits/:parameter` | per-name deposit history |
//! | GET | `/api/intmax/transfers/:parameter` | per-name transfer history |
//! | GET | `/api/debug/master-account` | master rollup account |
//!
//! Successes use `{ success: true, data, timestamp }`; failures are
//! described in [`error`].

pub mod error;
pub mod handlers;
pub mod state;

use axum::Router;
use axum::routing::{get, post};
use stealthmax_directory::NameRegistry;
use stealthmax_types::{Result, StealthError};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::ApiResponse;
pub use state::AppState;

/// Build the router over `state`.
pub fn router<R: NameRegistry + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .route("/", get(handlers::greeting))
        .route("/health", get(handlers::health::<R>))
        .route("/api/register", post(handlers::register::<R>))
        .route("/api/derive-address", post(handlers::derive_address::<R>))
        .route("/api/names", get(handlers::names::<R>))
        .route("/api/monitoring-status", get(handlers::monitoring_status::<R>))
        .route("/api/monitoring-details", get(handlers::monitoring_details::<R>))
        .route("/api/intmax/deposit", post(handlers::deposit::<R>))
        .route("/api/intmax/balances/:parameter", get(handlers::balances::<R>))
        .route("/api/intmax/deposits/:parameter", get(handlers::deposits::<R>))
        .route("/api/intmax/transfers/:parameter", get(handlers::transfers::<R>))
        .route("/api/debug/master-account", get(handlers::master_account::<R>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` flips to `true`.
///
/// # Errors
/// `Io` if the server fails.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| StealthError::Io(e.to_string()))?;
    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            tracing::info!("HTTP server shutting down");
        })
        .await
        .map_err(|e| StealthError::Io(e.to_string()))
}
