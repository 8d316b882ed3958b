//! Authenticated HTTP front for the pob-web virtual file store.
//!
//! Every `/api` request passes the gate in [`gate`] first: a bearer JWT is
//! verified against the issuer's JWKS and its `sub` claim becomes the
//! [`pobweb_vfs::Subject`] that scopes all storage access.

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod routes;
pub mod state;

use std::future::Future;

use tokio::net::TcpListener;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
