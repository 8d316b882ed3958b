use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pobweb_server::auth::{AuthConfig, TokenValidator};
use pobweb_server::config::{init_tracing, ServerArgs};
use pobweb_server::AppState;
use pobweb_vfs::{Limits, SqliteKv, VfsService};
use tokio::net::TcpListener;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_tracing(args.log_format);

    let auth = AuthConfig::from_env().context("auth configuration")?;
    tracing::info!(
        event = "auth_config",
        issuer = %auth.issuer,
        jwks = %auth.jwks_uri,
        insecure_jwks = auth.allow_insecure_jwks
    );
    let validator = TokenValidator::new(auth).context("token validator")?;

    let backend = SqliteKv::open(&args.db)
        .with_context(|| format!("opening database {}", args.db.display()))?;
    let vfs = VfsService::new(Arc::new(backend)).with_limits(Limits {
        max_value_bytes: args.max_value_bytes,
        ..Limits::default()
    });

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(event = "server_listening", addr = %listener.local_addr()?);

    pobweb_server::serve(listener, AppState::new(vfs, validator), shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!(event = "server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(event = "signal_handler_failed", error = %e);
        std::future::pending::<()>().await;
    }
}
