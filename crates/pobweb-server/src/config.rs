use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use pobweb_vfs::service::DEFAULT_MAX_VALUE_BYTES;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server settings. Authentication is configured separately through
/// `POBWEB_AUTH_*` (see [`crate::auth::AuthConfig::from_env`]).
#[derive(Debug, Clone, Parser)]
#[command(name = "pobweb-server", version, about = "pob-web virtual file API")]
pub struct ServerArgs {
    #[arg(long, env = "POBWEB_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// SQLite database file; created if missing.
    #[arg(long, env = "POBWEB_DB", default_value = "pobweb-kv.sqlite")]
    pub db: PathBuf,

    #[arg(long, env = "POBWEB_MAX_VALUE_BYTES", default_value_t = DEFAULT_MAX_VALUE_BYTES)]
    pub max_value_bytes: usize,

    #[arg(long, value_enum, env = "POBWEB_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

/// Logs go to stderr; `RUST_LOG` overrides the `info` default.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults_and_flags() {
        let args = ServerArgs::try_parse_from(["pobweb-server"]).unwrap();
        assert_eq!(args.max_value_bytes, DEFAULT_MAX_VALUE_BYTES);
        assert_eq!(args.log_format, LogFormat::Text);

        let args = ServerArgs::try_parse_from([
            "pobweb-server",
            "--bind",
            "0.0.0.0:9000",
            "--db",
            "/tmp/kv.sqlite",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.bind.port(), 9000);
        assert_eq!(args.db, PathBuf::from("/tmp/kv.sqlite"));
        assert_eq!(args.log_format, LogFormat::Json);
    }
}
