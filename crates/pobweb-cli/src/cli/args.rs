use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pobweb_packer::publish::DEFAULT_STORE;

#[derive(Parser, Debug)]
#[command(
    name = "pobweb",
    version,
    about = "Package Path of Building releases for pob-web and publish them to object storage"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,

    #[arg(long, global = true, value_enum, env = "POBWEB_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build root.zip, the staging tree and the publish directory for a tag
    Pack(PackArgs),
    /// Mirror a packed publish directory to the object store
    Sync(SyncArgs),
    /// Print the image catalog (.image.tsv) of a directory
    Catalog(CatalogArgs),
}

#[derive(Parser, Debug)]
pub struct PackArgs {
    /// Release tag of the upstream repository (e.g. v2.42.0)
    pub tag: String,

    /// Product id or kv namespace; defaults to the primary product
    pub product: Option<String>,

    /// Pack this local checkout instead of cloning the tag
    #[arg(long)]
    pub source: Option<PathBuf>,

    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// YAML pack configuration
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct SyncArgs {
    pub tag: String,

    pub product: String,

    /// s3://bucket[/base][?region=..], file:///path or memory://
    #[arg(long, env = "POBWEB_PUBLISH_STORE", default_value = DEFAULT_STORE)]
    pub store: String,

    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Report what would be uploaded without uploading
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// Directory to scan
    pub dir: PathBuf,

    /// Write the catalog here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_defaults() {
        let cli = Cli::try_parse_from(["pobweb", "pack", "v2.42.0"]).unwrap();
        let Command::Pack(args) = cli.cmd else {
            panic!("expected pack");
        };
        assert_eq!(args.tag, "v2.42.0");
        assert_eq!(args.product, None);
        assert_eq!(args.work_dir, PathBuf::from("."));
    }

    #[test]
    fn test_sync_requires_product() {
        assert!(Cli::try_parse_from(["pobweb", "sync", "v2.42.0"]).is_err());
        let cli = Cli::try_parse_from([
            "pobweb",
            "sync",
            "v0.4.1",
            "poe2",
            "--store",
            "memory://",
            "--dry-run",
        ])
        .unwrap();
        let Command::Sync(args) = cli.cmd else {
            panic!("expected sync");
        };
        assert_eq!(args.product, "poe2");
        assert_eq!(args.store, "memory://");
        assert!(args.dry_run);
    }

    #[test]
    fn test_global_log_format() {
        let cli = Cli::try_parse_from(["pobweb", "catalog", "src", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
