use super::args::{Cli, Command};

pub mod catalog;
pub mod pack;
pub mod sync;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Pack(args) => pack::run(args).await,
        Command::Sync(args) => sync::run(args).await,
        Command::Catalog(args) => catalog::run(args),
    }
}
