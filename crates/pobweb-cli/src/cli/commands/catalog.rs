use anyhow::Context;
use pobweb_packer::{Catalog, PackConfig, Scanner};

use crate::cli::args::CatalogArgs;
use crate::exit_codes::SUCCESS;

pub fn run(args: CatalogArgs) -> anyhow::Result<i32> {
    let config = PackConfig::load(args.config.as_deref())?;
    let scanner = Scanner::new(args.dir.clone()).with_order(config.scan_order);
    let catalog = Catalog::from_scan(&scanner, &config.excluded_prefixes)?;
    let tsv = catalog.to_tsv();

    match &args.output {
        Some(path) => {
            std::fs::write(path, &tsv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(
                event = "catalog_written",
                path = %path.display(),
                images = catalog.len()
            );
        }
        None => print!("{tsv}"),
    }
    Ok(SUCCESS)
}
