use anyhow::Context;
use pobweb_packer::{pack, PackConfig, PackRequest};

use crate::cli::args::PackArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: PackArgs) -> anyhow::Result<i32> {
    let config = PackConfig::load(args.config.as_deref())?;
    let product = match &args.product {
        Some(selector) => config.product(selector)?,
        None => config.primary_product()?,
    }
    .clone();

    // clone, scan and zip are all blocking
    let report = tokio::task::spawn_blocking(move || {
        let request = PackRequest {
            tag: &args.tag,
            product: &product,
            work_dir: args.work_dir,
            source: args.source,
        };
        pack(&config, &request)
    })
    .await
    .context("pack task panicked")??;

    println!("bundle:  {}", report.bundle_path.display());
    println!("staging: {}", report.staging_dir.display());
    println!("publish: {}", report.publish_dir.display());
    println!(
        "entries: {}  images: {}  sha256: {}",
        report.entries, report.images, report.bundle_sha256
    );
    Ok(SUCCESS)
}
