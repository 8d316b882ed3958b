use pobweb_packer::{validate_tag, BuildLayout, PackConfig, Publisher};

use crate::cli::args::SyncArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: SyncArgs) -> anyhow::Result<i32> {
    validate_tag(&args.tag)?;
    let config = PackConfig::load(args.config.as_deref())?;
    let product = config.product(&args.product)?;
    let layout = BuildLayout::new(&args.work_dir, &product.id, &args.tag);
    let publisher = Publisher::from_url(&args.store)?;
    let destination = product.destination_prefix(&args.tag);

    let report = publisher
        .sync(layout.publish_dir(), &destination, args.dry_run)
        .await?;

    let verb = if report.dry_run { "would upload" } else { "uploaded" };
    for path in &report.uploaded {
        println!("{verb} {path}");
    }
    println!(
        "{}: {} {verb} ({} bytes), {} unchanged",
        report.destination,
        report.uploaded.len(),
        report.bytes_uploaded,
        report.skipped.len()
    );
    Ok(SUCCESS)
}
