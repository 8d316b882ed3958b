//! Offline packaging pipeline for pob-web.
//!
//! A release tag of an upstream planner repository is turned into:
//!
//! - `root.zip`, the bundle the embedded engine mounts. Images ship as
//!   zero-byte placeholders; their dimensions live in the `.image.tsv`
//!   catalog entry.
//! - a publish directory holding the bundle and the full image bytes, which
//!   [`publish::Publisher`] mirrors to object storage.
//!
//! ```text
//! Scanner ──► Catalog ──┐
//!    │                  ├──► BundleBuilder ──► root.zip ──► Publisher
//!    └──────────────────┘
//! ```

pub mod bundle;
pub mod catalog;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod probe;
pub mod product;
pub mod publish;
pub mod scan;

pub use bundle::{BundleBuilder, BundleEntry, EntryBody};
pub use catalog::{Catalog, CatalogRecord, CATALOG_ENTRY};
pub use config::{PackConfig, RewriteRule, RuntimeScripts};
pub use error::{ErrorKind, PackError, PackResult};
pub use manifest::ManifestStamp;
pub use pipeline::{assemble, pack, BuildLayout, PackReport, PackRequest};
pub use product::{validate_tag, Product, Repository};
pub use publish::{Publisher, StoreSpec, SyncReport};
pub use scan::{Classification, ScanEntry, ScanOrder, Scanner};
