//! Pack pipeline: clone, assemble, write.
//!
//! Outputs for one `(product, tag)` below a work directory:
//!
//! ```text
//! build/{product}/{tag}/repo/          shallow clone
//! build/{product}/{tag}/root.zip       bundle
//! build/{product}/{tag}/root-zipfs/    bundle entries materialized on disk
//! publish/{product}/{tag}/root.zip     copy of the bundle
//! publish/{product}/{tag}/root/...     full image bytes, fetched by the client
//! ```
//!
//! Everything is assembled in memory before the first output byte is
//! written; a failed build leaves no `root.zip` behind.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};

use crate::bundle::BundleBuilder;
use crate::catalog::{is_excluded, Catalog, CATALOG_ENTRY};
use crate::config::PackConfig;
use crate::error::{PackError, PackResult};
use crate::product::{validate_tag, Product};
use crate::scan::{Classification, ScanEntry, Scanner};

/// Root files copied verbatim next to the rewritten manifest.
const STATIC_ROOT_FILES: [&str; 3] = ["changelog.txt", "help.txt", "LICENSE.md"];
const MANIFEST_FILE: &str = "manifest.xml";
const INSTALLED_MARKER: &str = "installed.cfg";
const BUNDLE_FILE: &str = "root.zip";

/// On-disk locations for one build.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    build_dir: PathBuf,
    publish_dir: PathBuf,
}

impl BuildLayout {
    pub fn new(work_dir: &Path, product_id: &str, tag: &str) -> Self {
        Self {
            build_dir: work_dir.join("build").join(product_id).join(tag),
            publish_dir: work_dir.join("publish").join(product_id).join(tag),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.build_dir.join("repo")
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.build_dir.join(BUNDLE_FILE)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.build_dir.join("root-zipfs")
    }

    /// Directory mirrored to the object store by `sync`.
    pub fn publish_dir(&self) -> &Path {
        &self.publish_dir
    }

    pub fn published_images_dir(&self) -> PathBuf {
        self.publish_dir.join("root")
    }
}

/// One `pack` invocation.
#[derive(Debug, Clone)]
pub struct PackRequest<'a> {
    pub tag: &'a str,
    pub product: &'a Product,
    pub work_dir: PathBuf,
    /// Local checkout to pack instead of cloning.
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PackReport {
    pub bundle_path: PathBuf,
    pub staging_dir: PathBuf,
    pub publish_dir: PathBuf,
    pub entries: usize,
    pub images: usize,
    pub bundle_sha256: String,
}

/// In-memory result of assembling a checkout.
#[derive(Debug)]
pub struct Assembly {
    pub bundle: BundleBuilder,
    pub catalog: Catalog,
    /// Image files whose bytes are published beside the bundle.
    pub images: Vec<ScanEntry>,
}

/// Run the whole pipeline for one tag.
pub fn pack(config: &PackConfig, request: &PackRequest<'_>) -> PackResult<PackReport> {
    validate_tag(request.tag)?;
    let layout = BuildLayout::new(&request.work_dir, &request.product.id, request.tag);

    let repo_root = match &request.source {
        Some(dir) => {
            remove_outputs(&layout)?;
            dir.clone()
        }
        None => {
            remove_dir_if_exists(layout.build_dir())?;
            remove_dir_if_exists(layout.publish_dir())?;
            clone_repository(request.product, request.tag, &layout.repo_dir())?;
            layout.repo_dir()
        }
    };

    tracing::info!(
        event = "pack_started",
        product = %request.product.id,
        tag = %request.tag,
        source = %repo_root.display(),
        "assembling bundle"
    );
    let assembly = assemble(&repo_root, config)?;
    let archive = assembly.bundle.to_zip_bytes()?;
    let bundle_sha256 = hex::encode(Sha256::digest(&archive));

    write_atomic(&layout.bundle_path(), &archive)?;
    assembly.bundle.write_tree(&layout.staging_dir())?;
    write_publish_tree(&layout, &archive, &assembly.images)?;

    let report = PackReport {
        bundle_path: layout.bundle_path(),
        staging_dir: layout.staging_dir(),
        publish_dir: layout.publish_dir().to_path_buf(),
        entries: assembly.bundle.file_count(),
        images: assembly.catalog.len(),
        bundle_sha256,
    };
    tracing::info!(
        event = "pack_finished",
        product = %request.product.id,
        tag = %request.tag,
        entries = report.entries,
        images = report.images,
        bytes = archive.len(),
        sha256 = %report.bundle_sha256,
        "bundle written"
    );
    Ok(report)
}

/// Build the bundle and catalog for a checkout rooted at `repo_root`.
pub fn assemble(repo_root: &Path, config: &PackConfig) -> PackResult<Assembly> {
    let source_dir = repo_root.join(&config.source_dir);
    let mut bundle = BundleBuilder::new(config.excluded_prefixes.clone());
    let mut catalog = Catalog::new();
    let mut images = Vec::new();

    let scanner = Scanner::new(&source_dir).with_order(config.scan_order);
    for entry in scanner.scan()? {
        let entry = entry?;
        if is_excluded(&entry.relative_path, &config.excluded_prefixes) {
            continue;
        }
        match entry.classification {
            Classification::Image => {
                catalog.push_entry(&entry)?;
                bundle.add_placeholder(&entry.relative_path)?;
                images.push(entry);
            }
            class if class.ships_content() => {
                let bytes = read_source(&entry.absolute_path)?;
                let (name, bytes) = apply_rewrites(config, &entry.relative_path, bytes);
                bundle.add_content(&name, bytes)?;
            }
            _ => {
                tracing::trace!(path = %entry.relative_path, "not packaged");
            }
        }
    }

    let runtime_dir = repo_root.join(&config.runtime_scripts.dir);
    if runtime_dir.exists() {
        let prefix = config.runtime_scripts.prefix.trim_matches('/');
        let scanner = Scanner::new(&runtime_dir).with_order(config.scan_order);
        for entry in scanner.scan()? {
            let entry = entry?;
            if entry.classification != Classification::Script {
                continue;
            }
            let bytes = read_source(&entry.absolute_path)?;
            bundle.add_content(&format!("{prefix}/{}", entry.relative_path), bytes)?;
        }
    } else {
        tracing::warn!(
            event = "runtime_scripts_missing",
            dir = %runtime_dir.display(),
            "runtime script tree not found; bundle has no runtime scripts"
        );
    }

    bundle.add_content(CATALOG_ENTRY, catalog.to_tsv().into_bytes())?;

    let manifest_path = repo_root.join(MANIFEST_FILE);
    let manifest = fs::read_to_string(&manifest_path)
        .map_err(|e| PackError::source_tree(&manifest_path, e))?;
    let stamped = config.manifest.apply(&manifest).into_owned();
    bundle.add_content(MANIFEST_FILE, stamped.into_bytes())?;

    for name in STATIC_ROOT_FILES {
        bundle.add_content(name, read_source(&repo_root.join(name))?)?;
    }
    bundle.add_content(INSTALLED_MARKER, Vec::new())?;

    Ok(Assembly {
        bundle,
        catalog,
        images,
    })
}

fn read_source(path: &Path) -> PackResult<Vec<u8>> {
    fs::read(path).map_err(|e| PackError::source_tree(path, e))
}

/// Apply name rewrites, and content rewrites for matching files.
fn apply_rewrites(config: &PackConfig, relative_path: &str, bytes: Vec<u8>) -> (String, Vec<u8>) {
    let mut name = relative_path.to_string();
    for rule in &config.rewrites {
        name = rule.rewrite_name(&name);
    }
    let content_rules: Vec<_> = config
        .rewrites
        .iter()
        .filter(|r| r.applies_to_content(relative_path))
        .collect();
    if content_rules.is_empty() {
        return (name, bytes);
    }
    match String::from_utf8(bytes) {
        Ok(mut text) => {
            for rule in content_rules {
                text = text.replace(&rule.find, &rule.replace);
            }
            (name, text.into_bytes())
        }
        Err(err) => {
            tracing::warn!(path = %relative_path, "content rewrite skipped: not UTF-8");
            (name, err.into_bytes())
        }
    }
}

/// Shallow-clone `product` at `tag` into `dest`.
pub fn clone_repository(product: &Product, tag: &str, dest: &Path) -> PackResult<()> {
    validate_tag(tag)?;
    let remote = product.repository.remote_url();
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| PackError::output(parent, e))?;
    }
    tracing::info!(event = "clone", %remote, %tag, dest = %dest.display(), "cloning");
    let output = Command::new("git")
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg(format!("--branch={tag}"))
        .arg(&remote)
        .arg(dest)
        .output()
        .map_err(|e| PackError::Clone {
            remote: remote.clone(),
            tag: tag.to_string(),
            message: format!("failed to run git: {e}"),
        })?;
    if !output.status.success() {
        return Err(PackError::Clone {
            remote,
            tag: tag.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Write `bytes` to a sibling `.partial` file, then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> PackResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PackError::output(parent, e))?;
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    fs::write(&partial, bytes).map_err(|e| PackError::output(&partial, e))?;
    fs::rename(&partial, path).map_err(|e| PackError::output(path, e))
}

fn write_publish_tree(layout: &BuildLayout, archive: &[u8], images: &[ScanEntry]) -> PackResult<()> {
    write_atomic(&layout.publish_dir().join(BUNDLE_FILE), archive)?;
    let root = layout.published_images_dir();
    for image in images {
        let dest = root.join(&image.relative_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| PackError::output(parent, e))?;
        }
        fs::copy(&image.absolute_path, &dest).map_err(|e| PackError::output(&dest, e))?;
    }
    Ok(())
}

/// Outputs only; a local checkout under the build directory survives.
fn remove_outputs(layout: &BuildLayout) -> PackResult<()> {
    let bundle = layout.bundle_path();
    match fs::remove_file(&bundle) {
        Ok(()) => {}
        Err(e) if e.kind() == IoErrorKind::NotFound => {}
        Err(e) => return Err(PackError::output(&bundle, e)),
    }
    remove_dir_if_exists(&layout.staging_dir())?;
    remove_dir_if_exists(layout.publish_dir())
}

fn remove_dir_if_exists(dir: &Path) -> PackResult<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(PackError::output(dir, e)),
    }
}
