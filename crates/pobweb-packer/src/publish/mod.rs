//! Remote publisher: one-way checksum sync of a publish directory.
//!
//! # Key schema
//!
//! ```text
//! {base}/versions/{tag}/root.zip              primary product
//! {base}/versions.{product}/{tag}/root.zip    other products
//! {base}/versions.../{tag}/root/{image path}
//! {base}/versions.../{tag}/.sync-ledger.json
//! ```
//!
//! A file is uploaded unless the ledger records the same SHA-256 for it and
//! an object of the same size is present. Remote-only objects are never
//! deleted. The ledger is rewritten once every upload has succeeded, so an
//! interrupted sync re-uploads at most what it had not yet recorded.

pub mod ledger;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{GetOptions, ObjectStore, PutMode, PutOptions, PutPayload};
use sha2::{Digest, Sha256};

use crate::error::{PackError, PackResult};
use crate::scan::{ScanOrder, Scanner};

pub use ledger::{Ledger, LedgerEntry, LEDGER_NAME};

/// Default publish target.
pub const DEFAULT_STORE: &str = "s3://pob-web";

/// Parsed publish target URL.
///
/// ```text
/// s3://bucket/base?region=auto
/// file:///srv/pob-web
/// memory://
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    pub scheme: String,
    pub bucket: Option<String>,
    /// Base prefix within the bucket, without slashes at either end.
    pub prefix: String,
    pub region: Option<String>,
}

impl StoreSpec {
    pub fn parse(spec: &str) -> PackResult<Self> {
        let url = url::Url::parse(spec).map_err(|e| PackError::InvalidStore {
            spec: spec.to_string(),
            reason: e.to_string(),
        })?;
        let scheme = url.scheme().to_string();
        if !matches!(scheme.as_str(), "s3" | "file" | "memory") {
            return Err(PackError::InvalidStore {
                spec: spec.to_string(),
                reason: format!("unsupported scheme: {scheme}"),
            });
        }
        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        if scheme == "s3" && bucket.is_none() {
            return Err(PackError::InvalidStore {
                spec: spec.to_string(),
                reason: "S3 URL must include bucket name".to_string(),
            });
        }
        let region = url
            .query_pairs()
            .find(|(k, _)| k == "region")
            .map(|(_, v)| v.into_owned());
        Ok(Self {
            scheme,
            bucket,
            prefix: url.path().trim_matches('/').to_string(),
            region,
        })
    }
}

/// What a sync did, or would do with `dry_run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub destination: String,
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    pub bytes_uploaded: u64,
    pub dry_run: bool,
}

#[derive(Debug)]
struct LocalFile {
    relative_path: String,
    bytes: Vec<u8>,
    sha256: String,
}

pub struct Publisher {
    inner: Arc<dyn ObjectStore>,
    base: String,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("store", &self.inner.to_string())
            .field("base", &self.base)
            .finish()
    }
}

impl Publisher {
    pub fn new(inner: Arc<dyn ObjectStore>, base: impl Into<String>) -> Self {
        Self {
            inner,
            base: base.into().trim_matches('/').to_string(),
        }
    }

    pub fn from_url(url: &str) -> PackResult<Self> {
        Self::from_spec(&StoreSpec::parse(url)?)
    }

    pub fn from_spec(spec: &StoreSpec) -> PackResult<Self> {
        let invalid = |reason: String| PackError::InvalidStore {
            spec: format!("{}://{}", spec.scheme, spec.bucket.as_deref().unwrap_or("")),
            reason,
        };
        let inner: Arc<dyn ObjectStore> = match spec.scheme.as_str() {
            "memory" => Arc::new(object_store::memory::InMemory::new()),
            "file" => {
                let root = match &spec.bucket {
                    Some(host) => format!("/{host}/{}", spec.prefix),
                    None => format!("/{}", spec.prefix),
                };
                std::fs::create_dir_all(&root).map_err(|e| PackError::output(&root, e))?;
                let store = object_store::local::LocalFileSystem::new_with_prefix(&root)
                    .map_err(|e| invalid(format!("failed to open local store at {root}: {e}")))?;
                return Ok(Self::new(Arc::new(store), ""));
            }
            "s3" => {
                let bucket = spec
                    .bucket
                    .as_deref()
                    .ok_or_else(|| invalid("S3 URL must include bucket name".to_string()))?;
                let mut builder = object_store::aws::AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_allow_http(false);
                // Cloudflare R2 deployments export R2_ENDPOINT_URL
                if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                    builder = builder.with_endpoint(endpoint);
                    if spec.region.is_none() {
                        builder = builder.with_region("auto");
                    }
                }
                if let Some(region) = &spec.region {
                    builder = builder.with_region(region);
                }
                Arc::new(
                    builder
                        .build()
                        .map_err(|e| invalid(format!("failed to create S3 client: {e}")))?,
                )
            }
            scheme => return Err(invalid(format!("unsupported scheme: {scheme}"))),
        };
        Ok(Self::new(inner, spec.prefix.clone()))
    }

    fn key(&self, destination: &str, relative: &str) -> ObjectPath {
        let destination = destination.trim_matches('/');
        if self.base.is_empty() {
            ObjectPath::from(format!("{destination}/{relative}"))
        } else {
            ObjectPath::from(format!("{}/{destination}/{relative}", self.base))
        }
    }

    fn destination_root(&self, destination: &str) -> ObjectPath {
        let destination = destination.trim_matches('/');
        if self.base.is_empty() {
            ObjectPath::from(destination)
        } else {
            ObjectPath::from(format!("{}/{destination}", self.base))
        }
    }

    /// Mirror `local_dir` to `destination` (e.g. `versions/v2.42.0`).
    pub async fn sync(
        &self,
        local_dir: &Path,
        destination: &str,
        dry_run: bool,
    ) -> PackResult<SyncReport> {
        let local = collect_local(local_dir).await?;
        let ledger = self.load_ledger(destination).await?;
        let remote_sizes = self.remote_sizes(destination).await?;

        let mut report = SyncReport {
            destination: self.destination_root(destination).to_string(),
            dry_run,
            ..SyncReport::default()
        };
        let mut pending = Vec::new();
        for file in &local {
            let size = file.bytes.len() as u64;
            let recorded = ledger
                .get(&file.relative_path)
                .is_some_and(|e| e.sha256 == file.sha256);
            let present = remote_sizes.get(&file.relative_path) == Some(&size);
            if recorded && present {
                report.skipped.push(file.relative_path.clone());
            } else {
                report.uploaded.push(file.relative_path.clone());
                report.bytes_uploaded += size;
                pending.push(file);
            }
        }

        tracing::info!(
            event = "sync_plan",
            destination = %report.destination,
            upload = report.uploaded.len(),
            skip = report.skipped.len(),
            bytes = report.bytes_uploaded,
            dry_run,
            "sync planned"
        );
        if dry_run {
            return Ok(report);
        }

        for file in pending {
            let key = self.key(destination, &file.relative_path);
            tracing::debug!(event = "upload", key = %key, "uploading");
            self.inner
                .put_opts(
                    &key,
                    PutPayload::from(file.bytes.clone()),
                    PutOptions {
                        mode: PutMode::Overwrite,
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| PackError::transport(key.to_string(), e))?;
        }

        let mut merged = ledger;
        for file in &local {
            merged.insert(
                file.relative_path.clone(),
                LedgerEntry {
                    sha256: file.sha256.clone(),
                    size: file.bytes.len() as u64,
                },
            );
        }
        self.store_ledger(destination, &merged).await?;
        tracing::info!(
            event = "sync_finished",
            destination = %report.destination,
            uploaded = report.uploaded.len(),
            "sync complete"
        );
        Ok(report)
    }

    /// Ledger for `destination`; absent or unreadable ledgers are empty.
    pub async fn load_ledger(&self, destination: &str) -> PackResult<Ledger> {
        let key = self.key(destination, LEDGER_NAME);
        let result = match self.inner.get_opts(&key, GetOptions::default()).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(Ledger::default()),
            Err(e) => return Err(PackError::transport(key.to_string(), e)),
        };
        let bytes = result
            .bytes()
            .await
            .map_err(|e| PackError::transport(key.to_string(), e))?;
        match Ledger::from_slice(&bytes) {
            Ok(ledger) => Ok(ledger),
            Err(e) => {
                tracing::warn!(
                    event = "ledger_unreadable",
                    key = %key,
                    error = %e,
                    "ignoring unreadable sync ledger; every file will be uploaded"
                );
                Ok(Ledger::default())
            }
        }
    }

    async fn store_ledger(&self, destination: &str, ledger: &Ledger) -> PackResult<()> {
        let key = self.key(destination, LEDGER_NAME);
        let body = ledger.to_vec().map_err(|e| PackError::transport(key.to_string(), e))?;
        self.inner
            .put_opts(&key, PutPayload::from(body), PutOptions::default())
            .await
            .map_err(|e| PackError::transport(key.to_string(), e))?;
        Ok(())
    }

    /// Relative path -> size of every object under `destination`.
    async fn remote_sizes(&self, destination: &str) -> PackResult<HashMap<String, u64>> {
        let root = self.destination_root(destination);
        let objects: Vec<_> = self
            .inner
            .list(Some(&root))
            .try_collect()
            .await
            .map_err(|e| PackError::transport(root.to_string(), e))?;
        let root_prefix = format!("{root}/");
        Ok(objects
            .into_iter()
            .filter_map(|meta| {
                let relative = meta.location.as_ref().strip_prefix(&root_prefix)?.to_string();
                let size = u64::try_from(meta.size).ok()?;
                Some((relative, size))
            })
            .collect())
    }
}

/// Read and hash every file below `dir`, in file-name order.
async fn collect_local(dir: &Path) -> PackResult<Vec<LocalFile>> {
    let scanner = Scanner::new(dir).with_order(ScanOrder::Sorted);
    let mut files = Vec::new();
    for entry in scanner.scan()? {
        let entry = entry?;
        if entry.relative_path == LEDGER_NAME {
            continue;
        }
        let bytes = tokio::fs::read(&entry.absolute_path)
            .await
            .map_err(|e| PackError::source_tree(&entry.absolute_path, e))?;
        files.push(LocalFile {
            sha256: hex::encode(Sha256::digest(&bytes)),
            relative_path: entry.relative_path,
            bytes,
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_spec() {
        let spec = StoreSpec::parse("s3://pob-web/mirror?region=auto").unwrap();
        assert_eq!(spec.scheme, "s3");
        assert_eq!(spec.bucket.as_deref(), Some("pob-web"));
        assert_eq!(spec.prefix, "mirror");
        assert_eq!(spec.region.as_deref(), Some("auto"));

        let bare = StoreSpec::parse(DEFAULT_STORE).unwrap();
        assert_eq!(bare.prefix, "");
    }

    #[test]
    fn test_parse_file_and_memory() {
        let spec = StoreSpec::parse("file:///srv/pob-web").unwrap();
        assert!(spec.bucket.is_none());
        assert_eq!(spec.prefix, "srv/pob-web");
        assert_eq!(StoreSpec::parse("memory://").unwrap().scheme, "memory");
    }

    #[test]
    fn test_parse_rejects() {
        for bad in ["not a url", "gs://bucket", "s3:///no-bucket"] {
            let err = StoreSpec::parse(bad).unwrap_err();
            assert_eq!(err.exit_code(), 2, "{bad}");
        }
    }

    #[test]
    fn test_keys_join_base() {
        let store = Arc::new(object_store::memory::InMemory::new());
        let p = Publisher::new(store.clone(), "/mirror/");
        assert_eq!(
            p.key("versions/v1", "root/a.png").as_ref(),
            "mirror/versions/v1/root/a.png"
        );
        let p = Publisher::new(store, "");
        assert_eq!(p.key("versions.le/v1", "root.zip").as_ref(), "versions.le/v1/root.zip");
    }
}
