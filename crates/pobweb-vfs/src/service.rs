//! Virtual file operations over a [`KvBackend`].
//!
//! One operation set serves both route families. A [`VfsProfile`] decides
//! whether metadata is stored and returned, and which overwrite policy a
//! `put` uses when the caller does not say.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::backend::{KvBackend, Metadata, PutMode, PutOutcome};
use crate::error::{VfsError, VfsResult};
use crate::key::{validate_path, KeySpace, Subject};

pub const DEFAULT_MAX_VALUE_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_MAX_METADATA_BYTES: usize = 1024;
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    Replace,
    RejectIfExists,
}

impl OverwritePolicy {
    fn put_mode(self) -> PutMode {
        match self {
            Self::Replace => PutMode::Overwrite,
            Self::RejectIfExists => PutMode::IfAbsent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfsProfile {
    pub supports_metadata: bool,
    pub default_overwrite: OverwritePolicy,
}

impl VfsProfile {
    /// Metadata in and out, writes replace.
    pub const METADATA: Self = Self {
        supports_metadata: true,
        default_overwrite: OverwritePolicy::Replace,
    };

    /// Bytes only, writes refuse to replace unless asked.
    pub const PLAIN: Self = Self {
        supports_metadata: false,
        default_overwrite: OverwritePolicy::RejectIfExists,
    };

    /// `?overwrite=` wins over the profile default.
    pub fn policy(&self, overwrite: Option<bool>) -> OverwritePolicy {
        match overwrite {
            Some(true) => OverwritePolicy::Replace,
            Some(false) => OverwritePolicy::RejectIfExists,
            None => self.default_overwrite,
        }
    }
}

/// Who is asking: the authenticated subject and an optional namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub subject: Subject,
    pub namespace: Option<String>,
}

impl Owner {
    pub fn new(subject: Subject, namespace: Option<String>) -> Self {
        Self { subject, namespace }
    }

    fn key_space(&self) -> VfsResult<KeySpace> {
        KeySpace::new(&self.subject, self.namespace.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_value_bytes: usize,
    pub max_metadata_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            max_metadata_bytes: DEFAULT_MAX_METADATA_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VfsEntry {
    pub value: Bytes,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub name: String,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    Written,
    /// `RejectIfExists` met an existing value; it was left untouched.
    Rejected,
}

#[derive(Clone)]
pub struct VfsService {
    backend: Arc<dyn KvBackend>,
    limits: Limits,
    page_size: usize,
}

impl std::fmt::Debug for VfsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsService")
            .field("limits", &self.limits)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl VfsService {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        if !backend.atomic_conditional_put() {
            tracing::warn!(
                event = "conditional_put_not_atomic",
                "backend checks then writes; concurrent no-overwrite puts may both succeed"
            );
        }
        Self {
            backend,
            limits: Limits::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Every path under `prefix` owned by `owner`; all backend pages drained.
    pub async fn list(
        &self,
        owner: &Owner,
        prefix: &str,
        profile: VfsProfile,
    ) -> VfsResult<Vec<Listing>> {
        let space = owner.key_space()?;
        let key_prefix = space.key(prefix);
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .backend
                .list(&key_prefix, cursor.as_deref(), self.page_size)
                .await?;
            for entry in page.entries {
                let Some(name) = space.strip(&entry.key) else {
                    continue;
                };
                out.push(Listing {
                    name: name.to_string(),
                    metadata: if profile.supports_metadata {
                        entry.metadata
                    } else {
                        None
                    },
                });
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::debug!(event = "vfs_list", count = out.len(), "listed");
        Ok(out)
    }

    /// Metadata of `path`; `None` when the entry has none or the profile
    /// does not carry metadata.
    pub async fn head(
        &self,
        owner: &Owner,
        path: &str,
        profile: VfsProfile,
    ) -> VfsResult<Option<Metadata>> {
        validate_path(path)?;
        let key = owner.key_space()?.key(path);
        let head = self
            .backend
            .head(&key)
            .await?
            .ok_or_else(|| VfsError::NotFound {
                path: path.to_string(),
            })?;
        Ok(head.metadata.filter(|_| profile.supports_metadata))
    }

    pub async fn get(&self, owner: &Owner, path: &str, profile: VfsProfile) -> VfsResult<VfsEntry> {
        validate_path(path)?;
        let key = owner.key_space()?.key(path);
        let record = self
            .backend
            .get(&key)
            .await?
            .ok_or_else(|| VfsError::NotFound {
                path: path.to_string(),
            })?;
        Ok(VfsEntry {
            value: record.value,
            metadata: record.metadata.filter(|_| profile.supports_metadata),
        })
    }

    /// Full replace of value and metadata.
    ///
    /// With a metadata profile an omitted object is stored as `{}`; without
    /// one, nothing is stored beside the bytes.
    pub async fn put(
        &self,
        owner: &Owner,
        path: &str,
        value: Bytes,
        metadata: Option<Metadata>,
        profile: VfsProfile,
        overwrite: Option<bool>,
    ) -> VfsResult<PutResult> {
        validate_path(path)?;
        if value.len() > self.limits.max_value_bytes {
            return Err(VfsError::TooLarge {
                size: value.len(),
                limit: self.limits.max_value_bytes,
            });
        }
        let metadata = if profile.supports_metadata {
            let metadata = metadata.unwrap_or_default();
            self.check_metadata(&metadata)?;
            Some(metadata)
        } else {
            None
        };
        let key = owner.key_space()?.key(path);
        let policy = profile.policy(overwrite);
        let outcome = self
            .backend
            .put(&key, value, metadata, policy.put_mode())
            .await?;
        tracing::debug!(event = "vfs_put", ?policy, ?outcome, "put");
        Ok(match outcome {
            PutOutcome::Written => PutResult::Written,
            PutOutcome::Exists => PutResult::Rejected,
        })
    }

    /// Remove `path`; absent paths succeed.
    pub async fn delete(&self, owner: &Owner, path: &str) -> VfsResult<()> {
        validate_path(path)?;
        let key = owner.key_space()?.key(path);
        self.backend.delete(&key).await?;
        Ok(())
    }

    fn check_metadata(&self, metadata: &Metadata) -> VfsResult<()> {
        let encoded = serde_json::to_vec(metadata).map_err(|e| VfsError::InvalidMetadata {
            reason: e.to_string(),
        })?;
        if encoded.len() > self.limits.max_metadata_bytes {
            return Err(VfsError::InvalidMetadata {
                reason: format!(
                    "{} bytes exceeds limit of {}",
                    encoded.len(),
                    self.limits.max_metadata_bytes
                ),
            });
        }
        Ok(())
    }
}

/// Parse an `x-metadata` header value: a JSON object, at most `limit` bytes.
pub fn parse_metadata_header(raw: &str, limit: usize) -> VfsResult<Metadata> {
    if raw.len() > limit {
        return Err(VfsError::InvalidMetadata {
            reason: format!("{} bytes exceeds limit of {limit}", raw.len()),
        });
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(VfsError::InvalidMetadata {
            reason: "metadata must be a JSON object".into(),
        }),
        Err(e) => Err(VfsError::InvalidMetadata {
            reason: e.to_string(),
        }),
    }
}
