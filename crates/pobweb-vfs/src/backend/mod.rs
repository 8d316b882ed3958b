//! Key-value backend abstraction.
//!
//! Keys are opaque strings, values opaque bytes, with an optional small JSON
//! object attached per key. Single-key operations are atomic; there are no
//! multi-key transactions.

pub mod sqlite;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::KvResult;

pub use sqlite::SqliteKv;

/// Per-key metadata object.
pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct KvRecord {
    pub value: Bytes,
    pub metadata: Option<Metadata>,
}

/// Result of a `head` lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct KvHead {
    pub size: u64,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Replace any existing value and metadata.
    Overwrite,
    /// Write only if the key is absent.
    IfAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// `IfAbsent` found an existing value; nothing was changed.
    Exists,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub key: String,
    pub metadata: Option<Metadata>,
}

/// One page of a prefix listing. `cursor` is set while more pages remain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    pub cursor: Option<String>,
}

/// Storage behind the file service.
///
/// # Conditional writes
///
/// `put` with [`PutMode::IfAbsent`] must never replace an existing value
/// that was present when the call started. Backends with a native
/// conditional insert (such as [`SqliteKv`]) make the check and the write one
/// step and report `true` from [`KvBackend::atomic_conditional_put`]. Others
/// may implement it as read-then-write; two concurrent `IfAbsent` writers can
/// then both succeed, and the later write wins.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<KvRecord>>;

    async fn head(&self, key: &str) -> KvResult<Option<KvHead>>;

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        metadata: Option<Metadata>,
        mode: PutMode,
    ) -> KvResult<PutOutcome>;

    /// Remove `key`; absent keys are not an error.
    async fn delete(&self, key: &str) -> KvResult<()>;

    /// Keys starting with `prefix`, resuming after `cursor`.
    async fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize)
        -> KvResult<ListPage>;

    fn atomic_conditional_put(&self) -> bool {
        false
    }
}
