//! Sync ledger: checksums of what a previous sync uploaded.
//!
//! Stored next to the published files as `.sync-ledger.json`. Object stores
//! do not expose a content checksum portably (ETags of multipart uploads are
//! not content hashes), so the publisher records its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const LEDGER_NAME: &str = ".sync-ledger.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Lowercase hex SHA-256 of the uploaded bytes.
    pub sha256: String,
    pub size: u64,
}

/// Relative path -> entry, serialized in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    pub fn get(&self, path: &str) -> Option<&LedgerEntry> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: String, entry: LedgerEntry) {
        self.entries.insert(path, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}
