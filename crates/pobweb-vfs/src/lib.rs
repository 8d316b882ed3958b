//! Tenant-scoped virtual file store.
//!
//! Paths owned by an authenticated subject map onto keys of a shared
//! key-value backend (`user:{subject}:vfs:{path}`). Two owners never share a
//! key; within one owner the path is the identity and the last write wins.

pub mod backend;
pub mod error;
pub mod key;
pub mod service;

pub use backend::{KvBackend, Metadata, PutMode, PutOutcome, SqliteKv};
pub use error::{KvError, KvResult, VfsError, VfsResult};
pub use key::{KeySpace, Subject};
pub use service::{
    parse_metadata_header, Limits, Listing, OverwritePolicy, Owner, PutResult, VfsEntry,
    VfsProfile, VfsService,
};
