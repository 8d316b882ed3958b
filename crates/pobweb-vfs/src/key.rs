//! Namespaced key scheme.
//!
//! ```text
//! user:{subject}:vfs:{path}
//! user:{subject}:ns-vfs:{namespace}:{path}
//! ```
//!
//! `%` and `:` in the subject and namespace are percent-escaped, so a
//! subject can never reach into another subject's key range. Subjects issued
//! by the identity provider (`auth0|abc123`) contain neither and map to the
//! same key text the store has always used. Paths are stored as given.

use std::borrow::Cow;
use std::fmt;

use crate::error::{VfsError, VfsResult};

pub const MAX_PATH_BYTES: usize = 1024;
pub const MAX_NAMESPACE_BYTES: usize = 64;

/// Authenticated tenant identifier (`sub` claim).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    pub fn new(sub: impl Into<String>) -> VfsResult<Self> {
        let sub = sub.into();
        if sub.is_empty() {
            return Err(VfsError::InvalidSubject {
                reason: "empty subject".into(),
            });
        }
        Ok(Self(sub))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One tenant's key range: a subject, optionally narrowed to a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(subject: &Subject, namespace: Option<&str>) -> VfsResult<Self> {
        let sub = escape_component(subject.as_str());
        let prefix = match namespace {
            None => format!("user:{sub}:vfs:"),
            Some(ns) => {
                validate_namespace(ns)?;
                format!("user:{sub}:ns-vfs:{}:", escape_component(ns))
            }
        };
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, path: &str) -> String {
        format!("{}{path}", self.prefix)
    }

    /// Path part of a key in this space.
    pub fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
    }
}

/// Escape `%` and `:` so a component cannot contain a separator.
pub fn escape_component(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['%', ':']) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

pub fn validate_path(path: &str) -> VfsResult<()> {
    let reason = if path.is_empty() {
        "empty path"
    } else if path.starts_with('/') {
        "path must be relative"
    } else if path.len() > MAX_PATH_BYTES {
        "path too long"
    } else if path.chars().any(char::is_control) {
        "control character in path"
    } else {
        return Ok(());
    };
    Err(VfsError::InvalidPath {
        path: path.chars().take(64).collect(),
        reason: reason.to_string(),
    })
}

fn validate_namespace(ns: &str) -> VfsResult<()> {
    let reason = if ns.is_empty() {
        "empty namespace"
    } else if ns.len() > MAX_NAMESPACE_BYTES {
        "namespace too long"
    } else if ns.chars().any(char::is_control) {
        "control character in namespace"
    } else {
        return Ok(());
    };
    Err(VfsError::InvalidNamespace {
        reason: reason.to_string(),
    })
}
