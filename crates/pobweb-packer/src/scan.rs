//! Tree scanner.
//!
//! Walks a source directory depth-first and yields one [`ScanEntry`] per
//! regular file. A scan is a plain iterator: every consumer (catalog,
//! packager, publisher) starts its own walk over the same base directory.
//!
//! Entry order is the platform's readdir order unless [`ScanOrder::Sorted`]
//! is requested. Readdir order is stable for an unmodified tree, and the
//! bundle catalog order is derived from it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{PackError, PackResult};

/// How a scanned file is treated by the packager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Raster image or compressed texture: catalogued, shipped as placeholder.
    Image,
    /// `.lua` source.
    Script,
    /// `.zip` archive consumed by the engine.
    Archive,
    /// `.part*` split archive chunk.
    PartialArchive,
    /// `.json*` data file.
    Data,
    /// Not packaged.
    Other,
}

impl Classification {
    /// Classify by file name. Case-sensitive, mirroring the engine's lookups.
    pub fn of(relative_path: &str) -> Self {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        if file_name.ends_with(".dds.zst") {
            return Self::Image;
        }
        match extension(file_name) {
            Some("png") | Some("jpg") => Self::Image,
            Some("lua") => Self::Script,
            Some("zip") => Self::Archive,
            Some(ext) if ext.starts_with("part") => Self::PartialArchive,
            Some(ext) if ext.starts_with("json") => Self::Data,
            _ => Self::Other,
        }
    }

    /// Whether the full file content goes into the bundle.
    pub fn ships_content(self) -> bool {
        matches!(
            self,
            Self::Script | Self::Archive | Self::PartialArchive | Self::Data
        )
    }
}

/// Extension after the last dot, ignoring a leading dot (`.luacheckrc` has none).
fn extension(file_name: &str) -> Option<&str> {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => Some(&file_name[idx + 1..]),
        _ => None,
    }
}

/// One regular file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub absolute_path: PathBuf,
    /// Path relative to the scan base, `/`-separated.
    pub relative_path: String,
    pub classification: Classification,
}

/// Directory entry ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOrder {
    /// Whatever the filesystem returns.
    #[default]
    Native,
    /// File-name order within each directory.
    Sorted,
}

/// Scanner over one base directory.
#[derive(Debug, Clone)]
pub struct Scanner {
    base: PathBuf,
    order: ScanOrder,
}

impl Scanner {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            order: ScanOrder::Native,
        }
    }

    pub fn with_order(mut self, order: ScanOrder) -> Self {
        self.order = order;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Start a fresh walk.
    ///
    /// Fails immediately if the base does not exist; errors met during the
    /// walk are yielded in place and end the useful part of the scan.
    pub fn scan(&self) -> PackResult<Scan> {
        if !self.base.exists() {
            return Err(PackError::MissingSource {
                path: self.base.clone(),
            });
        }
        let mut walker = WalkDir::new(&self.base).follow_links(false);
        if self.order == ScanOrder::Sorted {
            walker = walker.sort_by_file_name();
        }
        Ok(Scan {
            base: self.base.clone(),
            inner: walker.into_iter(),
        })
    }
}

/// Lazy iterator over the files of one walk.
pub struct Scan {
    base: PathBuf,
    inner: walkdir::IntoIter,
}

impl Iterator for Scan {
    type Item = PackResult<ScanEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.base.clone());
                    let io = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    return Some(Err(PackError::source_tree(path, io)));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative_path = match relative_to(&self.base, entry.path()) {
                Ok(rel) => rel,
                Err(err) => return Some(Err(err)),
            };
            return Some(Ok(ScanEntry {
                classification: Classification::of(&relative_path),
                absolute_path: entry.into_path(),
                relative_path,
            }));
        }
    }
}

/// `/`-joined path of `path` below `base`; a base that is itself the file
/// maps to the file name. Names that are not valid UTF-8 are refused.
fn relative_to<'p>(base: &Path, path: &'p Path) -> PackResult<String> {
    let utf8 = |part: &'p std::ffi::OsStr| -> PackResult<&'p str> {
        part.to_str().ok_or_else(|| PackError::UnsupportedPath {
            path: path.to_path_buf(),
            reason: "name is not valid UTF-8".to_string(),
        })
    };
    let rel = path.strip_prefix(base).unwrap_or(path);
    if rel.as_os_str().is_empty() {
        return match path.file_name() {
            Some(name) => utf8(name).map(str::to_string),
            None => Ok(String::new()),
        };
    }
    let parts = rel
        .components()
        .map(|c| utf8(c.as_os_str()))
        .collect::<PackResult<Vec<_>>>()?;
    Ok(parts.join("/"))
}
