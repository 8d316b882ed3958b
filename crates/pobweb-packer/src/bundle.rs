//! Bundle assembly and deterministic archive serialization.
//!
//! The bundle is a ZIP archive with every entry `Stored`, stamped with the
//! DOS epoch and fixed permissions, in insertion order. Two builders fed the
//! same entries serialize to identical bytes.

use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::catalog::is_excluded;
use crate::error::{PackError, PackResult};

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBody {
    /// `name/` directory record.
    Directory,
    /// Zero-byte stand-in for an image fetched separately at runtime.
    Placeholder,
    Content(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub name: String,
    pub body: EntryBody,
}

impl BundleEntry {
    pub fn is_directory(&self) -> bool {
        matches!(self.body, EntryBody::Directory)
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.body {
            EntryBody::Content(bytes) => bytes,
            EntryBody::Directory | EntryBody::Placeholder => &[],
        }
    }
}

/// Ordered set of uniquely named bundle entries.
#[derive(Debug, Default)]
pub struct BundleBuilder {
    entries: Vec<BundleEntry>,
    names: HashSet<String>,
    excluded_prefixes: Vec<String>,
}

impl BundleBuilder {
    pub fn new(excluded_prefixes: Vec<String>) -> Self {
        Self {
            excluded_prefixes,
            ..Self::default()
        }
    }

    pub fn add_placeholder(&mut self, name: &str) -> PackResult<()> {
        self.add_file(name, EntryBody::Placeholder)
    }

    pub fn add_content(&mut self, name: &str, bytes: Vec<u8>) -> PackResult<()> {
        self.add_file(name, EntryBody::Content(bytes))
    }

    fn add_file(&mut self, name: &str, body: EntryBody) -> PackResult<()> {
        if let Some(prefix) = self
            .excluded_prefixes
            .iter()
            .find(|p| is_excluded(name, std::slice::from_ref(p)))
        {
            return Err(PackError::ExcludedEntry {
                name: name.to_string(),
                prefix: prefix.clone(),
            });
        }
        if self.names.contains(name) {
            return Err(PackError::DuplicateEntry {
                name: name.to_string(),
            });
        }
        self.add_ancestors(name);
        self.names.insert(name.to_string());
        self.entries.push(BundleEntry {
            name: name.to_string(),
            body,
        });
        Ok(())
    }

    fn add_ancestors(&mut self, name: &str) {
        for (idx, _) in name.match_indices('/') {
            let dir = &name[..=idx];
            if self.names.insert(dir.to_string()) {
                self.entries.push(BundleEntry {
                    name: dir.to_string(),
                    body: EntryBody::Directory,
                });
            }
        }
    }

    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of non-directory entries.
    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_directory()).count()
    }

    /// Serialize the archive in memory.
    pub fn to_zip_bytes(&self) -> PackResult<Vec<u8>> {
        let epoch = DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0).map_err(|e| {
            PackError::Archive(zip::result::ZipError::Io(std::io::Error::other(format!(
                "fixed timestamp rejected: {e}"
            ))))
        })?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(epoch);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.entries {
            match &entry.body {
                EntryBody::Directory => {
                    zip.add_directory(entry.name.as_str(), options.unix_permissions(DIR_MODE))?;
                }
                body => {
                    zip.start_file(entry.name.as_str(), options.unix_permissions(FILE_MODE))?;
                    if let EntryBody::Content(bytes) = body {
                        zip.write_all(bytes)
                            .map_err(|e| PackError::Archive(e.into()))?;
                    }
                }
            }
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Materialize every entry below `dir` (placeholders as empty files).
    pub fn write_tree(&self, dir: &Path) -> PackResult<()> {
        fs::create_dir_all(dir).map_err(|e| PackError::output(dir, e))?;
        for entry in &self.entries {
            let path = dir.join(entry.name.trim_end_matches('/'));
            if entry.is_directory() {
                fs::create_dir_all(&path).map_err(|e| PackError::output(&path, e))?;
                continue;
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| PackError::output(parent, e))?;
            }
            fs::write(&path, entry.bytes()).map_err(|e| PackError::output(&path, e))?;
        }
        Ok(())
    }
}
