//! Image catalog.
//!
//! The catalog is the engine's only source of image dimensions: images ship
//! as zero-byte placeholders and are fetched individually at runtime.
//!
//! # Format
//!
//! ```text
//! Assets/ring.png\t32\t32\n
//! TreeData/skills.dds.zst\t2048\t1024\n
//! ```
//!
//! One record per line, tab-separated, UTF-8, every line newline-terminated.
//! Records keep scan order.

use std::fmt::Write as _;

use crate::error::{PackError, PackResult};
use crate::probe;
use crate::scan::{Classification, ScanEntry, Scanner};

/// Reserved bundle entry (and staging file) name for the catalog.
pub const CATALOG_ENTRY: &str = ".image.tsv";

/// One catalogued image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub relative_path: String,
    pub width: u32,
    pub height: u32,
}

/// Ordered image index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    records: Vec<CatalogRecord>,
}

/// Malformed catalog line.
#[derive(Debug, thiserror::Error)]
#[error("catalog line {line}: {reason}")]
pub struct CatalogParseError {
    pub line: usize,
    pub reason: String,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `entry` and append its record.
    ///
    /// Paths holding a tab or line break would split their record, so they
    /// fail the build instead of producing an unreadable catalog.
    pub fn push_entry(&mut self, entry: &ScanEntry) -> PackResult<()> {
        if entry.relative_path.contains(['\t', '\n', '\r']) {
            return Err(PackError::UnsupportedPath {
                path: entry.absolute_path.clone(),
                reason: "tab or line break in an image path".to_string(),
            });
        }
        let dims = probe::dimensions(&entry.absolute_path)?;
        self.records.push(CatalogRecord {
            relative_path: entry.relative_path.clone(),
            width: dims.width,
            height: dims.height,
        });
        Ok(())
    }

    /// Catalog every image of a walk, skipping excluded prefixes.
    pub fn from_scan(scanner: &Scanner, excluded_prefixes: &[String]) -> PackResult<Self> {
        let mut catalog = Self::new();
        for entry in scanner.scan()? {
            let entry = entry?;
            if entry.classification != Classification::Image
                || is_excluded(&entry.relative_path, excluded_prefixes)
            {
                continue;
            }
            catalog.push_entry(&entry)?;
        }
        Ok(catalog)
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, relative_path: &str) -> Option<&CatalogRecord> {
        self.records
            .iter()
            .find(|r| r.relative_path == relative_path)
    }

    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for r in &self.records {
            // writing into a String cannot fail
            let _ = writeln!(out, "{}\t{}\t{}", r.relative_path, r.width, r.height);
        }
        out
    }

    /// Parse catalog text; a missing final newline is accepted.
    pub fn parse(text: &str) -> Result<Self, CatalogParseError> {
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let (Some(path), Some(w), Some(h), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(CatalogParseError {
                    line: line_no,
                    reason: "expected 3 tab-separated fields".to_string(),
                });
            };
            let dim = |s: &str, what: &str| {
                s.parse::<u32>().map_err(|e| CatalogParseError {
                    line: line_no,
                    reason: format!("bad {what} '{s}': {e}"),
                })
            };
            records.push(CatalogRecord {
                relative_path: path.to_string(),
                width: dim(w, "width")?,
                height: dim(h, "height")?,
            });
        }
        Ok(Self { records })
    }
}

/// Raw string-prefix match, as the packager has always applied it.
pub fn is_excluded(relative_path: &str, excluded_prefixes: &[String]) -> bool {
    excluded_prefixes
        .iter()
        .any(|p| relative_path.starts_with(p.as_str()))
}
