//! Image dimension probing from file headers.
//!
//! Pixel data is never decoded: PNG/JPEG headers are read by `image`, and
//! zstd-compressed DDS textures are decompressed only far enough to read the
//! DDS header.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{PackError, PackResult};

/// `"DDS "` magic followed by the first fields of `DDS_HEADER`.
const DDS_MAGIC: &[u8; 4] = b"DDS ";
const DDS_PROBE_LEN: usize = 20;
const DDS_HEIGHT_OFFSET: usize = 12;
const DDS_WIDTH_OFFSET: usize = 16;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Probe the dimensions of an image-classified file.
pub fn dimensions(path: &Path) -> PackResult<Dimensions> {
    let is_dds = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".dds.zst"));
    if is_dds {
        dds_zst_dimensions(path)
    } else {
        raster_dimensions(path)
    }
}

fn raster_dimensions(path: &Path) -> PackResult<Dimensions> {
    let (width, height) = image::image_dimensions(path).map_err(|e| match e {
        image::ImageError::IoError(io) => PackError::source_tree(path, io),
        other => PackError::ImageProbe {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })?;
    Ok(Dimensions { width, height })
}

fn dds_zst_dimensions(path: &Path) -> PackResult<Dimensions> {
    let file = File::open(path).map_err(|e| PackError::source_tree(path, e))?;
    let mut decoder = zstd::stream::read::Decoder::new(file).map_err(|e| PackError::ImageProbe {
        path: path.to_path_buf(),
        reason: format!("zstd: {e}"),
    })?;
    let mut head = [0u8; DDS_PROBE_LEN];
    decoder
        .read_exact(&mut head)
        .map_err(|e| PackError::ImageProbe {
            path: path.to_path_buf(),
            reason: format!("truncated DDS header: {e}"),
        })?;
    parse_dds_header(&head).ok_or_else(|| PackError::ImageProbe {
        path: path.to_path_buf(),
        reason: "missing DDS magic".to_string(),
    })
}

fn parse_dds_header(head: &[u8; DDS_PROBE_LEN]) -> Option<Dimensions> {
    if &head[..4] != DDS_MAGIC {
        return None;
    }
    let le = |at: usize| u32::from_le_bytes([head[at], head[at + 1], head[at + 2], head[at + 3]]);
    Some(Dimensions {
        width: le(DDS_WIDTH_OFFSET),
        height: le(DDS_HEIGHT_OFFSET),
    })
}
