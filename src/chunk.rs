//! Repository walking and overlapping fixed-size chunking.
//!
//! Walks a repository tree, applies include/exclude glob filters, and
//! splits each eligible file into chunks of at most `chunk_size`
//! characters, consecutive chunks sharing `chunk_overlap` characters.
//! Chunk provenance is tracked positionally: `files[i]` is the source of
//! `chunks[i]`, so duplicate chunk text never collides.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Sentinel histogram key for files without an extension.
pub const NO_EXTENSION: &str = "none";

/// Everything the chunker extracted from one repository.
#[derive(Debug, Default)]
pub struct ChunkSet {
    /// Chunk arena, in walk order.
    pub chunks: Vec<String>,
    /// Parallel provenance list: `files[i]` produced `chunks[i]`.
    pub files: Vec<String>,
    /// Eligible file count per lowercase extension.
    pub extension_stats: BTreeMap<String, usize>,
}

impl ChunkSet {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of distinct source files (not chunks).
    pub fn file_count(&self) -> usize {
        self.extension_stats.values().sum()
    }
}

/// Persisted form of the chunk arena, keyed by stringified chunk index.
#[derive(Debug, Serialize)]
pub struct ChunkMap {
    pub chunks: Vec<String>,
    pub chunk_to_file: BTreeMap<String, String>,
}

impl From<&ChunkSet> for ChunkMap {
    fn from(set: &ChunkSet) -> Self {
        let chunk_to_file = set
            .files
            .iter()
            .enumerate()
            .map(|(i, file)| (i.to_string(), file.clone()))
            .collect();
        Self {
            chunks: set.chunks.clone(),
            chunk_to_file,
        }
    }
}

/// Walk `root` and chunk every eligible file.
///
/// A file is eligible when it matches at least one include pattern (an
/// empty include list admits everything) and no exclude pattern. Files
/// that are not valid UTF-8 are skipped without failing the run.
pub fn chunk_repository(
    root: &Path,
    include_patterns: &[String],
    exclude_patterns: &[String],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<ChunkSet> {
    let include_set = build_globset(include_patterns)?;
    let exclude_set = build_globset(exclude_patterns)?;

    let mut set = ChunkSet::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| Error::Acquisition(format!("walk failed: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_patterns.is_empty() && !include_set.is_match(&rel_str) {
            continue;
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(file = %rel_str, error = %e, "skipping unreadable file");
                continue;
            }
        };
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                debug!(file = %rel_str, "skipping binary file");
                continue;
            }
        };

        *set.extension_stats.entry(extension_of(path)).or_insert(0) += 1;

        for chunk in split_text(&text, chunk_size, chunk_overlap) {
            set.chunks.push(chunk);
            set.files.push(rel_str.clone());
        }
    }

    Ok(set)
}

/// Split text into consecutive chunks of at most `chunk_size` characters,
/// each sharing `chunk_overlap` characters with its predecessor. Text no
/// longer than `chunk_size` yields exactly one chunk.
///
/// Lengths are counted in characters and splits always fall on UTF-8
/// character boundaries.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    debug_assert!(chunk_overlap < chunk_size);

    // Byte offset of every character boundary, including the end of text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    if char_len <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(char_len);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end == char_len {
            break;
        }
        start += step;
    }
    chunks
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| NO_EXTENSION.to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Validation(format!("invalid glob pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Validation(format!("failed to build glob set: {}", e)))
}
