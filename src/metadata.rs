//! Per-index metadata records.
//!
//! Summarizes one indexed repository: counts, file-type histogram, on-disk
//! size, last commit, timestamps. Written as `metadata.json` inside the
//! index directory with stable field ordering so re-index diffs stay
//! readable. `rix list` and `rix info` read these records back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::store::write_atomic;

pub const METADATA_FILE: &str = "metadata.json";

/// Subdirectory holding the verbatim copy of indexed repository files.
pub const REPOSITORY_DIR: &str = "repository";

/// Summary record for one indexed repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Normalized repository name, also the index directory name.
    pub name: String,
    /// Original path or URL the index was built from.
    pub repository_path: String,
    pub index_path: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Distinct source files, not chunks.
    pub file_count: usize,
    pub chunk_count: usize,
    pub embedding_model: String,
    /// Eligible file count per lowercase extension.
    pub file_types: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    /// Total size of all files under the index directory.
    pub size_bytes: u64,
    /// HEAD commit of the indexed working tree, or `"unknown"`.
    pub last_commit_id: String,
    pub repository_directory: PathBuf,
}

impl IndexMetadata {
    pub fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Persistence(format!("failed to encode metadata: {}", e)))?;
        write_atomic(&dir.join(METADATA_FILE), json.as_bytes())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        let text = fs::read_to_string(&path).map_err(|e| {
            Error::Persistence(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Persistence(format!("corrupt metadata in {}: {}", path.display(), e)))
    }
}

/// Sum of file sizes under `dir`. Unreadable entries are ignored.
pub fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Metadata for every index directory under `root`, sorted by name.
/// Subdirectories without a readable metadata record are skipped.
pub fn list_indexes(root: &Path) -> Result<Vec<IndexMetadata>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(root).map_err(|e| {
        Error::Persistence(format!("failed to read {}: {}", root.display(), e))
    })?;

    let mut indexes = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Persistence(format!("failed to read {}: {}", root.display(), e))
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Ok(metadata) = IndexMetadata::load(&entry.path()) {
            indexes.push(metadata);
        }
    }

    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(indexes)
}
