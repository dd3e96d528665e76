//! Indexing pipeline orchestration.
//!
//! Coordinates the full flow: validate, acquire, chunk, embed, build the
//! vector store, persist artifacts, copy repository files, write metadata.
//! Each stage completes fully or fails the run; the public entry points
//! catch every error and convert it into an [`IndexOutcome`] so failures
//! never cross the external boundary as panics. Temporary clone
//! directories are cleaned up on every exit path, including errors.

use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::acquire::{self, normalize_name};
use crate::chunk::{self, ChunkMap};
use crate::config::{IndexConfig, RepositoryConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::metadata::{directory_size, IndexMetadata, REPOSITORY_DIR};
use crate::store::{self, CHUNK_MAP_FILE, VectorStore};

/// Structured result of an indexing or delete operation.
#[derive(Debug, Serialize)]
pub struct IndexOutcome {
    /// `"success"` or `"error"`.
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_path: Option<PathBuf>,
    pub file_count: usize,
    pub chunk_count: usize,
}

impl IndexOutcome {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            repository_name: None,
            index_path: None,
            file_count: 0,
            chunk_count: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Index a repository with the provider selected by the configuration.
pub async fn index_repository(config: &IndexConfig, repo: &RepositoryConfig) -> IndexOutcome {
    let provider = match embedding::create_provider(config) {
        Ok(provider) => provider,
        Err(e) => {
            error!(error = %e, "provider construction failed");
            return IndexOutcome::error(e.to_string());
        }
    };
    index_repository_with(config, repo, provider.as_ref()).await
}

/// Index a repository with an explicitly injected embedding provider.
pub async fn index_repository_with(
    config: &IndexConfig,
    repo: &RepositoryConfig,
    provider: &dyn EmbeddingProvider,
) -> IndexOutcome {
    match run_index(config, repo, provider).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(repository = %repo.repository, error = %e, "indexing failed");
            IndexOutcome::error(e.to_string())
        }
    }
}

async fn run_index(
    config: &IndexConfig,
    repo: &RepositoryConfig,
    provider: &dyn EmbeddingProvider,
) -> Result<IndexOutcome> {
    config.validate()?;
    repo.validate()?;

    // The temp clone guard lives until the end of this function; dropping
    // it removes the clone on success and on every error path above.
    let acquired = acquire::acquire(&repo.repository)?;
    info!(repository = %repo.repository, path = %acquired.local_path.display(), "repository acquired");

    let chunk_set = chunk::chunk_repository(
        &acquired.local_path,
        &repo.include_patterns,
        &repo.exclude_patterns,
        repo.chunk_size,
        repo.chunk_overlap,
    )?;

    if chunk_set.is_empty() {
        info!(repository = %repo.repository, "no content matched the include/exclude patterns");
        return Ok(IndexOutcome::error(format!(
            "no indexable content found in {}",
            repo.repository
        )));
    }

    let name = repo
        .name
        .as_deref()
        .map(normalize_name)
        .unwrap_or_else(|| acquired.name.clone());

    // Embed and build before touching the index directory, so an embedding
    // failure persists nothing.
    let documents = store::create_documents(&chunk_set);
    let vector_store = VectorStore::build(documents, provider).await?;

    let index_dir = config.index_root().join(&name);
    vector_store.save(&index_dir)?;

    let chunk_map = ChunkMap::from(&chunk_set);
    let chunk_map_json = serde_json::to_string_pretty(&chunk_map)
        .map_err(|e| Error::Persistence(format!("failed to encode chunk map: {}", e)))?;
    store::write_atomic(&index_dir.join(CHUNK_MAP_FILE), chunk_map_json.as_bytes())?;

    copy_repository_files(&acquired.local_path, &index_dir.join(REPOSITORY_DIR))?;

    let last_commit_id = acquire::head_commit(&acquired.local_path);

    let metadata = IndexMetadata {
        name: name.clone(),
        repository_path: repo.repository.clone(),
        index_path: index_dir.clone(),
        created_at: Utc::now(),
        last_accessed: None,
        file_count: chunk_set.file_count(),
        chunk_count: chunk_set.chunks.len(),
        embedding_model: provider.model_id().to_string(),
        file_types: chunk_set.extension_stats.clone(),
        total_tokens: None,
        size_bytes: directory_size(&index_dir),
        last_commit_id,
        repository_directory: index_dir.join(REPOSITORY_DIR),
    };
    metadata.save(&index_dir)?;

    info!(
        name = %name,
        files = metadata.file_count,
        chunks = metadata.chunk_count,
        "repository indexed"
    );

    Ok(IndexOutcome {
        status: "success".to_string(),
        message: format!(
            "indexed {}: {} files, {} chunks",
            name, metadata.file_count, metadata.chunk_count
        ),
        repository_name: Some(name),
        index_path: Some(index_dir),
        file_count: metadata.file_count,
        chunk_count: metadata.chunk_count,
    })
}

/// Verbatim recursive copy of the repository's files into the index
/// directory, excluding version-control metadata. A prior copy is replaced
/// wholesale so a re-index never leaves stale files behind.
fn copy_repository_files(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|e| {
            Error::Persistence(format!("failed to clear {}: {}", dest.display(), e))
        })?;
    }

    let walker = WalkDir::new(source)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry =
            entry.map_err(|e| Error::Persistence(format!("repository copy failed: {}", e)))?;
        let relative = match entry.path().strip_prefix(source) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative,
            _ => continue,
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                Error::Persistence(format!("failed to create {}: {}", target.display(), e))
            })?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Persistence(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                Error::Persistence(format!("failed to copy {}: {}", entry.path().display(), e))
            })?;
        }
    }

    Ok(())
}

/// Remove a repository's index directory entirely.
pub fn delete_index(config: &IndexConfig, repository: &str) -> IndexOutcome {
    let name = normalize_name(repository);
    let index_dir = config.index_root().join(&name);

    if !index_dir.exists() {
        let err = Error::NotFound(name.clone());
        warn!(name = %name, "delete requested for missing index");
        return IndexOutcome::error(err.to_string());
    }

    match fs::remove_dir_all(&index_dir) {
        Ok(()) => {
            info!(name = %name, "index deleted");
            IndexOutcome {
                status: "success".to_string(),
                message: format!("deleted index '{}'", name),
                repository_name: Some(name),
                index_path: Some(index_dir),
                file_count: 0,
                chunk_count: 0,
            }
        }
        Err(e) => {
            error!(name = %name, error = %e, "delete failed");
            IndexOutcome::error(format!("failed to delete index '{}': {}", name, e))
        }
    }
}
