//! Similarity search over a persisted index.
//!
//! Loads the vector store for a repository name, embeds the query, runs a
//! top-K inner-product search, and reconstructs ranked results with chunk
//! text and source provenance.

use chrono::Utc;
use serde::Serialize;
use tracing::{error, warn};

use crate::acquire::normalize_name;
use crate::config::IndexConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::index::l2_normalize;
use crate::metadata::IndexMetadata;
use crate::store::VectorStore;

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub content: String,
    /// Relative path of the chunk's source file.
    pub source: String,
    pub score: f32,
}

/// Structured result of a search operation.
#[derive(Debug, Serialize)]
pub struct SearchOutcome {
    /// `"success"` or `"error"`.
    pub status: String,
    pub message: String,
    pub repository: String,
    pub results: Vec<SearchHit>,
}

/// Search with the provider selected by the configuration.
pub async fn search_repository(
    config: &IndexConfig,
    repository: &str,
    query: &str,
    limit: usize,
    threshold: f32,
) -> SearchOutcome {
    let name = normalize_name(repository);
    let provider = match embedding::create_provider(config) {
        Ok(provider) => provider,
        Err(e) => {
            error!(error = %e, "provider construction failed");
            return SearchOutcome {
                status: "error".to_string(),
                message: e.to_string(),
                repository: name,
                results: Vec::new(),
            };
        }
    };
    search_with_provider(config, repository, query, limit, threshold, provider.as_ref()).await
}

/// Search with an explicitly injected embedding provider.
pub async fn search_with_provider(
    config: &IndexConfig,
    repository: &str,
    query: &str,
    limit: usize,
    threshold: f32,
    provider: &dyn EmbeddingProvider,
) -> SearchOutcome {
    let name = normalize_name(repository);

    match run_search(config, &name, query, limit, threshold, provider).await {
        Ok(results) => SearchOutcome {
            status: "success".to_string(),
            message: format!("{} result(s) for '{}'", results.len(), query),
            repository: name,
            results,
        },
        Err(e) => {
            error!(repository = %name, error = %e, "search failed");
            SearchOutcome {
                status: "error".to_string(),
                message: e.to_string(),
                repository: name,
                results: Vec::new(),
            }
        }
    }
}

async fn run_search(
    config: &IndexConfig,
    name: &str,
    query: &str,
    limit: usize,
    threshold: f32,
    provider: &dyn EmbeddingProvider,
) -> Result<Vec<SearchHit>> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::Validation(format!(
            "threshold must be within 0.0..=1.0, got {}",
            threshold
        )));
    }
    if limit == 0 {
        return Err(Error::Validation("limit must be > 0".to_string()));
    }

    let index_dir = config.index_root().join(name);
    if !index_dir.exists() {
        return Err(Error::NotFound(name.to_string()));
    }

    let store = VectorStore::load(&index_dir, provider)?;

    let mut query_vector = provider.embed_query(query).await?;
    l2_normalize(&mut query_vector);

    let hits = store
        .index
        .search(&query_vector, limit)
        .into_iter()
        .filter(|(_, score)| *score >= threshold)
        .filter_map(|(position, score)| {
            store.document_for_position(position).map(|doc| SearchHit {
                content: doc.content.clone(),
                source: doc.metadata.source.clone(),
                score,
            })
        })
        .collect();

    touch_last_accessed(&index_dir);

    Ok(hits)
}

/// Record the access time in the index metadata. Best effort: a failed
/// write logs a warning and never fails the search.
fn touch_last_accessed(index_dir: &std::path::Path) {
    match IndexMetadata::load(index_dir) {
        Ok(mut metadata) => {
            metadata.last_accessed = Some(Utc::now());
            if let Err(e) = metadata.save(index_dir) {
                warn!(error = %e, "failed to update last-accessed time");
            }
        }
        Err(e) => warn!(error = %e, "failed to load metadata for access tracking"),
    }
}
