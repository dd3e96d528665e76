//! Document store and persisted vector store.
//!
//! A [`VectorStore`] couples three structures that must stay in lockstep:
//! the [`FlatIndex`] of embedding vectors, the ordered document store, and
//! the position-to-docstore-id mapping. On disk they become three
//! artifacts, none of which uses a generic object serializer:
//!
//! | artifact | format |
//! |----------|--------|
//! | `index.bin` | native binary vector index |
//! | `docstore.jsonl` | one JSON record per document, creation order |
//! | `index_mapping.json` | stringified position to docstore id |
//!
//! All three must be present and mutually consistent for a load to
//! succeed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::chunk::ChunkSet;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::index::{l2_normalize, FlatIndex};

pub const INDEX_FILE: &str = "index.bin";
pub const DOCSTORE_FILE: &str = "docstore.jsonl";
pub const MAPPING_FILE: &str = "index_mapping.json";
pub const CHUNK_MAP_FILE: &str = "chunk_map.json";

/// Source provenance recorded when a chunk has no file mapping.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Provenance attached to one document store entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Relative path of the source file within the repository.
    pub source: String,
    /// Sequential chunk number across the indexing run.
    pub chunk_id: usize,
}

/// One chunk of text plus its provenance, as stored in the docstore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    /// SHA-256 of the content, for staleness detection.
    pub content_hash: String,
}

/// Convert a chunk set into document store entries with sequential chunk
/// ids and positional provenance.
pub fn create_documents(set: &ChunkSet) -> Vec<Document> {
    set.chunks
        .iter()
        .enumerate()
        .map(|(chunk_id, content)| {
            let source = set
                .files
                .get(chunk_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
            Document {
                id: Uuid::new_v4().to_string(),
                content: content.clone(),
                metadata: DocumentMetadata { source, chunk_id },
                content_hash: content_hash(content),
            }
        })
        .collect()
}

fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// In-memory pairing of vector index, document store, and id mapping.
#[derive(Debug)]
pub struct VectorStore {
    pub index: FlatIndex,
    /// Documents in creation order; position `i` holds the document whose
    /// vector sits at index position `i`.
    pub documents: Vec<Document>,
    pub index_to_docstore_id: BTreeMap<usize, String>,
}

impl VectorStore {
    /// Embed all document contents in one batch call, normalize, and build
    /// the index plus mapping in creation order.
    pub async fn build(
        documents: Vec<Document>,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = provider.embed_batch(&texts).await?;

        if vectors.len() != documents.len() {
            return Err(Error::Embedding(format!(
                "embedding batch returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }

        let mut index = FlatIndex::new(provider.dims());
        let mut mapping = BTreeMap::new();
        for (position, (document, mut vector)) in
            documents.iter().zip(vectors.into_iter()).enumerate()
        {
            l2_normalize(&mut vector);
            index.add(&vector)?;
            mapping.insert(position, document.id.clone());
        }

        Ok(Self {
            index,
            documents,
            index_to_docstore_id: mapping,
        })
    }

    /// The document whose vector sits at `position`, if any.
    pub fn document_for_position(&self, position: usize) -> Option<&Document> {
        let id = self.index_to_docstore_id.get(&position)?;
        self.documents.iter().find(|d| &d.id == id)
    }

    /// Persist the three artifacts into `dir`. Each write goes to a
    /// temporary file first and is renamed into place.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| {
            Error::Persistence(format!("failed to create {}: {}", dir.display(), e))
        })?;

        self.index.save(&dir.join(INDEX_FILE))?;

        let mut docstore = String::new();
        for document in &self.documents {
            let line = serde_json::to_string(document).map_err(|e| {
                Error::Persistence(format!("failed to encode document: {}", e))
            })?;
            docstore.push_str(&line);
            docstore.push('\n');
        }
        write_atomic(&dir.join(DOCSTORE_FILE), docstore.as_bytes())?;

        let mapping: BTreeMap<String, &String> = self
            .index_to_docstore_id
            .iter()
            .map(|(position, id)| (position.to_string(), id))
            .collect();
        let mapping_json = serde_json::to_string_pretty(&mapping)
            .map_err(|e| Error::Persistence(format!("failed to encode id mapping: {}", e)))?;
        write_atomic(&dir.join(MAPPING_FILE), mapping_json.as_bytes())?;

        debug!(dir = %dir.display(), documents = self.documents.len(), "vector store saved");
        Ok(())
    }

    /// Load and cross-check the three artifacts. The provider is used to
    /// verify the stored vectors match the configured model's
    /// dimensionality.
    pub fn load(dir: &Path, provider: &dyn EmbeddingProvider) -> Result<Self> {
        let index = FlatIndex::load(&dir.join(INDEX_FILE))?;

        if index.dims() != provider.dims() {
            return Err(Error::Persistence(format!(
                "index has {}-dimensional vectors but model '{}' produces {}",
                index.dims(),
                provider.model_id(),
                provider.dims()
            )));
        }

        let docstore_path = dir.join(DOCSTORE_FILE);
        let docstore_text = fs::read_to_string(&docstore_path).map_err(|e| {
            Error::Persistence(format!("failed to read {}: {}", docstore_path.display(), e))
        })?;
        let mut documents = Vec::new();
        for (line_no, line) in docstore_text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let document: Document = serde_json::from_str(line).map_err(|e| {
                Error::Persistence(format!(
                    "corrupt docstore record at line {}: {}",
                    line_no + 1,
                    e
                ))
            })?;
            documents.push(document);
        }

        let mapping_path = dir.join(MAPPING_FILE);
        let mapping_text = fs::read_to_string(&mapping_path).map_err(|e| {
            Error::Persistence(format!("failed to read {}: {}", mapping_path.display(), e))
        })?;
        let raw_mapping: BTreeMap<String, String> = serde_json::from_str(&mapping_text)
            .map_err(|e| Error::Persistence(format!("corrupt id mapping: {}", e)))?;

        let mut mapping = BTreeMap::new();
        for (key, id) in raw_mapping {
            let position: usize = key.parse().map_err(|_| {
                Error::Persistence(format!("id mapping has non-integer key '{}'", key))
            })?;
            mapping.insert(position, id);
        }

        let store = Self {
            index,
            documents,
            index_to_docstore_id: mapping,
        };
        store.check_consistency()?;
        Ok(store)
    }

    fn check_consistency(&self) -> Result<()> {
        let count = self.index.len();
        if self.documents.len() != count || self.index_to_docstore_id.len() != count {
            return Err(Error::Persistence(format!(
                "artifact cardinality mismatch: {} vectors, {} documents, {} mapping entries",
                count,
                self.documents.len(),
                self.index_to_docstore_id.len()
            )));
        }

        let by_id: HashMap<&str, &Document> =
            self.documents.iter().map(|d| (d.id.as_str(), d)).collect();
        for position in 0..count {
            let id = self.index_to_docstore_id.get(&position).ok_or_else(|| {
                Error::Persistence(format!("id mapping is missing position {}", position))
            })?;
            if !by_id.contains_key(id.as_str()) {
                return Err(Error::Persistence(format!(
                    "id mapping references unknown document '{}'",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// Write `bytes` to a sibling temporary file, then rename into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| Error::Persistence(format!("failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        Error::Persistence(format!("failed to move {} into place: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkSet;
    use async_trait::async_trait;

    /// Stub that embeds each text as a unit vector on an axis derived from
    /// its first byte, so distinct texts get distinct directions.
    struct AxisProvider;

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        fn model_id(&self) -> &str {
            "axis-stub"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let axis = t.bytes().next().unwrap_or(0) as usize % 8;
                    let mut v = vec![0.0; 8];
                    v[axis] = 1.0;
                    v
                })
                .collect())
        }
    }

    fn sample_chunk_set() -> ChunkSet {
        let mut set = ChunkSet::default();
        set.chunks = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        set.files = vec![
            "docs/a.md".to_string(),
            "docs/b.md".to_string(),
            "src/c.rs".to_string(),
        ];
        set
    }

    #[test]
    fn test_create_documents_assigns_sequential_ids() {
        let documents = create_documents(&sample_chunk_set());
        assert_eq!(documents.len(), 3);
        for (i, doc) in documents.iter().enumerate() {
            assert_eq!(doc.metadata.chunk_id, i);
        }
        assert_eq!(documents[0].metadata.source, "docs/a.md");
        assert_eq!(documents[2].metadata.source, "src/c.rs");
        assert_ne!(documents[0].id, documents[1].id);
    }

    #[test]
    fn test_create_documents_unknown_source() {
        let mut set = sample_chunk_set();
        set.files.truncate(2);
        let documents = create_documents(&set);
        assert_eq!(documents[2].metadata.source, UNKNOWN_SOURCE);
    }

    #[test]
    fn test_duplicate_chunk_content_keeps_distinct_provenance() {
        let mut set = ChunkSet::default();
        set.chunks = vec!["same text".to_string(), "same text".to_string()];
        set.files = vec!["a.md".to_string(), "b.md".to_string()];

        let documents = create_documents(&set);
        assert_eq!(documents[0].metadata.source, "a.md");
        assert_eq!(documents[1].metadata.source, "b.md");
        assert_eq!(documents[0].content_hash, documents[1].content_hash);
    }

    #[tokio::test]
    async fn test_build_keeps_structures_in_lockstep() {
        let documents = create_documents(&sample_chunk_set());
        let store = VectorStore::build(documents, &AxisProvider).await.unwrap();

        assert_eq!(store.index.len(), 3);
        assert_eq!(store.documents.len(), 3);
        assert_eq!(store.index_to_docstore_id.len(), 3);
        for position in 0..3 {
            let doc = store.document_for_position(position).unwrap();
            assert_eq!(doc.metadata.chunk_id, position);
        }
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let documents = create_documents(&sample_chunk_set());
        let store = VectorStore::build(documents, &AxisProvider).await.unwrap();
        store.save(tmp.path()).unwrap();

        let restored = VectorStore::load(tmp.path(), &AxisProvider).unwrap();
        assert_eq!(restored.index, store.index);
        assert_eq!(restored.documents, store.documents);
        assert_eq!(restored.index_to_docstore_id, store.index_to_docstore_id);
    }

    #[tokio::test]
    async fn test_load_fails_without_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let documents = create_documents(&sample_chunk_set());
        let store = VectorStore::build(documents, &AxisProvider).await.unwrap();
        store.save(tmp.path()).unwrap();

        fs::remove_file(tmp.path().join(MAPPING_FILE)).unwrap();
        assert!(matches!(
            VectorStore::load(tmp.path(), &AxisProvider),
            Err(Error::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_load_fails_on_cardinality_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let documents = create_documents(&sample_chunk_set());
        let store = VectorStore::build(documents, &AxisProvider).await.unwrap();
        store.save(tmp.path()).unwrap();

        // Drop one docstore record.
        let docstore = fs::read_to_string(tmp.path().join(DOCSTORE_FILE)).unwrap();
        let truncated: Vec<&str> = docstore.lines().take(2).collect();
        fs::write(tmp.path().join(DOCSTORE_FILE), truncated.join("\n")).unwrap();

        assert!(matches!(
            VectorStore::load(tmp.path(), &AxisProvider),
            Err(Error::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_load_fails_on_dims_mismatch() {
        struct WideProvider;
        #[async_trait]
        impl EmbeddingProvider for WideProvider {
            fn model_id(&self) -> &str {
                "wide-stub"
            }
            fn dims(&self) -> usize {
                16
            }
            async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0; 16]).collect())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let documents = create_documents(&sample_chunk_set());
        let store = VectorStore::build(documents, &AxisProvider).await.unwrap();
        store.save(tmp.path()).unwrap();

        assert!(matches!(
            VectorStore::load(tmp.path(), &WideProvider),
            Err(Error::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_build_rejects_short_batch() {
        struct ShortProvider;
        #[async_trait]
        impl EmbeddingProvider for ShortProvider {
            fn model_id(&self) -> &str {
                "short-stub"
            }
            fn dims(&self) -> usize {
                4
            }
            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(vec![vec![1.0, 0.0, 0.0, 0.0]])
            }
        }

        let documents = create_documents(&sample_chunk_set());
        let err = VectorStore::build(documents, &ShortProvider).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
