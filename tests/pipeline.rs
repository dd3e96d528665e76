//! End-to-end pipeline tests: index a fixture repository with the offline
//! sentinel model, then exercise search, re-index, and delete against the
//! persisted artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;

use repo_index::config::{IndexConfig, RepositoryConfig, TEST_MODEL};
use repo_index::embedding::EmbeddingProvider;
use repo_index::error::Result;
use repo_index::indexer;
use repo_index::metadata::{IndexMetadata, REPOSITORY_DIR};
use repo_index::search;

/// Fixture repository from the worked example: `README.md` is 11
/// characters, `src/a.py` is 50.
fn fixture_repo() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("README.md"), "Hello world").unwrap();
    fs::create_dir(tmp.path().join("src")).unwrap();
    fs::write(tmp.path().join("src/a.py"), "x".repeat(50)).unwrap();
    tmp
}

fn test_config(index_root: &Path) -> IndexConfig {
    IndexConfig {
        model: TEST_MODEL.to_string(),
        index_root: Some(index_root.to_path_buf()),
        ..IndexConfig::default()
    }
}

fn repo_config(repo: &TempDir) -> RepositoryConfig {
    let mut config = RepositoryConfig::new(repo.path().to_string_lossy().to_string());
    config.name = Some("demo".to_string());
    config.chunk_size = 20;
    config.chunk_overlap = 5;
    config
}

#[tokio::test]
async fn test_index_worked_example_counts_and_artifacts() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    let outcome = indexer::index_repository(&config, &repo_config(&repo)).await;
    assert_eq!(outcome.status, "success", "{}", outcome.message);
    assert_eq!(outcome.file_count, 2);
    // README.md -> 1 chunk; a.py -> ceil((50-5)/15) = 3 chunks.
    assert_eq!(outcome.chunk_count, 4);

    let index_dir = root.path().join("demo");
    assert!(index_dir.join("index.bin").exists());
    assert!(index_dir.join("docstore.jsonl").exists());
    assert!(index_dir.join("index_mapping.json").exists());
    assert!(index_dir.join("chunk_map.json").exists());
    assert!(index_dir.join("metadata.json").exists());
    assert!(index_dir.join(REPOSITORY_DIR).join("README.md").exists());
    assert!(index_dir.join(REPOSITORY_DIR).join("src/a.py").exists());

    let metadata = IndexMetadata::load(&index_dir).unwrap();
    assert_eq!(metadata.name, "demo");
    assert_eq!(metadata.file_count, 2);
    assert_eq!(metadata.chunk_count, 4);
    assert_eq!(metadata.embedding_model, TEST_MODEL);
    assert_eq!(metadata.file_types.get("md"), Some(&1));
    assert_eq!(metadata.file_types.get("py"), Some(&1));
    assert_eq!(metadata.last_commit_id, "unknown");
    assert!(metadata.size_bytes > 0);
    assert_eq!(metadata.total_tokens, None);

    // The id mapping keys positions as strings.
    let mapping: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(index_dir.join("index_mapping.json")).unwrap())
            .unwrap();
    assert!(mapping.get("0").is_some());
    assert!(mapping.get("3").is_some());

    // The chunk map keys provenance by chunk index.
    let chunk_map: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(index_dir.join("chunk_map.json")).unwrap())
            .unwrap();
    assert_eq!(chunk_map["chunks"].as_array().unwrap().len(), 4);
    assert_eq!(chunk_map["chunk_to_file"]["0"], "README.md");
}

#[tokio::test]
async fn test_search_scores_ordered_and_thresholded() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    let outcome = indexer::index_repository(&config, &repo_config(&repo)).await;
    assert!(outcome.is_success());

    let threshold = 0.2;
    let result = search::search_repository(&config, "demo", "Hello world", 10, threshold).await;
    assert_eq!(result.status, "success", "{}", result.message);
    assert!(!result.results.is_empty());

    for hit in &result.results {
        assert!(hit.score >= threshold, "score {} below threshold", hit.score);
    }
    for pair in result.results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "results not sorted");
    }

    // The query is the exact text of the README chunk, so that chunk is
    // the top hit at similarity 1.0 under the deterministic embedder.
    let top = &result.results[0];
    assert_eq!(top.source, "README.md");
    assert_eq!(top.content, "Hello world");
    assert!((top.score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_search_respects_limit() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    assert!(indexer::index_repository(&config, &repo_config(&repo)).await.is_success());

    // All three a.py chunks carry the identical text "x" * 20, so querying
    // with that text yields at least three results at similarity 1.0.
    let query = "x".repeat(20);
    let result = search::search_repository(&config, "demo", &query, 2, 0.0).await;
    assert_eq!(result.status, "success");
    assert_eq!(result.results.len(), 2);
    for hit in &result.results {
        assert_eq!(hit.source, "src/a.py");
        assert!((hit.score - 1.0).abs() < 1e-5);
    }
}

#[tokio::test]
async fn test_search_accepts_org_qualified_name() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    let mut rc = repo_config(&repo);
    rc.name = Some("acme/demo".to_string());
    assert!(indexer::index_repository(&config, &rc).await.is_success());

    let result = search::search_repository(&config, "acme/demo", "Hello world", 5, 0.0).await;
    assert_eq!(result.status, "success");
    assert_eq!(result.repository, "acme_demo");
    assert!(!result.results.is_empty());
}

/// Stub returning the same vector for every input: all similarities are
/// exactly 1.0 after normalization.
struct FixedProvider;

#[async_trait]
impl EmbeddingProvider for FixedProvider {
    fn model_id(&self) -> &str {
        "fixed-stub"
    }
    fn dims(&self) -> usize {
        8
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0]).collect())
    }
}

#[tokio::test]
async fn test_fixed_vector_stub_returns_min_limit_results_at_score_one() {
    let repo = TempDir::new().unwrap();
    fs::write(repo.path().join("one.md"), "first file").unwrap();
    fs::write(repo.path().join("two.md"), "second file").unwrap();
    fs::write(repo.path().join("three.md"), "third file").unwrap();

    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    let mut rc = RepositoryConfig::new(repo.path().to_string_lossy().to_string());
    rc.name = Some("fixed".to_string());
    rc.chunk_size = 100;
    rc.chunk_overlap = 10;

    let outcome = indexer::index_repository_with(&config, &rc, &FixedProvider).await;
    assert!(outcome.is_success(), "{}", outcome.message);
    assert_eq!(outcome.chunk_count, 3);

    for limit in [1usize, 2, 3, 10] {
        let result = search::search_with_provider(
            &config,
            "fixed",
            "any query at all",
            limit,
            0.0,
            &FixedProvider,
        )
        .await;
        assert_eq!(result.status, "success", "{}", result.message);
        assert_eq!(result.results.len(), limit.min(3));
        for hit in &result.results {
            assert!((hit.score - 1.0).abs() < 1e-5, "score was {}", hit.score);
        }
    }
}

#[tokio::test]
async fn test_reindex_is_idempotent_for_search() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    assert!(indexer::index_repository(&config, &repo_config(&repo)).await.is_success());
    let first = search::search_repository(&config, "demo", "Hello world", 4, 0.0).await;

    assert!(indexer::index_repository(&config, &repo_config(&repo)).await.is_success());
    let second = search::search_repository(&config, "demo", "Hello world", 4, 0.0).await;

    assert_eq!(first.results.len(), second.results.len());
    for (a, b) in first.results.iter().zip(second.results.iter()) {
        assert_eq!(a.content, b.content);
        assert_eq!(a.source, b.source);
        assert!((a.score - b.score).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_delete_removes_index_and_search_reports_not_found() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    assert!(indexer::index_repository(&config, &repo_config(&repo)).await.is_success());
    let index_dir = root.path().join("demo");
    assert!(index_dir.exists());

    let deleted = indexer::delete_index(&config, "demo");
    assert!(deleted.is_success());
    assert!(!index_dir.exists());

    let result = search::search_repository(&config, "demo", "Hello", 5, 0.0).await;
    assert_eq!(result.status, "error");
    assert!(result.message.contains("no index found"), "{}", result.message);

    let again = indexer::delete_index(&config, "demo");
    assert_eq!(again.status, "error");
    assert!(again.message.contains("no index found"));
}

#[tokio::test]
async fn test_fully_excluded_repository_is_clean_no_content_outcome() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    let mut rc = repo_config(&repo);
    rc.exclude_patterns = vec!["**/*".to_string()];

    let outcome = indexer::index_repository(&config, &rc).await;
    assert_eq!(outcome.status, "error");
    assert!(outcome.message.contains("no indexable content"), "{}", outcome.message);
    assert_eq!(outcome.file_count, 0);
    assert_eq!(outcome.chunk_count, 0);

    // No index artifacts may appear for a no-content run.
    assert!(!root.path().join("demo").exists());
}

#[tokio::test]
async fn test_invalid_overlap_is_rejected_before_io() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    let mut rc = repo_config(&repo);
    rc.chunk_size = 10;
    rc.chunk_overlap = 10;

    let outcome = indexer::index_repository(&config, &rc).await;
    assert_eq!(outcome.status, "error");
    assert!(outcome.message.contains("chunk_overlap"));
    assert!(!root.path().join("demo").exists());
}

#[tokio::test]
async fn test_search_rejects_out_of_range_threshold() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    assert!(indexer::index_repository(&config, &repo_config(&repo)).await.is_success());

    let result = search::search_repository(&config, "demo", "Hello", 5, 1.5).await;
    assert_eq!(result.status, "error");
    assert!(result.message.contains("threshold"));
}

#[tokio::test]
async fn test_search_updates_last_accessed() {
    let repo = fixture_repo();
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    assert!(indexer::index_repository(&config, &repo_config(&repo)).await.is_success());
    let index_dir: PathBuf = root.path().join("demo");
    assert_eq!(IndexMetadata::load(&index_dir).unwrap().last_accessed, None);

    let result = search::search_repository(&config, "demo", "Hello", 5, 0.0).await;
    assert_eq!(result.status, "success");
    assert!(IndexMetadata::load(&index_dir).unwrap().last_accessed.is_some());
}
