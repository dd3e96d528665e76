use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Remote embedding models accepted by the provider, with their vector
/// dimensionality.
pub const KNOWN_MODELS: &[(&str, usize)] = &[
    ("amazon.titan-embed-text-v1", 1536),
    ("amazon.titan-embed-text-v2:0", 1024),
    ("cohere.embed-english-v3", 1024),
    ("cohere.embed-multilingual-v3", 1024),
];

/// Sentinel model id for offline use. Produces deterministic hash-derived
/// vectors locally instead of calling the remote API.
pub const TEST_MODEL: &str = "test-model";

/// Dimensionality of the sentinel model's vectors.
pub const TEST_MODEL_DIMS: usize = 64;

/// Embedding and storage settings shared by every command.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    /// Root directory holding one subdirectory per indexed repository.
    #[serde(default)]
    pub index_root: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            region: None,
            profile: None,
            index_root: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "amazon.titan-embed-text-v2:0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl IndexConfig {
    /// Effective index root: the configured override, else `$HOME/.repo-index`,
    /// else `./.repo-index`.
    pub fn index_root(&self) -> PathBuf {
        if let Some(ref root) = self.index_root {
            return root.clone();
        }
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".repo-index"),
            None => PathBuf::from(".repo-index"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model != TEST_MODEL && registered_dims(&self.model).is_none() {
            return Err(Error::Validation(format!(
                "unknown embedding model '{}'. Known models: {}",
                self.model,
                KNOWN_MODELS
                    .iter()
                    .map(|(id, _)| *id)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Validation("timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Look up the dimensionality of a registered remote model.
pub fn registered_dims(model: &str) -> Option<usize> {
    KNOWN_MODELS
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, dims)| *dims)
}

/// Per-run settings describing what to index and how to chunk it.
#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    /// Local path or remote clone URL.
    pub repository: String,
    /// Optional output name. Takes precedence over the derived name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl RepositoryConfig {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            name: None,
            include_patterns: default_include_patterns(),
            exclude_patterns: default_exclude_patterns(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(Error::Validation("repository must not be empty".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Validation("chunk_size must be > 0".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if !is_remote_url(&self.repository) && !Path::new(&self.repository).exists() {
            return Err(Error::Validation(format!(
                "repository path does not exist: {}",
                self.repository
            )));
        }
        Ok(())
    }
}

/// Whether a repository reference should be cloned rather than read in place.
pub fn is_remote_url(reference: &str) -> bool {
    reference.starts_with("http://")
        || reference.starts_with("https://")
        || reference.starts_with("git@")
        || reference.starts_with("ssh://")
}

fn default_include_patterns() -> Vec<String> {
    [
        "**/*.md", "**/*.txt", "**/*.rst", "**/*.py", "**/*.rs", "**/*.js", "**/*.ts",
        "**/*.java", "**/*.go", "**/*.rb", "**/*.c", "**/*.h", "**/*.cpp", "**/*.hpp",
        "**/*.cs", "**/*.sh", "**/*.toml", "**/*.yaml", "**/*.yml", "**/*.json",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    [
        "**/.git/**",
        "**/node_modules/**",
        "**/target/**",
        "**/__pycache__/**",
        "**/.venv/**",
        "**/dist/**",
        "**/build/**",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

/// Load an [`IndexConfig`] from a TOML file and validate it.
pub fn load_config(path: &Path) -> Result<IndexConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Validation(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: IndexConfig = toml::from_str(&content)
        .map_err(|e| Error::Validation(format!("failed to parse config file: {}", e)))?;

    config.validate()?;
    Ok(config)
}
