//! # repo-index CLI (`rix`)
//!
//! The `rix` binary indexes Git repositories for semantic search and
//! queries the resulting indexes.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rix index <repository>` | Index a local path or remote clone URL |
//! | `rix search <name> "<query>"` | Search an indexed repository |
//! | `rix list` | List indexed repositories |
//! | `rix info <name>` | Show one repository's index metadata |
//! | `rix delete <name>` | Remove a repository's index |
//!
//! All commands accept `--config` pointing to a TOML file with the
//! embedding model, region, and index root. Without it, built-in defaults
//! apply.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use repo_index::config::{self, IndexConfig, RepositoryConfig};
use repo_index::indexer;
use repo_index::metadata;
use repo_index::search;

/// Semantic indexing and similarity search for Git repositories.
#[derive(Parser)]
#[command(
    name = "rix",
    about = "Semantic indexing and similarity search for Git repositories",
    version
)]
struct Cli {
    /// Path to a TOML configuration file (model, region, index root).
    /// Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index a repository for semantic search.
    ///
    /// Accepts a local path or a remote clone URL. Remote repositories are
    /// shallow-cloned into a temporary directory that is removed when
    /// indexing finishes, whether it succeeds or fails.
    Index {
        /// Local path or remote clone URL.
        repository: String,

        /// Output index name. Defaults to a name derived from the
        /// repository reference (`owner/repo` becomes `owner_repo`).
        #[arg(long)]
        name: Option<String>,

        /// Include glob pattern. Repeatable; replaces the default set.
        #[arg(long = "include")]
        include_patterns: Vec<String>,

        /// Exclude glob pattern. Repeatable; replaces the default set.
        #[arg(long = "exclude")]
        exclude_patterns: Vec<String>,

        /// Maximum chunk length in characters.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared between consecutive chunks.
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Search an indexed repository.
    Search {
        /// Repository name (`owner_repo` or `owner/repo`).
        repository: String,

        /// The search query string.
        query: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Minimum similarity score, between 0.0 and 1.0.
        #[arg(long, default_value_t = 0.0)]
        threshold: f32,
    },

    /// List indexed repositories.
    List,

    /// Show one repository's index metadata.
    Info {
        /// Repository name (`owner_repo` or `owner/repo`).
        repository: String,
    },

    /// Remove a repository's index directory.
    Delete {
        /// Repository name (`owner_repo` or `owner/repo`).
        repository: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => IndexConfig::default(),
    };

    match cli.command {
        Commands::Index {
            repository,
            name,
            include_patterns,
            exclude_patterns,
            chunk_size,
            chunk_overlap,
        } => {
            let mut repo = RepositoryConfig::new(repository);
            repo.name = name;
            if !include_patterns.is_empty() {
                repo.include_patterns = include_patterns;
            }
            if !exclude_patterns.is_empty() {
                repo.exclude_patterns = exclude_patterns;
            }
            if let Some(size) = chunk_size {
                repo.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                repo.chunk_overlap = overlap;
            }

            let outcome = indexer::index_repository(&cfg, &repo).await;
            if !outcome.is_success() {
                anyhow::bail!(outcome.message);
            }
            println!("{}", outcome.message);
            if let Some(path) = outcome.index_path {
                println!("  index: {}", path.display());
            }
        }
        Commands::Search {
            repository,
            query,
            limit,
            threshold,
        } => {
            let outcome =
                search::search_repository(&cfg, &repository, &query, limit, threshold).await;
            if outcome.status != "success" {
                anyhow::bail!(outcome.message);
            }

            if outcome.results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in outcome.results.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, hit.score, hit.source);
                println!("   {}", excerpt(&hit.content));
                println!();
            }
        }
        Commands::List => {
            let indexes = metadata::list_indexes(&cfg.index_root())?;
            if indexes.is_empty() {
                println!("No indexed repositories.");
                return Ok(());
            }

            println!(
                "{:<32} {:>6} {:>8} {:>10}  {}",
                "NAME", "FILES", "CHUNKS", "SIZE", "MODEL"
            );
            println!("{}", "-".repeat(76));
            for m in &indexes {
                println!(
                    "{:<32} {:>6} {:>8} {:>10}  {}",
                    m.name,
                    m.file_count,
                    m.chunk_count,
                    format_bytes(m.size_bytes),
                    m.embedding_model
                );
            }
        }
        Commands::Info { repository } => {
            let name = repo_index::acquire::normalize_name(&repository);
            let dir = cfg.index_root().join(&name);
            let m = metadata::IndexMetadata::load(&dir)
                .map_err(|_| anyhow::anyhow!("no index found for repository '{}'", name))?;

            println!("name:            {}", m.name);
            println!("repository:      {}", m.repository_path);
            println!("index path:      {}", m.index_path.display());
            println!("created:         {}", m.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(accessed) = m.last_accessed {
                println!("last accessed:   {}", accessed.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!("files:           {}", m.file_count);
            println!("chunks:          {}", m.chunk_count);
            println!("model:           {}", m.embedding_model);
            println!("size:            {}", format_bytes(m.size_bytes));
            println!("last commit:     {}", m.last_commit_id);
            if !m.file_types.is_empty() {
                let types: Vec<String> = m
                    .file_types
                    .iter()
                    .map(|(ext, count)| format!("{} ({})", ext, count))
                    .collect();
                println!("file types:      {}", types.join(", "));
            }
        }
        Commands::Delete { repository } => {
            let outcome = indexer::delete_index(&cfg, &repository);
            if !outcome.is_success() {
                anyhow::bail!(outcome.message);
            }
            println!("{}", outcome.message);
        }
    }

    Ok(())
}

/// First line of a chunk, trimmed for display.
fn excerpt(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let trimmed = flat.trim();
    let cut: String = trimmed.chars().take(96).collect();
    if cut.len() < trimmed.len() {
        format!("{}...", cut)
    } else {
        cut
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
