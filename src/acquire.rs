use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::info;

use crate::config::is_remote_url;
use crate::error::{Error, Result};

/// A repository resolved to a local working directory.
///
/// For remote references the clone lives in `temp`; dropping the guard
/// removes the directory, so holding `Acquired` for the lifetime of the
/// pipeline gives cleanup on every exit path.
pub struct Acquired {
    pub local_path: PathBuf,
    pub name: String,
    pub temp: Option<TempDir>,
}

/// Resolve a repository reference to a local working directory.
///
/// Remote references are shallow-cloned into a fresh temporary directory;
/// local references are used in place.
pub fn acquire(reference: &str) -> Result<Acquired> {
    let name = repository_name(reference);

    if is_remote_url(reference) {
        let temp = TempDir::new()
            .map_err(|e| Error::Acquisition(format!("failed to create temp directory: {}", e)))?;
        clone_repository(reference, temp.path())?;
        Ok(Acquired {
            local_path: temp.path().to_path_buf(),
            name,
            temp: Some(temp),
        })
    } else {
        Ok(Acquired {
            local_path: PathBuf::from(reference),
            name,
            temp: None,
        })
    }
}

fn clone_repository(url: &str, dest: &Path) -> Result<()> {
    info!(url, dest = %dest.display(), "cloning repository");

    let output = Command::new("git")
        .args(["clone", "--depth", "1"])
        .arg(url)
        .arg(dest)
        .output()
        .map_err(|e| {
            Error::Acquisition(format!("failed to execute 'git clone'. Is git installed? {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Acquisition(format!(
            "git clone of {} failed: {}",
            url,
            stderr.trim()
        )));
    }

    Ok(())
}

/// Current HEAD commit hash of a local working tree, or `"unknown"` when
/// the directory is not a git repository or git is unavailable.
pub fn head_commit(repo_dir: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output();

    match output {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        }
        _ => "unknown".to_string(),
    }
}

/// Derive a filesystem-safe repository name from a reference.
///
/// Remote URLs keep their final two path segments (owner and repository)
/// joined with `_`; local paths keep their final segment. A trailing
/// `.git` suffix is stripped.
pub fn repository_name(reference: &str) -> String {
    let trimmed = reference.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    if is_remote_url(reference) {
        let without_scheme = match trimmed.find("://") {
            Some(idx) => &trimmed[idx + 3..],
            None => trimmed,
        };
        // scp-style git@host:owner/repo
        let path_part = match without_scheme.split_once(':') {
            Some((_, rest)) => rest,
            None => without_scheme,
        };

        let segments: Vec<&str> = path_part.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => "repository".to_string(),
            [single] => normalize_name(single),
            [.., owner, repo] => format!("{}_{}", owner, repo),
        }
    } else {
        Path::new(trimmed)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "repository".to_string())
    }
}

/// Collapse an org-qualified `owner/repo` name to a single path-safe token.
/// Search accepts both spellings; indexing stores the collapsed form.
pub fn normalize_name(name: &str) -> String {
    name.replace('/', "_")
}
