use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathNormalizationError {
    #[error("claimed path is blank")]
    EmptyInput,
    #[error("claimed path climbs above the repository")]
    EscapesRepositoryRoot,
    #[error("claimed path lies outside the repository")]
    AbsoluteOutsideRepository,
    #[error("the whole repository cannot be claimed")]
    ResolvesToRepositoryRoot,
    #[error("repository root cannot be resolved")]
    InvalidRepositoryRoot,
}

/// Normalize a claimed path to its canonical repo-relative form.
///
/// - surrounding whitespace is trimmed, `\` is treated as `/`
/// - empty and `.` segments are dropped, `..` is resolved lexically
/// - `..` that climbs above the root is rejected
/// - absolute paths inside `repo_root` become repo-relative, others are rejected
/// - the repository root itself cannot be claimed
///
/// Directory claims (`src/module/`) lose their trailing slash; containment is
/// decided per segment by [`paths_overlap`], so the slash carries no meaning.
pub fn normalize_claim_path(
    input: &str,
    repo_root: &Path,
) -> Result<String, PathNormalizationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PathNormalizationError::EmptyInput);
    }

    let unified = input.replace('\\', "/");
    let segments = if unified.starts_with('/') {
        strip_repo_root(&unified, repo_root)?
    } else {
        resolve_segments(unified.split('/'))?
    };

    if segments.is_empty() {
        return Err(PathNormalizationError::ResolvesToRepositoryRoot);
    }
    Ok(segments.join("/"))
}

/// Split an already-normalized path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// True when one segment list is a (non-strict) prefix of the other.
pub fn segments_overlap(a: &[&str], b: &[&str]) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let shared = a.len().min(b.len());
    a[..shared] == b[..shared]
}

/// Two normalized paths overlap when they are equal or one is an ancestor
/// directory of the other. `src/a.py` and `src/ab.py` do not overlap.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    segments_overlap(&segments(a), &segments(b))
}

fn strip_repo_root(
    absolute: &str,
    repo_root: &Path,
) -> Result<Vec<String>, PathNormalizationError> {
    let root = absolute_root(repo_root)?;
    let root = root.to_string_lossy().replace('\\', "/");
    if !root.starts_with('/') {
        return Err(PathNormalizationError::InvalidRepositoryRoot);
    }

    let path_segments = resolve_segments(absolute.split('/'))?;
    let root_segments = resolve_segments(root.split('/'))?;

    if path_segments.len() < root_segments.len()
        || path_segments[..root_segments.len()] != root_segments[..]
    {
        return Err(PathNormalizationError::AbsoluteOutsideRepository);
    }
    Ok(path_segments[root_segments.len()..].to_vec())
}

fn absolute_root(repo_root: &Path) -> Result<PathBuf, PathNormalizationError> {
    if repo_root.is_absolute() {
        return Ok(repo_root.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(repo_root))
        .map_err(|_| PathNormalizationError::InvalidRepositoryRoot)
}

fn resolve_segments<'a>(
    parts: impl Iterator<Item = &'a str>,
) -> Result<Vec<String>, PathNormalizationError> {
    let mut resolved: Vec<String> = Vec::new();
    for part in parts {
        match part {
            "" | "." => {}
            ".." => {
                if resolved.pop().is_none() {
                    return Err(PathNormalizationError::EscapesRepositoryRoot);
                }
            }
            other => resolved.push(other.to_string()),
        }
    }
    Ok(resolved)
}
