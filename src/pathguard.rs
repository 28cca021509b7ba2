use std::path::{Path, PathBuf};

use thiserror::Error;

/// The one hidden directory agents may touch directly.
pub const DEFAULT_METADATA_DIR: &str = ".agents";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathValidationError {
    #[error("path cannot be empty")]
    Empty,
    #[error("absolute paths are not allowed")]
    Absolute,
    #[error("'..' segments are not allowed")]
    Traversal,
    #[error("hidden segment '{0}' is not allowed")]
    HiddenSegment(String),
    #[error("path contains a NUL byte")]
    InvalidCharacter,
    #[error("extension '{0}' is not in the allow-list")]
    DisallowedExtension(String),
    #[error("path resolves outside the repository root")]
    EscapesRoot,
    #[error("repository root cannot be resolved")]
    InvalidRoot,
}

/// A path that passed every policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    /// Repo-relative, `/`-separated.
    pub relative: String,
    pub absolute: PathBuf,
}

/// Policy gate in front of every file operation.
#[derive(Debug, Clone)]
pub struct PathValidator {
    root: PathBuf,
    metadata_dir: String,
    allowed_extensions: Option<Vec<String>>,
}

impl PathValidator {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            root: repo_root.to_path_buf(),
            metadata_dir: DEFAULT_METADATA_DIR.to_string(),
            allowed_extensions: None,
        }
    }

    /// Restrict operations to these extensions (case-insensitive, without the dot).
    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = Some(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        );
        self
    }

    pub fn with_metadata_dir(mut self, dir: impl Into<String>) -> Self {
        self.metadata_dir = dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validate(&self, input: &str) -> Result<ValidatedPath, PathValidationError> {
        let relative = self.check_lexically(input)?;
        let absolute = self.root.join(&relative);
        self.check_containment(&absolute)?;
        Ok(ValidatedPath { relative, absolute })
    }

    /// Every check that needs no filesystem access.
    fn check_lexically(&self, input: &str) -> Result<String, PathValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PathValidationError::Empty);
        }
        if input.contains('\0') {
            return Err(PathValidationError::InvalidCharacter);
        }
        let unified = input.replace('\\', "/");
        if unified.starts_with('/') || has_drive_prefix(&unified) {
            return Err(PathValidationError::Absolute);
        }

        let mut kept: Vec<&str> = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(PathValidationError::Traversal),
                s if s.starts_with('.') => {
                    if !(kept.is_empty() && s == self.metadata_dir) {
                        return Err(PathValidationError::HiddenSegment(s.to_string()));
                    }
                    kept.push(s);
                }
                s => kept.push(s),
            }
        }
        if kept.is_empty() {
            return Err(PathValidationError::Empty);
        }

        if let Some(allowed) = &self.allowed_extensions {
            let last = kept[kept.len() - 1];
            let ext = Path::new(last)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            if !allowed.iter().any(|a| *a == ext) {
                return Err(PathValidationError::DisallowedExtension(ext));
            }
        }

        Ok(kept.join("/"))
    }

    /// Resolve symlinks through the nearest existing ancestor and make sure
    /// the result is still under the canonical root.
    fn check_containment(&self, absolute: &Path) -> Result<(), PathValidationError> {
        let root = self
            .root
            .canonicalize()
            .map_err(|_| PathValidationError::InvalidRoot)?;
        let existing = absolute
            .ancestors()
            .find(|p| p.exists())
            .ok_or(PathValidationError::EscapesRoot)?;
        let resolved = existing
            .canonicalize()
            .map_err(|_| PathValidationError::EscapesRoot)?;
        if resolved.starts_with(&root) {
            Ok(())
        } else {
            Err(PathValidationError::EscapesRoot)
        }
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
