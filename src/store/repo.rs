use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::pathguard::DEFAULT_METADATA_DIR;

pub const COORDINATION_SUBDIR: &str = "coordination";

/// Walk up from the current directory to the nearest directory holding the
/// agent metadata dir or a `.git` entry. Falls back to the current directory.
pub fn find_repo_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(find_repo_root_from(&cwd).unwrap_or(cwd))
}

pub fn find_repo_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(DEFAULT_METADATA_DIR).is_dir() || dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// `<repo>/.agents/coordination`
pub fn default_coord_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(DEFAULT_METADATA_DIR).join(COORDINATION_SUBDIR)
}
