pub mod claim;
pub mod file;
pub mod init;
pub mod status;

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{ClaimError, Result};
use crate::mutation::FileMutator;
use crate::pathguard::PathValidator;
use crate::store::audit::AuditTrail;
use crate::store::claims::ClaimRegistry;
use crate::store::repo;

/// Repository root and coordination directory resolved from CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub repo_root: PathBuf,
    pub coord_dir: PathBuf,
}

impl Workspace {
    pub fn resolve(repo_root: Option<PathBuf>, coord_dir: Option<PathBuf>) -> Result<Self> {
        let repo_root = match repo_root {
            Some(root) => root,
            None => repo::find_repo_root()?,
        };
        let coord_dir = coord_dir.unwrap_or_else(|| repo::default_coord_dir(&repo_root));
        Ok(Self {
            repo_root,
            coord_dir,
        })
    }

    pub fn config(&self) -> Config {
        Config::load(&self.coord_dir)
    }

    pub fn registry(&self) -> ClaimRegistry {
        ClaimRegistry::open(&self.coord_dir, &self.repo_root, self.config())
    }

    pub fn mutator(&self) -> FileMutator {
        FileMutator::new(
            PathValidator::new(&self.repo_root),
            AuditTrail::open(&self.coord_dir),
            Some(self.registry()),
        )
    }

    pub fn coord_dir(&self) -> &Path {
        &self.coord_dir
    }
}

/// `--agent`, then `CLAIMGUARD_AGENT`.
pub fn require_agent(agent: Option<String>) -> Result<String> {
    agent
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .or_else(crate::agent::resolve_agent)
        .ok_or(ClaimError::MissingAgent)
}
