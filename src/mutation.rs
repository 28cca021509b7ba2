//! Optimistic-concurrency file edits.
//!
//! Callers read a file, keep the version token they were handed, and present
//! it on every subsequent mutation. A mutation whose token no longer matches
//! the file on disk is rejected with [`ClaimError::VersionMismatch`]; nothing
//! is merged. Every accepted mutation is recorded in the audit trail.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::agent;
use crate::error::{ClaimError, Result};
use crate::patch::{FileType, PatchError, PatchRequest};
use crate::pathguard::{PathValidator, ValidatedPath};
use crate::store::audit::{AuditMethod, AuditTrail, NewAuditEntry};
use crate::store::claims::ClaimRegistry;
use crate::store::lock::{self, LockGuard};
use crate::store::paths::paths_overlap;
use crate::store::persist;
use crate::version::{self, FileVersion};

pub const MUTATION_LOCK: &str = "mutation.lock";

/// One observed version of a file, as handed to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSnapshot {
    pub path: String,
    pub sha: String,
    pub etag: String,
    pub size: u64,
    pub file_type: FileType,
    pub content: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Outcome of an accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationReceipt {
    pub path: String,
    pub method: AuditMethod,
    /// `None` when the change landed but the audit append failed.
    pub audit_id: Option<String>,
    pub sha_before: Option<String>,
    /// `None` after a delete.
    pub version: Option<FileVersion>,
}

/// One accepted mutation, ready to be audited.
struct Change<'a> {
    actor: &'a str,
    target: &'a ValidatedPath,
    method: AuditMethod,
    base_token: Option<&'a str>,
    sha_before: Option<String>,
    new_content: Option<&'a [u8]>,
    message: String,
}

pub struct FileMutator {
    validator: PathValidator,
    audit: AuditTrail,
    registry: Option<ClaimRegistry>,
    lock_path: PathBuf,
}

impl FileMutator {
    /// Without a registry no claim enforcement happens.
    pub fn new(
        validator: PathValidator,
        audit: AuditTrail,
        registry: Option<ClaimRegistry>,
    ) -> Self {
        let lock_path = audit.root().join(MUTATION_LOCK);
        Self {
            validator,
            audit,
            registry,
            lock_path,
        }
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn read(&self, path: &str) -> Result<FileSnapshot> {
        let target = self.resolve(path)?;
        let bytes = read_existing(&target)?;
        snapshot(&target, bytes)
    }

    /// Create `path` (no token) or overwrite it (token of the current version).
    pub fn write(
        &self,
        actor: &str,
        path: &str,
        content: &str,
        base_token: Option<&str>,
    ) -> Result<MutationReceipt> {
        agent::validate_agent_id(actor)?;
        let target = self.resolve(path)?;
        let _guard = self.lock()?;
        self.enforce_claims(actor, &target)?;

        let current = read_optional(&target.absolute)?;
        let (method, sha_before) = match (&current, base_token) {
            (None, None) => (AuditMethod::Create, None),
            (None, Some(token)) => {
                return Err(ClaimError::VersionMismatch {
                    path: target.relative.clone(),
                    expected: token.to_string(),
                    current: "absent".into(),
                });
            }
            (Some(_), None) => return Err(ClaimError::FileExists(target.relative.clone())),
            (Some(bytes), Some(token)) => {
                let sha = check_token(&target, bytes, token)?;
                (AuditMethod::Write, Some(sha))
            }
        };

        if let Some(parent) = target.absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        persist::write_bytes(&target.absolute, content.as_bytes())?;
        Ok(self.finish(Change {
            actor,
            target: &target,
            method,
            base_token,
            sha_before,
            new_content: Some(content.as_bytes()),
            message: format!("{method} {} bytes", content.len()),
        }))
    }

    /// Apply a structured edit to the current content.
    pub fn patch(
        &self,
        actor: &str,
        path: &str,
        request: &PatchRequest,
        base_token: &str,
    ) -> Result<MutationReceipt> {
        agent::validate_agent_id(actor)?;
        let target = self.resolve(path)?;
        let file_type = FileType::detect(&target.absolute);
        if !request.is_allowed_for(file_type) {
            return Err(ClaimError::UnsupportedPatch {
                kind: request.kind(),
                file_type,
            });
        }

        let _guard = self.lock()?;
        self.enforce_claims(actor, &target)?;

        let bytes = read_existing(&target)?;
        let sha_before = check_token(&target, &bytes, base_token)?;
        let old = String::from_utf8(bytes)
            .map_err(|_| PatchError::InvalidDocument("file is not valid UTF-8".into()))?;
        let new = request.apply(&old)?;

        persist::write_bytes(&target.absolute, new.as_bytes())?;
        Ok(self.finish(Change {
            actor,
            target: &target,
            method: AuditMethod::Patch,
            base_token: Some(base_token),
            sha_before: Some(sha_before),
            new_content: Some(new.as_bytes()),
            message: format!("{} patch", request.kind()),
        }))
    }

    pub fn delete(&self, actor: &str, path: &str, base_token: &str) -> Result<MutationReceipt> {
        agent::validate_agent_id(actor)?;
        let target = self.resolve(path)?;
        let _guard = self.lock()?;
        self.enforce_claims(actor, &target)?;

        let bytes = read_existing(&target)?;
        let sha_before = check_token(&target, &bytes, base_token)?;
        fs::remove_file(&target.absolute)?;
        Ok(self.finish(Change {
            actor,
            target: &target,
            method: AuditMethod::Delete,
            base_token: Some(base_token),
            sha_before: Some(sha_before),
            new_content: None,
            message: "deleted".into(),
        }))
    }

    /// Runs after the change is on disk, so an audit failure is logged
    /// rather than returned.
    fn finish(&self, change: Change<'_>) -> MutationReceipt {
        let relative = &change.target.relative;
        let version = change.new_content.map(|c| FileVersion::of(c, relative));
        let recorded = self.audit.record(NewAuditEntry {
            actor: change.actor.to_string(),
            method: change.method,
            path: relative.clone(),
            base_etag: change.base_token.map(|t| t.trim().to_string()),
            new_etag: version.as_ref().map(|v| v.etag.clone()),
            sha_before: change.sha_before.clone(),
            sha_after: version.as_ref().map(|v| v.sha.clone()),
            message: change.message,
        });
        let audit_id = match recorded {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(path = %relative, method = %change.method, "mutation not audited: {err}");
                None
            }
        };
        tracing::info!(actor = change.actor, path = %relative, method = %change.method, "file mutated");
        MutationReceipt {
            path: relative.clone(),
            method: change.method,
            audit_id,
            sha_before: change.sha_before,
            version,
        }
    }

    /// Validate `path` and keep it out of the coordination directory, whose
    /// files only the registry and audit trail may change.
    fn resolve(&self, path: &str) -> Result<ValidatedPath> {
        let target = self
            .validator
            .validate(path)
            .map_err(|e| ClaimError::InvalidPath(path.to_string(), e.to_string()))?;
        let coord = resolve_through_links(self.audit.root());
        if resolve_through_links(&target.absolute).starts_with(&coord) {
            return Err(ClaimError::InvalidPath(
                path.to_string(),
                "coordination state cannot be edited directly".into(),
            ));
        }
        Ok(target)
    }

    fn lock(&self) -> Result<LockGuard> {
        fs::create_dir_all(self.audit.root())?;
        lock::acquire_lock(&self.lock_path)
    }

    fn enforce_claims(&self, actor: &str, target: &ValidatedPath) -> Result<()> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        if registry.config().advisory_only {
            return Ok(());
        }
        for claim in registry.list_active() {
            if claim.agent_id == actor {
                continue;
            }
            if let Some(held) = claim
                .paths
                .iter()
                .find(|held| paths_overlap(held, &target.relative))
            {
                tracing::info!(actor, path = %target.relative, holder = %claim.agent_id, "mutation refused");
                return Err(ClaimError::PathConflict {
                    path: target.relative.clone(),
                    held: held.clone(),
                    claim_id: claim.claim_id,
                    agent_id: claim.agent_id,
                });
            }
        }
        Ok(())
    }
}

/// Canonicalize the deepest existing ancestor and re-append the rest.
fn resolve_through_links(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(canonical) = ancestor.canonicalize() {
            let rest = path.strip_prefix(ancestor).unwrap_or(Path::new(""));
            return canonical.join(rest);
        }
    }
    path.to_path_buf()
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn read_existing(target: &ValidatedPath) -> Result<Vec<u8>> {
    if target.absolute.is_dir() {
        return Err(ClaimError::FileNotFound(target.relative.clone()));
    }
    read_optional(&target.absolute)?.ok_or_else(|| ClaimError::FileNotFound(target.relative.clone()))
}

/// Returns the current sha when `token` names the current version.
fn check_token(target: &ValidatedPath, bytes: &[u8], token: &str) -> Result<String> {
    let current = FileVersion::of(bytes, &target.relative);
    if current.matches(token) {
        Ok(current.sha)
    } else {
        Err(ClaimError::VersionMismatch {
            path: target.relative.clone(),
            expected: token.trim().to_string(),
            current: current.sha,
        })
    }
}

/// Non-UTF-8 files are refused; a lossy `content` would not match `sha`.
fn snapshot(target: &ValidatedPath, bytes: Vec<u8>) -> Result<FileSnapshot> {
    let sha = version::sha(&bytes);
    let etag = version::etag(&bytes, &target.relative);
    let size = bytes.len() as u64;
    let content =
        String::from_utf8(bytes).map_err(|_| ClaimError::BinaryFile(target.relative.clone()))?;
    let last_modified = fs::metadata(&target.absolute)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(FileSnapshot {
        path: target.relative.clone(),
        sha,
        etag,
        size,
        file_type: FileType::detect(&target.absolute),
        content,
        last_modified,
    })
}
