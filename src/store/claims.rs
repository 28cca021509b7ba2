use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::agent;
use crate::config::{CONFIG_FILE, Config};
use crate::error::{ClaimError, Result};
use crate::model::{Claim, ClaimRequest, CompletedAction, CompletedLogEntry};
use crate::store::heartbeat::{Heartbeat, HeartbeatTracker};
use crate::store::lock::{self, LockGuard};
use crate::store::paths::{normalize_claim_path, paths_overlap};
use crate::store::persist;

pub const REGISTRY_FILE: &str = "active_work_registry.json";
pub const COMPLETED_LOG_FILE: &str = "completed_work_log.json";
pub const LOCK_FILE: &str = "coordination.lock";
const ACTIVE_DIR: &str = "agent_locks";
const ARCHIVE_DIR: &str = "released_locks";
const RECENT_COMPLETED: usize = 10;

/// The persisted registry document: claim_id -> Claim.
pub type Registry = BTreeMap<String, Claim>;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClaimStatus {
    #[serde(flatten)]
    pub claim: Claim,
    /// Past `expires_at`; still ACTIVE until reaped.
    pub stale_candidate: bool,
    /// Past `expires_at` plus the grace period.
    pub reapable: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub active: Vec<ClaimStatus>,
    pub recent_completed: Vec<CompletedLogEntry>,
    pub heartbeats: Vec<Heartbeat>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub passed: bool,
    pub coordination_dir: String,
    pub build: String,
    pub checks: Vec<ValidationCheck>,
}

// ---------------------------------------------------------------------------
// ClaimRegistry
// ---------------------------------------------------------------------------

/// Lease-based claims over repository paths and topics, persisted in a
/// coordination directory shared by every agent process.
///
/// Each mutating call holds `coordination.lock` across its whole
/// read-modify-write and rewrites the registry document atomically.
pub struct ClaimRegistry {
    root: PathBuf,
    repo_root: PathBuf,
    config: Config,
    heartbeats: HeartbeatTracker,
}

impl ClaimRegistry {
    /// Open (but do not create) a registry rooted at `coord_dir`.
    pub fn open(coord_dir: &Path, repo_root: &Path, config: Config) -> Self {
        Self {
            root: coord_dir.to_path_buf(),
            repo_root: repo_root.to_path_buf(),
            config,
            heartbeats: HeartbeatTracker::open(coord_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn heartbeats(&self) -> &HeartbeatTracker {
        &self.heartbeats
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.active_dir())?;
        fs::create_dir_all(self.archive_dir())?;
        fs::create_dir_all(self.heartbeats.dir())?;
        Ok(())
    }

    // -- path helpers -------------------------------------------------------

    fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    fn completed_log_path(&self) -> PathBuf {
        self.root.join(COMPLETED_LOG_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    fn active_dir(&self) -> PathBuf {
        self.root.join(ACTIVE_DIR)
    }

    fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn claim_file(&self, claim_id: &str) -> PathBuf {
        self.active_dir().join(format!("{claim_id}.json"))
    }

    pub fn archived_file(&self, claim_id: &str) -> PathBuf {
        self.archive_dir().join(format!("{claim_id}.json"))
    }

    // -- state access -------------------------------------------------------

    fn lock(&self) -> Result<LockGuard> {
        fs::create_dir_all(&self.root)?;
        if self.config.use_flock_when_available {
            lock::acquire_lock(&self.lock_path())
        } else {
            Ok(LockGuard::disabled(&self.lock_path()))
        }
    }

    fn load_registry(&self) -> Registry {
        persist::read_json_or_default(&self.registry_path(), Registry::new())
    }

    fn save_registry(&self, registry: &Registry) -> Result<()> {
        persist::write_json(&self.registry_path(), registry)
    }

    /// ACTIVE claims, oldest first.
    pub fn list_active(&self) -> Vec<Claim> {
        let mut claims: Vec<Claim> = self.load_registry().into_values().collect();
        claims.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.claim_id.cmp(&b.claim_id))
        });
        claims
    }

    pub fn get(&self, claim_id: &str) -> Result<Claim> {
        agent::validate_claim_id(claim_id)?;
        self.load_registry()
            .remove(claim_id)
            .ok_or_else(|| ClaimError::ClaimNotFound(claim_id.to_string()))
    }

    pub fn completed_log(&self) -> Vec<CompletedLogEntry> {
        persist::read_json_or_default(&self.completed_log_path(), Vec::new())
    }

    /// The ACTIVE claim whose paths contain, equal, or sit under `path`.
    pub fn holder_of(&self, path: &str) -> Result<Option<Claim>> {
        let path = normalize_claim_path(path, &self.repo_root)
            .map_err(|e| ClaimError::InvalidPath(path.to_string(), e.to_string()))?;
        Ok(self
            .list_active()
            .into_iter()
            .find(|c| c.paths.iter().any(|held| paths_overlap(held, &path))))
    }

    // -- claim --------------------------------------------------------------

    pub fn claim(&self, request: ClaimRequest) -> Result<Claim> {
        self.claim_at(request, Utc::now())
    }

    /// [`Self::claim`] with an explicit clock.
    pub fn claim_at(&self, request: ClaimRequest, now: DateTime<Utc>) -> Result<Claim> {
        let intent = request.intent.trim().to_string();
        if intent.is_empty() {
            return Err(ClaimError::MissingIntent);
        }

        let agent_id = match request.agent_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => agent::generated_agent_id(now),
        };
        agent::validate_agent_id(&agent_id)?;

        if request.paths.is_empty() && request.topics.is_empty() {
            return Err(ClaimError::EmptyClaim);
        }
        if request.paths.len() > self.config.max_paths_per_claim {
            return Err(ClaimError::TooManyPaths {
                count: request.paths.len(),
                max: self.config.max_paths_per_claim,
            });
        }

        let topics = normalize_topics(&request.topics)?;
        if !topics.is_empty() && !self.config.allow_topic_claims {
            return Err(ClaimError::TopicClaimsDisabled);
        }

        let mut paths: Vec<String> = Vec::with_capacity(request.paths.len());
        for raw in &request.paths {
            let normalized = normalize_claim_path(raw, &self.repo_root)
                .map_err(|e| ClaimError::InvalidPath(raw.clone(), e.to_string()))?;
            if !paths.contains(&normalized) {
                paths.push(normalized);
            }
        }

        let expires_at = self.config.lease_expiry(now)?;
        self.ensure_dirs()?;
        let _guard = self.lock()?;
        let mut registry = self.load_registry();

        if let Err(conflict) = check_conflicts(&registry, &paths, &topics) {
            tracing::info!(agent_id = %agent_id, "claim rejected: {conflict}");
            return Err(conflict);
        }

        let mut claim_id = agent::generated_claim_id(now);
        while registry.contains_key(&claim_id) || self.archived_file(&claim_id).exists() {
            claim_id = agent::generated_claim_id(now);
        }

        let claim = Claim {
            claim_id: claim_id.clone(),
            agent_id: agent_id.clone(),
            created_at: now,
            expires_at,
            renewed_at: None,
            paths,
            topics,
            intent,
            issue_pr: non_blank(request.issue_pr),
            reason: non_blank(request.reason),
            scope: non_blank(request.scope),
            host: host_name(),
            pid: std::process::id(),
        };

        persist::write_json(&self.claim_file(&claim_id), &claim)?;
        registry.insert(claim_id.clone(), claim.clone());
        if let Err(err) = self.save_registry(&registry) {
            let _ = fs::remove_file(self.claim_file(&claim_id));
            return Err(err);
        }

        self.touch_heartbeat(&agent_id);
        tracing::info!(
            claim_id = %claim.claim_id,
            agent_id = %claim.agent_id,
            paths = ?claim.paths,
            topics = ?claim.topics,
            "claim granted"
        );
        Ok(claim)
    }

    // -- release / renew ----------------------------------------------------

    /// End a claim on behalf of its owner. Unknown ids and foreign owners are
    /// rejected before anything is touched.
    pub fn release(&self, agent_id: &str, claim_id: &str) -> Result<Claim> {
        agent::validate_agent_id(agent_id)?;
        agent::validate_claim_id(claim_id)?;

        let _guard = self.lock()?;
        let mut registry = self.load_registry();
        let claim = owned_claim(&registry, agent_id, claim_id)?;

        self.terminate(
            &mut registry,
            &claim,
            CompletedAction::Released,
            agent_id,
            None,
            Utc::now(),
        )?;
        tracing::info!(claim_id, agent_id, "claim released");
        Ok(claim)
    }

    pub fn renew(&self, agent_id: &str, claim_id: &str) -> Result<Claim> {
        self.renew_at(agent_id, claim_id, Utc::now())
    }

    /// Extend the lease to `now + ttl`. The new expiry is always strictly
    /// later than the old one; `created_at` never changes.
    pub fn renew_at(&self, agent_id: &str, claim_id: &str, now: DateTime<Utc>) -> Result<Claim> {
        agent::validate_agent_id(agent_id)?;
        agent::validate_claim_id(claim_id)?;
        let candidate = self.config.lease_expiry(now)?;

        let _guard = self.lock()?;
        let mut registry = self.load_registry();
        let mut claim = owned_claim(&registry, agent_id, claim_id)?;

        claim.expires_at = if candidate > claim.expires_at {
            candidate
        } else {
            claim.expires_at + Duration::milliseconds(1)
        };
        claim.renewed_at = Some(now);

        persist::write_json(&self.claim_file(claim_id), &claim)?;
        registry.insert(claim_id.to_string(), claim.clone());
        self.save_registry(&registry)?;

        self.touch_heartbeat(agent_id);
        tracing::info!(claim_id, agent_id, expires_at = %claim.expires_at, "claim renewed");
        Ok(claim)
    }

    // -- reaping ------------------------------------------------------------

    /// Force-terminate every claim past `expires_at + stale_grace_minutes`.
    ///
    /// There is no background timer; an external scheduler calls this.
    /// Returns the ids reaped by this call, so a second sweep (or a racing
    /// reaper that loses the lock) returns nothing for the same claims.
    pub fn reap_stale(&self, reaper_id: Option<&str>) -> Result<Vec<String>> {
        self.reap_stale_at(reaper_id, Utc::now())
    }

    pub fn reap_stale_at(&self, reaper_id: Option<&str>, now: DateTime<Utc>) -> Result<Vec<String>> {
        let reaper = match reaper_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => agent::generated_reaper_id(now),
        };
        agent::validate_agent_id(&reaper)?;
        if !self.exists() {
            return Ok(vec![]);
        }

        let grace = self.config.stale_grace()?;
        let _guard = self.lock()?;
        let mut registry = self.load_registry();

        let stale: Vec<Claim> = registry
            .values()
            .filter(|c| c.is_reapable(now, grace))
            .cloned()
            .collect();

        let mut reaped = Vec::with_capacity(stale.len());
        for claim in stale {
            let reason = format!(
                "lease expired at {}; {}m grace period elapsed",
                claim.expires_at.to_rfc3339(),
                grace.num_minutes()
            );
            self.terminate(
                &mut registry,
                &claim,
                CompletedAction::Reaped,
                &reaper,
                Some(reason),
                now,
            )?;
            tracing::info!(
                claim_id = %claim.claim_id,
                agent_id = %claim.agent_id,
                reaper = %reaper,
                "stale claim reaped"
            );
            reaped.push(claim.claim_id);
        }
        Ok(reaped)
    }

    /// Drop the claim from the registry, archive its file, and log it.
    /// Caller holds the lock.
    ///
    /// The registry write is the commit point: if it fails nothing else has
    /// changed. An archive failure after it is logged and left for `validate`.
    fn terminate(
        &self,
        registry: &mut Registry,
        claim: &Claim,
        action: CompletedAction,
        actor: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        registry.remove(&claim.claim_id);
        if let Err(err) = self.save_registry(registry) {
            registry.insert(claim.claim_id.clone(), claim.clone());
            return Err(err);
        }

        if let Err(err) = self.archive(claim) {
            tracing::warn!(claim_id = %claim.claim_id, "claim file not archived: {err}");
        }

        let mut log = self.completed_log();
        log.push(CompletedLogEntry {
            action,
            timestamp: now,
            claim_id: claim.claim_id.clone(),
            actor: actor.to_string(),
            claim_data: claim.clone(),
            reason,
        });
        persist::write_json(&self.completed_log_path(), &log)
    }

    fn archive(&self, claim: &Claim) -> Result<()> {
        fs::create_dir_all(self.archive_dir())?;
        let active = self.claim_file(&claim.claim_id);
        let archived = self.archived_file(&claim.claim_id);
        if active.exists() {
            fs::rename(&active, &archived)?;
        } else {
            persist::write_json(&archived, claim)?;
        }
        Ok(())
    }

    fn touch_heartbeat(&self, agent_id: &str) {
        if let Err(err) = self.heartbeats.touch(agent_id) {
            tracing::warn!(agent_id, "heartbeat refresh failed: {err}");
        }
    }

    // -- read-only reports --------------------------------------------------

    pub fn status(&self) -> Result<StatusReport> {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> Result<StatusReport> {
        let grace = self.config.stale_grace()?;
        let active = self
            .list_active()
            .into_iter()
            .map(|claim| ClaimStatus {
                stale_candidate: claim.is_expired(now),
                reapable: claim.is_reapable(now, grace),
                claim,
            })
            .collect();

        let log = self.completed_log();
        let recent_completed = log
            .iter()
            .rev()
            .take(RECENT_COMPLETED)
            .cloned()
            .collect();

        Ok(StatusReport {
            generated_at: now,
            active,
            recent_completed,
            heartbeats: self.heartbeats.list()?,
        })
    }

    /// Preflight checks. Reads only; nothing is created or repaired.
    pub fn validate(&self) -> ValidationReport {
        let mut checks = Vec::new();
        let dir_exists = self.root.is_dir();

        checks.push(ValidationCheck {
            name: "coordination_dir_exists",
            passed: dir_exists,
            detail: self.root.display().to_string(),
        });

        let writable = fs::metadata(&self.root)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false);
        checks.push(ValidationCheck {
            name: "coordination_dir_writable",
            passed: writable,
            detail: if writable {
                "write permission present".into()
            } else {
                "directory missing or read-only".into()
            },
        });

        checks.push(parse_check::<Config>("config_parses", &self.root.join(CONFIG_FILE)));
        checks.push(parse_check::<Registry>("registry_parses", &self.registry_path()));
        checks.push(parse_check::<Vec<CompletedLogEntry>>(
            "completed_log_parses",
            &self.completed_log_path(),
        ));

        checks.push(self.lock_check());

        checks.push(ValidationCheck {
            name: "atomic_rename",
            passed: true,
            detail: "assumed available (single POSIX filesystem)".into(),
        });

        let missing: Vec<String> = persist::read_json::<Registry>(&self.registry_path())
            .ok()
            .flatten()
            .unwrap_or_default()
            .keys()
            .filter(|id| !self.claim_file(id).exists())
            .cloned()
            .collect();
        checks.push(ValidationCheck {
            name: "claim_files_present",
            passed: missing.is_empty(),
            detail: if missing.is_empty() {
                "every active claim has its claim file".into()
            } else {
                format!("missing claim files: {}", missing.join(", "))
            },
        });

        let orphans = [self.root.clone(), self.active_dir(), self.archive_dir()]
            .iter()
            .filter_map(|dir| fs::read_dir(dir).ok())
            .flatten()
            .filter_map(|e| e.ok())
            .filter(|e| persist::is_temp_file(&e.path()))
            .count();
        checks.push(ValidationCheck {
            name: "orphaned_temp_files",
            passed: true,
            detail: format!("{orphans} orphaned temp file(s); ignored by readers"),
        });

        ValidationReport {
            passed: checks.iter().all(|c| c.passed),
            coordination_dir: self.root.display().to_string(),
            build: crate::build_info::describe(),
            checks,
        }
    }

    fn lock_check(&self) -> ValidationCheck {
        let name = "advisory_lock";
        if !self.config.use_flock_when_available {
            return ValidationCheck {
                name,
                passed: true,
                detail: "disabled by configuration".into(),
            };
        }
        let path = self.lock_path();
        if !path.exists() {
            return ValidationCheck {
                name,
                passed: self.root.is_dir(),
                detail: "lock file not created yet".into(),
            };
        }
        match lock::try_lock(&path) {
            Ok(Some(_guard)) => ValidationCheck {
                name,
                passed: true,
                detail: "lock acquirable".into(),
            },
            Ok(None) => ValidationCheck {
                name,
                passed: true,
                detail: "lock currently held by another process".into(),
            },
            Err(err) => ValidationCheck {
                name,
                passed: false,
                detail: err.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_conflicts(registry: &Registry, paths: &[String], topics: &[String]) -> Result<()> {
    for existing in registry.values() {
        for path in paths {
            if let Some(held) = existing.paths.iter().find(|h| paths_overlap(h, path)) {
                return Err(ClaimError::PathConflict {
                    path: path.clone(),
                    held: held.clone(),
                    claim_id: existing.claim_id.clone(),
                    agent_id: existing.agent_id.clone(),
                });
            }
        }
        if let Some(topic) = topics.iter().find(|t| existing.topics.contains(t)) {
            return Err(ClaimError::TopicConflict {
                topic: topic.clone(),
                claim_id: existing.claim_id.clone(),
                agent_id: existing.agent_id.clone(),
            });
        }
    }
    Ok(())
}

fn owned_claim(registry: &Registry, agent_id: &str, claim_id: &str) -> Result<Claim> {
    let claim = registry
        .get(claim_id)
        .ok_or_else(|| ClaimError::ClaimNotFound(claim_id.to_string()))?;
    if claim.agent_id != agent_id {
        tracing::info!(claim_id, agent_id, owner = %claim.agent_id, "ownership violation");
        return Err(ClaimError::OwnershipViolation {
            claim_id: claim_id.to_string(),
            owner: claim.agent_id.clone(),
            agent_id: agent_id.to_string(),
        });
    }
    Ok(claim.clone())
}

fn normalize_topics(raw: &[String]) -> Result<Vec<String>> {
    let mut topics: Vec<String> = Vec::with_capacity(raw.len());
    for topic in raw {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ClaimError::InvalidTopic);
        }
        if !topics.iter().any(|t| t == topic) {
            topics.push(topic.to_string());
        }
    }
    Ok(topics)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

fn parse_check<T: serde::de::DeserializeOwned>(name: &'static str, path: &Path) -> ValidationCheck {
    match persist::read_json::<T>(path) {
        Ok(Some(_)) => ValidationCheck {
            name,
            passed: true,
            detail: "ok".into(),
        },
        Ok(None) => ValidationCheck {
            name,
            passed: true,
            detail: "absent; defaults in use".into(),
        },
        Err(err) => ValidationCheck {
            name,
            passed: false,
            detail: err.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, ClaimRegistry) {
        setup_with(Config::default())
    }

    fn setup_with(config: Config) -> (tempfile::TempDir, ClaimRegistry) {
        let dir = tempdir().unwrap();
        let coord = dir.path().join(".agents").join("coordination");
        let registry = ClaimRegistry::open(&coord, dir.path(), config);
        (dir, registry)
    }

    fn claim_paths(reg: &ClaimRegistry, agent: &str, paths: &[&str]) -> Result<Claim> {
        reg.claim(
            ClaimRequest::new("edit")
                .agent(agent)
                .paths(paths.iter().copied()),
        )
    }

    #[test]
    fn claim_persists_registry_and_claim_file() {
        let (_dir, reg) = setup();
        let claim = claim_paths(&reg, "agent-a", &["src/module/"]).unwrap();

        assert_eq!(claim.paths, vec!["src/module".to_string()]);
        assert!(reg.claim_file(&claim.claim_id).exists());
        assert_eq!(reg.get(&claim.claim_id).unwrap(), claim);
        assert!(reg.heartbeats().last_seen("agent-a").is_some());
        assert_eq!(claim.pid, std::process::id());
        assert_eq!(claim.expires_at - claim.created_at, Duration::minutes(90));
    }

    #[test]
    fn overlap_conflicts_in_both_directions() {
        let (_dir, reg) = setup();
        let dir_claim = claim_paths(&reg, "agent-a", &["src/module"]).unwrap();
        let err = claim_paths(&reg, "agent-b", &["src/module/file.py"]).unwrap_err();
        match err {
            ClaimError::PathConflict {
                claim_id, agent_id, ..
            } => {
                assert_eq!(claim_id, dir_claim.claim_id);
                assert_eq!(agent_id, "agent-a");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let (_dir2, reg2) = setup();
        claim_paths(&reg2, "agent-a", &["src/module/file.py"]).unwrap();
        assert!(matches!(
            claim_paths(&reg2, "agent-b", &["src/module"]),
            Err(ClaimError::PathConflict { .. })
        ));
        assert!(matches!(
            claim_paths(&reg2, "agent-b", &["./src/module/file.py"]),
            Err(ClaimError::PathConflict { .. })
        ));
    }

    #[test]
    fn same_agent_cannot_double_claim() {
        let (_dir, reg) = setup();
        claim_paths(&reg, "agent-a", &["src/a.rs"]).unwrap();
        assert!(claim_paths(&reg, "agent-a", &["src/a.rs"]).is_err());
    }

    #[test]
    fn sibling_prefixes_do_not_conflict() {
        let (_dir, reg) = setup();
        claim_paths(&reg, "agent-a", &["src/ab.py"]).unwrap();
        claim_paths(&reg, "agent-b", &["src/a.py"]).unwrap();
        assert_eq!(reg.list_active().len(), 2);
    }

    #[test]
    fn rejected_claim_leaves_state_unchanged() {
        let (_dir, reg) = setup();
        claim_paths(&reg, "agent-a", &["src"]).unwrap();
        let before = fs::read_to_string(reg.registry_path()).unwrap();
        assert!(claim_paths(&reg, "agent-b", &["docs/x.md", "src/lib.rs"]).is_err());
        let after = fs::read_to_string(reg.registry_path()).unwrap();
        assert_eq!(before, after);
        assert!(reg.heartbeats().last_seen("agent-b").is_none());
    }

    #[test]
    fn topics_are_exclusive() {
        let (_dir, reg) = setup();
        reg.claim(ClaimRequest::new("schema").agent("a").topics(["db-schema"]))
            .unwrap();
        let err = reg
            .claim(ClaimRequest::new("schema").agent("b").topics([" db-schema "]))
            .unwrap_err();
        assert!(matches!(err, ClaimError::TopicConflict { .. }));
        reg.claim(ClaimRequest::new("api").agent("b").topics(["api"]))
            .unwrap();
    }

    #[test]
    fn topics_can_be_disabled() {
        let (_dir, reg) = setup_with(Config {
            allow_topic_claims: false,
            ..Config::default()
        });
        let err = reg
            .claim(ClaimRequest::new("x").agent("a").topics(["t"]))
            .unwrap_err();
        assert!(matches!(err, ClaimError::TopicClaimsDisabled));
    }

    #[test]
    fn preconditions_are_checked() {
        let (_dir, reg) = setup_with(Config {
            max_paths_per_claim: 2,
            ..Config::default()
        });
        assert!(matches!(
            reg.claim(ClaimRequest::new("x").agent("a")),
            Err(ClaimError::EmptyClaim)
        ));
        assert!(matches!(
            claim_paths(&reg, "a", &["a", "b", "c"]),
            Err(ClaimError::TooManyPaths { count: 3, max: 2 })
        ));
        assert!(matches!(
            reg.claim(ClaimRequest::new("  ").agent("a").paths(["a"])),
            Err(ClaimError::MissingIntent)
        ));
        assert!(matches!(
            claim_paths(&reg, "a", &["../outside"]),
            Err(ClaimError::InvalidPath(_, _))
        ));
        assert!(matches!(
            claim_paths(&reg, "bad/agent", &["a"]),
            Err(ClaimError::InvalidAgentId(_))
        ));
        assert!(!reg.registry_path().exists());
    }

    #[test]
    fn missing_agent_id_is_generated() {
        let (_dir, reg) = setup();
        let claim = reg
            .claim(ClaimRequest::new("x").paths(["README.md"]))
            .unwrap();
        assert!(claim.agent_id.starts_with("agent_"));
    }

    #[test]
    fn release_archives_and_logs() {
        let (_dir, reg) = setup();
        let claim = claim_paths(&reg, "agent-a", &["src"]).unwrap();
        reg.release("agent-a", &claim.claim_id).unwrap();

        assert!(reg.list_active().is_empty());
        assert!(!reg.claim_file(&claim.claim_id).exists());
        assert!(reg.archived_file(&claim.claim_id).exists());
        let log = reg.completed_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, CompletedAction::Released);
        assert_eq!(log[0].actor, "agent-a");
        assert_eq!(log[0].claim_data, claim);
    }

    #[test]
    fn release_commits_even_when_archiving_fails() {
        let (_dir, reg) = setup();
        let claim = claim_paths(&reg, "agent-a", &["src"]).unwrap();
        fs::remove_dir(reg.archive_dir()).unwrap();
        fs::write(reg.archive_dir(), "not a directory").unwrap();

        reg.release("agent-a", &claim.claim_id).unwrap();

        assert!(reg.list_active().is_empty());
        assert_eq!(reg.completed_log().len(), 1);
        assert!(reg.claim_file(&claim.claim_id).exists());
    }

    #[test]
    fn oversized_ttl_is_a_config_error() {
        let (_dir, reg) = setup_with(Config {
            lock_ttl_minutes: 10_000_000_000_000,
            ..Config::default()
        });
        let err = claim_paths(&reg, "agent-a", &["src"]).unwrap_err();
        assert!(matches!(err, ClaimError::InvalidConfig(_)));
        assert_eq!(err.code(), "invalid_config");
        assert!(reg.list_active().is_empty());
    }

    #[test]
    fn release_and_renew_enforce_ownership() {
        let (_dir, reg) = setup();
        let claim = claim_paths(&reg, "agent-a", &["src"]).unwrap();

        assert!(matches!(
            reg.release("agent-b", &claim.claim_id),
            Err(ClaimError::OwnershipViolation { .. })
        ));
        assert!(matches!(
            reg.renew("agent-b", &claim.claim_id),
            Err(ClaimError::OwnershipViolation { .. })
        ));
        assert_eq!(reg.get(&claim.claim_id).unwrap(), claim);
        assert!(reg.completed_log().is_empty());
    }

    #[test]
    fn release_unknown_claim_is_not_found() {
        let (_dir, reg) = setup();
        assert!(matches!(
            reg.release("agent-a", "claim_nope"),
            Err(ClaimError::ClaimNotFound(_))
        ));
        assert!(matches!(
            reg.release("agent-a", "../x"),
            Err(ClaimError::InvalidClaimId(_))
        ));
    }

    #[test]
    fn renew_extends_but_keeps_created_at() {
        let (_dir, reg) = setup();
        let t0 = Utc::now();
        let claim = reg
            .claim_at(ClaimRequest::new("x").agent("a").paths(["src"]), t0)
            .unwrap();
        let renewed = reg
            .renew_at("a", &claim.claim_id, t0 + Duration::minutes(30))
            .unwrap();
        assert!(renewed.expires_at > claim.expires_at);
        assert_eq!(renewed.created_at, claim.created_at);
        assert_eq!(renewed.renewed_at, Some(t0 + Duration::minutes(30)));

        let same_instant = reg
            .renew_at("a", &claim.claim_id, t0 + Duration::minutes(30))
            .unwrap();
        assert!(same_instant.expires_at > renewed.expires_at);
        assert_eq!(reg.get(&claim.claim_id).unwrap(), same_instant);
    }

    #[test]
    fn reap_respects_grace_and_is_idempotent() {
        let (_dir, reg) = setup_with(Config {
            lock_ttl_minutes: 10,
            stale_grace_minutes: 5,
            ..Config::default()
        });
        let t0 = Utc::now();
        let claim = reg
            .claim_at(ClaimRequest::new("x").agent("a").paths(["src"]), t0)
            .unwrap();

        let at_boundary = t0 + Duration::minutes(15);
        assert!(reg.reap_stale_at(Some("reaper"), at_boundary).unwrap().is_empty());

        let status = reg.status_at(at_boundary).unwrap();
        assert!(status.active[0].stale_candidate);
        assert!(!status.active[0].reapable);

        let later = at_boundary + Duration::seconds(1);
        assert_eq!(
            reg.reap_stale_at(Some("reaper"), later).unwrap(),
            vec![claim.claim_id.clone()]
        );
        assert!(reg.reap_stale_at(Some("reaper"), later).unwrap().is_empty());

        let log = reg.completed_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, CompletedAction::Reaped);
        assert_eq!(log[0].actor, "reaper");
        assert!(log[0].reason.as_deref().is_some_and(|r| !r.is_empty()));
        assert!(reg.archived_file(&claim.claim_id).exists());
    }

    #[test]
    fn expiry_alone_never_removes_a_claim() {
        let (_dir, reg) = setup_with(Config {
            lock_ttl_minutes: 0,
            ..Config::default()
        });
        let t0 = Utc::now() - Duration::hours(5);
        reg.claim_at(ClaimRequest::new("x").agent("a").paths(["src"]), t0)
            .unwrap();
        assert_eq!(reg.list_active().len(), 1);
        assert!(claim_paths(&reg, "b", &["src/x"]).is_err());
    }

    #[test]
    fn corrupt_registry_degrades_to_empty() {
        let (_dir, reg) = setup();
        reg.ensure_dirs().unwrap();
        fs::write(reg.registry_path(), "{ definitely not json").unwrap();
        assert!(reg.list_active().is_empty());
        claim_paths(&reg, "a", &["src"]).unwrap();
        assert_eq!(reg.list_active().len(), 1);
    }

    #[test]
    fn holder_of_finds_covering_claim() {
        let (_dir, reg) = setup();
        let claim = claim_paths(&reg, "a", &["src/module"]).unwrap();
        assert_eq!(
            reg.holder_of("src/module/x.py").unwrap().map(|c| c.claim_id),
            Some(claim.claim_id)
        );
        assert!(reg.holder_of("src/other.py").unwrap().is_none());
    }

    #[test]
    fn validate_reports_without_mutating() {
        let (_dir, reg) = setup();
        let report = reg.validate();
        assert!(!report.passed);
        assert!(!reg.root().exists());

        claim_paths(&reg, "a", &["src"]).unwrap();
        let report = reg.validate();
        assert!(report.passed, "{report:?}");
        assert!(report.checks.iter().any(|c| c.name == "atomic_rename"));
    }

    #[test]
    fn validate_flags_corrupt_registry() {
        let (_dir, reg) = setup();
        reg.ensure_dirs().unwrap();
        fs::write(reg.registry_path(), "[oops").unwrap();
        let report = reg.validate();
        let check = report
            .checks
            .iter()
            .find(|c| c.name == "registry_parses")
            .unwrap();
        assert!(!check.passed);
        assert!(!report.passed);
    }

    #[test]
    fn works_without_flock() {
        let (_dir, reg) = setup_with(Config {
            use_flock_when_available: false,
            ..Config::default()
        });
        let claim = claim_paths(&reg, "a", &["src"]).unwrap();
        reg.release("a", &claim.claim_id).unwrap();
        assert!(!reg.lock_path().exists());
    }
}
