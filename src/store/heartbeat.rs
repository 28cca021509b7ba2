use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::agent;
use crate::error::Result;

const EXTENSION: &str = "heartbeat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub agent_id: String,
    pub last_seen: DateTime<Utc>,
}

/// Per-agent liveness markers under `heartbeats/`; the file mtime is the signal.
pub struct HeartbeatTracker {
    dir: PathBuf,
}

impl HeartbeatTracker {
    pub fn open(coord_dir: &Path) -> Self {
        Self {
            dir: coord_dir.join("heartbeats"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{agent_id}.{EXTENSION}"))
    }

    /// Refresh the agent's marker. The body is informational; readers use mtime.
    pub fn touch(&self, agent_id: &str) -> Result<()> {
        agent::validate_agent_id(agent_id)?;
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path_for(agent_id))?;
        writeln!(file, "{} pid={}", Utc::now().to_rfc3339(), std::process::id())?;
        Ok(())
    }

    pub fn last_seen(&self, agent_id: &str) -> Option<DateTime<Utc>> {
        let modified = fs::metadata(self.path_for(agent_id)).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    /// Every marker, most recent first.
    pub fn list(&self) -> Result<Vec<Heartbeat>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut beats = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(agent_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(last_seen) = self.last_seen(agent_id) {
                beats.push(Heartbeat {
                    agent_id: agent_id.to_string(),
                    last_seen,
                });
            }
        }
        beats.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(beats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn touch_creates_and_lists() {
        let dir = tempdir().unwrap();
        let hb = HeartbeatTracker::open(dir.path());
        assert!(hb.list().unwrap().is_empty());

        hb.touch("agent-a").unwrap();
        hb.touch("agent-b").unwrap();

        let names: Vec<String> = hb.list().unwrap().into_iter().map(|h| h.agent_id).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"agent-a".to_string()));
        assert!(hb.last_seen("agent-a").is_some());
        assert!(hb.last_seen("agent-z").is_none());
    }

    #[test]
    fn touch_rejects_unsafe_ids() {
        let dir = tempdir().unwrap();
        let hb = HeartbeatTracker::open(dir.path());
        assert!(hb.touch("../evil").is_err());
    }
}
