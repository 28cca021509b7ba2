use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::lock;

pub const AUDIT_FILE: &str = "audit_log.jsonl";
const AUDIT_LOCK: &str = "audit.lock";
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMethod {
    Create,
    Write,
    Patch,
    Delete,
}

impl std::fmt::Display for AuditMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Write => write!(f, "write"),
            Self::Patch => write!(f, "patch"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub method: AuditMethod,
    pub path: String,
    /// Token the caller presented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha_after: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Everything but the id and timestamp, which [`AuditTrail::record`] assigns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub actor: String,
    pub method: AuditMethod,
    pub path: String,
    pub base_etag: Option<String>,
    pub new_etag: Option<String>,
    pub sha_before: Option<String>,
    pub sha_after: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub path: Option<String>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    /// Id of the last entry on the previous page.
    pub cursor: Option<String>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            path: None,
            actor: None,
            since: None,
            until: None,
            limit: DEFAULT_PAGE_SIZE,
            cursor: None,
        }
    }
}

impl AuditQuery {
    fn accepts(&self, entry: &AuditEntry, path: Option<&str>) -> bool {
        path.is_none_or(|p| entry.path == p)
            && self.actor.as_ref().is_none_or(|a| &entry.actor == a)
            && self.since.is_none_or(|t| entry.timestamp >= t)
            && self.until.is_none_or(|t| entry.timestamp <= t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    /// Present when more entries follow this page.
    pub next_cursor: Option<String>,
}

/// Append-only JSONL log of file mutations. Queries scan the whole file.
pub struct AuditTrail {
    root: PathBuf,
}

impl AuditTrail {
    pub fn open(coord_dir: &Path) -> Self {
        Self {
            root: coord_dir.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(AUDIT_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(AUDIT_LOCK)
    }

    pub fn record(&self, new: NewAuditEntry) -> Result<String> {
        self.record_at(new, Utc::now())
    }

    pub fn record_at(&self, new: NewAuditEntry, timestamp: DateTime<Utc>) -> Result<String> {
        fs::create_dir_all(&self.root)?;
        let entry = AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            actor: new.actor,
            method: new.method,
            path: new.path,
            base_etag: new.base_etag,
            new_etag: new.new_etag,
            sha_before: new.sha_before,
            sha_after: new.sha_after,
            message: new.message,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = lock::acquire_lock(&self.lock_path())?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        tracing::debug!(id = %entry.id, method = %entry.method, path = %entry.path, "audit entry recorded");
        Ok(entry.id)
    }

    /// Newest first, filtered, one page at a time.
    pub fn query(&self, query: &AuditQuery) -> Result<AuditPage> {
        let path = query.path.as_deref().map(normalize_path_filter);
        let mut entries: Vec<AuditEntry> = self
            .read_all()?
            .into_iter()
            .filter(|e| query.accepts(e, path.as_deref()))
            .collect();
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });

        let start = match &query.cursor {
            Some(cursor) => entries
                .iter()
                .position(|e| &e.id == cursor)
                .map_or(entries.len(), |i| i + 1),
            None => 0,
        };
        let limit = query.limit.max(1);
        let rest = entries.split_off(start.min(entries.len()));
        let has_more = rest.len() > limit;
        let page: Vec<AuditEntry> = rest.into_iter().take(limit).collect();
        let next_cursor = if has_more {
            page.last().map(|e| e.id.clone())
        } else {
            None
        };

        Ok(AuditPage {
            entries: page,
            next_cursor,
        })
    }

    /// Lines that are torn or not UTF-8 are skipped with a warning.
    fn read_all(&self) -> Result<Vec<AuditEntry>> {
        let bytes = match fs::read(self.log_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(err.into()),
        };
        let mut entries = Vec::new();
        for (n, line) in bytes.split(|b| *b == b'\n').enumerate() {
            if line.trim_ascii().is_empty() {
                continue;
            }
            match serde_json::from_slice::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(line = n + 1, "skipping unparseable audit entry: {err}");
                }
            }
        }
        Ok(entries)
    }
}

/// Spell a path filter the way recorded paths are spelled.
fn normalize_path_filter(path: &str) -> String {
    path.trim()
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn entry(actor: &str, path: &str, method: AuditMethod) -> NewAuditEntry {
        NewAuditEntry {
            actor: actor.into(),
            method,
            path: path.into(),
            base_etag: None,
            new_etag: None,
            sha_before: None,
            sha_after: Some("abc".into()),
            message: String::new(),
        }
    }

    fn seeded() -> (tempfile::TempDir, AuditTrail, DateTime<Utc>) {
        let dir = tempdir().unwrap();
        let trail = AuditTrail::open(dir.path());
        let t0 = Utc::now();
        for i in 0..5 {
            let actor = if i % 2 == 0 { "agent-a" } else { "agent-b" };
            trail
                .record_at(
                    entry(actor, &format!("src/f{i}.rs"), AuditMethod::Write),
                    t0 + Duration::seconds(i),
                )
                .unwrap();
        }
        (dir, trail, t0)
    }

    #[test]
    fn empty_log_yields_empty_page() {
        let dir = tempdir().unwrap();
        let page = AuditTrail::open(dir.path())
            .query(&AuditQuery::default())
            .unwrap();
        assert!(page.entries.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn entries_come_back_newest_first() {
        let (_dir, trail, _) = seeded();
        let page = trail.query(&AuditQuery::default()).unwrap();
        let paths: Vec<&str> = page.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["src/f4.rs", "src/f3.rs", "src/f2.rs", "src/f1.rs", "src/f0.rs"]);
    }

    #[test]
    fn filters_by_actor_path_and_time() {
        let (_dir, trail, t0) = seeded();

        let by_actor = trail
            .query(&AuditQuery {
                actor: Some("agent-b".into()),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(by_actor.entries.len(), 2);

        let by_path = trail
            .query(&AuditQuery {
                path: Some("src/f2.rs".into()),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(by_path.entries.len(), 1);

        let window = trail
            .query(&AuditQuery {
                since: Some(t0 + Duration::seconds(1)),
                until: Some(t0 + Duration::seconds(3)),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(window.entries.len(), 3);
    }

    #[test]
    fn pagination_walks_every_entry_once() {
        let (_dir, trail, _) = seeded();
        let mut query = AuditQuery {
            limit: 2,
            ..AuditQuery::default()
        };
        let mut seen = Vec::new();
        loop {
            let page = trail.query(&query).unwrap();
            seen.extend(page.entries.iter().map(|e| e.path.clone()));
            match page.next_cursor {
                Some(cursor) => query.cursor = Some(cursor),
                None => break,
            }
        }
        assert_eq!(seen.len(), 5);
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn unknown_cursor_yields_empty_page() {
        let (_dir, trail, _) = seeded();
        let page = trail
            .query(&AuditQuery {
                cursor: Some("nope".into()),
                ..AuditQuery::default()
            })
            .unwrap();
        assert!(page.entries.is_empty());
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let (_dir, trail, _) = seeded();
        let mut file = OpenOptions::new()
            .append(true)
            .open(trail.log_path())
            .unwrap();
        writeln!(file, "{{ torn write").unwrap();
        trail
            .record(entry("agent-c", "README.md", AuditMethod::Delete))
            .unwrap();

        let page = trail.query(&AuditQuery::default()).unwrap();
        assert_eq!(page.entries.len(), 6);
        assert_eq!(page.entries[0].method, AuditMethod::Delete);
    }

    #[test]
    fn torn_multibyte_tail_is_skipped() {
        let (_dir, trail, _) = seeded();
        let mut file = OpenOptions::new()
            .append(true)
            .open(trail.log_path())
            .unwrap();
        file.write_all(b"{\"id\":\"\xE2\x82").unwrap();
        drop(file);

        let page = trail.query(&AuditQuery::default()).unwrap();
        assert_eq!(page.entries.len(), 5);
    }

    #[test]
    fn path_filter_matches_equivalent_spellings() {
        let (_dir, trail, _) = seeded();
        for spelling in ["./src/f2.rs", "src//f2.rs", " src\\f2.rs "] {
            let page = trail
                .query(&AuditQuery {
                    path: Some(spelling.into()),
                    ..AuditQuery::default()
                })
                .unwrap();
            assert_eq!(page.entries.len(), 1, "{spelling}");
        }
    }
}
