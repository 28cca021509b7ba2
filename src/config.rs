use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClaimError, Result};
use crate::store::persist;

pub const CONFIG_FILE: &str = "config.json";

/// Registry policy, read from `config.json` in the coordination directory.
///
/// Missing fields take their defaults, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lock_ttl_minutes: i64,
    pub stale_grace_minutes: i64,
    pub max_paths_per_claim: usize,
    pub allow_topic_claims: bool,
    /// When false, file mutations are refused on paths another agent holds.
    pub advisory_only: bool,
    pub use_flock_when_available: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_ttl_minutes: 90,
            stale_grace_minutes: 30,
            max_paths_per_claim: 25,
            allow_topic_claims: true,
            advisory_only: false,
            use_flock_when_available: true,
        }
    }
}

impl Config {
    /// Load from `<coord_dir>/config.json`; a missing or corrupt file yields defaults.
    pub fn load(coord_dir: &Path) -> Self {
        persist::read_json_or_default(&coord_dir.join(CONFIG_FILE), Self::default())
    }

    pub fn save(&self, coord_dir: &Path) -> Result<()> {
        persist::write_json(&coord_dir.join(CONFIG_FILE), self)
    }

    pub fn lease_ttl(&self) -> Result<Duration> {
        minutes("lock_ttl_minutes", self.lock_ttl_minutes)
    }

    pub fn stale_grace(&self) -> Result<Duration> {
        minutes("stale_grace_minutes", self.stale_grace_minutes)
    }

    /// `from + lease_ttl`, or an error when that is past chrono's range.
    pub fn lease_expiry(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        from.checked_add_signed(self.lease_ttl()?).ok_or_else(|| {
            ClaimError::InvalidConfig(format!(
                "lock_ttl_minutes={} puts the expiry out of range",
                self.lock_ttl_minutes
            ))
        })
    }
}

fn minutes(field: &str, value: i64) -> Result<Duration> {
    Duration::try_minutes(value.max(0))
        .ok_or_else(|| ClaimError::InvalidConfig(format!("{field}={value} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.lock_ttl_minutes, 90);
        assert_eq!(c.stale_grace_minutes, 30);
        assert_eq!(c.max_paths_per_claim, 25);
        assert!(c.allow_topic_claims);
        assert!(!c.advisory_only);
        assert!(c.use_flock_when_available);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"lock_ttl_minutes": 5, "allow_topic_claims": false}"#,
        )
        .unwrap();
        let c = Config::load(dir.path());
        assert_eq!(c.lock_ttl_minutes, 5);
        assert!(!c.allow_topic_claims);
        assert_eq!(c.stale_grace_minutes, 30);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "lock_ttl_minutes = 5").unwrap();
        assert_eq!(Config::load(dir.path()), Config::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempdir().unwrap();
        let c = Config {
            max_paths_per_claim: 3,
            ..Config::default()
        };
        c.save(dir.path()).unwrap();
        assert_eq!(Config::load(dir.path()), c);
    }

    #[test]
    fn negative_durations_clamp_to_zero() {
        let c = Config {
            lock_ttl_minutes: -5,
            ..Config::default()
        };
        assert_eq!(c.lease_ttl().unwrap(), Duration::zero());
    }

    #[test]
    fn oversized_durations_are_config_errors() {
        let c = Config {
            lock_ttl_minutes: i64::MAX,
            stale_grace_minutes: i64::MAX,
            ..Config::default()
        };
        assert!(matches!(c.lease_ttl(), Err(ClaimError::InvalidConfig(_))));
        assert!(matches!(c.stale_grace(), Err(ClaimError::InvalidConfig(_))));

        let c = Config {
            lock_ttl_minutes: 10_000_000_000_000,
            ..Config::default()
        };
        assert!(c.lease_ttl().is_ok());
        assert!(matches!(
            c.lease_expiry(Utc::now()),
            Err(ClaimError::InvalidConfig(_))
        ));
    }
}
