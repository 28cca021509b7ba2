use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lease over paths and/or topics held by one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub claim_id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_pr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub host: String,
    pub pid: u32,
}

impl Claim {
    /// Past `expires_at` but not necessarily reapable yet.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Strictly past `expires_at + grace`.
    pub fn is_reapable(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        self.expires_at
            .checked_add_signed(grace)
            .is_some_and(|deadline| now > deadline)
    }
}

/// Input to [`crate::store::claims::ClaimRegistry::claim`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimRequest {
    pub agent_id: Option<String>,
    pub paths: Vec<String>,
    pub topics: Vec<String>,
    pub intent: String,
    pub issue_pr: Option<String>,
    pub reason: Option<String>,
    pub scope: Option<String>,
}

impl ClaimRequest {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            ..Self::default()
        }
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletedAction {
    Released,
    Reaped,
}

impl std::fmt::Display for CompletedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Released => write!(f, "released"),
            Self::Reaped => write!(f, "reaped"),
        }
    }
}

/// One terminated claim in `completed_work_log.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedLogEntry {
    pub action: CompletedAction,
    pub timestamp: DateTime<Utc>,
    pub claim_id: String,
    pub actor: String,
    pub claim_data: Claim,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(now: DateTime<Utc>) -> Claim {
        Claim {
            claim_id: "claim_1".into(),
            agent_id: "agent-a".into(),
            created_at: now,
            expires_at: now + Duration::minutes(10),
            renewed_at: None,
            paths: vec!["src/module".into()],
            topics: vec![],
            intent: "refactor".into(),
            issue_pr: None,
            reason: None,
            scope: None,
            host: "host".into(),
            pid: 1,
        }
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = serde_json::to_string(&sample(Utc::now())).unwrap();
        assert!(!json.contains("renewed_at"));
        assert!(!json.contains("issue_pr"));
    }

    #[test]
    fn expiry_and_reapability() {
        let now = Utc::now();
        let claim = sample(now);
        let grace = Duration::minutes(5);

        assert!(!claim.is_expired(now));
        assert!(claim.is_expired(now + Duration::minutes(11)));
        assert!(!claim.is_reapable(now + Duration::minutes(15), grace));
        assert!(claim.is_reapable(now + Duration::minutes(15) + Duration::seconds(1), grace));
    }

    #[test]
    fn completed_action_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&CompletedAction::Reaped).unwrap(),
            "\"reaped\""
        );
    }
}
