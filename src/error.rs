use thiserror::Error;

use crate::patch::{FileType, PatchError};

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error(
        "path conflict: '{path}' overlaps '{held}' held by claim {claim_id} (agent '{agent_id}')"
    )]
    PathConflict {
        path: String,
        held: String,
        claim_id: String,
        agent_id: String,
    },

    #[error("topic conflict: '{topic}' is held by claim {claim_id} (agent '{agent_id}')")]
    TopicConflict {
        topic: String,
        claim_id: String,
        agent_id: String,
    },

    #[error("version mismatch on '{path}': expected {expected}, current sha is {current}")]
    VersionMismatch {
        path: String,
        expected: String,
        current: String,
    },

    #[error("file '{0}' already exists; pass its current version token to overwrite it")]
    FileExists(String),

    #[error("claim {claim_id} is owned by '{owner}', not '{agent_id}'")]
    OwnershipViolation {
        claim_id: String,
        owner: String,
        agent_id: String,
    },

    #[error("claim {0} not found")]
    ClaimNotFound(String),

    #[error("file '{0}' not found")]
    FileNotFound(String),

    #[error("invalid path '{0}': {1}")]
    InvalidPath(String, String),

    #[error("invalid agent id '{0}': must be non-empty ASCII alphanumeric/hyphen/underscore")]
    InvalidAgentId(String),

    #[error("invalid claim id '{0}'")]
    InvalidClaimId(String),

    #[error("too many paths: {count} exceeds max_paths_per_claim={max}")]
    TooManyPaths { count: usize, max: usize },

    #[error("topic claims are disabled by configuration")]
    TopicClaimsDisabled,

    #[error("topics must be non-empty strings")]
    InvalidTopic,

    #[error("a claim must name at least one path or topic")]
    EmptyClaim,

    #[error("a claim must state its intent")]
    MissingIntent,

    #[error("no agent id: pass --agent or set CLAIMGUARD_AGENT")]
    MissingAgent,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("file '{0}' is not valid UTF-8")]
    BinaryFile(String),

    #[error("{0} preflight check(s) failed")]
    ValidationFailed(usize),

    #[error("patch rejected: {0}")]
    Patch(#[from] PatchError),

    #[error("{kind} patches are not supported for {file_type} files")]
    UnsupportedPatch {
        kind: &'static str,
        file_type: FileType,
    },

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClaimError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathConflict { .. } => "path_conflict",
            Self::TopicConflict { .. } => "topic_conflict",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::FileExists(_) => "file_exists",
            Self::OwnershipViolation { .. } => "ownership_violation",
            Self::ClaimNotFound(_) => "claim_not_found",
            Self::FileNotFound(_) => "file_not_found",
            Self::InvalidPath(_, _) => "invalid_path",
            Self::InvalidAgentId(_) => "invalid_agent_id",
            Self::InvalidClaimId(_) => "invalid_claim_id",
            Self::TooManyPaths { .. } => "too_many_paths",
            Self::TopicClaimsDisabled => "topic_claims_disabled",
            Self::InvalidTopic => "invalid_topic",
            Self::EmptyClaim => "empty_claim",
            Self::MissingIntent => "missing_intent",
            Self::MissingAgent => "missing_agent",
            Self::InvalidConfig(_) => "invalid_config",
            Self::BinaryFile(_) => "binary_file",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Patch(_) => "invalid_patch",
            Self::UnsupportedPatch { .. } => "unsupported_patch",
            Self::Locked(_) => "locked",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }

    /// Coarse class an orchestration layer can branch on: retry elsewhere,
    /// escalate, or fix the request.
    pub fn category(&self) -> &'static str {
        match self {
            Self::PathConflict { .. }
            | Self::TopicConflict { .. }
            | Self::VersionMismatch { .. }
            | Self::FileExists(_)
            | Self::ValidationFailed(_) => "precondition_not_met",
            Self::OwnershipViolation { .. } => "ownership_violation",
            Self::ClaimNotFound(_) | Self::FileNotFound(_) => "not_found",
            Self::InvalidPath(_, _)
            | Self::InvalidAgentId(_)
            | Self::InvalidClaimId(_)
            | Self::TooManyPaths { .. }
            | Self::TopicClaimsDisabled
            | Self::InvalidTopic
            | Self::EmptyClaim
            | Self::MissingIntent
            | Self::MissingAgent
            | Self::InvalidConfig(_)
            | Self::BinaryFile(_)
            | Self::Patch(_)
            | Self::UnsupportedPatch { .. } => "validation_error",
            Self::Locked(_) => "contention",
            Self::Io(_) | Self::Json(_) => "io_failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_the_holder() {
        let err = ClaimError::PathConflict {
            path: "src/module/file.py".into(),
            held: "src/module".into(),
            claim_id: "claim_x".into(),
            agent_id: "agent-a".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("claim_x"));
        assert!(msg.contains("agent-a"));
        assert_eq!(err.code(), "path_conflict");
        assert_eq!(err.category(), "precondition_not_met");
    }

    #[test]
    fn ownership_and_lookup_categories() {
        let err = ClaimError::OwnershipViolation {
            claim_id: "c".into(),
            owner: "a".into(),
            agent_id: "b".into(),
        };
        assert_eq!(err.category(), "ownership_violation");
        assert_eq!(ClaimError::ClaimNotFound("c".into()).category(), "not_found");
        assert_eq!(ClaimError::EmptyClaim.category(), "validation_error");
    }
}
