use chrono::{DateTime, Utc};

use crate::error::{ClaimError, Result};

pub const AGENT_ENV: &str = "CLAIMGUARD_AGENT";

/// Resolve the agent identity from the environment.
///
/// Checks `CLAIMGUARD_AGENT`. Returns `None` if unset or blank so callers can
/// decide whether to generate one.
pub fn resolve_agent() -> Option<String> {
    std::env::var(AGENT_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `agent_<UTC timestamp>_<4 hex>`, used when a claimant does not name itself.
pub fn generated_agent_id(now: DateTime<Utc>) -> String {
    format!("agent_{}_{}", compact_timestamp(now), random_hex(2))
}

/// `claim_<UTC timestamp>_<8 hex>`.
pub fn generated_claim_id(now: DateTime<Utc>) -> String {
    format!("claim_{}_{}", compact_timestamp(now), random_hex(4))
}

/// Default reaper identity for sweeps that are not attributed to an agent.
pub fn generated_reaper_id(now: DateTime<Utc>) -> String {
    format!("reaper_{}_{}", compact_timestamp(now), random_hex(2))
}

/// Agent and claim ids end up in file names, so they are restricted to
/// ASCII alphanumerics, `-`, and `_`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn validate_agent_id(agent_id: &str) -> Result<()> {
    if is_valid_id(agent_id) {
        Ok(())
    } else {
        Err(ClaimError::InvalidAgentId(agent_id.to_string()))
    }
}

pub fn validate_claim_id(claim_id: &str) -> Result<()> {
    if is_valid_id(claim_id) {
        Ok(())
    } else {
        Err(ClaimError::InvalidClaimId(claim_id.to_string()))
    }
}

fn compact_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0_u8; bytes];
    if getrandom::fill(&mut buf).is_err() {
        // Entropy failure only costs uniqueness of a suffix; fall back to uuid.
        let token = uuid::Uuid::new_v4().simple().to_string();
        return token[..bytes * 2].to_string();
    }
    hex::encode(buf)
}
