use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::model::Claim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn print_claim(claim: &Claim, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(claim)?,
        Format::Pretty => {
            println!(
                "{} {}",
                format!("[{}]", claim.claim_id).cyan().bold(),
                claim.agent_id
            );
            println!("  {} {}", "intent:".dimmed(), claim.intent);
            if !claim.paths.is_empty() {
                println!("  {} {}", "paths:".dimmed(), claim.paths.join(", "));
            }
            if !claim.topics.is_empty() {
                println!("  {} {}", "topics:".dimmed(), claim.topics.join(", "));
            }
            println!("  {} {}", "expires:".dimmed(), timestamp(claim.expires_at));
            if let Some(renewed) = claim.renewed_at {
                println!("  {} {}", "renewed:".dimmed(), timestamp(renewed));
            }
            if let Some(ref issue) = claim.issue_pr {
                println!("  {} {}", "issue/pr:".dimmed(), issue);
            }
            if let Some(ref scope) = claim.scope {
                println!("  {} {}", "scope:".dimmed(), scope);
            }
        }
        Format::Minimal => println!("{}", claim.claim_id),
    }
    Ok(())
}

pub fn timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%SZ").to_string()
}

/// Shorten long tokens for tabular output.
pub fn truncate(value: &str, max_len: usize) -> String {
    if value.chars().count() > max_len {
        let truncated: String = value.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_values() {
        assert_eq!(truncate("abc", 8), "abc");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
