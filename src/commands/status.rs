use colored::Colorize;

use crate::commands::Workspace;
use crate::error::{ClaimError, Result};
use crate::output::{self, Format};

pub fn status(ws: &Workspace, format: Format) -> Result<()> {
    let report = ws.registry().status()?;
    match format {
        Format::Json => output::print_json(&report)?,
        Format::Pretty => {
            if report.active.is_empty() {
                println!("{}", "No active claims.".dimmed());
            }
            for entry in &report.active {
                let flag = if entry.reapable {
                    " reapable".red().bold().to_string()
                } else if entry.stale_candidate {
                    " stale".yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "{} {}{}",
                    format!("[{}]", entry.claim.claim_id).cyan().bold(),
                    entry.claim.agent_id,
                    flag
                );
                println!("  {} {}", "intent:".dimmed(), entry.claim.intent);
                let held: Vec<String> = entry
                    .claim
                    .paths
                    .iter()
                    .cloned()
                    .chain(entry.claim.topics.iter().map(|t| format!("#{t}")))
                    .collect();
                println!("  {} {}", "holds:".dimmed(), held.join(", "));
                println!(
                    "  {} {}",
                    "expires:".dimmed(),
                    output::timestamp(entry.claim.expires_at)
                );
            }
            if !report.recent_completed.is_empty() {
                println!();
                println!("{}", "Recently completed".bold());
                for done in &report.recent_completed {
                    println!(
                        "  {} {} {} by {}",
                        output::timestamp(done.timestamp).dimmed(),
                        done.action,
                        done.claim_id,
                        done.actor
                    );
                }
            }
            if !report.heartbeats.is_empty() {
                println!();
                println!("{}", "Heartbeats".bold());
                for beat in &report.heartbeats {
                    println!(
                        "  {} {}",
                        beat.agent_id,
                        output::timestamp(beat.last_seen).dimmed()
                    );
                }
            }
        }
        Format::Minimal => {
            println!("{:32} {:24} {:8} PATHS", "CLAIM", "AGENT", "STATE");
            println!("{}", "-".repeat(80));
            for entry in &report.active {
                let state = if entry.reapable {
                    "reapable"
                } else if entry.stale_candidate {
                    "stale"
                } else {
                    "active"
                };
                println!(
                    "{:32} {:24} {:8} {}",
                    output::truncate(&entry.claim.claim_id, 32),
                    output::truncate(&entry.claim.agent_id, 24),
                    state,
                    entry.claim.paths.join(",")
                );
            }
        }
    }
    Ok(())
}

/// Prints the report, then fails when any check failed.
pub fn validate(ws: &Workspace, format: Format) -> Result<()> {
    let report = ws.registry().validate();
    match format {
        Format::Json => output::print_json(&report)?,
        Format::Pretty | Format::Minimal => {
            for check in &report.checks {
                let mark = if check.passed {
                    format!("{:5}", "ok").green()
                } else {
                    format!("{:5}", "FAIL").red().bold()
                };
                println!("{} {:28} {}", mark, check.name, check.detail.dimmed());
            }
            if format == Format::Pretty {
                println!("{} {}", "build:".dimmed(), report.build);
            }
        }
    }
    let failed = report.checks.iter().filter(|c| !c.passed).count();
    if failed > 0 {
        return Err(ClaimError::ValidationFailed(failed));
    }
    Ok(())
}
