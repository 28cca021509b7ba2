use colored::Colorize;

use crate::commands::{Workspace, require_agent};
use crate::error::Result;
use crate::model::ClaimRequest;
use crate::output::{self, Format};

pub struct ClaimArgs {
    pub agent: Option<String>,
    pub paths: Vec<String>,
    pub topics: Vec<String>,
    pub intent: String,
    pub issue_pr: Option<String>,
    pub reason: Option<String>,
    pub scope: Option<String>,
}

pub fn claim(ws: &Workspace, args: ClaimArgs, format: Format) -> Result<()> {
    let request = ClaimRequest {
        agent_id: args.agent.or_else(crate::agent::resolve_agent),
        paths: args.paths,
        topics: args.topics,
        intent: args.intent,
        issue_pr: args.issue_pr,
        reason: args.reason,
        scope: args.scope,
    };
    let claim = ws.registry().claim(request)?;
    if format == Format::Pretty {
        println!("{}", "Claim granted".green().bold());
    }
    output::print_claim(&claim, format)
}

pub fn release(ws: &Workspace, agent: Option<String>, claim_id: &str, format: Format) -> Result<()> {
    let agent = require_agent(agent)?;
    let claim = ws.registry().release(&agent, claim_id)?;
    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({"released": claim.claim_id, "agent_id": claim.agent_id})
        ),
        Format::Pretty => println!("Released {}", claim.claim_id.cyan()),
        Format::Minimal => println!("{}", claim.claim_id),
    }
    Ok(())
}

pub fn renew(ws: &Workspace, agent: Option<String>, claim_id: &str, format: Format) -> Result<()> {
    let agent = require_agent(agent)?;
    let claim = ws.registry().renew(&agent, claim_id)?;
    match format {
        Format::Json => output::print_json(&claim)?,
        Format::Pretty => println!(
            "Renewed {} until {}",
            claim.claim_id.cyan(),
            output::timestamp(claim.expires_at)
        ),
        Format::Minimal => println!("{}", claim.expires_at.to_rfc3339()),
    }
    Ok(())
}

pub fn reap_stale(ws: &Workspace, reaper_id: Option<&str>, format: Format) -> Result<()> {
    let reaped = ws.registry().reap_stale(reaper_id)?;
    match format {
        Format::Json => println!("{}", serde_json::json!({"reaped": reaped})),
        Format::Pretty => {
            if reaped.is_empty() {
                println!("{}", "No stale claims.".dimmed());
            } else {
                for id in &reaped {
                    println!("Reaped {}", id.yellow());
                }
            }
        }
        Format::Minimal => {
            for id in &reaped {
                println!("{id}");
            }
        }
    }
    Ok(())
}
