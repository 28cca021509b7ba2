use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::commands::{Workspace, require_agent};
use crate::error::Result;
use crate::mutation::MutationReceipt;
use crate::output::{self, Format};
use crate::patch::{JsonPatchOp, LineOp, PatchError, PatchRequest};
use crate::store::audit::AuditQuery;

pub fn read(ws: &Workspace, path: &str, format: Format) -> Result<()> {
    let snap = ws.mutator().read(path)?;
    match format {
        Format::Json => output::print_json(&snap)?,
        Format::Pretty => {
            println!("{} {}", snap.path.cyan().bold(), format!("({})", snap.file_type).dimmed());
            println!("  {} {}", "sha:".dimmed(), snap.sha);
            println!("  {} {}", "etag:".dimmed(), snap.etag);
            println!("  {} {} bytes", "size:".dimmed(), snap.size);
            println!();
            print!("{}", snap.content);
        }
        Format::Minimal => print!("{}", snap.content),
    }
    Ok(())
}

/// Content comes from `--content`, then `--from <file>`, then stdin.
pub fn write(
    ws: &Workspace,
    agent: Option<String>,
    path: &str,
    content: Option<String>,
    from: Option<&Path>,
    base: Option<&str>,
    format: Format,
) -> Result<()> {
    let agent = require_agent(agent)?;
    let content = match (content, from) {
        (Some(c), _) => c,
        (None, Some(src)) => std::fs::read_to_string(src)?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let receipt = ws.mutator().write(&agent, path, &content, base)?;
    print_receipt(&receipt, format)
}

pub struct PatchArgs {
    pub json_patch: Option<String>,
    pub lines: Option<String>,
    pub text: Option<String>,
}

impl PatchArgs {
    fn into_request(self) -> Result<PatchRequest> {
        let request = match (self.json_patch, self.lines, self.text) {
            (Some(raw), None, None) => {
                let value: serde_json::Value = serde_json::from_str(&raw)
                    .map_err(|e| PatchError::MalformedOperation(e.to_string()))?;
                PatchRequest::JsonPatch(JsonPatchOp::parse_all(&value)?)
            }
            (None, Some(raw), None) => {
                let ops: Vec<LineOp> = serde_json::from_str(&raw)
                    .map_err(|e| PatchError::MalformedOperation(e.to_string()))?;
                PatchRequest::Lines(ops)
            }
            (None, None, Some(text)) => PatchRequest::Text(text),
            _ => {
                return Err(PatchError::MalformedOperation(
                    "exactly one of --json-patch, --lines, --text is required".into(),
                )
                .into());
            }
        };
        Ok(request)
    }
}

pub fn patch(
    ws: &Workspace,
    agent: Option<String>,
    path: &str,
    args: PatchArgs,
    base: &str,
    format: Format,
) -> Result<()> {
    let agent = require_agent(agent)?;
    let request = args.into_request()?;
    let receipt = ws.mutator().patch(&agent, path, &request, base)?;
    print_receipt(&receipt, format)
}

pub fn delete(
    ws: &Workspace,
    agent: Option<String>,
    path: &str,
    base: &str,
    format: Format,
) -> Result<()> {
    let agent = require_agent(agent)?;
    let receipt = ws.mutator().delete(&agent, path, base)?;
    print_receipt(&receipt, format)
}

pub struct HistoryArgs {
    pub path: Option<String>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub cursor: Option<String>,
}

pub fn history(ws: &Workspace, args: HistoryArgs, format: Format) -> Result<()> {
    let query = AuditQuery {
        path: args.path,
        actor: args.actor,
        since: args.since,
        until: args.until,
        limit: args.limit,
        cursor: args.cursor,
    };
    let page = ws.mutator().audit().query(&query)?;
    match format {
        Format::Json => output::print_json(&page)?,
        Format::Pretty => {
            if page.entries.is_empty() {
                println!("{}", "No audit entries.".dimmed());
            }
            for e in &page.entries {
                println!(
                    "{} {:7} {} {}",
                    output::timestamp(e.timestamp).dimmed(),
                    e.method.to_string(),
                    e.path.cyan(),
                    format!("by {}", e.actor).dimmed()
                );
            }
            if let Some(ref cursor) = page.next_cursor {
                println!("{} --cursor {}", "more:".dimmed(), cursor);
            }
        }
        Format::Minimal => {
            for e in &page.entries {
                println!("{} {} {} {}", e.id, e.method, e.path, e.actor);
            }
        }
    }
    Ok(())
}

fn print_receipt(receipt: &MutationReceipt, format: Format) -> Result<()> {
    match format {
        Format::Json => output::print_json(receipt)?,
        Format::Pretty => {
            println!("{} {}", receipt.method.to_string().green().bold(), receipt.path.cyan());
            if let Some(ref v) = receipt.version {
                println!("  {} {}", "sha:".dimmed(), v.sha);
                println!("  {} {}", "etag:".dimmed(), v.etag);
            }
        }
        Format::Minimal => match receipt.version {
            Some(ref v) => println!("{}", v.sha),
            None => println!("{}", receipt.path),
        },
    }
    Ok(())
}
