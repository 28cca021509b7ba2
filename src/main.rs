use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use claimguard::commands::claim::ClaimArgs;
use claimguard::commands::file::{HistoryArgs, PatchArgs};
use claimguard::commands::{self, Workspace};
use claimguard::output::Format;
use claimguard::store::audit::DEFAULT_PAGE_SIZE;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CLAIMGUARD_LOG";

#[derive(Parser)]
#[command(
    name = "claimguard",
    version,
    about = "Lease-based path claims and optimistic file edits for concurrent agents"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Repository root (default: nearest ancestor with .agents/ or .git)
    #[arg(long, global = true)]
    repo_root: Option<PathBuf>,
    /// Coordination directory (default: <repo>/.agents/coordination)
    #[arg(long, global = true)]
    coord_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the coordination directory and a default config.json
    Init,
    /// Claim paths and/or topics
    Claim {
        /// Agent id (default: $CLAIMGUARD_AGENT, else generated)
        #[arg(long)]
        agent: Option<String>,
        /// Paths to claim (comma-separated)
        #[arg(long, value_delimiter = ',')]
        paths: Vec<String>,
        /// Topics to claim (comma-separated)
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,
        /// What the agent intends to do
        #[arg(long)]
        intent: String,
        /// Related issue or pull request
        #[arg(long)]
        issue_pr: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Release a claim you own
    Release {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        claim_id: String,
    },
    /// Extend the lease on a claim you own
    Renew {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        claim_id: String,
    },
    /// Show active claims, recent completions, and heartbeats
    Status {
        /// Shorthand for --format json
        #[arg(long)]
        json: bool,
    },
    /// Terminate claims past their lease plus grace period
    ReapStale {
        #[arg(long)]
        reaper_id: Option<String>,
        /// Shorthand for --format json
        #[arg(long)]
        json: bool,
    },
    /// Run preflight checks on the coordination directory
    Validate,
    /// Read and mutate files with version tokens
    File {
        #[command(subcommand)]
        action: FileAction,
    },
}

#[derive(Subcommand)]
enum FileAction {
    /// Print content plus its sha and etag
    Read { path: String },
    /// Create a file, or overwrite it given its current version token
    Write {
        path: String,
        #[arg(long)]
        agent: Option<String>,
        /// New content (default: read --from, else stdin)
        #[arg(long, conflicts_with = "from")]
        content: Option<String>,
        /// Read new content from this file
        #[arg(long)]
        from: Option<PathBuf>,
        /// Version token (sha or etag) from the last read; omit to create
        #[arg(long)]
        base: Option<String>,
    },
    /// Apply a JSON patch, line patch, or full-text replacement
    Patch {
        path: String,
        #[arg(long)]
        agent: Option<String>,
        /// Version token (sha or etag) from the last read
        #[arg(long)]
        base: String,
        /// RFC 6902 operations (add/remove/replace) as a JSON array
        #[arg(long, conflicts_with_all = ["lines", "text"])]
        json_patch: Option<String>,
        /// Line operations as a JSON array
        #[arg(long, conflicts_with = "text")]
        lines: Option<String>,
        /// Replacement content
        #[arg(long)]
        text: Option<String>,
    },
    /// Delete a file given its current version token
    Delete {
        path: String,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        base: String,
    },
    /// Query the mutation audit trail, newest first
    History {
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        /// RFC 3339 lower bound
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// RFC 3339 upper bound
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: usize,
        /// Id of the last entry of the previous page
        #[arg(long)]
        cursor: Option<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn run(cli: Cli, format: Format) -> claimguard::error::Result<()> {
    let ws = Workspace::resolve(cli.repo_root, cli.coord_dir)?;

    match cli.command {
        Commands::Init => commands::init::run(&ws),
        Commands::Claim {
            agent,
            paths,
            topics,
            intent,
            issue_pr,
            reason,
            scope,
        } => commands::claim::claim(
            &ws,
            ClaimArgs {
                agent,
                paths,
                topics,
                intent,
                issue_pr,
                reason,
                scope,
            },
            format,
        ),
        Commands::Release { agent, claim_id } => {
            commands::claim::release(&ws, agent, &claim_id, format)
        }
        Commands::Renew { agent, claim_id } => commands::claim::renew(&ws, agent, &claim_id, format),
        Commands::Status { .. } => commands::status::status(&ws, format),
        Commands::ReapStale { reaper_id, .. } => {
            commands::claim::reap_stale(&ws, reaper_id.as_deref(), format)
        }
        Commands::Validate => commands::status::validate(&ws, format),
        Commands::File { action } => match action {
            FileAction::Read { path } => commands::file::read(&ws, &path, format),
            FileAction::Write {
                path,
                agent,
                content,
                from,
                base,
            } => commands::file::write(
                &ws,
                agent,
                &path,
                content,
                from.as_deref(),
                base.as_deref(),
                format,
            ),
            FileAction::Patch {
                path,
                agent,
                base,
                json_patch,
                lines,
                text,
            } => commands::file::patch(
                &ws,
                agent,
                &path,
                PatchArgs {
                    json_patch,
                    lines,
                    text,
                },
                &base,
                format,
            ),
            FileAction::Delete { path, agent, base } => {
                commands::file::delete(&ws, agent, &path, &base, format)
            }
            FileAction::History {
                path,
                actor,
                since,
                until,
                limit,
                cursor,
            } => commands::file::history(
                &ws,
                HistoryArgs {
                    path,
                    actor,
                    since,
                    until,
                    limit,
                    cursor,
                },
                format,
            ),
        },
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let format = match cli.command {
        Commands::Status { json: true } | Commands::ReapStale { json: true, .. } => Format::Json,
        _ => cli.format,
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "category": e.category(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
