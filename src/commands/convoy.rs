use clap::Subcommand;

use super::context::{Town, TownArgs};
use super::format::{self, OutputFormat};
use super::queue::print_report;
use crate::convoy::{CheckReport, ConvoyProgress, ConvoyStatus, ConvoyTracker};
use crate::dispatch::{DispatchQueue, QueueOptions};
use crate::template::format_elapsed;

#[derive(Debug, Subcommand)]
pub enum ConvoyCommand {
    /// Create a convoy tracking one or more issues
    Create {
        /// Convoy title
        title: String,
        /// Issues to track
        #[arg(required = true)]
        issues: Vec<String>,
        /// Address to mail when the convoy lands (repeatable)
        #[arg(long = "notify", value_name = "ADDRESS")]
        notify: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add issues to an existing convoy
    Track {
        convoy_id: String,
        #[arg(required = true)]
        issues: Vec<String>,
    },
    /// Show convoy progress (every open convoy when no id is given)
    Status {
        convoy_id: Option<String>,
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Shorthand for --format json
        #[arg(long)]
        json: bool,
    },
    /// Queue a convoy's open, unassigned issues into their rigs
    Queue {
        convoy_id: String,
        /// Show what would be queued without queueing
        #[arg(short = 'n', long)]
        dry_run: bool,
        /// Queue issues even if they already have an assignee
        #[arg(long)]
        force: bool,
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Shorthand for --format json
        #[arg(long)]
        json: bool,
    },
    /// Land convoys whose issues are all closed and notify subscribers
    Check {
        /// Check one convoy (default: sweep every open convoy)
        convoy_id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl ConvoyCommand {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "convoy create",
            Self::Track { .. } => "convoy track",
            Self::Status { .. } => "convoy status",
            Self::Queue { .. } => "convoy queue",
            Self::Check { .. } => "convoy check",
        }
    }

    pub fn execute(&self, town: &TownArgs) -> anyhow::Result<()> {
        let town = town.load()?;
        match self {
            Self::Create {
                title,
                issues,
                notify,
                json,
            } => create(&town, title, issues, notify, *json),
            Self::Track { convoy_id, issues } => track(&town, convoy_id, issues),
            Self::Status {
                convoy_id,
                format,
                json,
            } => status(&town, convoy_id.as_deref(), format::resolve(*format, *json)),
            Self::Queue {
                convoy_id,
                dry_run,
                force,
                format,
                json,
            } => {
                let (store, ledger) = (town.store(), town.ledger());
                let queue = DispatchQueue::new(&store, &ledger, &town.config);
                let opts = QueueOptions {
                    force: *force,
                    dry_run: *dry_run,
                };
                let report = queue.enqueue_tracked(convoy_id, opts)?;
                print_report(&report, format::resolve(*format, *json))
            }
            Self::Check { convoy_id, json } => check(&town, convoy_id.as_deref(), *json),
        }
    }
}

fn create(town: &Town, title: &str, issues: &[String], notify: &[String], json: bool) -> anyhow::Result<()> {
    let (store, ledger) = (town.store(), town.ledger());
    let convoy = ConvoyTracker::new(&store, &ledger, &town.config).create(title, issues, notify)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&convoy)?);
    } else {
        println!("Created convoy {}: {}", convoy.id, convoy.title);
        println!("  tracking {} issue(s)", convoy.tracked.len());
        for sub in &convoy.subscribers {
            println!("  notify {sub}");
        }
    }
    Ok(())
}

fn track(town: &Town, convoy_id: &str, issues: &[String]) -> anyhow::Result<()> {
    let (store, ledger) = (town.store(), town.ledger());
    let outcome = ConvoyTracker::new(&store, &ledger, &town.config).track(convoy_id, issues)?;
    if outcome.added.is_empty() {
        println!("{convoy_id}: already tracking all given issues");
    } else {
        println!("{convoy_id}: now tracking {}", outcome.added.join(", "));
    }
    if outcome.reopened {
        println!("{convoy_id}: reopened");
    }
    Ok(())
}

fn status(town: &Town, convoy_id: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let (store, ledger) = (town.store(), town.ledger());
    let progress = ConvoyTracker::new(&store, &ledger, &town.config).status(convoy_id)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&progress)?),
        OutputFormat::Pretty | OutputFormat::Text => {
            if progress.is_empty() {
                println!("No open convoys.");
            }
            for p in &progress {
                print_progress(p, format == OutputFormat::Pretty);
            }
        }
    }
    Ok(())
}

fn print_progress(p: &ConvoyProgress, pretty: bool) {
    let badge = match (pretty, p.status) {
        (true, ConvoyStatus::Open) => "🚚",
        (true, ConvoyStatus::Closed) => "🏁",
        (false, status) => status.as_str(),
    };
    println!("{badge} {} {} [{}/{} closed]", p.id, p.title, p.closed, p.total);
    for issue in &p.issues {
        let mark = if !pretty {
            issue.status.as_str()
        } else if issue.status.is_terminal() {
            "✓"
        } else {
            "·"
        };
        let assignee = if issue.assignee.is_empty() {
            String::new()
        } else {
            format!(" @{}", issue.assignee)
        };
        println!("  {mark} {} {}{assignee}", issue.id, issue.title);
    }
}

fn check(town: &Town, convoy_id: Option<&str>, json: bool) -> anyhow::Result<()> {
    let (store, ledger, notifier) = (town.store(), town.ledger(), town.notifier());
    let report = ConvoyTracker::new(&store, &ledger, &town.config).check(convoy_id, &notifier)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_check(&report);
    }
    Ok(())
}

fn print_check(report: &CheckReport) {
    for landed in &report.landed {
        println!(
            "Landed {}: {} ({} issue(s), {})",
            landed.convoy_id,
            landed.title,
            landed.issues.len(),
            format_elapsed(landed.duration_secs)
        );
    }
    for id in &report.reopened {
        println!("Reopened {id}");
    }
    for e in &report.errors {
        eprintln!("error: {}: {}", e.convoy_id, e.message);
    }
    println!(
        "{} landed, {} reopened, {} still open",
        report.landed.len(),
        report.reopened.len(),
        report.still_open.len()
    );
}
