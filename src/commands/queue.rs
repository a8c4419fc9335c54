use clap::Args;

use super::context::TownArgs;
use super::format::{self, OutputFormat};
use crate::dispatch::{DispatchQueue, Phase, QueueOptions, QueueReport};

#[derive(Debug, Args)]
pub struct QueueArgs {
    /// Issue to place in its rig's backlog
    pub issue_id: String,
    /// Show what would be queued without queueing
    #[arg(short = 'n', long)]
    pub dry_run: bool,
    /// Queue even if the issue already has an assignee
    #[arg(long)]
    pub force: bool,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
    /// Shorthand for --format json
    #[arg(long)]
    pub json: bool,
}

impl QueueArgs {
    pub fn execute(&self, town: &TownArgs) -> anyhow::Result<()> {
        let town = town.load()?;
        let (store, ledger) = (town.store(), town.ledger());
        let queue = DispatchQueue::new(&store, &ledger, &town.config);
        let report = queue.enqueue_issue(
            &self.issue_id,
            QueueOptions {
                force: self.force,
                dry_run: self.dry_run,
            },
        )?;
        print_report(&report, format::resolve(self.format, self.json))
    }
}

/// Render a queue report. Skip counts are always printed, so "nothing to
/// do" and "everything filtered" look different.
pub fn print_report(report: &QueueReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let pretty = format == OutputFormat::Pretty;
    let convoy = report.convoy_id.as_deref().unwrap_or("(untracked)");
    let verb = if report.dry_run { "would queue" } else { "queued" };

    if pretty {
        println!("🚚 Convoy {convoy}");
    } else {
        println!("convoy {convoy}");
    }
    if report.candidates.is_empty() {
        println!("  no candidates");
    }
    for c in &report.candidates {
        let failed = report
            .errors
            .iter()
            .any(|e| e.phase == Phase::Placement && e.issue_id == c.issue_id);
        let mark = match (pretty, failed) {
            (true, false) => "✓",
            (true, true) => "✗",
            (false, false) => verb,
            (false, true) => "failed",
        };
        println!("  {mark} {} -> {} ({})", c.issue_id, c.rig, c.title);
    }

    let s = &report.skipped;
    println!(
        "skipped: closed={} assigned={} already-queued={} no-rig={}",
        s.closed, s.assigned, s.already_queued, s.no_rig
    );
    for skip in &report.skips {
        println!("  - {} [{}]", skip.issue_id, skip.reason.as_str());
    }
    for e in &report.errors {
        let phase = match e.phase {
            Phase::Lookup => "lookup",
            Phase::Placement => "placement",
        };
        eprintln!("error: {} ({phase}): {}", e.issue_id, e.message);
    }

    if report.dry_run {
        println!("{} candidate(s), dry run", report.candidates.len());
    } else {
        println!("{}/{} queued", report.queued, report.candidates.len());
    }
    Ok(())
}
