//! Dispatch queue: which tracked issues go into a rig backlog now.
//!
//! Eligibility is a pure membership decision. Blocked issues are placed like
//! any other open issue; dependency readiness is checked by whoever pulls
//! from the backlog.

use serde::Serialize;

use crate::config::Config;
use crate::convoy::ConvoyTracker;
use crate::error::Result;
use crate::ledger::ConvoyLedger;
use crate::store::{Issue, IssueStore, Placement, validate_issue_id};

/// Why an issue was left out. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Closed,
    Assigned,
    AlreadyQueued,
    NoRig,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Assigned => "assigned",
            Self::AlreadyQueued => "already-queued",
            Self::NoRig => "no-rig",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SkipCounts {
    pub closed: usize,
    pub assigned: usize,
    pub already_queued: usize,
    pub no_rig: usize,
}

impl SkipCounts {
    const fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Closed => self.closed += 1,
            SkipReason::Assigned => self.assigned += 1,
            SkipReason::AlreadyQueued => self.already_queued += 1,
            SkipReason::NoRig => self.no_rig += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.closed + self.assigned + self.already_queued + self.no_rig
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchCandidate {
    pub issue_id: String,
    pub title: String,
    pub rig: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skip {
    pub issue_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lookup,
    Placement,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueError {
    pub issue_id: String,
    pub phase: Phase,
    pub message: String,
    pub storage_fault: bool,
}

impl IssueError {
    fn new(issue_id: &str, phase: Phase, err: &crate::error::Error) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            phase,
            message: err.to_string(),
            storage_fault: err.is_storage_fault(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueOptions {
    /// Place issues even when they already have an assignee.
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueReport {
    pub convoy_id: Option<String>,
    pub dry_run: bool,
    pub candidates: Vec<DispatchCandidate>,
    pub skips: Vec<Skip>,
    pub skipped: SkipCounts,
    pub errors: Vec<IssueError>,
    /// Candidates actually placed. Always zero on a dry run.
    pub queued: usize,
}

impl QueueReport {
    fn skip(&mut self, issue_id: &str, reason: SkipReason) {
        self.skipped.record(reason);
        self.skips.push(Skip {
            issue_id: issue_id.to_string(),
            reason,
        });
    }

    pub fn placement_failures(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.phase == Phase::Placement)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Skip(SkipReason),
    Candidate(DispatchCandidate),
}

/// Decide one issue. Precedence: closed, assigned, already-queued, no-rig.
pub fn classify(issue: &Issue, force: bool, queue_label: &str, config: &Config) -> Eligibility {
    if issue.status.is_terminal() {
        return Eligibility::Skip(SkipReason::Closed);
    }
    if issue.is_assigned() && !force {
        return Eligibility::Skip(SkipReason::Assigned);
    }
    if issue.has_label(queue_label) {
        return Eligibility::Skip(SkipReason::AlreadyQueued);
    }
    match config.rig_for_prefix(issue.prefix()) {
        Some(rig) => Eligibility::Candidate(DispatchCandidate {
            issue_id: issue.id.clone(),
            title: issue.title.clone(),
            rig: rig.to_string(),
        }),
        None => Eligibility::Skip(SkipReason::NoRig),
    }
}

pub struct DispatchQueue<'a> {
    store: &'a dyn IssueStore,
    ledger: &'a dyn ConvoyLedger,
    config: &'a Config,
}

impl<'a> DispatchQueue<'a> {
    pub fn new(store: &'a dyn IssueStore, ledger: &'a dyn ConvoyLedger, config: &'a Config) -> Self {
        Self {
            store,
            ledger,
            config,
        }
    }

    fn placement(&self) -> Placement {
        Placement {
            queue_label: self.config.dispatch.queue_label.clone(),
            formula: self.config.dispatch.formula.clone(),
        }
    }

    fn classify_into(&self, report: &mut QueueReport, issue: &Issue, force: bool) {
        match classify(issue, force, &self.config.dispatch.queue_label, self.config) {
            Eligibility::Skip(reason) => report.skip(&issue.id, reason),
            Eligibility::Candidate(c) => report.candidates.push(c),
        }
    }

    /// Queue every eligible issue tracked by a convoy.
    ///
    /// Lookup and placement failures are collected per issue; the batch
    /// always runs to the end.
    pub fn enqueue_tracked(&self, convoy_id: &str, opts: QueueOptions) -> Result<QueueReport> {
        let convoy = self.ledger.load(convoy_id)?;
        let mut report = QueueReport {
            convoy_id: Some(convoy.id.clone()),
            dry_run: opts.dry_run,
            ..QueueReport::default()
        };
        for id in &convoy.tracked {
            match self.store.show(id) {
                Ok(issue) => self.classify_into(&mut report, &issue, opts.force),
                Err(e) => {
                    tracing::warn!(issue = %id, error = %e, "issue lookup failed");
                    report.errors.push(IssueError::new(id, Phase::Lookup, &e));
                }
            }
        }
        if !opts.dry_run {
            self.place(&mut report);
        }
        tracing::info!(
            convoy = %convoy_id,
            candidates = report.candidates.len(),
            queued = report.queued,
            skipped = report.skipped.total(),
            errors = report.errors.len(),
            dry_run = opts.dry_run,
            "convoy queue evaluated"
        );
        Ok(report)
    }

    /// Queue a single issue, creating a tracking convoy for it first when no
    /// open convoy tracks it yet.
    pub fn enqueue_issue(&self, issue_id: &str, opts: QueueOptions) -> Result<QueueReport> {
        validate_issue_id(issue_id)?;
        let issue = self.store.show(issue_id)?;
        let tracker = ConvoyTracker::new(self.store, self.ledger, self.config);

        let mut report = QueueReport {
            convoy_id: tracker.find_open_tracking(issue_id)?.map(|c| c.id),
            dry_run: opts.dry_run,
            ..QueueReport::default()
        };
        self.classify_into(&mut report, &issue, opts.force);

        if !opts.dry_run && !report.candidates.is_empty() {
            if report.convoy_id.is_none() {
                let title = if issue.title.is_empty() {
                    issue.id.clone()
                } else {
                    issue.title.clone()
                };
                let convoy = tracker.create(&format!("Work: {title}"), &[issue.id.clone()], &[])?;
                tracing::info!(issue = %issue_id, convoy = %convoy.id, "auto-tracked issue");
                report.convoy_id = Some(convoy.id);
            }
            self.place(&mut report);
        }
        Ok(report)
    }

    fn place(&self, report: &mut QueueReport) {
        let placement = self.placement();
        for candidate in &report.candidates {
            match self.store.enqueue(&candidate.issue_id, &candidate.rig, &placement) {
                Ok(()) => {
                    report.queued += 1;
                    tracing::debug!(issue = %candidate.issue_id, rig = %candidate.rig, "queued");
                }
                Err(e) => {
                    tracing::warn!(issue = %candidate.issue_id, rig = %candidate.rig, error = %e, "placement failed");
                    report
                        .errors
                        .push(IssueError::new(&candidate.issue_id, Phase::Placement, &e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::store::IssueStatus;
    use crate::testing::{Fault, MemoryLedger, MemoryStore, test_config};

    fn issue(id: &str, status: IssueStatus, assignee: &str, labels: &[&str]) -> Issue {
        Issue {
            id: id.to_string(),
            title: format!("title of {id}"),
            status,
            assignee: assignee.to_string(),
            labels: labels.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn reason(issue: &Issue, force: bool) -> Option<SkipReason> {
        match classify(issue, force, "gt:queued", &test_config()) {
            Eligibility::Skip(r) => Some(r),
            Eligibility::Candidate(_) => None,
        }
    }

    fn convoy_with(store: &MemoryStore, ledger: &MemoryLedger, tracked: &[&str]) -> String {
        let config = test_config();
        let tracker = ConvoyTracker::new(store, ledger, &config);
        let ids: Vec<String> = tracked.iter().map(|s| (*s).to_string()).collect();
        tracker.create("Batch", &ids, &[]).unwrap().id
    }

    #[test]
    fn skip_precedence() {
        let everything = issue("hq-x", IssueStatus::Closed, "joe", &["gt:queued"]);
        assert_eq!(reason(&everything, false), Some(SkipReason::Closed));

        let assigned_and_queued = issue("hq-x", IssueStatus::Open, "joe", &["gt:queued"]);
        assert_eq!(reason(&assigned_and_queued, false), Some(SkipReason::Assigned));
        assert_eq!(reason(&assigned_and_queued, true), Some(SkipReason::AlreadyQueued));

        let assigned_no_rig = issue("hq-x", IssueStatus::Open, "joe", &[]);
        assert_eq!(reason(&assigned_no_rig, true), Some(SkipReason::NoRig));

        let unknown_prefix = issue("zz-x", IssueStatus::Open, "", &[]);
        assert_eq!(reason(&unknown_prefix, false), Some(SkipReason::NoRig));

        let tombstone = issue("gt-x", IssueStatus::Tombstone, "", &[]);
        assert_eq!(reason(&tombstone, false), Some(SkipReason::Closed));

        let blocked = issue("gt-x", IssueStatus::Blocked, "", &[]);
        assert_eq!(reason(&blocked, false), None);
    }

    #[test]
    fn self_tracked_convoy_scenario() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("gt-a", "Login", IssueStatus::Closed, "");
        store.put("bd-b", "Tokens", IssueStatus::Open, "");
        let convoy_id = convoy_with(&store, &ledger, &["gt-a", "bd-b"]);
        store.put(&convoy_id, "Batch", IssueStatus::Open, "");
        ConvoyTracker::new(&store, &ledger, &config)
            .track(&convoy_id, &[convoy_id.clone()])
            .unwrap();

        let queue = DispatchQueue::new(&store, &ledger, &config);
        let report = queue
            .enqueue_tracked(&convoy_id, QueueOptions { dry_run: true, ..QueueOptions::default() })
            .unwrap();
        assert_eq!(
            report.skipped,
            SkipCounts {
                closed: 1,
                no_rig: 1,
                ..SkipCounts::default()
            }
        );
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].issue_id, "bd-b");
        assert_eq!(report.candidates[0].rig, "beads");
        assert_eq!(report.queued, 0);
        assert!(store.enqueued().is_empty());
    }

    #[test]
    fn skips_and_candidates_partition_tracked_set() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("gt-a", "a", IssueStatus::Closed, "");
        store.put("gt-b", "b", IssueStatus::InProgress, "gastown/polecats/nux");
        store.put("gt-c", "c", IssueStatus::Open, "");
        store.add_label("gt-c", "gt:queued");
        store.put("zz-d", "d", IssueStatus::Open, "");
        store.put("bd-e", "e", IssueStatus::Open, "");
        store.put("gt-f", "f", IssueStatus::Blocked, "");
        let tracked = ["gt-a", "gt-b", "gt-c", "zz-d", "bd-e", "gt-f"];
        let convoy_id = convoy_with(&store, &ledger, &tracked);

        let report = DispatchQueue::new(&store, &ledger, &config)
            .enqueue_tracked(&convoy_id, QueueOptions::default())
            .unwrap();

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for id in report
            .skips
            .iter()
            .map(|s| s.issue_id.as_str())
            .chain(report.candidates.iter().map(|c| c.issue_id.as_str()))
        {
            assert!(seen.insert(id), "{id} counted twice");
        }
        assert_eq!(seen, tracked.into_iter().collect());
        assert_eq!(report.skipped.total(), report.skips.len());
        assert_eq!(report.skipped.total() + report.candidates.len(), tracked.len());
        assert_eq!(report.queued, 2);
    }

    #[test]
    fn dry_run_matches_real_run() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("gt-a", "a", IssueStatus::Open, "");
        store.put("bd-b", "b", IssueStatus::Open, "beads/crew/joe");
        store.put("gt-c", "c", IssueStatus::Closed, "");
        let convoy_id = convoy_with(&store, &ledger, &["gt-a", "bd-b", "gt-c"]);
        let queue = DispatchQueue::new(&store, &ledger, &config);

        for force in [false, true] {
            let preview = queue
                .enqueue_tracked(&convoy_id, QueueOptions { force, dry_run: true })
                .unwrap();
            let real = queue
                .enqueue_tracked(&convoy_id, QueueOptions { force, dry_run: false })
                .unwrap();
            assert_eq!(preview.candidates, real.candidates);
            assert_eq!(preview.skipped, real.skipped);
            assert_eq!(real.queued, real.candidates.len());
            store.clear_label_everywhere("gt:queued");
        }
    }

    #[test]
    fn placement_marks_backlog_labels_and_second_run_skips() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("bd-b", "b", IssueStatus::Open, "");
        let convoy_id = convoy_with(&store, &ledger, &["bd-b"]);
        let queue = DispatchQueue::new(&store, &ledger, &config);

        queue.enqueue_tracked(&convoy_id, QueueOptions::default()).unwrap();
        assert_eq!(store.enqueued(), [("bd-b".to_string(), "beads".to_string())]);
        let labels = store.labels("bd-b");
        assert!(labels.contains(&"queue-rig:beads".to_string()));
        assert!(labels.contains(&"formula:mol-polecat-work".to_string()));

        let again = queue.enqueue_tracked(&convoy_id, QueueOptions::default()).unwrap();
        assert_eq!(again.skipped.already_queued, 1);
        assert!(again.candidates.is_empty());
    }

    #[test]
    fn placement_failure_is_partial_success() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("gt-a", "a", IssueStatus::Open, "");
        store.put("bd-b", "b", IssueStatus::Open, "");
        store.fail("gt-a", Fault::Placement);
        let convoy_id = convoy_with(&store, &ledger, &["gt-a", "bd-b"]);

        let report = DispatchQueue::new(&store, &ledger, &config)
            .enqueue_tracked(&convoy_id, QueueOptions::default())
            .unwrap();
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.queued, 1);
        assert_eq!(report.placement_failures(), 1);
        assert_eq!(report.errors[0].issue_id, "gt-a");
    }

    #[test]
    fn lookup_failure_is_reported_outside_partition() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("gt-a", "a", IssueStatus::Open, "");
        store.fail("bd-b", Fault::Infrastructure);
        let convoy_id = convoy_with(&store, &ledger, &["gt-a", "bd-b"]);

        let report = DispatchQueue::new(&store, &ledger, &config)
            .enqueue_tracked(&convoy_id, QueueOptions::default())
            .unwrap();
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].phase, Phase::Lookup);
        assert!(report.errors[0].storage_fault);
    }

    #[test]
    fn single_issue_auto_creates_tracking_convoy() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("gt-a", "Login flow", IssueStatus::Open, "");
        let queue = DispatchQueue::new(&store, &ledger, &config);

        let preview = queue
            .enqueue_issue("gt-a", QueueOptions { dry_run: true, ..QueueOptions::default() })
            .unwrap();
        assert!(preview.convoy_id.is_none());
        assert!(ledger.list().unwrap().is_empty());

        let report = queue.enqueue_issue("gt-a", QueueOptions::default()).unwrap();
        let convoy_id = report.convoy_id.unwrap();
        let convoy = ledger.load(&convoy_id).unwrap();
        assert_eq!(convoy.title, "Work: Login flow");
        assert!(convoy.tracked.contains("gt-a"));
        assert_eq!(report.queued, 1);
    }

    #[test]
    fn single_issue_reuses_existing_convoy() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("gt-a", "a", IssueStatus::Open, "");
        let existing = convoy_with(&store, &ledger, &["gt-a"]);

        let report = DispatchQueue::new(&store, &ledger, &config)
            .enqueue_issue("gt-a", QueueOptions::default())
            .unwrap();
        assert_eq!(report.convoy_id.as_deref(), Some(existing.as_str()));
        assert_eq!(ledger.list().unwrap().len(), 1);
    }

    #[test]
    fn single_skipped_issue_creates_no_convoy() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        store.put("gt-a", "a", IssueStatus::Closed, "");
        let report = DispatchQueue::new(&store, &ledger, &config)
            .enqueue_issue("gt-a", QueueOptions::default())
            .unwrap();
        assert_eq!(report.skipped.closed, 1);
        assert!(report.convoy_id.is_none());
        assert!(ledger.list().unwrap().is_empty());
    }

    #[test]
    fn single_missing_issue_is_not_found() {
        let (store, ledger, config) = (MemoryStore::new(), MemoryLedger::default(), test_config());
        let err = DispatchQueue::new(&store, &ledger, &config)
            .enqueue_issue("gt-nope", QueueOptions::default())
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::NotFound { kind: "issue", .. }));
    }
}
