//! Convoy lifecycle: creation, tracking and landing.
//!
//! Closure is pull-based. Nothing subscribes to issue-store changes; a
//! convoy only lands when somebody calls [`ConvoyTracker::evaluate_landing`]
//! (directly, through `gt convoy check`, or from a poller).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::ConvoyLedger;
use crate::notify::Notifier;
use crate::store::{IssueStatus, IssueStore, extract_prefix, validate_issue_id};
use crate::template::{self, LandedIssue, LandedNotice};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 5;
const ID_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvoyStatus {
    Open,
    Closed,
}

impl ConvoyStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convoy {
    pub id: String,
    pub title: String,
    pub status: ConvoyStatus,
    pub tracked: BTreeSet<String>,
    #[serde(default)]
    pub subscribers: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landed_at: Option<DateTime<Utc>>,
}

impl Convoy {
    pub const fn is_open(&self) -> bool {
        matches!(self.status, ConvoyStatus::Open)
    }

    fn reopen(&mut self) {
        self.status = ConvoyStatus::Open;
        self.landed_at = None;
    }
}

/// Live projection of one tracked issue. Never cached between calls.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedIssueView {
    pub id: String,
    pub title: String,
    pub status: IssueStatus,
    pub assignee: String,
    pub rig: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvoyProgress {
    pub id: String,
    pub title: String,
    pub status: ConvoyStatus,
    pub closed: usize,
    pub total: usize,
    pub issues: Vec<TrackedIssueView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Landing {
    NoTransition,
    Landed(LandedNotice),
    /// A closed convoy had an issue reopened behind its back.
    Reopened,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackOutcome {
    /// Ids that were not tracked before this call.
    pub added: Vec<String>,
    pub reopened: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvoyFailure {
    pub convoy_id: String,
    pub message: String,
    pub storage_fault: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub landed: Vec<LandedNotice>,
    pub reopened: Vec<String>,
    pub still_open: Vec<String>,
    pub errors: Vec<ConvoyFailure>,
}

pub struct ConvoyTracker<'a> {
    store: &'a dyn IssueStore,
    ledger: &'a dyn ConvoyLedger,
    config: &'a Config,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> ConvoyTracker<'a> {
    pub fn new(store: &'a dyn IssueStore, ledger: &'a dyn ConvoyLedger, config: &'a Config) -> Self {
        Self {
            store,
            ledger,
            config,
            clock: Utc::now,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn create(&self, title: &str, issues: &[String], subscribers: &[String]) -> Result<Convoy> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation("convoy title must not be empty".to_string()));
        }
        if issues.is_empty() {
            return Err(Error::Validation(format!(
                "convoy {title:?} needs at least one issue to track"
            )));
        }
        for id in issues {
            validate_issue_id(id)?;
        }

        let convoy = Convoy {
            id: self.fresh_id()?,
            title: title.to_string(),
            status: ConvoyStatus::Open,
            tracked: issues.iter().cloned().collect(),
            subscribers: subscribers
                .iter()
                .map(String::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            created_at: (self.clock)(),
            landed_at: None,
        };
        self.ledger.save(&convoy)?;
        tracing::info!(convoy = %convoy.id, issues = convoy.tracked.len(), "convoy created");
        Ok(convoy)
    }

    fn fresh_id(&self) -> Result<String> {
        let mut rng = rand::rng();
        for _ in 0..ID_ATTEMPTS {
            let suffix: String = (0..ID_LEN)
                .map(|_| char::from(ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())]))
                .collect();
            let id = format!("{}-cv-{suffix}", self.config.town.prefix);
            match self.ledger.load(&id) {
                Err(Error::NotFound { .. }) => return Ok(id),
                Err(e) => return Err(e),
                Ok(_) => tracing::debug!(%id, "convoy id collision, retrying"),
            }
        }
        Err(Error::Other(format!(
            "could not allocate a unique convoy id after {ID_ATTEMPTS} attempts"
        )))
    }

    /// Add issues to a convoy. Adding to a closed convoy reopens it, whatever
    /// the added issues' own status.
    pub fn track(&self, convoy_id: &str, issues: &[String]) -> Result<TrackOutcome> {
        if issues.is_empty() {
            return Err(Error::Validation(format!(
                "no issues given to track in convoy {convoy_id}"
            )));
        }
        for id in issues {
            validate_issue_id(id)?;
        }
        let mut convoy = self.ledger.load(convoy_id)?;
        let added: Vec<String> = issues
            .iter()
            .filter(|id| convoy.tracked.insert((*id).clone()))
            .cloned()
            .collect();
        let reopened = !convoy.is_open();
        if reopened {
            convoy.reopen();
        }
        if reopened || !added.is_empty() {
            self.ledger.save(&convoy)?;
        }
        tracing::info!(convoy = %convoy_id, added = added.len(), reopened, "issues tracked");
        Ok(TrackOutcome { added, reopened })
    }

    /// Re-read every tracked issue and move the convoy to whichever state
    /// the store now implies.
    pub fn evaluate_landing(&self, convoy_id: &str) -> Result<Landing> {
        let mut convoy = self.ledger.load(convoy_id)?;
        let views = self.tracked_views(&convoy)?;
        let all_done = !views.is_empty() && views.iter().all(|v| v.status.is_terminal());

        match (convoy.status, all_done) {
            (ConvoyStatus::Open, true) => {
                let now = (self.clock)();
                convoy.status = ConvoyStatus::Closed;
                convoy.landed_at = Some(now);
                self.ledger.save(&convoy)?;
                tracing::info!(convoy = %convoy.id, "convoy landed");
                Ok(Landing::Landed(landed_notice(&convoy, &views, now)))
            }
            (ConvoyStatus::Closed, false) => {
                convoy.reopen();
                self.ledger.save(&convoy)?;
                tracing::info!(convoy = %convoy.id, "convoy reopened: tracked issue no longer closed");
                Ok(Landing::Reopened)
            }
            _ => Ok(Landing::NoTransition),
        }
    }

    /// Progress for one convoy, or for every open convoy when `convoy_id` is `None`.
    pub fn status(&self, convoy_id: Option<&str>) -> Result<Vec<ConvoyProgress>> {
        let convoys = match convoy_id {
            Some(id) => vec![self.ledger.load(id)?],
            None => self.ledger.list()?.into_iter().filter(Convoy::is_open).collect(),
        };
        convoys
            .into_iter()
            .map(|convoy| {
                let issues = self.tracked_views(&convoy)?;
                Ok(ConvoyProgress {
                    closed: issues.iter().filter(|v| v.status.is_terminal()).count(),
                    total: issues.len(),
                    id: convoy.id,
                    title: convoy.title,
                    status: convoy.status,
                    issues,
                })
            })
            .collect()
    }

    /// Evaluate landing and mail each landed notice to its subscribers.
    ///
    /// With an explicit id, failures propagate. Sweeping all open convoys
    /// collects per-convoy failures instead.
    pub fn check(&self, convoy_id: Option<&str>, notifier: &dyn Notifier) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        let targets: Vec<String> = match convoy_id {
            Some(id) => vec![id.to_string()],
            None => self
                .ledger
                .list()?
                .into_iter()
                .filter(Convoy::is_open)
                .map(|c| c.id)
                .collect(),
        };

        for id in targets {
            let landing = match self.evaluate_landing(&id) {
                Ok(landing) => landing,
                Err(e) if convoy_id.is_none() => {
                    tracing::warn!(convoy = %id, error = %e, "landing check failed");
                    report.errors.push(ConvoyFailure {
                        convoy_id: id,
                        storage_fault: e.is_storage_fault(),
                        message: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };
            match landing {
                Landing::Landed(notice) => {
                    match self.deliver(&notice, notifier) {
                        Ok(()) => {}
                        Err(e) if convoy_id.is_none() => {
                            tracing::warn!(convoy = %id, error = %e, "landed notice not delivered");
                            report.errors.push(ConvoyFailure {
                                convoy_id: id,
                                storage_fault: e.is_storage_fault(),
                                message: e.to_string(),
                            });
                        }
                        Err(e) => return Err(e),
                    }
                    report.landed.push(notice);
                }
                Landing::Reopened => report.reopened.push(id),
                Landing::NoTransition => report.still_open.push(id),
            }
        }
        Ok(report)
    }

    fn deliver(&self, notice: &LandedNotice, notifier: &dyn Notifier) -> Result<()> {
        let convoy = self.ledger.load(&notice.convoy_id)?;
        if convoy.subscribers.is_empty() {
            return Ok(());
        }
        let subject = notice.subject();
        let body = template::landed_body(notice)?;
        for to in &convoy.subscribers {
            if let Err(e) = notifier.send(to, &subject, &body) {
                tracing::warn!(convoy = %notice.convoy_id, to = %to, error = %e, "landed notification not delivered");
            }
        }
        Ok(())
    }

    /// The open convoy already tracking `issue_id`, if any.
    pub fn find_open_tracking(&self, issue_id: &str) -> Result<Option<Convoy>> {
        Ok(self
            .ledger
            .list()?
            .into_iter()
            .find(|c| c.is_open() && c.tracked.contains(issue_id)))
    }

    fn tracked_views(&self, convoy: &Convoy) -> Result<Vec<TrackedIssueView>> {
        convoy
            .tracked
            .iter()
            .map(|id| {
                let issue = self.store.show(id)?;
                Ok(TrackedIssueView {
                    rig: self
                        .config
                        .rig_for_prefix(extract_prefix(id))
                        .map(str::to_string),
                    id: id.clone(),
                    title: issue.title,
                    status: issue.status,
                    assignee: issue.assignee,
                })
            })
            .collect()
    }
}

fn landed_notice(convoy: &Convoy, views: &[TrackedIssueView], now: DateTime<Utc>) -> LandedNotice {
    let workers: BTreeSet<&str> = views
        .iter()
        .map(|v| v.assignee.as_str())
        .filter(|a| !a.is_empty())
        .collect();
    LandedNotice {
        convoy_id: convoy.id.clone(),
        title: convoy.title.clone(),
        issues: views
            .iter()
            .map(|v| LandedIssue {
                id: v.id.clone(),
                title: v.title.clone(),
                status: v.status.to_string(),
            })
            .collect(),
        workers: workers.into_iter().map(str::to_string).collect(),
        duration_secs: (now - convoy.created_at).num_seconds(),
    }
}
