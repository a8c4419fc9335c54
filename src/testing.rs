//! In-memory fakes for the store, ledger, session host and notifier.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::config::{Config, RigConfig};
use crate::convoy::Convoy;
use crate::error::{Error, Result};
use crate::ledger::ConvoyLedger;
use crate::notify::Notifier;
use crate::session::SessionHost;
use crate::store::{Issue, IssueStatus, IssueStore, Placement};

/// Town `hq` with rigs `gastown` (`gt-`) and `beads` (`bd-`).
pub fn test_config() -> Config {
    let mut config = Config::default();
    config
        .rigs
        .insert("gastown".into(), RigConfig { prefix: "gt".into() });
    config
        .rigs
        .insert("beads".into(), RigConfig { prefix: "bd".into() });
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `show` fails the way a crashed store does.
    Infrastructure,
    /// `enqueue` is rejected.
    Placement,
}

#[derive(Default)]
pub struct MemoryStore {
    issues: RefCell<BTreeMap<String, Issue>>,
    faults: RefCell<BTreeMap<String, Fault>>,
    enqueued: RefCell<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, id: &str, title: &str, status: IssueStatus, assignee: &str) {
        self.issues.borrow_mut().insert(
            id.to_string(),
            Issue {
                id: id.to_string(),
                title: title.to_string(),
                status,
                assignee: assignee.to_string(),
                labels: Vec::new(),
            },
        );
    }

    pub fn set_status(&self, id: &str, status: IssueStatus) {
        if let Some(issue) = self.issues.borrow_mut().get_mut(id) {
            issue.status = status;
        }
    }

    pub fn add_label(&self, id: &str, label: &str) {
        if let Some(issue) = self.issues.borrow_mut().get_mut(id) {
            issue.labels.push(label.to_string());
        }
    }

    pub fn clear_label_everywhere(&self, label: &str) {
        for issue in self.issues.borrow_mut().values_mut() {
            issue.labels.retain(|l| l != label);
        }
    }

    pub fn labels(&self, id: &str) -> Vec<String> {
        self.issues
            .borrow()
            .get(id)
            .map(|i| i.labels.clone())
            .unwrap_or_default()
    }

    pub fn fail(&self, id: &str, fault: Fault) {
        self.faults.borrow_mut().insert(id.to_string(), fault);
    }

    pub fn enqueued(&self) -> Vec<(String, String)> {
        self.enqueued.borrow().clone()
    }
}

impl IssueStore for MemoryStore {
    fn show(&self, id: &str) -> Result<Issue> {
        if self.faults.borrow().get(id) == Some(&Fault::Infrastructure) {
            return Err(Error::Infrastructure {
                tool: "bd".into(),
                message: "panic: runtime error: invalid memory address or nil pointer dereference".into(),
            });
        }
        self.issues
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("issue", id))
    }

    fn enqueue(&self, id: &str, rig: &str, placement: &Placement) -> Result<()> {
        if self.faults.borrow().get(id) == Some(&Fault::Placement) {
            return Err(Error::ToolFailed {
                tool: "bd".into(),
                code: 1,
                message: format!("cannot update {id}"),
            });
        }
        let mut issues = self.issues.borrow_mut();
        let issue = issues
            .get_mut(id)
            .ok_or_else(|| Error::not_found("issue", id))?;
        issue.labels.extend(placement.labels(rig));
        self.enqueued
            .borrow_mut()
            .push((id.to_string(), rig.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    convoys: RefCell<BTreeMap<String, Convoy>>,
}

impl ConvoyLedger for MemoryLedger {
    fn load(&self, id: &str) -> Result<Convoy> {
        self.convoys
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("convoy", id))
    }

    fn save(&self, convoy: &Convoy) -> Result<()> {
        self.convoys
            .borrow_mut()
            .insert(convoy.id.clone(), convoy.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Convoy>> {
        let mut all: Vec<Convoy> = self.convoys.borrow().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[derive(Default)]
pub struct FakeHost {
    sessions: RefCell<BTreeMap<String, String>>,
    respawns: RefCell<Vec<(String, String)>>,
    switched: RefCell<Vec<String>>,
    fail_switch: bool,
    vanish: Cell<bool>,
}

impl FakeHost {
    pub fn failing_switch() -> Self {
        Self {
            fail_switch: true,
            ..Self::default()
        }
    }

    pub fn add_session(&self, name: &str, pane: &str) {
        self.sessions
            .borrow_mut()
            .insert(name.to_string(), pane.to_string());
    }

    /// The next respawn finds its pane gone.
    pub fn vanish_on_respawn(&self) {
        self.vanish.set(true);
    }

    pub fn respawns(&self) -> Vec<(String, String)> {
        self.respawns.borrow().clone()
    }

    pub fn switched(&self) -> Vec<String> {
        self.switched.borrow().clone()
    }
}

impl SessionHost for FakeHost {
    fn current_session(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn has_session(&self, name: &str) -> Result<bool> {
        Ok(self.sessions.borrow().contains_key(name))
    }

    fn first_pane(&self, session: &str) -> Result<String> {
        self.sessions
            .borrow()
            .get(session)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound {
                session: session.to_string(),
            })
    }

    fn respawn(&self, pane: &str, command: &str) -> Result<()> {
        if self.vanish.get() {
            return Err(Error::SessionNotFound {
                session: pane.to_string(),
            });
        }
        self.respawns
            .borrow_mut()
            .push((pane.to_string(), command.to_string()));
        Ok(())
    }

    fn switch_client(&self, session: &str) -> Result<()> {
        if self.fail_switch {
            return Err(Error::ToolFailed {
                tool: "tmux".into(),
                code: 1,
                message: "no current client".into(),
            });
        }
        self.switched.borrow_mut().push(session.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: RefCell<Vec<Sent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(Error::ToolFailed {
                tool: "gt".into(),
                code: 1,
                message: "mail transport down".into(),
            });
        }
        self.sent.borrow_mut().push(Sent {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
