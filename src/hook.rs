//! Work hooks: one hand-off slot per agent identity.
//!
//! ```text
//! <root>/.beads-wisp/
//!   .gitignore                    # "*"
//!   hook-gastown.crew.joe.json
//!   hook-mayor.json
//! ```
//!
//! A slot is written by whoever slings work and burned by the first startup
//! of the target session. Last writer wins.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::AgentIdentity;
use crate::ledger::write_json_atomic;
use crate::store::IssueStore;

pub const WISP_DIR: &str = ".beads-wisp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHook {
    pub issue_id: String,
    /// Canonical identity text, e.g. `gastown/crew/joe`.
    pub agent_identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkHook {
    pub fn new(
        identity: &AgentIdentity,
        issue_id: &str,
        subject: Option<&str>,
        context: Option<&str>,
    ) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            agent_identity: identity.to_string(),
            subject: subject.map(str::to_string),
            context: context.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HookSlots {
    dir: PathBuf,
}

impl HookSlots {
    /// Slots live under `<root>/.beads-wisp`.
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(WISP_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, identity: &AgentIdentity) -> PathBuf {
        self.dir.join(format!("hook-{}.json", identity.hook_key()))
    }

    /// Verify the issue exists, then write a hook for it.
    pub fn attach(
        &self,
        store: &dyn IssueStore,
        identity: &AgentIdentity,
        issue_id: &str,
        subject: Option<&str>,
        context: Option<&str>,
    ) -> Result<WorkHook> {
        store.show(issue_id)?;
        let hook = WorkHook::new(identity, issue_id, subject, context);
        self.write(identity, &hook)?;
        Ok(hook)
    }

    /// Overwrite the identity's slot.
    pub fn write(&self, identity: &AgentIdentity, hook: &WorkHook) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.path_for(identity);
        write_json_atomic(&path, hook)?;
        tracing::info!(identity = %identity, issue = %hook.issue_id, path = %path.display(), "hook written");
        Ok(path)
    }

    /// Read and delete the slot. Only one caller gets `Some`.
    pub fn consume(&self, identity: &AgentIdentity) -> Result<Option<WorkHook>> {
        let path = self.path_for(identity);
        let burning = self.dir.join(format!(
            ".burning-{}-{}.json",
            identity.hook_key(),
            std::process::id()
        ));
        match fs::rename(&path, &burning) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&path, e)),
        }
        let read = fs::read_to_string(&burning).map_err(|e| Error::io(&burning, e));
        discard(&burning);
        let hook: WorkHook = serde_json::from_str(&read?)?;
        tracing::info!(identity = %identity, issue = %hook.issue_id, "hook consumed");
        Ok(Some(hook))
    }

    /// Read the slot without burning it.
    pub fn peek(&self, identity: &AgentIdentity) -> Result<Option<WorkHook>> {
        let path = self.path_for(identity);
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let ignore = self.dir.join(".gitignore");
        if !ignore.exists() {
            fs::write(&ignore, "*\n").map_err(|e| Error::io(&ignore, e))?;
        }
        Ok(())
    }
}

/// Best-effort removal of a burned slot. The hook has already been read.
fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "could not remove consumed hook");
    }
}
