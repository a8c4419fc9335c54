//! Issue store client.
//!
//! The store is the source of truth for issue state. Nothing here caches:
//! every call goes back to `bd`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::subprocess::{RunOutput, Tool};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
    Tombstone,
    Other(String),
}

impl IssueStatus {
    /// Closed and tombstoned issues count as done.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Tombstone)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
            Self::Tombstone => "tombstone",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for IssueStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "open" => Self::Open,
            "in_progress" => Self::InProgress,
            "blocked" => Self::Blocked,
            "closed" => Self::Closed,
            "tombstone" => Self::Tombstone,
            _ => Self::Other(s),
        }
    }
}

impl From<IssueStatus> for String {
    fn from(status: IssueStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed output from `bd show <id> --json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_status")]
    pub status: IssueStatus,
    /// Empty means unassigned.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub assignee: String,
    #[serde(default, deserialize_with = "null_as_empty_vec")]
    pub labels: Vec<String>,
}

fn default_status() -> IssueStatus {
    IssueStatus::Open
}

fn null_as_empty<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn null_as_empty_vec<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}

impl Issue {
    pub const fn is_assigned(&self) -> bool {
        !self.assignee.is_empty()
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn prefix(&self) -> &str {
        extract_prefix(&self.id)
    }
}

/// What gets attached to an issue when it enters a rig backlog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub queue_label: String,
    pub formula: String,
}

impl Placement {
    pub fn labels(&self, rig: &str) -> Vec<String> {
        vec![
            self.queue_label.clone(),
            format!("queue-rig:{rig}"),
            format!("formula:{}", self.formula),
        ]
    }
}

/// Read/write facade over the issue store.
pub trait IssueStore {
    fn show(&self, id: &str) -> Result<Issue>;

    /// Put the issue into `rig`'s backlog. Never touches convoy tracking.
    fn enqueue(&self, id: &str, rig: &str, placement: &Placement) -> Result<()>;
}

/// Issue store backed by the `bd` CLI.
#[derive(Debug, Clone)]
pub struct BdStore {
    program: String,
    timeout: Duration,
    cwd: Option<PathBuf>,
}

impl BdStore {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
            cwd: None,
        }
    }

    #[must_use]
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    fn tool(&self) -> Tool {
        let tool = Tool::new(&self.program).timeout(self.timeout);
        match &self.cwd {
            Some(dir) => tool.current_dir(dir),
            None => tool,
        }
    }
}

impl IssueStore for BdStore {
    fn show(&self, id: &str) -> Result<Issue> {
        validate_issue_id(id)?;
        let output = self.tool().args(&["show", id, "--json"]).run()?;
        if !output.success() {
            return Err(classify_failure(&self.program, id, &output));
        }
        parse_show(id, &output.stdout)
    }

    fn enqueue(&self, id: &str, rig: &str, placement: &Placement) -> Result<()> {
        validate_issue_id(id)?;
        let mut tool = self.tool().args(&["update", id]);
        for label in placement.labels(rig) {
            tool = tool.args(&["--add-label", &label]);
        }
        let output = tool.run()?;
        if output.success() {
            return Ok(());
        }
        match classify_failure(&self.program, id, &output) {
            err @ Error::Infrastructure { .. } => Err(err),
            _ => Err(Error::ToolFailed {
                tool: self.program.clone(),
                code: output.exit_code,
                message: output.stderr.trim().to_string(),
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShowResponse {
    One(Issue),
    Many(Vec<Issue>),
}

/// `bd show --json` prints either an object or an array of one.
pub fn parse_show(id: &str, json: &str) -> Result<Issue> {
    match serde_json::from_str::<ShowResponse>(json.trim()) {
        Ok(ShowResponse::One(issue)) => Ok(issue),
        Ok(ShowResponse::Many(issues)) => issues
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("issue", id)),
        Err(e) => Err(Error::Other(format!("parsing bd show output for {id}: {e}"))),
    }
}

static INFRA_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)panic:|runtime error|nil pointer dereference|sigsegv|segmentation (fault|violation)|signal: |table '?wisps'? does(n't| not) exist|doltdb|doltcore",
    )
    .expect("valid infrastructure failure pattern")
});

/// True when failure text means the store itself is unhealthy.
pub fn is_infrastructure_failure(text: &str) -> bool {
    INFRA_FAILURE.is_match(text)
}

static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)not found|no issue|does(n't| not) exist|no such")
        .expect("valid not-found pattern")
});

/// Sort a failed `bd` run into a storage fault, a missing issue, or a plain
/// tool failure.
///
/// A crash must never be reported as "issue does not exist".
pub fn classify_failure(tool: &str, id: &str, output: &RunOutput) -> Error {
    let text = format!("{}\n{}", output.stderr, output.stdout);
    if output.exit_code < 0 || is_infrastructure_failure(&text) {
        let message = output.stderr.trim();
        return Error::Infrastructure {
            tool: tool.to_string(),
            message: if message.is_empty() {
                format!("{tool} terminated abnormally (exit {}) while reading {id}", output.exit_code)
            } else {
                message.to_string()
            },
        };
    }
    if NOT_FOUND.is_match(&text) {
        return Error::not_found("issue", id);
    }
    let message = output.stderr.trim();
    Error::ToolFailed {
        tool: tool.to_string(),
        code: output.exit_code,
        message: if message.is_empty() {
            format!("show {id} failed with no output")
        } else {
            message.to_string()
        },
    }
}

/// Text before the first `-`: `gt-abc` -> `gt`.
pub fn extract_prefix(id: &str) -> &str {
    id.split_once('-').map_or(id, |(prefix, _)| prefix)
}

pub fn validate_issue_id(id: &str) -> Result<()> {
    let Some((prefix, rest)) = id.split_once('-') else {
        return Err(Error::Validation(format!(
            "invalid issue id {id:?}: expected <prefix>-<id>"
        )));
    };
    let ok = |s: &str| {
        !s.is_empty()
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b'_')
    };
    if ok(prefix) && ok(rest) && !id.starts_with('-') {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid issue id {id:?}: expected <prefix>-<id>"
        )))
    }
}
