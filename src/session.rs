//! Terminal session host.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::subprocess::Tool;

/// Addresses and restarts execution sessions.
pub trait SessionHost {
    /// Name of the session the caller is attached to, if any.
    fn current_session(&self) -> Result<Option<String>>;
    fn has_session(&self, name: &str) -> Result<bool>;
    /// Control handle (pane id) of the session's first pane.
    fn first_pane(&self, session: &str) -> Result<String>;
    /// Kill whatever runs in `pane` and start `command` in its place.
    fn respawn(&self, pane: &str, command: &str) -> Result<()>;
    fn switch_client(&self, session: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TmuxHost {
    program: String,
    timeout: Duration,
}

impl TmuxHost {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
        }
    }

    /// Query and view commands; bounded by the configured timeout.
    fn tmux(&self, args: &[&str]) -> Tool {
        Tool::new(&self.program).args(args).timeout(self.timeout)
    }
}

fn is_missing_target(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("can't find") || s.contains("no such") || s.contains("session not found")
}

impl SessionHost for TmuxHost {
    fn current_session(&self) -> Result<Option<String>> {
        let output = self.tmux(&["display-message", "-p", "#{session_name}"]).run()?;
        let name = output.stdout.trim();
        Ok((output.success() && !name.is_empty()).then(|| name.to_string()))
    }

    fn has_session(&self, name: &str) -> Result<bool> {
        let target = format!("={name}");
        Ok(self.tmux(&["has-session", "-t", &target]).run()?.success())
    }

    fn first_pane(&self, session: &str) -> Result<String> {
        let output = self
            .tmux(&["list-panes", "-t", session, "-F", "#{pane_id}"])
            .run()?;
        if !output.success() {
            return Err(Error::SessionNotFound {
                session: session.to_string(),
            });
        }
        output
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::SessionNotFound {
                session: session.to_string(),
            })
    }

    fn respawn(&self, pane: &str, command: &str) -> Result<()> {
        tracing::info!(pane, command, "respawning pane");
        // The restart itself runs without a timeout.
        let output = Tool::new(&self.program)
            .args(&["respawn-pane", "-k", "-t", pane, command])
            .run()?;
        if output.success() {
            Ok(())
        } else if is_missing_target(&output.stderr) {
            Err(Error::SessionNotFound {
                session: pane.to_string(),
            })
        } else {
            Err(Error::ToolFailed {
                tool: self.program.clone(),
                code: output.exit_code,
                message: output.stderr.trim().to_string(),
            })
        }
    }

    fn switch_client(&self, session: &str) -> Result<()> {
        self.tmux(&["switch-client", "-t", session]).run_ok()?;
        Ok(())
    }
}
