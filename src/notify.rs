use std::time::Duration;

use crate::error::{Error, Result};
use crate::subprocess::Tool;

/// Delivers a message to an agent or operator mailbox.
pub trait Notifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Sends mail by running the configured command, e.g. `gt mail send`.
#[derive(Debug, Clone)]
pub struct MailNotifier {
    command: Vec<String>,
    timeout: Duration,
}

impl MailNotifier {
    pub const fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn invocation(&self, to: &str, subject: &str, body: &str) -> Result<Tool> {
        let (program, base) = self
            .command
            .split_first()
            .ok_or_else(|| Error::Config("notify.command is empty".to_string()))?;
        let base: Vec<&str> = base.iter().map(String::as_str).collect();
        Ok(Tool::new(program)
            .args(&base)
            .args(&[to, "-s", subject, "-m", body])
            .timeout(self.timeout))
    }
}

impl Notifier for MailNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.invocation(to, subject, body)?.run_ok()?;
        tracing::debug!(to, subject, "mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_config_error() {
        let notifier = MailNotifier::new(Vec::new(), Duration::from_secs(1));
        let err = notifier.send("mayor", "hi", "body").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn appends_recipient_subject_and_body() {
        let notifier = MailNotifier::new(vec!["echo".into(), "mail".into()], Duration::from_secs(5));
        let out = notifier
            .invocation("beads/crew/joe", "🎯 SLUNG: gt-x", "body")
            .unwrap()
            .run_ok()
            .unwrap();
        assert_eq!(out.stdout.trim(), "mail beads/crew/joe -s 🎯 SLUNG: gt-x -m body");
    }

    #[test]
    fn failing_command_reports_error() {
        let notifier = MailNotifier::new(vec!["false".into()], Duration::from_secs(5));
        assert!(matches!(
            notifier.send("mayor", "s", "b"),
            Err(Error::ToolFailed { .. })
        ));
    }
}
