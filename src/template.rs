//! Message bodies for landed-convoy and hand-off mail.

use minijinja::{Environment, context};
use serde::Serialize;

use crate::error::Result;

const LANDED_TEMPLATE: &str = include_str!("templates/landed.txt.jinja");
const SLING_TEMPLATE: &str = include_str!("templates/sling.txt.jinja");

/// One issue line in a landed notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LandedIssue {
    pub id: String,
    pub title: String,
    pub status: String,
}

/// Payload produced when a convoy lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LandedNotice {
    pub convoy_id: String,
    pub title: String,
    /// Ordered by issue id.
    pub issues: Vec<LandedIssue>,
    /// Distinct assignees that worked the convoy's issues.
    pub workers: Vec<String>,
    pub duration_secs: i64,
}

impl LandedNotice {
    pub fn subject(&self) -> String {
        format!("🚚 Convoy landed: {}", self.title)
    }
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("landed.txt", LANDED_TEMPLATE)?;
    env.add_template("sling.txt", SLING_TEMPLATE)?;
    Ok(env)
}

pub fn landed_body(notice: &LandedNotice) -> Result<String> {
    let env = environment()?;
    let body = env.get_template("landed.txt")?.render(context! {
        convoy_id => &notice.convoy_id,
        title => &notice.title,
        issues => &notice.issues,
        workers => &notice.workers,
        elapsed => format_elapsed(notice.duration_secs),
    })?;
    Ok(body)
}

/// Body of the mail left for a slung agent. An explicit message wins.
pub fn sling_body(issue_id: &str, message: Option<&str>) -> Result<String> {
    let env = environment()?;
    let body = env.get_template("sling.txt")?.render(context! {
        issue_id => issue_id,
        context => message,
    })?;
    Ok(body)
}

/// `93784` -> `1d 2h 3m`; sub-minute durations print seconds.
pub fn format_elapsed(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        return format!("{secs}s");
    }
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, minutes) = (rem / 3600, (rem % 3600) / 60);
    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(workers: Vec<String>) -> LandedNotice {
        LandedNotice {
            convoy_id: "hq-cv-abc12".into(),
            title: "Auth rewrite".into(),
            issues: vec![
                LandedIssue {
                    id: "bd-b".into(),
                    title: "Token store".into(),
                    status: "closed".into(),
                },
                LandedIssue {
                    id: "gt-a".into(),
                    title: "Login flow".into(),
                    status: "tombstone".into(),
                },
            ],
            workers,
            duration_secs: 7260,
        }
    }

    #[test]
    fn landed_body_lists_issues_and_workers() {
        let body = landed_body(&notice(vec!["gastown/polecats/nux".into(), "beads/crew/joe".into()])).unwrap();
        assert!(body.starts_with("Convoy hq-cv-abc12 has landed: Auth rewrite"));
        assert!(body.contains("- bd-b [closed] Token store\n"));
        assert!(body.contains("- gt-a [tombstone] Login flow"));
        assert!(body.contains("Workers: gastown/polecats/nux, beads/crew/joe"));
        assert!(body.contains("Elapsed: 2h 1m"));
    }

    #[test]
    fn landed_body_without_workers() {
        let body = landed_body(&notice(Vec::new())).unwrap();
        assert!(!body.contains("Workers:"));
        assert!(body.contains("Elapsed:"));
    }

    #[test]
    fn sling_body_defaults_to_bd_hint() {
        assert_eq!(
            sling_body("gt-x", None).unwrap(),
            "Work slung onto hook. Run bd show gt-x for details."
        );
        assert_eq!(sling_body("gt-x", Some("start with the parser")).unwrap(), "start with the parser");
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(-5), "0s");
        assert_eq!(format_elapsed(42), "42s");
        assert_eq!(format_elapsed(60), "1m");
        assert_eq!(format_elapsed(3600), "1h");
        assert_eq!(format_elapsed(93_784), "1d 2h 3m");
    }
}
