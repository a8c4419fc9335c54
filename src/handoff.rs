//! Sling and recycle.
//!
//! Restarting the caller's own session ends the caller, so the controller
//! never does it. It returns [`Outcome::RestartSelf`] and the binary runs it
//! as its last act through [`restart_self`].

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::RestartConfig;
use crate::error::{Error, Result};
use crate::hook::{HookSlots, WorkHook};
use crate::identity::{AgentIdentity, IdentityContext, Role, SessionAddress, restart_command};
use crate::notify::Notifier;
use crate::session::SessionHost;
use crate::store::{IssueStore, validate_issue_id};
use crate::template;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PlannedAction {
    WriteHook { path: PathBuf, hook: WorkHook },
    Notify { to: String, subject: String },
    Respawn { pane: String, command: String },
    SwitchClient { session: String },
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteHook { path, hook } => {
                write!(f, "write hook {} (issue {})", path.display(), hook.issue_id)
            }
            Self::Notify { to, subject } => write!(f, "mail {to}: {subject}"),
            Self::Respawn { pane, command } => write!(f, "tmux respawn-pane -k -t {pane} {command}"),
            Self::SwitchClient { session } => write!(f, "tmux switch-client -t {session}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewSwitch {
    NotRequested,
    Switched,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Respawn the caller's own pane. Must be the caller's final action.
    RestartSelf {
        session: String,
        pane: String,
        command: String,
    },
    /// Another session was restarted; nothing is left to do.
    RecycledRemote {
        session: String,
        pane: String,
        command: String,
        view: ViewSwitch,
    },
    /// Dry run: what would have happened, in order.
    Preview(Vec<PlannedAction>),
}

/// Run a [`Outcome::RestartSelf`]. Other outcomes are already complete.
pub fn restart_self(host: &dyn SessionHost, outcome: &Outcome) -> Result<()> {
    if let Outcome::RestartSelf { pane, command, .. } = outcome {
        host.respawn(pane, command)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlingRequest<'r> {
    pub issue_id: &'r str,
    pub subject: Option<&'r str>,
    /// Free-text context left on the hook and in the hand-off mail.
    pub message: Option<&'r str>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecycleRequest<'r> {
    /// Role token or session name. `None` means the caller's own session.
    pub target: Option<&'r str>,
    pub watch: bool,
    pub dry_run: bool,
}

pub struct HandoffController<'a> {
    hooks: &'a HookSlots,
    store: &'a dyn IssueStore,
    host: &'a dyn SessionHost,
    notifier: &'a dyn Notifier,
    restart: &'a RestartConfig,
}

impl<'a> HandoffController<'a> {
    pub fn new(
        hooks: &'a HookSlots,
        store: &'a dyn IssueStore,
        host: &'a dyn SessionHost,
        notifier: &'a dyn Notifier,
        restart: &'a RestartConfig,
    ) -> Self {
        Self {
            hooks,
            store,
            host,
            notifier,
            restart,
        }
    }

    /// Attach work to the caller's hook and hand back the self-restart.
    ///
    /// Every fallible check runs before the hook is written, so a refused
    /// sling leaves no hook behind.
    pub fn sling(&self, ctx: &IdentityContext, req: SlingRequest<'_>) -> Result<Outcome> {
        validate_issue_id(req.issue_id)?;
        let identity = ctx.agent_identity()?;
        if identity.role().is_worker() || ctx.polecat.is_some() {
            return Err(Error::RoleNotAllowed {
                role: Role::Polecat.as_str(),
                action: "sling",
                hint: "use `gt done` to hand off finished work",
            });
        }
        let (session, pane) = self_session(ctx)?;
        let command = restart_command(&SessionAddress::decode(&session), self.restart)?;

        let to = identity.to_string();
        let subject = format!("🎯 SLUNG: {}", req.subject.unwrap_or(req.issue_id));
        let body = template::sling_body(req.issue_id, req.message)?;

        if req.dry_run {
            self.store.show(req.issue_id)?;
            let hook = WorkHook::new(&identity, req.issue_id, req.subject, req.message);
            return Ok(Outcome::Preview(vec![
                PlannedAction::WriteHook {
                    path: self.hooks.path_for(&identity),
                    hook,
                },
                PlannedAction::Notify { to, subject },
                PlannedAction::Respawn { pane, command },
            ]));
        }

        self.hooks
            .attach(self.store, &identity, req.issue_id, req.subject, req.message)?;
        match self.notifier.send(&to, &subject, &body) {
            Ok(()) => tracing::info!(to = %to, "hand-off mail sent"),
            Err(e) => tracing::warn!(to = %to, error = %e, "could not send hand-off mail"),
        }
        Ok(Outcome::RestartSelf {
            session,
            pane,
            command,
        })
    }

    /// Restart a session in place: the caller's own, or a live remote one.
    pub fn recycle(&self, ctx: &IdentityContext, req: RecycleRequest<'_>) -> Result<Outcome> {
        let address = resolve_target(ctx, req.target)?;
        let command = restart_command(&address, self.restart)?;
        let session = address.session_name();

        if ctx.current_session.as_deref() == Some(session.as_str()) {
            let (session, pane) = self_session(ctx)?;
            if req.dry_run {
                return Ok(Outcome::Preview(vec![PlannedAction::Respawn { pane, command }]));
            }
            return Ok(Outcome::RestartSelf {
                session,
                pane,
                command,
            });
        }

        if !self.host.has_session(&session)? {
            return Err(Error::SessionNotFound { session });
        }
        let pane = self.host.first_pane(&session)?;

        if req.dry_run {
            let mut actions = vec![PlannedAction::Respawn { pane, command }];
            if req.watch {
                actions.push(PlannedAction::SwitchClient { session });
            }
            return Ok(Outcome::Preview(actions));
        }

        self.host.respawn(&pane, &command)?;
        tracing::info!(session = %session, pane = %pane, "remote session recycled");
        let view = if req.watch {
            match self.host.switch_client(&session) {
                Ok(()) => ViewSwitch::Switched,
                Err(e) => {
                    tracing::warn!(session = %session, error = %e, "could not switch view");
                    ViewSwitch::Failed(e.to_string())
                }
            }
        } else {
            ViewSwitch::NotRequested
        };
        Ok(Outcome::RecycledRemote {
            session,
            pane,
            command,
            view,
        })
    }
}

fn self_session(ctx: &IdentityContext) -> Result<(String, String)> {
    let session = ctx.current_session.clone().ok_or_else(|| {
        Error::IdentityUnresolved("not running inside a tmux session - cannot restart".to_string())
    })?;
    let pane = ctx
        .pane
        .clone()
        .ok_or_else(|| Error::IdentityUnresolved("TMUX_PANE not set - cannot restart".to_string()))?;
    Ok((session, pane))
}

/// Map a role token or session name onto a session address.
///
/// Rig-scoped roles take their rig from the context, falling back to the
/// rig of the caller's own session.
pub fn resolve_target(ctx: &IdentityContext, target: Option<&str>) -> Result<SessionAddress> {
    let Some(token) = target.map(str::trim).filter(|t| !t.is_empty()) else {
        return ctx.current_address().ok_or_else(|| {
            Error::IdentityUnresolved(
                "not in a tmux session; name a role or session to recycle".to_string(),
            )
        });
    };
    let Some(role) = Role::from_token(token) else {
        return Ok(SessionAddress::decode(token));
    };
    let identity = match role {
        Role::Mayor | Role::Deacon => return Ok(SessionAddress::Singleton(role)),
        Role::Witness => AgentIdentity::witness(&scoped_rig(ctx, role)?)?,
        Role::Refinery => AgentIdentity::refinery(&scoped_rig(ctx, role)?)?,
        Role::Crew => {
            let rig = scoped_rig(ctx, role)?;
            let name = ctx.crew.as_deref().ok_or_else(|| {
                Error::IdentityUnresolved("crew member unknown: set GT_CREW or pass --crew".to_string())
            })?;
            AgentIdentity::crew(&rig, name)?
        }
        Role::Polecat => {
            let rig = scoped_rig(ctx, role)?;
            let name = ctx.polecat.as_deref().ok_or_else(|| {
                Error::IdentityUnresolved("polecat name unknown: set GT_POLECAT".to_string())
            })?;
            AgentIdentity::polecat(&rig, name)?
        }
    };
    Ok(SessionAddress::RigScoped(identity))
}

fn scoped_rig(ctx: &IdentityContext, role: Role) -> Result<String> {
    if let Some(rig) = &ctx.rig {
        return Ok(rig.clone());
    }
    ctx.current_address()
        .and_then(|a| a.identity())
        .and_then(|id| id.rig().map(str::to_string))
        .ok_or_else(|| {
            Error::IdentityUnresolved(format!(
                "cannot tell which rig's {role} to recycle: set GT_RIG or pass --rig"
            ))
        })
}
