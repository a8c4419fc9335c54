use clap::Args;

use super::context::{Environment, IdentityArgs, TownArgs};
use crate::handoff::{self, HandoffController, Outcome, PlannedAction, SlingRequest};
use crate::hook::HookSlots;

#[derive(Debug, Args)]
pub struct SlingArgs {
    /// Issue to attach to your hook
    pub issue_id: String,
    /// Subject for the hand-off mail (default: the issue id)
    #[arg(short, long)]
    pub subject: Option<String>,
    /// Context left on the hook for your next session
    #[arg(short, long)]
    pub message: Option<String>,
    /// Show what would happen without writing the hook or restarting
    #[arg(short = 'n', long)]
    pub dry_run: bool,
    #[command(flatten)]
    pub identity: IdentityArgs,
}

impl SlingArgs {
    /// Attach the issue, mail yourself, then restart your own session. The
    /// respawn kills this process, so it runs last.
    pub fn execute(&self, town: &TownArgs) -> anyhow::Result<()> {
        let town = town.load_or_default()?;
        let env = Environment::from_process();
        let host = town.host();
        let ctx = self.identity.context(&env, &town.root, &host);
        let hooks = HookSlots::new(env.cwd.as_deref().unwrap_or(&town.root));
        let (store, notifier) = (town.store(), town.notifier());
        let controller = HandoffController::new(&hooks, &store, &host, &notifier, &town.config.restart);

        let outcome = controller.sling(
            &ctx,
            SlingRequest {
                issue_id: &self.issue_id,
                subject: self.subject.as_deref(),
                message: self.message.as_deref(),
                dry_run: self.dry_run,
            },
        )?;

        match &outcome {
            Outcome::Preview(actions) => print_preview(actions),
            Outcome::RestartSelf { session, .. } => {
                println!("🎯 Slung {} onto hook", self.issue_id);
                println!("Restarting {session}...");
                handoff::restart_self(&host, &outcome)?;
            }
            Outcome::RecycledRemote { .. } => {}
        }
        Ok(())
    }
}

pub(super) fn print_preview(actions: &[PlannedAction]) {
    for action in actions {
        match action {
            PlannedAction::Respawn { .. } => println!("Would execute: {action}"),
            _ => println!("Would {action}"),
        }
    }
}
