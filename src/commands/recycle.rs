use clap::Args;

use super::context::{Environment, IdentityArgs, TownArgs};
use super::sling::print_preview;
use crate::handoff::{self, HandoffController, Outcome, RecycleRequest, ViewSwitch};
use crate::hook::HookSlots;

#[derive(Debug, Args)]
pub struct RecycleArgs {
    /// Role (mayor, deacon, witness, refinery, crew) or session name.
    /// Default: the current session.
    pub target: Option<String>,
    /// Switch your tmux client to the recycled session
    #[arg(short, long)]
    pub watch: bool,
    /// Show what would happen without restarting anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,
    #[command(flatten)]
    pub identity: IdentityArgs,
}

impl RecycleArgs {
    pub fn execute(&self, town: &TownArgs) -> anyhow::Result<()> {
        let town = town.load_or_default()?;
        let env = Environment::from_process();
        let host = town.host();
        let ctx = self.identity.context(&env, &town.root, &host);
        let hooks = HookSlots::new(&town.root);
        let (store, notifier) = (town.store(), town.notifier());
        let controller = HandoffController::new(&hooks, &store, &host, &notifier, &town.config.restart);

        let outcome = controller.recycle(
            &ctx,
            RecycleRequest {
                target: self.target.as_deref(),
                watch: self.watch,
                dry_run: self.dry_run,
            },
        )?;

        match &outcome {
            Outcome::Preview(actions) => print_preview(actions),
            Outcome::RecycledRemote { session, view, .. } => {
                println!("♻ Recycled {session}");
                match view {
                    ViewSwitch::Switched => println!("Switched to {session}"),
                    ViewSwitch::Failed(reason) => {
                        eprintln!("warning: could not switch to {session}: {reason}");
                    }
                    ViewSwitch::NotRequested => {}
                }
            }
            Outcome::RestartSelf { session, .. } => {
                println!("Restarting {session}...");
                handoff::restart_self(&host, &outcome)?;
            }
        }
        Ok(())
    }
}
