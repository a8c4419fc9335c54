use clap::Args;

use super::context::{Environment, IdentityArgs, TownArgs};
use crate::hook::{HookSlots, WorkHook};

#[derive(Debug, Args)]
pub struct ResumeArgs {
    /// Show the hook without consuming it
    #[arg(long)]
    pub peek: bool,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub identity: IdentityArgs,
}

impl ResumeArgs {
    /// Pick up the work slung onto this agent's hook. The slot is burned
    /// unless `--peek` is given; an empty slot is not an error.
    pub fn execute(&self, town: &TownArgs) -> anyhow::Result<()> {
        let town = town.load_or_default()?;
        let env = Environment::from_process();
        let ctx = self.identity.context(&env, &town.root, &town.host());
        let identity = ctx.agent_identity()?;
        let hooks = HookSlots::new(env.cwd.as_deref().unwrap_or(&town.root));

        let hook = if self.peek {
            hooks.peek(&identity)?
        } else {
            hooks.consume(&identity)?
        };

        match (hook, self.json) {
            (Some(hook), true) => println!("{}", serde_json::to_string_pretty(&hook)?),
            (None, true) => println!("null"),
            (Some(hook), false) => print_hook(&hook),
            (None, false) => println!("No work on hook for {identity}"),
        }
        Ok(())
    }
}

fn print_hook(hook: &WorkHook) {
    println!("🪝 {}", hook.issue_id);
    if let Some(subject) = &hook.subject {
        println!("  subject: {subject}");
    }
    println!("  slung:   {}", hook.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(context) = &hook.context {
        println!();
        println!("{context}");
    }
    println!();
    println!("Run `bd show {}` for details.", hook.issue_id);
}
