use std::process::ExitCode;

use clap::{Parser, Subcommand};

use gastown::commands::context::TownArgs;
use gastown::commands::convoy::ConvoyCommand;
use gastown::commands::queue::QueueArgs;
use gastown::commands::recycle::RecycleArgs;
use gastown::commands::resume::ResumeArgs;
use gastown::commands::schema::SchemaArgs;
use gastown::commands::sling::SlingArgs;
use gastown::error::Error;

#[derive(Debug, Parser)]
#[command(
    name = "gt",
    version,
    about = "Convoy tracking, dispatch and work hand-off for Gas Town agents"
)]
struct Cli {
    #[command(flatten)]
    town: TownArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Track batches of issues and land them when done
    Convoy {
        #[command(subcommand)]
        command: ConvoyCommand,
    },
    /// Queue a single issue into its rig (auto-creates a convoy)
    Queue(QueueArgs),
    /// Attach an issue to your hook and restart with it
    Sling(SlingArgs),
    /// Restart an agent session in place
    Recycle(RecycleArgs),
    /// Pick up the work on your hook
    Resume(ResumeArgs),
    /// Print the JSON Schema for .gastown.toml
    Schema(SchemaArgs),
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Convoy { command } => command.name(),
            Self::Queue(_) => "queue",
            Self::Sling(_) => "sling",
            Self::Recycle(_) => "recycle",
            Self::Resume(_) => "resume",
            Self::Schema(_) => "schema",
        }
    }
}

fn main() -> ExitCode {
    let _telemetry = gastown::telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match &cli.command {
        Commands::Convoy { command } => command.execute(&cli.town),
        Commands::Queue(args) => args.execute(&cli.town),
        Commands::Sling(args) => args.execute(&cli.town),
        Commands::Recycle(args) => args.execute(&cli.town),
        Commands::Resume(args) => args.execute(&cli.town),
        Commands::Schema(args) => args.execute(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(err) = e.downcast_ref::<Error>() {
                tracing::debug!(code = err.code(), "command failed");
                eprintln!("error: {err}");
                err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
