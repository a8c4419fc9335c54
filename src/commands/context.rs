//! Everything commands read from the outside world: town config, process
//! environment, working directory and the tmux client. Merged here once and
//! handed to the core as plain values.

use std::path::{Component, Path, PathBuf};

use clap::Args;

use crate::config::{self, Config};
use crate::error::Error;
use crate::identity::{IdentityContext, Role};
use crate::ledger::FileLedger;
use crate::notify::MailNotifier;
use crate::session::{SessionHost, TmuxHost};
use crate::store::BdStore;
use crate::subprocess::run_command;

#[derive(Debug, Clone, Default, Args)]
pub struct TownArgs {
    /// Town root directory (default: nearest parent holding .gastown.toml)
    #[arg(long, global = true)]
    pub town_root: Option<PathBuf>,
}

/// A loaded town: where it lives and how it is configured.
#[derive(Debug, Clone)]
pub struct Town {
    pub root: PathBuf,
    pub config: Config,
}

impl TownArgs {
    /// (config path, town root), or `None` when no config exists.
    fn locate(&self) -> anyhow::Result<Option<(PathBuf, PathBuf)>> {
        Ok(match &self.town_root {
            Some(root) => config::find_config(root).map(|path| (path, root.clone())),
            None => config::find_town_root(&std::env::current_dir()?).ok(),
        })
    }

    fn start_dir(&self) -> anyhow::Result<PathBuf> {
        Ok(match &self.town_root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        })
    }

    /// Load the town config; a missing config is an error.
    pub fn load(&self) -> anyhow::Result<Town> {
        let Some((path, root)) = self.locate()? else {
            return Err(Error::Config(format!(
                "no {} or {} found in {} or any parent",
                config::CONFIG_TOML,
                config::CONFIG_JSON,
                self.start_dir()?.display()
            ))
            .into());
        };
        let config = Config::load(&path)?;
        tracing::debug!(town = %root.display(), "loaded town config");
        Ok(Town { root, config })
    }

    /// Like [`Self::load`], but fall back to defaults rooted at the start
    /// directory when no town config exists. A config that exists but does
    /// not parse is still an error.
    pub fn load_or_default(&self) -> anyhow::Result<Town> {
        if self.locate()?.is_some() {
            return self.load();
        }
        let root = self.start_dir()?;
        tracing::debug!(dir = %root.display(), "no town config, using defaults");
        Ok(Town {
            root,
            config: Config::default(),
        })
    }
}

impl Town {
    pub fn store(&self) -> BdStore {
        BdStore::new(&self.config.tools.bd, self.config.tools.timeout()).in_dir(&self.root)
    }

    pub fn ledger(&self) -> FileLedger {
        FileLedger::for_town(&self.root)
    }

    pub fn host(&self) -> TmuxHost {
        TmuxHost::new(&self.config.tools.tmux, self.config.tools.timeout())
    }

    pub fn notifier(&self) -> MailNotifier {
        MailNotifier::new(self.config.notify.command.clone(), self.config.tools.timeout())
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct IdentityArgs {
    /// Rig name (default: $GT_RIG or detected from the working directory)
    #[arg(long)]
    pub rig: Option<String>,
    /// Crew member name (default: $GT_CREW or detected from the working directory)
    #[arg(long)]
    pub crew: Option<String>,
}

/// Process facts identity resolution depends on.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub role: Option<String>,
    pub rig: Option<String>,
    pub crew: Option<String>,
    pub polecat: Option<String>,
    pub in_tmux: bool,
    pub pane: Option<String>,
    pub cwd: Option<PathBuf>,
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            role: env_nonempty("GT_ROLE"),
            rig: env_nonempty("GT_RIG"),
            crew: env_nonempty("GT_CREW"),
            polecat: env_nonempty("GT_POLECAT"),
            in_tmux: env_nonempty("TMUX").is_some(),
            pane: env_nonempty("TMUX_PANE"),
            cwd: clone_root().or_else(|| std::env::current_dir().ok()),
        }
    }
}

impl IdentityArgs {
    /// Merge flags, environment, working directory and the tmux session
    /// into one context. Flags win over environment, environment over cwd.
    pub fn context(&self, env: &Environment, town_root: &Path, host: &dyn SessionHost) -> IdentityContext {
        let mut rig = self.rig.clone().or_else(|| env.rig.clone());
        let mut crew = self.crew.clone().or_else(|| env.crew.clone());
        if (rig.is_none() || crew.is_none())
            && env.polecat.is_none()
            && let Some((dir_rig, dir_crew)) = env
                .cwd
                .as_deref()
                .and_then(|cwd| detect_crew_from_cwd(cwd, town_root))
        {
            rig = rig.or(Some(dir_rig));
            crew = crew.or(Some(dir_crew));
        }

        let current_session = if env.in_tmux {
            host.current_session().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not read current tmux session");
                None
            })
        } else {
            None
        };

        IdentityContext {
            role: env.role.as_deref().and_then(Role::from_token),
            rig,
            crew,
            polecat: env.polecat.clone(),
            current_session,
            pane: env.pane.clone().filter(|_| env.in_tmux),
        }
    }
}

/// `<town>/<rig>/crew/<name>[/...]` -> `(rig, name)`.
pub fn detect_crew_from_cwd(cwd: &Path, town_root: &Path) -> Option<(String, String)> {
    let rel = cwd.strip_prefix(town_root).ok()?;
    let mut parts = rel.components().filter_map(|c| match c {
        Component::Normal(s) => s.to_str(),
        _ => None,
    });
    let rig = parts.next()?;
    if parts.next()? != "crew" {
        return None;
    }
    let name = parts.next()?;
    Some((rig.to_string(), name.to_string()))
}

/// Top of the current git clone; hook slots live here.
pub fn clone_root() -> Option<PathBuf> {
    run_command("git", &["rev-parse", "--show-toplevel"], None)
        .ok()
        .map(|out| PathBuf::from(out.trim()))
        .filter(|p| !p.as_os_str().is_empty())
}
