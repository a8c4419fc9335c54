use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::Role;

/// Config file name constants.
pub const CONFIG_TOML: &str = ".gastown.toml";
pub const CONFIG_JSON: &str = ".gastown.json";

/// Find the config file path, preferring .gastown.toml over .gastown.json.
/// Returns None if neither exists.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    let toml_path = dir.join(CONFIG_TOML);
    if toml_path.exists() {
        return Some(toml_path);
    }
    let json_path = dir.join(CONFIG_JSON);
    if json_path.exists() {
        return Some(json_path);
    }
    None
}

/// Walk up from `start` to the nearest directory holding a town config.
/// Returns (`config_path`, `town_root`).
pub fn find_town_root(start: &Path) -> Result<(PathBuf, PathBuf)> {
    for dir in start.ancestors() {
        if let Some(path) = find_config(dir) {
            return Ok((path, dir.to_path_buf()));
        }
    }
    Err(Error::Config(format!(
        "no {CONFIG_TOML} or {CONFIG_JSON} found in {} or any parent",
        start.display()
    )))
}

/// Top-level .gastown.toml config.
///
/// Every section is optional; a town with no rigs can still recycle
/// sessions, it just has nowhere to dispatch work.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub town: TownConfig,
    /// Rig name -> rig settings.
    #[serde(default)]
    pub rigs: BTreeMap<String, RigConfig>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub restart: RestartConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TownConfig {
    #[serde(default = "default_town_name")]
    pub name: String,
    /// Issue-id prefix of the town-root namespace (convoys live here).
    #[serde(default = "default_town_prefix")]
    pub prefix: String,
}

impl Default for TownConfig {
    fn default() -> Self {
        Self {
            name: default_town_name(),
            prefix: default_town_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RigConfig {
    /// Issue-id prefix owned by this rig, e.g. `gt` for `gt-abc`.
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DispatchConfig {
    /// Label marking an issue as sitting in a rig backlog.
    #[serde(default = "default_queue_label", alias = "queueLabel")]
    pub queue_label: String,
    /// Formula attached to queued work.
    #[serde(default = "default_formula")]
    pub formula: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_label: default_queue_label(),
            formula: default_formula(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolsConfig {
    #[serde(default = "default_bd")]
    pub bd: String,
    #[serde(default = "default_tmux")]
    pub tmux: String,
    #[serde(default = "default_tool_timeout", alias = "timeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bd: default_bd(),
            tmux: default_tmux(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl ToolsConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotifyConfig {
    /// Mail command; recipient, `-s <subject>` and `-m <body>` are appended.
    #[serde(default = "default_notify_command")]
    pub command: Vec<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            command: default_notify_command(),
        }
    }
}

/// Per-role overrides for the command a restarted session runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RestartConfig {
    #[serde(default)]
    pub mayor: Option<String>,
    #[serde(default)]
    pub deacon: Option<String>,
    #[serde(default)]
    pub crew: Option<String>,
    #[serde(default)]
    pub witness: Option<String>,
    #[serde(default)]
    pub refinery: Option<String>,
}

impl RestartConfig {
    pub fn override_for(&self, role: Role) -> Option<&str> {
        match role {
            Role::Mayor => self.mayor.as_deref(),
            Role::Deacon => self.deacon.as_deref(),
            Role::Crew => self.crew.as_deref(),
            Role::Witness => self.witness.as_deref(),
            Role::Refinery => self.refinery.as_deref(),
            Role::Polecat => None,
        }
    }
}

// Default value functions for serde
fn default_town_name() -> String { "town".into() }
fn default_town_prefix() -> String { "hq".into() }
fn default_queue_label() -> String { "gt:queued".into() }
fn default_formula() -> String { "mol-polecat-work".into() }
fn default_bd() -> String { "bd".into() }
fn default_tmux() -> String { "tmux".into() }
const fn default_tool_timeout() -> u64 { 30 }
fn default_notify_command() -> Vec<String> {
    vec!["gt".into(), "mail".into(), "send".into()]
}

impl Config {
    /// Load config from a file (TOML or JSON, auto-detected by extension).
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "json" => Self::parse_json(&contents)?,
            _ => Self::parse_toml(&contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string.
    pub fn parse_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("invalid {CONFIG_TOML}: {e}")))
    }

    /// Parse config from a JSON string.
    pub fn parse_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid {CONFIG_JSON}: {e}")))
    }

    /// Every prefix must identify exactly one namespace.
    pub fn validate(&self) -> Result<()> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        owners.insert(self.town.prefix.as_str(), "town root");
        for (rig, rc) in &self.rigs {
            if rig.contains('-') {
                return Err(Error::Config(format!(
                    "rig name {rig:?} must not contain '-'"
                )));
            }
            if rc.prefix.is_empty() || rc.prefix.contains('-') {
                return Err(Error::Config(format!(
                    "rig {rig}: prefix {:?} must be non-empty and contain no '-'",
                    rc.prefix
                )));
            }
            if let Some(other) = owners.insert(rc.prefix.as_str(), rig.as_str()) {
                return Err(Error::Config(format!(
                    "prefix {:?} is claimed by both {other} and rig {rig}",
                    rc.prefix
                )));
            }
        }
        Ok(())
    }

    /// Rig owning issues with this prefix. The town-root prefix and unknown
    /// prefixes have no rig.
    pub fn rig_for_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == self.town.prefix {
            return None;
        }
        self.rigs
            .iter()
            .find(|(_, rc)| rc.prefix == prefix)
            .map(|(name, _)| name.as_str())
    }
}
