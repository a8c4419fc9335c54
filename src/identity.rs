//! Agent identities and session addresses.
//!
//! Session names are decoded exactly once, at the boundary, into a
//! [`SessionAddress`]. Everything past that point switches on the variant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::RestartConfig;
use crate::error::{Error, Result};

/// Prefix shared by every tmux session the town manages.
pub const SESSION_PREFIX: &str = "gt-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mayor,
    Deacon,
    Crew,
    Witness,
    Refinery,
    Polecat,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mayor => "mayor",
            Self::Deacon => "deacon",
            Self::Crew => "crew",
            Self::Witness => "witness",
            Self::Refinery => "refinery",
            Self::Polecat => "polecat",
        }
    }

    /// One per town, addressed without a rig.
    pub const fn is_town_singleton(self) -> bool {
        matches!(self, Self::Mayor | Self::Deacon)
    }

    /// Autonomous workers finish through their own completion path.
    pub const fn is_worker(self) -> bool {
        matches!(self, Self::Polecat)
    }

    /// Parse a role token, accepting the short aliases operators type.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "mayor" | "may" => Some(Self::Mayor),
            "deacon" | "dea" => Some(Self::Deacon),
            "crew" => Some(Self::Crew),
            "witness" | "wit" => Some(Self::Witness),
            "refinery" | "ref" => Some(Self::Refinery),
            "polecat" | "polecats" => Some(Self::Polecat),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (role, rig, name) tuple. Two equal tuples are the same addressable agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentIdentity {
    role: Role,
    rig: Option<String>,
    name: Option<String>,
}

impl AgentIdentity {
    pub const fn mayor() -> Self {
        Self {
            role: Role::Mayor,
            rig: None,
            name: None,
        }
    }

    pub const fn deacon() -> Self {
        Self {
            role: Role::Deacon,
            rig: None,
            name: None,
        }
    }

    pub fn crew(rig: &str, name: &str) -> Result<Self> {
        Self::named(Role::Crew, rig, name)
    }

    pub fn polecat(rig: &str, name: &str) -> Result<Self> {
        Self::named(Role::Polecat, rig, name)
    }

    pub fn witness(rig: &str) -> Result<Self> {
        Self::rig_only(Role::Witness, rig)
    }

    pub fn refinery(rig: &str) -> Result<Self> {
        Self::rig_only(Role::Refinery, rig)
    }

    fn named(role: Role, rig: &str, name: &str) -> Result<Self> {
        validate_rig(rig)?;
        validate_component(role.as_str(), name)?;
        Ok(Self {
            role,
            rig: Some(rig.to_string()),
            name: Some(name.to_string()),
        })
    }

    fn rig_only(role: Role, rig: &str) -> Result<Self> {
        validate_rig(rig)?;
        Ok(Self {
            role,
            rig: Some(rig.to_string()),
            name: None,
        })
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub fn rig(&self) -> Option<&str> {
        self.rig.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// File-name-safe slot key. Components never contain '.', so the
    /// mapping is injective.
    pub fn hook_key(&self) -> String {
        self.to_string().replace('/', ".")
    }

    pub fn session_address(&self) -> SessionAddress {
        if self.role.is_town_singleton() {
            SessionAddress::Singleton(self.role)
        } else {
            SessionAddress::RigScoped(self.clone())
        }
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rig = self.rig.as_deref().unwrap_or_default();
        let name = self.name.as_deref().unwrap_or_default();
        match self.role {
            Role::Mayor | Role::Deacon => f.write_str(self.role.as_str()),
            Role::Witness | Role::Refinery => write!(f, "{rig}/{}", self.role),
            Role::Crew => write!(f, "{rig}/crew/{name}"),
            Role::Polecat => write!(f, "{rig}/polecats/{name}"),
        }
    }
}

impl FromStr for AgentIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["mayor"] => Ok(Self::mayor()),
            ["deacon"] => Ok(Self::deacon()),
            [rig, "witness"] => Self::witness(rig),
            [rig, "refinery"] => Self::refinery(rig),
            [rig, "crew", name] => Self::crew(rig, name),
            [rig, "polecats", name] => Self::polecat(rig, name),
            _ => Err(Error::Validation(format!(
                "unrecognized agent identity {s:?} (expected mayor, deacon, <rig>/witness, <rig>/refinery, <rig>/crew/<name> or <rig>/polecats/<name>)"
            ))),
        }
    }
}

fn validate_component(field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() <= 64
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid {field} name {value:?}: must match [A-Za-z0-9_-]+, max 64 chars"
        )))
    }
}

/// Rig names carry no `-`: it separates the rig from the role in session names.
fn validate_rig(rig: &str) -> Result<()> {
    validate_component("rig", rig)?;
    if rig.contains('-') {
        return Err(Error::Validation(format!(
            "invalid rig name {rig:?}: '-' is reserved as the session name separator"
        )));
    }
    Ok(())
}

/// Where a session lives, decoded once from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAddress {
    /// Town-wide role with a fixed session name.
    Singleton(Role),
    /// Role bound to a rig, possibly with a named sub-context.
    RigScoped(AgentIdentity),
    /// A session name matching no known pattern.
    Literal(String),
}

impl SessionAddress {
    /// Decode a tmux session name.
    pub fn decode(name: &str) -> Self {
        Self::try_decode(name).unwrap_or_else(|| Self::Literal(name.to_string()))
    }

    fn try_decode(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(SESSION_PREFIX)?;
        match rest {
            "mayor" => return Some(Self::Singleton(Role::Mayor)),
            "deacon" => return Some(Self::Singleton(Role::Deacon)),
            _ => {}
        }
        let (rig, role) = rest.split_once('-')?;
        let identity = match role {
            "witness" => AgentIdentity::witness(rig).ok()?,
            "refinery" => AgentIdentity::refinery(rig).ok()?,
            _ => {
                if let Some(name) = role.strip_prefix("crew-") {
                    AgentIdentity::crew(rig, name).ok()?
                } else if let Some(name) = role.strip_prefix("polecat-") {
                    AgentIdentity::polecat(rig, name).ok()?
                } else {
                    return None;
                }
            }
        };
        Some(Self::RigScoped(identity))
    }

    pub fn session_name(&self) -> String {
        match self {
            Self::Singleton(role) => format!("{SESSION_PREFIX}{role}"),
            Self::RigScoped(id) => {
                let rig = id.rig().unwrap_or_default();
                match (id.role(), id.name()) {
                    (Role::Crew, Some(name)) => format!("{SESSION_PREFIX}{rig}-crew-{name}"),
                    (Role::Polecat, Some(name)) => format!("{SESSION_PREFIX}{rig}-polecat-{name}"),
                    (role, _) => format!("{SESSION_PREFIX}{rig}-{role}"),
                }
            }
            Self::Literal(name) => name.clone(),
        }
    }

    /// The agent living in this session, when the address is decodable.
    pub fn identity(&self) -> Option<AgentIdentity> {
        match self {
            Self::Singleton(Role::Deacon) => Some(AgentIdentity::deacon()),
            Self::Singleton(_) => Some(AgentIdentity::mayor()),
            Self::RigScoped(id) => Some(id.clone()),
            Self::Literal(_) => None,
        }
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.session_name())
    }
}

/// The command a freshly respawned session runs to resume its role.
///
/// Rig and identity are not passed: the resumed process re-derives them from
/// its own environment and picks its work up from the hook.
pub fn restart_command(address: &SessionAddress, overrides: &RestartConfig) -> Result<String> {
    let (role, default) = match address {
        SessionAddress::Singleton(Role::Deacon) => (Role::Deacon, "gt dea at"),
        SessionAddress::Singleton(_) => (Role::Mayor, "gt may at"),
        SessionAddress::RigScoped(id) => match id.role() {
            Role::Crew => (Role::Crew, "gt crew at"),
            Role::Witness => (Role::Witness, "gt wit at"),
            Role::Refinery => (Role::Refinery, "gt ref at"),
            _ => {
                return Err(Error::UnknownSessionPattern {
                    session: address.session_name(),
                });
            }
        },
        SessionAddress::Literal(name) => {
            return Err(Error::UnknownSessionPattern {
                session: name.clone(),
            });
        }
    };
    Ok(overrides
        .override_for(role)
        .map_or_else(|| default.to_string(), str::to_string))
}

/// Everything the core knows about "who am I", merged once at the boundary
/// from flags, environment and working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityContext {
    pub role: Option<Role>,
    pub rig: Option<String>,
    pub crew: Option<String>,
    pub polecat: Option<String>,
    /// Name of the tmux session the caller runs in.
    pub current_session: Option<String>,
    /// Pane id of the caller (`TMUX_PANE`).
    pub pane: Option<String>,
}

impl IdentityContext {
    /// Resolve the caller's own identity.
    ///
    /// Order: crew context, polecat context, explicit role, then the
    /// current session name.
    pub fn agent_identity(&self) -> Result<AgentIdentity> {
        if let (Some(rig), Some(crew)) = (&self.rig, &self.crew) {
            return AgentIdentity::crew(rig, crew);
        }
        if let (Some(rig), Some(polecat)) = (&self.rig, &self.polecat) {
            return AgentIdentity::polecat(rig, polecat);
        }
        if let Some(role) = self.role {
            match (role, self.rig.as_deref()) {
                (Role::Mayor, _) => return Ok(AgentIdentity::mayor()),
                (Role::Deacon, _) => return Ok(AgentIdentity::deacon()),
                (Role::Witness, Some(rig)) => return AgentIdentity::witness(rig),
                (Role::Refinery, Some(rig)) => return AgentIdentity::refinery(rig),
                _ => {}
            }
        }
        if let Some(identity) = self
            .current_session
            .as_deref()
            .and_then(|s| SessionAddress::decode(s).identity())
        {
            return Ok(identity);
        }
        Err(Error::IdentityUnresolved(
            "set GT_RIG/GT_CREW, pass --rig/--crew, or run from a crew directory".to_string(),
        ))
    }

    pub fn current_address(&self) -> Option<SessionAddress> {
        self.current_session.as_deref().map(SessionAddress::decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tokens_and_aliases() {
        assert_eq!(Role::from_token("may"), Some(Role::Mayor));
        assert_eq!(Role::from_token("DEACON"), Some(Role::Deacon));
        assert_eq!(Role::from_token("wit"), Some(Role::Witness));
        assert_eq!(Role::from_token("ref"), Some(Role::Refinery));
        assert_eq!(Role::from_token("crew"), Some(Role::Crew));
        assert_eq!(Role::from_token("gt-mayor"), None);
    }

    #[test]
    fn identity_text_parses_back() {
        for text in ["mayor", "deacon", "rigA/witness", "rigA/refinery", "rigA/crew/joe", "rigA/polecats/nux"] {
            let id: AgentIdentity = text.parse().unwrap();
            assert_eq!(id.to_string(), text);
        }
    }

    #[test]
    fn identity_rejects_bad_components() {
        assert!("rigA/crew/".parse::<AgentIdentity>().is_err());
        assert!("rig.A/crew/joe".parse::<AgentIdentity>().is_err());
        assert!("rigA/crew/joe/extra".parse::<AgentIdentity>().is_err());
        assert!("rigA/janitor".parse::<AgentIdentity>().is_err());
    }

    #[test]
    fn hook_keys_do_not_collide() {
        let a = AgentIdentity::crew("a_b", "c").unwrap();
        let b = AgentIdentity::crew("a", "b_c").unwrap();
        assert_ne!(a.hook_key(), b.hook_key());
        assert_eq!(a.hook_key(), "a_b.crew.c");
    }

    #[test]
    fn decode_known_session_names() {
        assert_eq!(SessionAddress::decode("gt-mayor"), SessionAddress::Singleton(Role::Mayor));
        assert_eq!(SessionAddress::decode("gt-deacon"), SessionAddress::Singleton(Role::Deacon));
        assert_eq!(
            SessionAddress::decode("gt-gastown-crew-joe"),
            SessionAddress::RigScoped(AgentIdentity::crew("gastown", "joe").unwrap())
        );
        assert_eq!(
            SessionAddress::decode("gt-beads-witness"),
            SessionAddress::RigScoped(AgentIdentity::witness("beads").unwrap())
        );
        assert_eq!(
            SessionAddress::decode("gt-beads-refinery"),
            SessionAddress::RigScoped(AgentIdentity::refinery("beads").unwrap())
        );
        assert_eq!(
            SessionAddress::decode("gt-beads-polecat-nux"),
            SessionAddress::RigScoped(AgentIdentity::polecat("beads", "nux").unwrap())
        );
    }

    #[test]
    fn decode_unknown_names_as_literal() {
        assert_eq!(SessionAddress::decode("scratch"), SessionAddress::Literal("scratch".into()));
        assert_eq!(SessionAddress::decode("gt-"), SessionAddress::Literal("gt-".into()));
        assert_eq!(
            SessionAddress::decode("gt--witness"),
            SessionAddress::Literal("gt--witness".into())
        );
    }

    #[test]
    fn session_name_inverts_decode() {
        for name in [
            "gt-mayor",
            "gt-deacon",
            "gt-gastown-crew-joe",
            "gt-beads-witness",
            "gt-beads-refinery",
            "gt-beads-polecat-nux",
            "gt-ops-crew-tools-witness",
            "gt-ops_crew-witness",
            "scratch",
        ] {
            assert_eq!(SessionAddress::decode(name).session_name(), name);
        }
    }

    #[test]
    fn hyphenated_crew_names_stay_crew() {
        let address = SessionAddress::decode("gt-ops-crew-tools-witness");
        assert_eq!(
            address,
            SessionAddress::RigScoped(AgentIdentity::crew("ops", "tools-witness").unwrap())
        );
        assert_eq!(
            restart_command(&address, &RestartConfig::default()).unwrap(),
            "gt crew at"
        );
    }

    #[test]
    fn rig_names_reject_separator() {
        assert!(AgentIdentity::witness("ops-crew-tools").is_err());
        assert!(AgentIdentity::crew("a-b", "c").is_err());
        assert!("ops-crew/witness".parse::<AgentIdentity>().is_err());
        let witness = AgentIdentity::witness("ops_crew").unwrap();
        assert_eq!(SessionAddress::decode(&witness.session_address().session_name()), witness.session_address());
    }

    #[test]
    fn restart_commands_per_role() {
        let none = RestartConfig::default();
        let cmd = |name: &str| restart_command(&SessionAddress::decode(name), &none);
        assert_eq!(cmd("gt-mayor").unwrap(), "gt may at");
        assert_eq!(cmd("gt-deacon").unwrap(), "gt dea at");
        assert_eq!(cmd("gt-gastown-crew-joe").unwrap(), "gt crew at");
        assert_eq!(cmd("gt-gastown-witness").unwrap(), "gt wit at");
        assert_eq!(cmd("gt-gastown-refinery").unwrap(), "gt ref at");
    }

    #[test]
    fn restart_command_unknown_patterns() {
        let none = RestartConfig::default();
        for name in ["scratch", "gt-gastown-polecat-nux"] {
            let err = restart_command(&SessionAddress::decode(name), &none).unwrap_err();
            assert!(matches!(err, Error::UnknownSessionPattern { ref session } if session == name));
        }
    }

    #[test]
    fn restart_command_honors_overrides() {
        let overrides = RestartConfig {
            witness: Some("gt witness attach".into()),
            ..RestartConfig::default()
        };
        let address = SessionAddress::decode("gt-gastown-witness");
        assert_eq!(restart_command(&address, &overrides).unwrap(), "gt witness attach");
    }

    #[test]
    fn context_prefers_crew_over_session() {
        let ctx = IdentityContext {
            rig: Some("rigA".into()),
            crew: Some("joe".into()),
            current_session: Some("gt-mayor".into()),
            ..IdentityContext::default()
        };
        assert_eq!(ctx.agent_identity().unwrap().to_string(), "rigA/crew/joe");
    }

    #[test]
    fn context_detects_polecat() {
        let ctx = IdentityContext {
            rig: Some("rigA".into()),
            polecat: Some("nux".into()),
            ..IdentityContext::default()
        };
        assert_eq!(ctx.agent_identity().unwrap().role(), Role::Polecat);
    }

    #[test]
    fn context_falls_back_to_session_name() {
        let ctx = IdentityContext {
            current_session: Some("gt-beads-witness".into()),
            ..IdentityContext::default()
        };
        assert_eq!(ctx.agent_identity().unwrap().to_string(), "beads/witness");
    }

    #[test]
    fn empty_context_is_unresolved() {
        let err = IdentityContext::default().agent_identity().unwrap_err();
        assert!(matches!(err, Error::IdentityUnresolved(_)));

        let literal = IdentityContext {
            current_session: Some("scratch".into()),
            ..IdentityContext::default()
        };
        assert!(matches!(literal.agent_identity(), Err(Error::IdentityUnresolved(_))));
    }
}
