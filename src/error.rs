use std::process::ExitCode;

/// Marker carried by every error that comes from an unhealthy issue store
/// rather than from missing data.
pub const STORAGE_FAULT: &str = "storage-layer fault";

/// Errors that cause gt to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("cannot resolve agent identity: {0}")]
    IdentityUnresolved(String),

    #[error("unknown session type: {session} (try specifying the role explicitly)")]
    UnknownSessionPattern { session: String },

    #[error("{role} agents cannot {action} ({hint})")]
    RoleNotAllowed {
        role: &'static str,
        action: &'static str,
        hint: &'static str,
    },

    #[error("session '{session}' not found - is the agent running?")]
    SessionNotFound { session: String },

    #[error("storage-layer fault in {tool}: {message}")]
    Infrastructure { tool: String, message: String },

    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("{tool} failed (exit {code}): {message}")]
    ToolFailed {
        tool: String,
        code: i32,
        message: String,
    },

    #[error("{tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True when the failure means the store is unhealthy, not that data is absent.
    pub const fn is_storage_fault(&self) -> bool {
        matches!(self, Self::Infrastructure { .. })
    }

    /// Numeric exit status for this error category.
    pub const fn code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Validation(_) => 2,
            Self::NotFound { .. } => 3,
            Self::IdentityUnresolved(_) | Self::UnknownSessionPattern { .. } => 4,
            Self::RoleNotAllowed { .. } => 5,
            Self::SessionNotFound { .. } => 6,
            Self::Infrastructure { .. } => 7,
            Self::ToolNotFound { .. } => 8,
            Self::ToolFailed { .. } | Self::Timeout { .. } => 9,
            Self::Io { .. } | Self::Json(_) | Self::Template(_) | Self::Other(_) => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}
