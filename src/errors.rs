use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline phase a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preflight,
    PreHook,
    Restore,
    PostHook,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Preflight => write!(f, "preflight"),
            Phase::PreHook => write!(f, "pre-restore hook"),
            Phase::Restore => write!(f, "restore"),
            Phase::PostHook => write!(f, "post-restore hook"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("dump file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("required client tool not found: {0}. Install the PostgreSQL client tools and make sure they are in your PATH")]
    ToolNotFound(&'static str),

    #[error("authentication required: no valid access token. Set one in the config file or via RESTORETOOL_TOKEN")]
    AuthenticationRequired,

    #[error("service \"{0}\" not found in this project")]
    ServiceNotFound(String),

    #[error("could not reach {endpoint}: {reason}")]
    Connectivity { endpoint: String, reason: String },

    #[error("preflight check failed: {0}")]
    Preflight(String),

    #[error("unrecognized dump format \"{0}\" (expected plain, plain-compressed, custom, tar or directory)")]
    UnrecognizedFormat(String),

    #[error("{phase} failed: {source}")]
    Hook {
        phase: Phase,
        source: sqlx::Error,
    },

    /// Non-zero exit from pg_restore or psql. `recoverable` marks the
    /// archive-tool warning heuristic: the tool exited non-zero but wrote
    /// diagnostics, which commonly happens for benign warnings.
    #[error("{message}")]
    Tool {
        phase: Phase,
        message: String,
        line: Option<u64>,
        output: Option<String>,
        recoverable: bool,
    },

    #[error("secret storage error: {0}")]
    Secret(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl RestoreError {
    /// Archive-tool exit with diagnostics on stderr: classified as a
    /// warning-grade failure, payload preserved verbatim.
    pub fn tool_warning(output: String) -> Self {
        RestoreError::Tool {
            phase: Phase::Restore,
            message: "pg_restore reported errors during the restore (see output above); \
                      the dump may still have been applied in part"
                .to_string(),
            line: None,
            output: Some(output),
            recoverable: true,
        }
    }

    /// Archive-tool exit with a silent stderr: nothing to classify.
    pub fn tool_fatal(message: String) -> Self {
        RestoreError::Tool {
            phase: Phase::Restore,
            message,
            line: None,
            output: None,
            recoverable: false,
        }
    }

    /// Script-interpreter failure; always fatal, optionally tagged with the
    /// dump line that produced the first ERROR.
    pub fn script_failed(message: String, line: Option<u64>, output: Option<String>) -> Self {
        RestoreError::Tool {
            phase: Phase::Restore,
            message,
            line,
            output,
            recoverable: false,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            RestoreError::Hook { phase, .. } | RestoreError::Tool { phase, .. } => Some(*phase),
            RestoreError::InputNotFound(_)
            | RestoreError::ToolNotFound(_)
            | RestoreError::AuthenticationRequired
            | RestoreError::ServiceNotFound(_)
            | RestoreError::Connectivity { .. }
            | RestoreError::Preflight(_)
            | RestoreError::UnrecognizedFormat(_) => Some(Phase::Preflight),
            _ => None,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, RestoreError::Tool { recoverable: true, .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RestoreError::Cancelled)
    }
}

pub type Result<T, E = RestoreError> = std::result::Result<T, E>;
