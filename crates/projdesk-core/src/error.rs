use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    SettingsParseError,
    RemoteNotConfigured,
    ProjectNotFound,
    ChannelNotFound,
    DocumentNotFound,
    Conflict,
    InvalidInput,
    AccessDenied,
    RemoteUnavailable,
    RemoteAuthFailed,
    DocumentMalformed,
    RevisionConflict,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::SettingsParseError => "E1001",
            Self::RemoteNotConfigured => "E1002",
            Self::ProjectNotFound => "E2001",
            Self::ChannelNotFound => "E2002",
            Self::DocumentNotFound => "E2003",
            Self::Conflict => "E2004",
            Self::InvalidInput => "E2005",
            Self::AccessDenied => "E4001",
            Self::RemoteUnavailable => "E5001",
            Self::RemoteAuthFailed => "E5002",
            Self::DocumentMalformed => "E5003",
            Self::RevisionConflict => "E5004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SettingsParseError => "Settings file parse error",
            Self::RemoteNotConfigured => "Remote document not configured",
            Self::ProjectNotFound => "Project not found",
            Self::ChannelNotFound => "Channel mapping not found",
            Self::DocumentNotFound => "Remote document not found",
            Self::Conflict => "Conflicting change",
            Self::InvalidInput => "Invalid input",
            Self::AccessDenied => "Access denied",
            Self::RemoteUnavailable => "Remote document unavailable",
            Self::RemoteAuthFailed => "Remote document rejected credentials",
            Self::DocumentMalformed => "Remote document is malformed",
            Self::RevisionConflict => "Remote document changed concurrently",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::SettingsParseError => Some("Fix syntax in .projdesk/config.toml and retry."),
            Self::RemoteNotConfigured => {
                Some("Set PROJDESK_GIST_ID or PROJDESK_DOCUMENT, or add a [remote] section.")
            }
            Self::ProjectNotFound => Some("Check the client name with `pdk list`."),
            Self::ChannelNotFound => Some("List current mappings with `pdk admin show`."),
            Self::DocumentNotFound => Some("Verify the gist id or document path."),
            Self::Conflict => {
                Some("Use a client name that is not taken, or retry if another writer raced you.")
            }
            Self::InvalidInput => None,
            Self::AccessDenied => {
                Some("Ask an administrator to add you to the authorized users list.")
            }
            Self::RemoteUnavailable => Some("Retry later; the remote endpoint did not respond."),
            Self::RemoteAuthFailed => Some("Check GITHUB_TOKEN and its gist scope."),
            Self::DocumentMalformed => Some("Repair the remote JSON document by hand."),
            Self::RevisionConflict => Some("Retry; another writer updated the document."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures of the remote document endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Transient transport failure; retried by the client before surfacing.
    #[error("network error talking to remote document: {0}")]
    Network(String),

    /// The endpoint rejected our credentials. Never retried.
    #[error("remote document rejected credentials: {0}")]
    Auth(String),

    /// The payload could not be decoded or was rejected as invalid.
    #[error("malformed remote document: {0}")]
    Malformed(String),

    /// The stored revision no longer matches the one the write was based on.
    #[error("remote document changed (expected {expected}, found {found})")]
    Conflict { expected: String, found: String },

    /// The document endpoint itself does not exist.
    #[error("remote document not found: {0}")]
    NotFound(String),
}

impl StorageError {
    /// Whether a retry of the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Network(_) => ErrorCode::RemoteUnavailable,
            Self::Auth(_) => ErrorCode::RemoteAuthFailed,
            Self::Malformed(_) => ErrorCode::DocumentMalformed,
            Self::Conflict { .. } => ErrorCode::RevisionConflict,
            Self::NotFound(_) => ErrorCode::DocumentNotFound,
        }
    }
}

/// The kind of thing a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Project,
    Channel,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Project => "project",
            Self::Channel => "channel",
        })
    }
}

/// Typed failure returned by every store and desk operation.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("{what} '{key}' not found")]
    NotFound { what: Missing, key: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Deliberately carries no detail so callers cannot test for existence.
    #[error("access denied")]
    AuthDenied,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DeskError {
    pub(crate) fn project_not_found(client: &str) -> Self {
        Self::NotFound {
            what: Missing::Project,
            key: client.trim().to_string(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound {
                what: Missing::Project,
                ..
            } => ErrorCode::ProjectNotFound,
            Self::NotFound {
                what: Missing::Channel,
                ..
            } => ErrorCode::ChannelNotFound,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::Validation { .. } => ErrorCode::InvalidInput,
            Self::AuthDenied => ErrorCode::AccessDenied,
            Self::Storage(err) => err.code(),
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type DeskResult<T> = Result<T, DeskError>;
