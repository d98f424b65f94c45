use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Canonical marker stored for a tracked field that has no value.
pub const UNSET: &str = "-";

/// Project attributes whose changes are recorded in history.
///
/// This enum is the single source of truth for the diff, the history
/// snapshot, and the external redaction filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Status,
    Category,
    Owner,
    Developer,
    Blocker,
    LastContactDate,
    Call,
    CommChannel,
}

impl TrackedField {
    /// Every tracked field, in display order.
    pub const ALL: [Self; 8] = [
        Self::Status,
        Self::Category,
        Self::Owner,
        Self::Developer,
        Self::Blocker,
        Self::LastContactDate,
        Self::Call,
        Self::CommChannel,
    ];

    /// Document key for this field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Category => "category",
            Self::Owner => "owner",
            Self::Developer => "developer",
            Self::Blocker => "blocker",
            Self::LastContactDate => "last_contact_date",
            Self::Call => "call",
            Self::CommChannel => "comm_channel",
        }
    }

    /// Human label for pretty output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Category => "Category",
            Self::Owner => "Owner",
            Self::Developer => "Developer",
            Self::Blocker => "Blocker",
            Self::LastContactDate => "Last Contact",
            Self::Call => "Next Call",
            Self::CommChannel => "Channel",
        }
    }

    /// Fields that must hold a `YYYY-MM-DD` date when set.
    #[must_use]
    pub const fn is_date(self) -> bool {
        matches!(self, Self::LastContactDate | Self::Call)
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for TrackedField {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "tracked field",
                got: s.to_string(),
            })
    }
}

/// Canonicalize a tracked value: trim, and map blank or `-` to [`UNSET`].
#[must_use]
pub fn normalize_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == UNSET {
        UNSET.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Canonicalize an actor or authorized-user email.
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Case-insensitive comparison key for client names.
#[must_use]
pub fn client_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}
