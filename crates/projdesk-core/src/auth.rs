//! Scope decisions and the redaction applied to external callers.
//!
//! [`resolve_scope`] is a pure function of the [`Config`] snapshot, the
//! channel and the actor. [`audit_scope`] is the logging wrapper every
//! request path goes through; its events use the `projdesk::audit` target.
//!
//! | channel role | list state                  | actor listed | scope            |
//! |--------------|-----------------------------|--------------|------------------|
//! | unmapped     | any                         | any          | Denied           |
//! | internal     | `authorized_users` empty    | any          | InternalFull     |
//! | internal     | non-empty                   | yes / no     | InternalFull / Denied |
//! | external     | `external_authorized_users` empty | any    | Denied           |
//! | external     | non-empty                   | yes / no     | ExternalScoped / Denied |

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::config::{Config, Role};
use crate::model::field::{client_key, normalize_email};
use crate::model::project::{HistoryEntry, Project};

pub const AUDIT_TARGET: &str = "projdesk::audit";

/// Why a caller was refused. Only ever written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    UnmappedChannel,
    MissingIdentity,
    NotInternalUser,
    NoExternalUsersConfigured,
    NotExternalUser,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnmappedChannel => "channel is not mapped",
            Self::MissingIdentity => "caller has no email",
            Self::NotInternalUser => "not an authorized internal user",
            Self::NoExternalUsersConfigured => "no external users are configured",
            Self::NotExternalUser => "not an authorized external user",
        })
    }
}

/// What a caller may see and do. Exactly one per (config, channel, actor).
///
/// A serialized denial carries no reason, so a caller cannot tell a mapped
/// channel from an unmapped one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Scope {
    InternalFull,
    ExternalScoped {
        client: String,
    },
    Denied {
        #[serde(skip)]
        reason: DenyReason,
    },
}

/// Command classes gated by scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// get, list, history
    Read,
    /// create, update, rename
    Mutate,
    /// user and channel administration
    Admin,
}

impl Scope {
    #[must_use]
    pub const fn allows(&self, command: Command) -> bool {
        match self {
            Self::InternalFull => true,
            Self::ExternalScoped { .. } => matches!(command, Command::Read),
            Self::Denied { .. } => false,
        }
    }

    /// Whether this scope may read the project named `client`.
    #[must_use]
    pub fn can_view(&self, client: &str) -> bool {
        match self {
            Self::InternalFull => true,
            Self::ExternalScoped { client: own } => client_key(own) == client_key(client),
            Self::Denied { .. } => false,
        }
    }

    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::InternalFull => "internal_full",
            Self::ExternalScoped { .. } => "external_scoped",
            Self::Denied { .. } => "denied",
        }
    }
}

/// Decide the scope for `actor` on `channel`. No side effects.
#[must_use]
pub fn resolve_scope(config: &Config, channel: &str, actor: &str) -> Scope {
    let Some(mapping) = config.mapping(channel) else {
        return Scope::Denied {
            reason: DenyReason::UnmappedChannel,
        };
    };
    let actor = normalize_email(actor);
    if actor.is_empty() {
        return Scope::Denied {
            reason: DenyReason::MissingIdentity,
        };
    }

    match mapping.role {
        Role::Internal if config.is_internal_authorized(&actor) => Scope::InternalFull,
        Role::Internal => Scope::Denied {
            reason: DenyReason::NotInternalUser,
        },
        Role::External if config.external_authorized_users.is_empty() => Scope::Denied {
            reason: DenyReason::NoExternalUsersConfigured,
        },
        Role::External if config.is_external_authorized(&actor) => Scope::ExternalScoped {
            client: mapping.client.trim().to_string(),
        },
        Role::External => Scope::Denied {
            reason: DenyReason::NotExternalUser,
        },
    }
}

/// [`resolve_scope`], logging denials and external grants to the audit target.
#[must_use]
pub fn audit_scope(config: &Config, channel: &str, actor: &str) -> Scope {
    let scope = resolve_scope(config, channel, actor);
    match &scope {
        Scope::Denied { reason } => {
            warn!(target: AUDIT_TARGET, actor, channel, decision = "denied", %reason, "access denied");
        }
        Scope::ExternalScoped { client } => {
            info!(target: AUDIT_TARGET, actor, channel, decision = "external_scoped", %client, "external access granted");
        }
        Scope::InternalFull => {}
    }
    scope
}

/// Log a request refused after scope resolution (wrong client or command).
pub fn audit_refusal(scope: &Scope, channel: &str, actor: &str, what: &str) {
    warn!(
        target: AUDIT_TARGET,
        actor,
        channel,
        decision = "refused",
        scope = scope.label(),
        what,
        "request outside caller scope"
    );
}

/// Copy of `project` with every internal-only field removed.
///
/// Keeps the id, name, tracked fields, `last_updated` and history. Drops
/// notes, budget and every unknown key.
#[must_use]
pub fn redact(project: &Project) -> Project {
    Project {
        id: project.id.clone(),
        client: project.client.clone(),
        fields: project.fields.clone(),
        last_updated: project.last_updated.clone(),
        internal_notes: None,
        budget: None,
        history: project.history.clone(),
        extra: BTreeMap::new(),
    }
}

/// Projects visible to `scope`, redacted for external callers.
#[must_use]
pub fn visible_projects(scope: &Scope, projects: Vec<Project>) -> Vec<Project> {
    match scope {
        Scope::InternalFull => projects,
        Scope::ExternalScoped { .. } => projects
            .iter()
            .filter(|p| scope.can_view(&p.client))
            .map(redact)
            .collect(),
        Scope::Denied { .. } => Vec::new(),
    }
}

/// History as `scope` may see it. History only ever holds tracked fields,
/// so no entry needs redacting.
#[must_use]
pub fn visible_history(scope: &Scope, client: &str, history: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    if scope.can_view(client) {
        history
    } else {
        Vec::new()
    }
}
