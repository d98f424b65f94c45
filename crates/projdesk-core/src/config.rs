//! Access-control configuration and the admin operations that edit it.
//!
//! The configuration lives in the same remote document as the projects
//! (see [`crate::model::document`]). A deployment may pin it instead through
//! the `PROJDESK_CONFIG_JSON` environment variable; that override wins on
//! every load and is never rewritten by admin operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cycle::{self, DEFAULT_MAX_CYCLES, Outcome};
use crate::error::{DeskError, DeskResult, Missing};
use crate::model::field::{ParseEnumError, normalize_email};
use crate::remote::DocumentClient;

/// Environment variable holding a raw JSON config that overrides the document.
pub const CONFIG_OVERRIDE_ENV: &str = "PROJDESK_CONFIG_JSON";

/// Which audience a channel serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Internal,
    External,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "external" => Ok(Self::External),
            _ => Err(ParseEnumError {
                expected: "role (internal|external)",
                got: s.to_string(),
            }),
        }
    }
}

/// The single (client, role) pair a channel is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMapping {
    pub client: String,
    #[serde(default)]
    pub role: Role,
}

/// One of the two authorized-user lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserList {
    Internal,
    External,
}

impl fmt::Display for UserList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Internal => "internal",
            Self::External => "external",
        })
    }
}

impl FromStr for UserList {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "external" => Ok(Self::External),
            _ => Err(ParseEnumError {
                expected: "user list (internal|external)",
                got: s.to_string(),
            }),
        }
    }
}

/// Immutable snapshot of the access configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reporting channel; carried through for other tools.
    pub channel_id: String,
    /// Mailbox channel; carried through for other tools.
    pub mailbox_channel_id: String,
    /// Internal users. Empty means every internal-channel caller is allowed.
    pub authorized_users: Vec<String>,
    /// External users. Empty means no external access at all.
    pub external_authorized_users: Vec<String>,
    pub channel_map: BTreeMap<String, ChannelMapping>,
}

impl Config {
    #[must_use]
    pub fn users(&self, list: UserList) -> &[String] {
        match list {
            UserList::Internal => &self.authorized_users,
            UserList::External => &self.external_authorized_users,
        }
    }

    fn users_mut(&mut self, list: UserList) -> &mut Vec<String> {
        match list {
            UserList::Internal => &mut self.authorized_users,
            UserList::External => &mut self.external_authorized_users,
        }
    }

    #[must_use]
    pub fn mapping(&self, channel: &str) -> Option<&ChannelMapping> {
        self.channel_map.get(channel.trim())
    }

    /// Fail-open: an empty internal list admits everyone.
    #[must_use]
    pub fn is_internal_authorized(&self, email: &str) -> bool {
        self.authorized_users.is_empty() || contains_email(&self.authorized_users, email)
    }

    /// Fail-closed: an empty external list admits no one.
    #[must_use]
    pub fn is_external_authorized(&self, email: &str) -> bool {
        !self.external_authorized_users.is_empty()
            && contains_email(&self.external_authorized_users, email)
    }

    /// Lowercase and dedupe the user lists, dropping blank entries.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for list in [UserList::Internal, UserList::External] {
            let users = self.users_mut(list);
            let mut seen = Vec::with_capacity(users.len());
            for email in users.drain(..) {
                let email = normalize_email(&email);
                if !email.is_empty() && !seen.contains(&email) {
                    seen.push(email);
                }
            }
            *users = seen;
        }
        self
    }
}

fn contains_email(list: &[String], email: &str) -> bool {
    let email = normalize_email(email);
    !email.is_empty() && list.iter().any(|u| normalize_email(u) == email)
}

/// What an admin operation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdminOutcome {
    Added,
    AlreadyPresent,
    Removed,
    NotPresent,
    Mapped,
    Replaced { previous: ChannelMapping },
    Unmapped { previous: ChannelMapping },
}

impl AdminOutcome {
    /// Whether the operation wrote the document.
    #[must_use]
    pub const fn changed(&self) -> bool {
        !matches!(self, Self::AlreadyPresent | Self::NotPresent)
    }
}

/// Trimmed, lowercased email with exactly one `@` and no whitespace.
///
/// # Errors
///
/// Returns [`DeskError::Validation`] for anything else.
pub fn validate_email(raw: &str) -> DeskResult<String> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(DeskError::invalid("email", "must not be empty"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(DeskError::invalid("email", "must not contain whitespace"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DeskError::invalid("email", format!("'{email}' has no '@'")));
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(DeskError::invalid(
            "email",
            format!("'{email}' must have exactly one '@' between a user and a domain"),
        ));
    }
    Ok(email)
}

fn non_empty(field: &'static str, raw: &str) -> DeskResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        Err(DeskError::invalid(field, "must not be empty"))
    } else {
        Ok(value.to_string())
    }
}

/// Hands out [`Config`] snapshots and applies admin edits.
pub struct ConfigStore {
    remote: Arc<dyn DocumentClient>,
    env_override: Option<Config>,
    max_cycles: u32,
}

impl ConfigStore {
    pub fn new(remote: Arc<dyn DocumentClient>) -> Self {
        Self {
            remote,
            env_override: None,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    /// Pin the configuration to a raw JSON override. An unparseable override
    /// is logged and ignored.
    #[must_use]
    pub fn with_env_override(mut self, raw: Option<&str>) -> Self {
        self.env_override = raw
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| match serde_json::from_str::<Config>(raw) {
                Ok(config) => Some(config.normalized()),
                Err(err) => {
                    warn!(var = CONFIG_OVERRIDE_ENV, error = %err, "ignoring unparseable config override");
                    None
                }
            });
        self
    }

    /// [`ConfigStore::new`] plus the override from [`CONFIG_OVERRIDE_ENV`].
    pub fn from_env(remote: Arc<dyn DocumentClient>) -> Self {
        let raw = std::env::var(CONFIG_OVERRIDE_ENV).ok();
        Self::new(remote).with_env_override(raw.as_deref())
    }

    #[must_use]
    pub const fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    #[must_use]
    pub const fn has_override(&self) -> bool {
        self.env_override.is_some()
    }

    /// Current configuration: the override if set, else the document's.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Storage`] if the document cannot be read.
    pub fn load(&self) -> DeskResult<Config> {
        if let Some(config) = &self.env_override {
            return Ok(config.clone());
        }
        let (doc, _) = cycle::load(self.remote.as_ref())?;
        Ok(doc.config.normalized())
    }

    /// Replace the document's configuration keys, leaving projects alone.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Storage`] or [`DeskError::Conflict`] if the write fails.
    pub fn save(&self, config: &Config) -> DeskResult<()> {
        self.warn_if_pinned();
        cycle::read_modify_write(self.remote.as_ref(), self.max_cycles, "save config", |doc| {
            if doc.config == *config {
                Ok(Outcome::Unchanged(()))
            } else {
                doc.config = config.clone();
                Ok(Outcome::Commit(()))
            }
        })
    }

    /// Add an email to one of the authorized lists.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Validation`] for a bad email, or a storage failure.
    pub fn add_user(&self, list: UserList, email: &str) -> DeskResult<AdminOutcome> {
        let email = validate_email(email)?;
        let outcome = self.edit("add user", |config| {
            let users = config.users_mut(list);
            if contains_email(users, &email) {
                AdminOutcome::AlreadyPresent
            } else {
                users.push(email.clone());
                AdminOutcome::Added
            }
        })?;
        if outcome.changed() {
            info!(%list, %email, "authorized user added");
        }
        Ok(outcome)
    }

    /// Remove an email from one of the authorized lists.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Validation`] for a bad email, or a storage failure.
    pub fn remove_user(&self, list: UserList, email: &str) -> DeskResult<AdminOutcome> {
        let email = validate_email(email)?;
        let outcome = self.edit("remove user", |config| {
            let users = config.users_mut(list);
            let before = users.len();
            users.retain(|u| normalize_email(u) != email);
            if users.len() == before {
                AdminOutcome::NotPresent
            } else {
                AdminOutcome::Removed
            }
        })?;
        if outcome.changed() {
            info!(%list, %email, "authorized user removed");
        }
        Ok(outcome)
    }

    /// Bind a channel to a client and role, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Validation`] for a blank channel or client, or a
    /// storage failure.
    pub fn map_channel(&self, channel: &str, client: &str, role: Role) -> DeskResult<AdminOutcome> {
        let channel = non_empty("channel", channel)?;
        let mapping = ChannelMapping {
            client: non_empty("client", client)?,
            role,
        };
        let outcome = self.edit("map channel", |config| {
            match config.channel_map.insert(channel.clone(), mapping.clone()) {
                None => AdminOutcome::Mapped,
                Some(previous) if previous == mapping => AdminOutcome::AlreadyPresent,
                Some(previous) => AdminOutcome::Replaced { previous },
            }
        })?;
        if outcome.changed() {
            info!(%channel, client = %mapping.client, %role, "channel mapped");
        }
        Ok(outcome)
    }

    /// Drop a channel binding.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::NotFound`] if the channel has no binding.
    pub fn unmap_channel(&self, channel: &str) -> DeskResult<AdminOutcome> {
        let channel = non_empty("channel", channel)?;
        self.warn_if_pinned();
        let previous = cycle::read_modify_write(
            self.remote.as_ref(),
            self.max_cycles,
            "unmap channel",
            |doc| match doc.config.channel_map.remove(&channel) {
                Some(previous) => Ok(Outcome::Commit(previous)),
                None => Err(DeskError::NotFound {
                    what: Missing::Channel,
                    key: channel.clone(),
                }),
            },
        )?;
        info!(%channel, client = %previous.client, "channel unmapped");
        Ok(AdminOutcome::Unmapped { previous })
    }

    fn edit(
        &self,
        op: &str,
        mut apply: impl FnMut(&mut Config) -> AdminOutcome,
    ) -> DeskResult<AdminOutcome> {
        self.warn_if_pinned();
        cycle::read_modify_write(self.remote.as_ref(), self.max_cycles, op, |doc| {
            let outcome = apply(&mut doc.config);
            if outcome.changed() {
                Ok(Outcome::Commit(outcome))
            } else {
                Ok(Outcome::Unchanged(outcome))
            }
        })
    }

    fn warn_if_pinned(&self) {
        if self.has_override() {
            warn!(
                var = CONFIG_OVERRIDE_ENV,
                "config is pinned by environment; the document was updated but the override must be refreshed by hand"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use crate::remote::memory::MemoryDocumentClient;

    fn store_with(content: &str) -> (Arc<MemoryDocumentClient>, ConfigStore) {
        let remote = Arc::new(MemoryDocumentClient::with_content(content));
        let store = ConfigStore::new(remote.clone());
        (remote, store)
    }

    fn stored(remote: &MemoryDocumentClient) -> Document {
        Document::parse(&remote.content().expect("content")).expect("parse")
    }

    #[test]
    fn mapping_without_role_defaults_to_internal() {
        let mapping: ChannelMapping =
            serde_json::from_str(r#"{"client": "Avvika"}"#).expect("parse");
        assert_eq!(mapping.role, Role::Internal);
    }

    #[test]
    fn authorization_lists_fail_open_and_closed() {
        let config = Config::default();
        assert!(config.is_internal_authorized("anyone@x.com"));
        assert!(!config.is_external_authorized("anyone@x.com"));

        let config = Config {
            authorized_users: vec!["leo@powercommerce.com".into()],
            external_authorized_users: vec!["ana@avvika.com".into()],
            ..Config::default()
        };
        assert!(config.is_internal_authorized(" LEO@PowerCommerce.com"));
        assert!(!config.is_internal_authorized("ana@avvika.com"));
        assert!(config.is_external_authorized("Ana@Avvika.com"));
        assert!(!config.is_external_authorized(""));
    }

    #[test]
    fn email_validation() {
        assert_eq!(validate_email(" Leo@X.com ").expect("valid"), "leo@x.com");
        for bad in ["", "   ", "leo", "leo@@x.com", "a@b@c", "le o@x.com", "@x.com", "leo@"] {
            assert!(validate_email(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn env_override_wins_and_bad_override_is_ignored() {
        let (_, store) = store_with(r#"{"authorized_users": ["doc@x.com"]}"#);
        let pinned = store.with_env_override(Some(r#"{"authorized_users": ["ENV@x.com"]}"#));
        assert_eq!(pinned.load().expect("load").authorized_users, vec!["env@x.com"]);

        let (_, store) = store_with(r#"{"authorized_users": ["doc@x.com"]}"#);
        let broken = store.with_env_override(Some("{nope"));
        assert!(!broken.has_override());
        assert_eq!(broken.load().expect("load").authorized_users, vec!["doc@x.com"]);
    }

    #[test]
    fn missing_document_yields_empty_config() {
        let store = ConfigStore::new(Arc::new(MemoryDocumentClient::new()));
        assert_eq!(store.load().expect("load"), Config::default());
    }

    #[test]
    fn add_user_is_idempotent_and_leaves_projects_alone() {
        let (remote, store) = store_with(r#"{"projects": [{"client": "Avvika"}]}"#);
        assert_eq!(
            store.add_user(UserList::External, "Ana@Avvika.com").expect("add"),
            AdminOutcome::Added
        );
        let writes = remote.store_count();
        assert_eq!(
            store.add_user(UserList::External, "ana@avvika.com").expect("again"),
            AdminOutcome::AlreadyPresent
        );
        assert_eq!(remote.store_count(), writes);

        let doc = stored(&remote);
        assert_eq!(doc.config.external_authorized_users, vec!["ana@avvika.com"]);
        assert_eq!(doc.projects.len(), 1);
    }

    #[test]
    fn remove_absent_user_writes_nothing() {
        let (remote, store) = store_with(r#"{"authorized_users": ["leo@x.com"]}"#);
        assert_eq!(
            store.remove_user(UserList::Internal, "nobody@x.com").expect("remove"),
            AdminOutcome::NotPresent
        );
        assert_eq!(remote.store_count(), 0);
        assert_eq!(
            store.remove_user(UserList::Internal, "LEO@x.com").expect("remove"),
            AdminOutcome::Removed
        );
        assert!(stored(&remote).config.authorized_users.is_empty());
    }

    #[test]
    fn remapping_replaces_the_single_binding() {
        let (remote, store) = store_with("{}");
        assert_eq!(
            store.map_channel("C1", "Avvika", Role::External).expect("map"),
            AdminOutcome::Mapped
        );
        let outcome = store.map_channel("C1", "Zeta", Role::Internal).expect("remap");
        assert_eq!(
            outcome,
            AdminOutcome::Replaced {
                previous: ChannelMapping {
                    client: "Avvika".into(),
                    role: Role::External
                }
            }
        );
        let doc = stored(&remote);
        assert_eq!(doc.config.channel_map.len(), 1);
        assert_eq!(doc.config.mapping("C1").map(|m| m.client.as_str()), Some("Zeta"));
    }

    #[test]
    fn unmapping_unknown_channel_is_not_found() {
        let (_, store) = store_with("{}");
        let err = store.unmap_channel("C404").expect_err("unknown");
        assert!(matches!(
            err,
            DeskError::NotFound {
                what: Missing::Channel,
                ..
            }
        ));
    }

    #[test]
    fn blank_channel_or_client_is_rejected() {
        let (remote, store) = store_with("{}");
        assert!(matches!(
            store.map_channel(" ", "Avvika", Role::External),
            Err(DeskError::Validation { field: "channel", .. })
        ));
        assert!(matches!(
            store.map_channel("C1", "", Role::External),
            Err(DeskError::Validation { field: "client", .. })
        ));
        assert_eq!(remote.store_count(), 0);
    }

    #[test]
    fn save_rewrites_config_keys_only() {
        let (remote, store) = store_with(
            r#"{"projects": [{"client": "Avvika"}], "report_schedule": "daily"}"#,
        );
        let config = Config {
            channel_id: "C-REPORTS".into(),
            ..Config::default()
        };
        store.save(&config).expect("save");
        let doc = stored(&remote);
        assert_eq!(doc.config.channel_id, "C-REPORTS");
        assert_eq!(doc.projects[0].client, "Avvika");
        assert!(doc.extra.contains_key("report_schedule"));
    }

    #[test]
    fn normalization_lowercases_and_dedupes() {
        let config = Config {
            authorized_users: vec!["A@x.com".into(), "a@x.com ".into(), " ".into()],
            ..Config::default()
        }
        .normalized();
        assert_eq!(config.authorized_users, vec!["a@x.com"]);
    }
}
