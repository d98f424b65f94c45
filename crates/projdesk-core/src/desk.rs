//! The command surface.
//!
//! Every call takes the [`Caller`] it runs for, resolves that caller's scope
//! against a freshly loaded [`Config`], and only then touches projects.
//! External callers asking about another client are refused before any
//! lookup, so a refusal never reveals whether that client exists.

use serde::Serialize;
use std::sync::Arc;

use crate::auth::{self, Command, Scope};
use crate::config::{AdminOutcome, Config, ConfigStore, Role, UserList};
use crate::error::{DeskError, DeskResult};
use crate::model::project::{HistoryEntry, Project};
use crate::remote::DocumentClient;
use crate::store::{ProjectPatch, ProjectStore, RenameOutcome, UpdateOutcome};

/// Who is asking, and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub channel: String,
    pub email: String,
}

impl Caller {
    pub fn new(channel: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            email: email.into(),
        }
    }
}

pub struct Desk {
    config: ConfigStore,
    projects: ProjectStore,
}

impl Desk {
    #[must_use]
    pub const fn new(config: ConfigStore, projects: ProjectStore) -> Self {
        Self { config, projects }
    }

    /// Desk over one remote, honoring the config override in the environment.
    pub fn from_remote(remote: Arc<dyn DocumentClient>) -> Self {
        Self::new(
            ConfigStore::from_env(Arc::clone(&remote)),
            ProjectStore::new(remote),
        )
    }

    /// Scope of `caller` under the current configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Storage`] if the configuration cannot be loaded.
    pub fn resolve_scope(&self, caller: &Caller) -> DeskResult<Scope> {
        let config = self.config.load()?;
        Ok(auth::audit_scope(&config, &caller.channel, &caller.email))
    }

    fn require(&self, caller: &Caller, command: Command, what: &str) -> DeskResult<Scope> {
        let scope = self.resolve_scope(caller)?;
        if scope.allows(command) {
            Ok(scope)
        } else {
            if !scope.is_denied() {
                auth::audit_refusal(&scope, &caller.channel, &caller.email, what);
            }
            Err(DeskError::AuthDenied)
        }
    }

    fn require_view(&self, caller: &Caller, client: &str, what: &str) -> DeskResult<Scope> {
        let scope = self.require(caller, Command::Read, what)?;
        if scope.can_view(client) {
            Ok(scope)
        } else {
            auth::audit_refusal(&scope, &caller.channel, &caller.email, what);
            Err(DeskError::AuthDenied)
        }
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] outside the caller's scope, else
    /// [`DeskError::NotFound`] if no project matches.
    pub fn get_project(&self, caller: &Caller, client: &str) -> DeskResult<Project> {
        let scope = self.require_view(caller, client, "get project")?;
        let project = self.projects.find_by_client(client)?;
        Ok(match scope {
            Scope::InternalFull => project,
            _ => auth::redact(&project),
        })
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] for a denied caller, or a storage failure.
    pub fn list_projects(&self, caller: &Caller, category: Option<&str>) -> DeskResult<Vec<Project>> {
        let scope = self.require(caller, Command::Read, "list projects")?;
        let projects = self.projects.list(category)?;
        Ok(auth::visible_projects(&scope, projects))
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] unless internal, else see [`ProjectStore::create`].
    pub fn create_project(
        &self,
        caller: &Caller,
        client: &str,
        fields: &ProjectPatch,
    ) -> DeskResult<Project> {
        self.require(caller, Command::Mutate, "create project")?;
        self.projects.create(client, fields, &caller.email)
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] unless internal, else see
    /// [`ProjectStore::apply_update`].
    pub fn update_project(
        &self,
        caller: &Caller,
        client: &str,
        patch: &ProjectPatch,
    ) -> DeskResult<UpdateOutcome> {
        self.require(caller, Command::Mutate, "update project")?;
        self.projects.apply_update(client, patch, &caller.email)
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] unless internal, else see [`ProjectStore::rename`].
    pub fn rename_project(&self, caller: &Caller, old: &str, new: &str) -> DeskResult<RenameOutcome> {
        self.require(caller, Command::Mutate, "rename project")?;
        self.projects.rename(old, new, &caller.email)
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] outside the caller's scope, else
    /// [`DeskError::NotFound`] if no project matches.
    pub fn get_history(
        &self,
        caller: &Caller,
        client: &str,
        limit: Option<usize>,
    ) -> DeskResult<Vec<HistoryEntry>> {
        let scope = self.require_view(caller, client, "get history")?;
        let history = self.projects.history(client, limit)?;
        Ok(auth::visible_history(&scope, client, history))
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] unless internal, else see [`ConfigStore::add_user`].
    pub fn admin_add_user(&self, caller: &Caller, list: UserList, email: &str) -> DeskResult<AdminOutcome> {
        self.require(caller, Command::Admin, "add user")?;
        self.config.add_user(list, email)
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] unless internal, else see
    /// [`ConfigStore::remove_user`].
    pub fn admin_remove_user(
        &self,
        caller: &Caller,
        list: UserList,
        email: &str,
    ) -> DeskResult<AdminOutcome> {
        self.require(caller, Command::Admin, "remove user")?;
        self.config.remove_user(list, email)
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] unless internal, else see
    /// [`ConfigStore::map_channel`].
    pub fn admin_map_channel(
        &self,
        caller: &Caller,
        channel: &str,
        client: &str,
        role: Role,
    ) -> DeskResult<AdminOutcome> {
        self.require(caller, Command::Admin, "map channel")?;
        self.config.map_channel(channel, client, role)
    }

    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] unless internal, else see
    /// [`ConfigStore::unmap_channel`].
    pub fn admin_unmap_channel(&self, caller: &Caller, channel: &str) -> DeskResult<AdminOutcome> {
        self.require(caller, Command::Admin, "unmap channel")?;
        self.config.unmap_channel(channel)
    }

    /// Fresh configuration snapshot, for administrators.
    ///
    /// # Errors
    ///
    /// [`DeskError::AuthDenied`] unless internal, or a storage failure.
    pub fn reload_config(&self, caller: &Caller) -> DeskResult<Config> {
        self.require(caller, Command::Admin, "reload config")?;
        self.config.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Missing;
    use crate::model::field::TrackedField;
    use crate::remote::memory::MemoryDocumentClient;

    const DOC: &str = r#"{
        "authorized_users": ["leo@powercommerce.com"],
        "external_authorized_users": ["ana@avvika.com"],
        "channel_map": {
            "C-TEAM": {"client": "PowerCommerce", "role": "internal"},
            "C-AVVIKA": {"client": "Avvika", "role": "external"}
        },
        "projects": [
            {"client": "Avvika", "status": "In Progress", "internal_notes": "slow payer"},
            {"client": "Zeta", "status": "Initialized"}
        ]
    }"#;

    fn desk() -> (Arc<MemoryDocumentClient>, Desk) {
        let remote = Arc::new(MemoryDocumentClient::with_content(DOC));
        let desk = Desk::new(
            ConfigStore::new(remote.clone()),
            ProjectStore::new(remote.clone()),
        );
        (remote, desk)
    }

    fn internal() -> Caller {
        Caller::new("C-TEAM", "leo@powercommerce.com")
    }

    fn external() -> Caller {
        Caller::new("C-AVVIKA", "ana@avvika.com")
    }

    #[test]
    fn internal_caller_sees_everything() {
        let (_, desk) = desk();
        let all = desk.list_projects(&internal(), None).expect("list");
        assert_eq!(all.len(), 2);
        let avvika = desk.get_project(&internal(), "avvika").expect("get");
        assert_eq!(avvika.internal_notes.as_deref(), Some("slow payer"));
    }

    #[test]
    fn external_caller_sees_only_own_project_redacted() {
        let (_, desk) = desk();
        let visible = desk.list_projects(&external(), None).expect("list");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].client, "Avvika");
        assert!(visible[0].internal_notes.is_none());

        let own = desk.get_project(&external(), "AVVIKA").expect("own");
        assert!(own.internal_notes.is_none());
    }

    #[test]
    fn external_lookup_of_other_client_is_denied_not_missing() {
        let (remote, desk) = desk();
        let fetches = remote.fetch_count();
        assert!(matches!(
            desk.get_project(&external(), "Zeta"),
            Err(DeskError::AuthDenied)
        ));
        assert!(matches!(
            desk.get_project(&external(), "Nonexistent"),
            Err(DeskError::AuthDenied)
        ));
        assert!(matches!(
            desk.get_history(&external(), "Zeta", None),
            Err(DeskError::AuthDenied)
        ));
        // Only the config loads; no project lookup happened.
        assert_eq!(remote.fetch_count(), fetches + 3);
    }

    #[test]
    fn external_caller_cannot_mutate_or_administer() {
        let (remote, desk) = desk();
        let patch = ProjectPatch::new().set(TrackedField::Status, "Done");
        assert!(matches!(
            desk.update_project(&external(), "Avvika", &patch),
            Err(DeskError::AuthDenied)
        ));
        assert!(matches!(
            desk.admin_add_user(&external(), UserList::External, "x@y.com"),
            Err(DeskError::AuthDenied)
        ));
        assert!(matches!(desk.reload_config(&external()), Err(DeskError::AuthDenied)));
        assert_eq!(remote.store_count(), 0);
    }

    #[test]
    fn unmapped_channel_gets_nothing() {
        let (_, desk) = desk();
        let stranger = Caller::new("C-RANDOM", "leo@powercommerce.com");
        assert!(matches!(
            desk.list_projects(&stranger, None),
            Err(DeskError::AuthDenied)
        ));
    }

    #[test]
    fn internal_not_found_is_reported() {
        let (_, desk) = desk();
        assert!(matches!(
            desk.get_project(&internal(), "Nope"),
            Err(DeskError::NotFound {
                what: Missing::Project,
                ..
            })
        ));
    }

    #[test]
    fn mutations_are_attributed_to_the_caller() {
        let (_, desk) = desk();
        let patch = ProjectPatch::new().set(TrackedField::Status, "Completed");
        let outcome = desk
            .update_project(&internal(), "Avvika", &patch)
            .expect("update");
        assert_eq!(
            outcome.entry.map(|e| e.user),
            Some("leo@powercommerce.com".to_string())
        );
    }

    #[test]
    fn admin_round_trip_through_desk() {
        let (_, desk) = desk();
        desk.admin_map_channel(&internal(), "C-ZETA", "Zeta", Role::External)
            .expect("map");
        desk.admin_add_user(&internal(), UserList::External, "zed@zeta.io")
            .expect("add");
        let zed = Caller::new("C-ZETA", "zed@zeta.io");
        assert_eq!(
            desk.resolve_scope(&zed).expect("scope"),
            Scope::ExternalScoped {
                client: "Zeta".into()
            }
        );
        desk.admin_unmap_channel(&internal(), "C-ZETA").expect("unmap");
        assert!(desk.resolve_scope(&zed).expect("scope").is_denied());
    }
}
