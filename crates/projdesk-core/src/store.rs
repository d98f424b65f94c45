//! Project store: every operation is one read-modify-write cycle against
//! the remote document.
//!
//! Nothing is cached between calls. A mutation fetches the document, locates
//! the project, diffs, and writes the whole document back with the revision
//! it read. If another writer got in first, the cycle reruns on fresh data;
//! an update that turns into a no-op on fresh data records nothing.

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cycle::{self, DEFAULT_MAX_CYCLES, Outcome};
use crate::error::{DeskError, DeskResult};
use crate::history::{self, TIMESTAMP_FORMAT};
use crate::model::field::{TrackedField, UNSET, client_key, normalize_value};
use crate::model::project::{CLIENT_CHANGE_KEY, FieldChange, HistoryEntry, Project};
use crate::remote::DocumentClient;

/// Source of "now" for stamps. Swappable so tests control time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Keys with a fixed meaning that may not be set through `extra`.
const RESERVED_KEYS: &[&str] = &[
    "id",
    "client",
    "history",
    "last_updated",
    "internal_notes",
    "budget",
];

/// Requested changes to one project.
///
/// Tracked fields absent from the patch are left alone; a present but blank
/// value clears the field to `-`. For the untracked fields, a blank note or a
/// JSON `null` budget clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub fields: BTreeMap<TrackedField, String>,
    pub internal_notes: Option<String>,
    pub budget: Option<Value>,
    pub extra: BTreeMap<String, Value>,
}

impl ProjectPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: TrackedField, value: impl Into<String>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.internal_notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn budget(mut self, budget: Value) -> Self {
        self.budget = Some(budget);
        self
    }

    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.internal_notes.is_none()
            && self.budget.is_none()
            && self.extra.is_empty()
    }

    /// Reject malformed dates and extras that shadow known keys.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Validation`] naming the offending field.
    pub fn validate(&self) -> DeskResult<()> {
        for (field, raw) in &self.fields {
            let value = normalize_value(raw);
            if field.is_date()
                && value != UNSET
                && NaiveDate::parse_from_str(&value, DATE_FORMAT).is_err()
            {
                return Err(DeskError::invalid(
                    field.as_str(),
                    format!("'{value}' is not a YYYY-MM-DD date"),
                ));
            }
        }
        for key in self.extra.keys() {
            let shadows_tracked = key.parse::<TrackedField>().is_ok();
            if key.trim().is_empty() || shadows_tracked || RESERVED_KEYS.contains(&key.as_str()) {
                return Err(DeskError::invalid(
                    "extra",
                    format!("'{key}' cannot be set as a free-form field"),
                ));
            }
        }
        Ok(())
    }

    /// Apply untracked changes; true if anything differed.
    fn apply_untracked(&self, project: &mut Project) -> bool {
        let mut changed = false;
        if let Some(notes) = &self.internal_notes {
            let notes = notes.trim();
            let next = (!notes.is_empty()).then(|| notes.to_string());
            if project.internal_notes != next {
                project.internal_notes = next;
                changed = true;
            }
        }
        if let Some(budget) = &self.budget {
            let next = (!budget.is_null()).then(|| budget.clone());
            if project.budget != next {
                project.budget = next;
                changed = true;
            }
        }
        for (key, value) in &self.extra {
            if value.is_null() {
                changed |= project.extra.remove(key).is_some();
            } else if project.extra.get(key) != Some(value) {
                project.extra.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

/// Result of [`ProjectStore::apply_update`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub project: Project,
    /// The recorded entry; `None` when no tracked field changed.
    pub entry: Option<HistoryEntry>,
    /// Whether the document was written.
    pub persisted: bool,
}

/// Result of [`ProjectStore::rename`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenameOutcome {
    pub project: Project,
    pub entry: HistoryEntry,
    /// Channels whose mapping followed the rename.
    pub remapped_channels: Vec<String>,
}

pub struct ProjectStore {
    remote: Arc<dyn DocumentClient>,
    clock: Clock,
    max_cycles: u32,
}

impl ProjectStore {
    pub fn new(remote: Arc<dyn DocumentClient>) -> Self {
        Self {
            remote,
            clock: Arc::new(|| Local::now().naive_local()),
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// All projects in document order.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Storage`] if the document cannot be read.
    pub fn load(&self) -> DeskResult<Vec<Project>> {
        let (doc, _) = cycle::load(self.remote.as_ref())?;
        Ok(doc.projects)
    }

    /// Projects in document order, optionally only those whose category
    /// matches `category` case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::Storage`] if the document cannot be read.
    pub fn list(&self, category: Option<&str>) -> DeskResult<Vec<Project>> {
        let projects = self.load()?;
        Ok(match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => {
                let wanted = category.to_lowercase();
                projects
                    .into_iter()
                    .filter(|p| p.get(TrackedField::Category).trim().to_lowercase() == wanted)
                    .collect()
            }
            None => projects,
        })
    }

    /// Case-insensitive lookup by client name.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::NotFound`] if no project matches.
    pub fn find_by_client(&self, client: &str) -> DeskResult<Project> {
        let (doc, _) = cycle::load(self.remote.as_ref())?;
        doc.find(client)
            .cloned()
            .ok_or_else(|| DeskError::project_not_found(client))
    }

    /// Create a project with intake defaults overridden by `initial`.
    ///
    /// # Errors
    ///
    /// - [`DeskError::Validation`] for a blank client or a bad patch
    /// - [`DeskError::Conflict`] if the client name is taken
    pub fn create(&self, client: &str, initial: &ProjectPatch, actor: &str) -> DeskResult<Project> {
        let client = client.trim();
        if client.is_empty() {
            return Err(DeskError::invalid("client", "must not be empty"));
        }
        initial.validate()?;

        let project = cycle::read_modify_write(self.remote.as_ref(), self.max_cycles, "create", |doc| {
            if let Some(existing) = doc.find(client) {
                return Err(DeskError::Conflict(format!(
                    "client '{}' already exists",
                    existing.client
                )));
            }
            let stamp = self.now().format(TIMESTAMP_FORMAT).to_string();
            let mut project = Project::new(doc.allocate_id(client, &stamp), client);
            for (field, value) in &initial.fields {
                project.fields.set(*field, normalize_value(value));
            }
            initial.apply_untracked(&mut project);
            project.last_updated = Some(stamp);
            doc.projects.push(project.clone());
            Ok(Outcome::Commit(project))
        })?;

        info!(client = %project.client, id = %project.id, actor, "project created");
        Ok(project)
    }

    /// Apply `patch` to the project named `client`, recording tracked changes.
    ///
    /// # Errors
    ///
    /// - [`DeskError::NotFound`] if no project matches
    /// - [`DeskError::Validation`] for a malformed patch
    /// - [`DeskError::Conflict`] if concurrent writers keep winning
    pub fn apply_update(
        &self,
        client: &str,
        patch: &ProjectPatch,
        actor: &str,
    ) -> DeskResult<UpdateOutcome> {
        patch.validate()?;

        let outcome = cycle::read_modify_write(self.remote.as_ref(), self.max_cycles, "update", |doc| {
            let idx = doc
                .position(client)
                .ok_or_else(|| DeskError::project_not_found(client))?;
            let project = &mut doc.projects[idx];

            let before = history::snapshot(project);
            let mut after = before.clone();
            for (field, value) in &patch.fields {
                after.set(*field, normalize_value(value));
            }
            let changes = history::diff(&before, &after);

            let mut updated = project.clone();
            let untracked_changed = patch.apply_untracked(&mut updated);
            if changes.is_empty() && !untracked_changed {
                debug!(client = %project.client, "update changes nothing");
                return Ok(Outcome::Unchanged(UpdateOutcome {
                    project: project.clone(),
                    entry: None,
                    persisted: false,
                }));
            }

            let now = self.now();
            let entry = if changes.is_empty() {
                None
            } else {
                let applied: Vec<(TrackedField, String)> = changes
                    .iter()
                    .map(|(field, change)| (*field, change.new.clone()))
                    .collect();
                let entry = history::record(&mut updated, history::keyed(changes), actor, now);
                for (field, value) in applied {
                    updated.fields.set(field, value);
                }
                Some(entry)
            };
            updated.last_updated = Some(entry.as_ref().map_or_else(
                || history::next_timestamp(&updated.history, now),
                |entry| entry.timestamp.clone(),
            ));

            *project = updated.clone();
            Ok(Outcome::Commit(UpdateOutcome {
                project: updated,
                entry,
                persisted: true,
            }))
        })?;

        if outcome.persisted {
            let changed: Vec<&str> = outcome
                .entry
                .as_ref()
                .map(|e| e.changes.keys().map(String::as_str).collect())
                .unwrap_or_default();
            info!(client = %outcome.project.client, actor, ?changed, "project updated");
        }
        Ok(outcome)
    }

    /// Relabel a project, keeping its id, and point channel mappings for the
    /// old name at the new one.
    ///
    /// # Errors
    ///
    /// - [`DeskError::Validation`] for a blank or identical new name
    /// - [`DeskError::NotFound`] if `old` does not exist
    /// - [`DeskError::Conflict`] if `new` belongs to another project
    pub fn rename(&self, old: &str, new: &str, actor: &str) -> DeskResult<RenameOutcome> {
        let new = new.trim();
        if new.is_empty() {
            return Err(DeskError::invalid("client", "new name must not be empty"));
        }

        let outcome = cycle::read_modify_write(self.remote.as_ref(), self.max_cycles, "rename", |doc| {
            let idx = doc
                .position(old)
                .ok_or_else(|| DeskError::project_not_found(old))?;
            let current = doc.projects[idx].client.clone();
            if current == new {
                return Err(DeskError::invalid(
                    "client",
                    format!("'{new}' is already the project's name"),
                ));
            }
            if let Some(other) = doc.position(new).filter(|other| *other != idx) {
                return Err(DeskError::Conflict(format!(
                    "client '{}' already exists",
                    doc.projects[other].client
                )));
            }

            let project = &mut doc.projects[idx];
            let mut changes = BTreeMap::new();
            changes.insert(CLIENT_CHANGE_KEY.to_string(), FieldChange::new(current.as_str(), new));
            let entry = history::record(project, changes, actor, self.now());
            project.client = new.to_string();
            project.last_updated = Some(entry.timestamp.clone());
            let project = project.clone();

            let old_key = client_key(&current);
            let mut remapped_channels = Vec::new();
            for (channel, mapping) in &mut doc.config.channel_map {
                if client_key(&mapping.client) == old_key {
                    mapping.client = new.to_string();
                    remapped_channels.push(channel.clone());
                }
            }

            Ok(Outcome::Commit(RenameOutcome {
                project,
                entry,
                remapped_channels,
            }))
        })?;

        info!(
            from = %outcome.entry.changes[CLIENT_CHANGE_KEY].old,
            to = %outcome.project.client,
            actor,
            remapped = outcome.remapped_channels.len(),
            "project renamed"
        );
        Ok(outcome)
    }

    /// History of one project, newest first, at most `limit` entries.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::NotFound`] if no project matches.
    pub fn history(&self, client: &str, limit: Option<usize>) -> DeskResult<Vec<HistoryEntry>> {
        let project = self.find_by_client(client)?;
        let limit = limit.unwrap_or(usize::MAX);
        Ok(project.history.into_iter().take(limit).collect())
    }
}
