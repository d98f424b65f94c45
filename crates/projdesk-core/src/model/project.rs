use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::field::{TrackedField, UNSET};

/// Values of every tracked field, as stored in the document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackedSnapshot {
    pub status: String,
    pub category: String,
    pub owner: String,
    pub developer: String,
    pub blocker: String,
    pub last_contact_date: String,
    pub call: String,
    pub comm_channel: String,
}

impl TrackedSnapshot {
    /// Snapshot with every field set to [`UNSET`].
    #[must_use]
    pub fn unset() -> Self {
        let mut snapshot = Self::default();
        for field in TrackedField::ALL {
            snapshot.set(field, UNSET);
        }
        snapshot
    }

    #[must_use]
    pub fn get(&self, field: TrackedField) -> &str {
        match field {
            TrackedField::Status => &self.status,
            TrackedField::Category => &self.category,
            TrackedField::Owner => &self.owner,
            TrackedField::Developer => &self.developer,
            TrackedField::Blocker => &self.blocker,
            TrackedField::LastContactDate => &self.last_contact_date,
            TrackedField::Call => &self.call,
            TrackedField::CommChannel => &self.comm_channel,
        }
    }

    pub fn set(&mut self, field: TrackedField, value: impl Into<String>) {
        let slot = match field {
            TrackedField::Status => &mut self.status,
            TrackedField::Category => &mut self.category,
            TrackedField::Owner => &mut self.owner,
            TrackedField::Developer => &mut self.developer,
            TrackedField::Blocker => &mut self.blocker,
            TrackedField::LastContactDate => &mut self.last_contact_date,
            TrackedField::Call => &mut self.call,
            TrackedField::CommChannel => &mut self.comm_channel,
        };
        *slot = value.into();
    }
}

/// One field's before/after pair inside a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: String,
    pub new: String,
}

impl FieldChange {
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Key used in `changes` for a client rename.
pub const CLIENT_CHANGE_KEY: &str = "client";

/// An immutable audit record. Never constructed with empty `changes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `YYYY-MM-DD HH:MM:SS`, never earlier than the previous entry.
    pub timestamp: String,
    pub user: String,
    /// Keyed by tracked-field name, or `client` for a rename.
    pub changes: BTreeMap<String, FieldChange>,
    #[serde(default)]
    pub previous_state: TrackedSnapshot,
}

impl HistoryEntry {
    /// True when this entry records a client rename.
    #[must_use]
    pub fn is_rename(&self) -> bool {
        self.changes.contains_key(CLIENT_CHANGE_KEY)
    }
}

/// A client project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Stable identifier; survives renames.
    #[serde(default)]
    pub id: String,
    /// Display name, unique case-insensitively.
    pub client: String,
    #[serde(flatten)]
    pub fields: TrackedSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Value>,
    /// Newest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Keys this version does not know about; preserved verbatim, never shown externally.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Project {
    /// A fresh project with the tracked defaults new clients start with.
    #[must_use]
    pub fn new(id: impl Into<String>, client: impl Into<String>) -> Self {
        let mut fields = TrackedSnapshot::unset();
        fields.set(TrackedField::Status, "Initialized");
        fields.set(TrackedField::Category, "New / In Progress");
        fields.set(TrackedField::Developer, "Unassigned");
        Self {
            id: id.into(),
            client: client.into(),
            fields,
            last_updated: None,
            internal_notes: None,
            budget: None,
            history: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, field: TrackedField) -> &str {
        self.fields.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_project_uses_intake_defaults() {
        let p = Project::new("prj-1", "Avvika");
        assert_eq!(p.get(TrackedField::Status), "Initialized");
        assert_eq!(p.get(TrackedField::Category), "New / In Progress");
        assert_eq!(p.get(TrackedField::Developer), "Unassigned");
        assert_eq!(p.get(TrackedField::Owner), UNSET);
        assert_eq!(p.get(TrackedField::Blocker), UNSET);
        assert!(p.history.is_empty());
    }

    #[test]
    fn unknown_keys_survive_a_roundtrip() {
        let raw = json!({
            "client": "Avvika",
            "status": "In Progress",
            "budget": 1200,
            "email_history": [{"summary": "kickoff"}],
            "last_email_received": "2025-01-02"
        });
        let project: Project = serde_json::from_value(raw).expect("parse");
        assert_eq!(project.get(TrackedField::Status), "In Progress");
        assert_eq!(project.budget, Some(json!(1200)));
        assert!(project.extra.contains_key("email_history"));
        assert!(project.extra.contains_key("last_email_received"));
        assert!(!project.extra.contains_key("status"));

        let back = serde_json::to_value(&project).expect("serialize");
        assert_eq!(back["email_history"][0]["summary"], "kickoff");
        assert_eq!(back["status"], "In Progress");
    }

    #[test]
    fn missing_tracked_fields_default_to_empty() {
        let project: Project =
            serde_json::from_value(json!({"client": "Bare"})).expect("parse");
        assert_eq!(project.get(TrackedField::Owner), "");
        assert!(project.id.is_empty());
    }

    #[test]
    fn snapshot_get_and_set_cover_every_field() {
        let mut snapshot = TrackedSnapshot::default();
        for (i, field) in TrackedField::ALL.into_iter().enumerate() {
            snapshot.set(field, format!("v{i}"));
        }
        for (i, field) in TrackedField::ALL.into_iter().enumerate() {
            assert_eq!(snapshot.get(field), format!("v{i}"));
        }
    }

    #[test]
    fn rename_entries_are_recognized() {
        let mut changes = BTreeMap::new();
        changes.insert(CLIENT_CHANGE_KEY.to_string(), FieldChange::new("A", "B"));
        let entry = HistoryEntry {
            timestamp: "2025-01-01 10:00:00".into(),
            user: "leo@powercommerce.com".into(),
            changes,
            previous_state: TrackedSnapshot::unset(),
        };
        assert!(entry.is_rename());
    }
}
