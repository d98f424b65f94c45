//! The single JSON document that holds the access configuration and every
//! project record.
//!
//! # Layout
//!
//! ```text
//! {
//!   "channel_id": "...",
//!   "mailbox_channel_id": "...",
//!   "authorized_users": ["..."],
//!   "external_authorized_users": ["..."],
//!   "channel_map": { "C123": { "client": "Avvika", "role": "external" } },
//!   "projects": [ { "id": "prj-…", "client": "Avvika", ..., "history": [...] } ]
//! }
//! ```
//!
//! Older deployments stored a bare array of projects with history kept
//! oldest-first and no `id`. [`Document::parse`] upgrades those in memory;
//! the next write persists the upgraded shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::config::Config;
use crate::error::StorageError;
use crate::model::field::client_key;
use crate::model::project::{HistoryEntry, Project};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(flatten)]
    pub config: Config,
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Top-level keys owned by other tools; rewritten untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Document {
    /// Decode a raw document, accepting the legacy bare-array shape.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Malformed`] for invalid JSON or a shape that is
    /// neither an object nor an array of projects.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| StorageError::Malformed(format!("invalid JSON: {err}")))?;

        let mut doc = match value {
            Value::Array(items) => {
                debug!(projects = items.len(), "upgrading legacy project array");
                let projects = serde_json::from_value(Value::Array(items))
                    .map_err(|err| StorageError::Malformed(format!("bad project list: {err}")))?;
                Self {
                    projects,
                    ..Self::default()
                }
            }
            value @ Value::Object(_) => serde_json::from_value(value)
                .map_err(|err| StorageError::Malformed(format!("bad document: {err}")))?,
            other => {
                return Err(StorageError::Malformed(format!(
                    "expected a JSON object, found {}",
                    json_kind(&other)
                )));
            }
        };

        doc.upgrade();
        Ok(doc)
    }

    /// Pretty-printed JSON, the form written back to the remote.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Malformed`] if a free-form value cannot be encoded.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| StorageError::Malformed(format!("cannot encode document: {err}")))
    }

    /// Index of the project whose client matches `client` case-insensitively.
    #[must_use]
    pub fn position(&self, client: &str) -> Option<usize> {
        let key = client_key(client);
        self.projects.iter().position(|p| client_key(&p.client) == key)
    }

    #[must_use]
    pub fn find(&self, client: &str) -> Option<&Project> {
        self.position(client).map(|idx| &self.projects[idx])
    }

    /// Allocate an id no other project in this document uses.
    #[must_use]
    pub fn allocate_id(&self, client: &str, salt: &str) -> String {
        let taken: HashSet<&str> = self.projects.iter().map(|p| p.id.as_str()).collect();
        let mut attempt = 0_u32;
        loop {
            let candidate = derive_project_id(client, &format!("{salt}#{attempt}"));
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            attempt += 1;
        }
    }

    fn upgrade(&mut self) {
        for idx in 0..self.projects.len() {
            if self.projects[idx].id.is_empty() {
                let id = self.allocate_id(&self.projects[idx].client, "");
                self.projects[idx].id = id;
            }
            reorder_legacy_history(&mut self.projects[idx].history);
        }
    }
}

/// `prj-` plus 12 hex chars of a BLAKE3 hash over the client key and salt.
#[must_use]
pub fn derive_project_id(client: &str, salt: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(client_key(client).as_bytes());
    hasher.update(b"\0");
    hasher.update(salt.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("prj-{}", &hex.as_str()[..12])
}

// Legacy histories were appended oldest-first.
fn reorder_legacy_history(history: &mut [HistoryEntry]) {
    if let (Some(first), Some(last)) = (history.first(), history.last()) {
        if first.timestamp < last.timestamp {
            history.reverse();
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::model::field::TrackedField;

    const SAMPLE: &str = r#"{
        "channel_id": "C-REPORTS",
        "mailbox_channel_id": "C-MAIL",
        "authorized_users": ["leo@powercommerce.com"],
        "external_authorized_users": [],
        "channel_map": {
            "C-AVVIKA": {"client": "Avvika", "role": "external"},
            "C-TEAM": {"client": "", "role": "internal"}
        },
        "projects": [
            {"client": "Avvika", "status": "In Progress", "history": []}
        ],
        "report_schedule": "daily"
    }"#;

    #[test]
    fn parses_config_projects_and_extras() {
        let doc = Document::parse(SAMPLE).expect("parse");
        assert_eq!(doc.config.channel_id, "C-REPORTS");
        assert_eq!(doc.config.authorized_users, vec!["leo@powercommerce.com"]);
        assert_eq!(
            doc.config.channel_map.get("C-AVVIKA").map(|m| m.role),
            Some(Role::External)
        );
        assert_eq!(doc.projects.len(), 1);
        assert_eq!(doc.projects[0].get(TrackedField::Status), "In Progress");
        assert_eq!(doc.extra.get("report_schedule"), Some(&Value::from("daily")));
        assert!(!doc.extra.contains_key("projects"));
    }

    #[test]
    fn missing_ids_are_assigned_deterministically() {
        let a = Document::parse(SAMPLE).expect("parse");
        let b = Document::parse(SAMPLE).expect("parse");
        assert!(a.projects[0].id.starts_with("prj-"));
        assert_eq!(a.projects[0].id, b.projects[0].id);
    }

    #[test]
    fn legacy_array_is_accepted_and_history_flipped() {
        let raw = r#"[
            {"client": "Avvika", "history": [
                {"timestamp": "2025-01-01 09:00:00", "user": "a@x.com",
                 "changes": {"status": {"old": "-", "new": "Started"}}},
                {"timestamp": "2025-01-02 09:00:00", "user": "a@x.com",
                 "changes": {"status": {"old": "Started", "new": "Done"}}}
            ]}
        ]"#;
        let doc = Document::parse(raw).expect("parse legacy");
        assert!(doc.config.channel_map.is_empty());
        let history = &doc.projects[0].history;
        assert_eq!(history[0].timestamp, "2025-01-02 09:00:00");
        assert_eq!(history[1].timestamp, "2025-01-01 09:00:00");
    }

    #[test]
    fn scalars_are_malformed() {
        assert!(matches!(
            Document::parse("42"),
            Err(StorageError::Malformed(_))
        ));
        assert!(matches!(
            Document::parse("{not json"),
            Err(StorageError::Malformed(_))
        ));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let doc = Document::parse(SAMPLE).expect("parse");
        assert_eq!(doc.position("AVVIKA"), Some(0));
        assert_eq!(doc.position(" avvika "), Some(0));
        assert!(doc.find("Other").is_none());
    }

    #[test]
    fn allocated_ids_skip_taken_ones() {
        let mut doc = Document::parse(SAMPLE).expect("parse");
        let first = doc.allocate_id("Zeta", "t1");
        doc.projects.push(Project::new(first.clone(), "Zeta"));
        let second = doc.allocate_id("Zeta", "t1");
        assert_ne!(first, second);
    }

    #[test]
    fn encode_then_parse_is_stable() {
        let doc = Document::parse(SAMPLE).expect("parse");
        let again = Document::parse(&doc.to_json().expect("encode")).expect("reparse");
        assert_eq!(doc, again);
    }
}
