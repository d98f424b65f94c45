//! Record types persisted in the remote document.

pub mod document;
pub mod field;
pub mod project;

pub use document::Document;
pub use field::{TrackedField, UNSET};
pub use project::{FieldChange, HistoryEntry, Project, TrackedSnapshot};
