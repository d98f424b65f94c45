pub mod admin;
pub mod completions;
pub mod create;
pub mod history;
pub mod list;
pub mod rename;
pub mod scope;
pub mod show;
pub mod update;

use clap::Args;
use projdesk_core::desk::{Caller, Desk};
use projdesk_core::error::DeskResult;
use projdesk_core::model::TrackedField;
use projdesk_core::store::ProjectPatch;
use serde_json::Value;

use crate::output::{CliError, OutputMode, render_error};

/// Everything a command needs once the remote and caller are resolved.
pub struct Session {
    pub desk: Desk,
    pub caller: Caller,
    pub output: OutputMode,
}

impl Session {
    /// Unwrap a desk result, rendering the failure before bailing.
    pub fn check<T>(&self, result: DeskResult<T>) -> anyhow::Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                render_error(self.output, &CliError::from(&err))?;
                anyhow::bail!("{err}")
            }
        }
    }
}

/// Tracked and untracked field flags shared by `create` and `update`.
#[derive(Args, Debug, Default)]
pub struct FieldArgs {
    /// Project status (e.g. "In Progress", "Completed").
    #[arg(long)]
    pub status: Option<String>,

    /// Pipeline category.
    #[arg(long)]
    pub category: Option<String>,

    /// Account owner.
    #[arg(long)]
    pub owner: Option<String>,

    /// Assigned developer.
    #[arg(long)]
    pub developer: Option<String>,

    /// Current blocker. Pass "" or "-" to clear.
    #[arg(long)]
    pub blocker: Option<String>,

    /// Date of the last client contact.
    #[arg(long = "last-contact", value_name = "YYYY-MM-DD")]
    pub last_contact_date: Option<String>,

    /// Date of the next scheduled call.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub call: Option<String>,

    /// Where the client is reached (Slack, email, ...).
    #[arg(long = "comm-channel")]
    pub comm_channel: Option<String>,

    /// Internal notes; never shown to external callers. Pass "" to clear.
    #[arg(long)]
    pub notes: Option<String>,

    /// Budget as JSON (number, string, or object). Pass null to clear.
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub budget: Option<Value>,

    /// Free-form field as KEY=VALUE; VALUE is parsed as JSON when it can be.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub extra: Vec<(String, Value)>,
}

impl FieldArgs {
    /// Build the patch these flags describe.
    pub fn to_patch(&self) -> ProjectPatch {
        let tracked = [
            (TrackedField::Status, &self.status),
            (TrackedField::Category, &self.category),
            (TrackedField::Owner, &self.owner),
            (TrackedField::Developer, &self.developer),
            (TrackedField::Blocker, &self.blocker),
            (TrackedField::LastContactDate, &self.last_contact_date),
            (TrackedField::Call, &self.call),
            (TrackedField::CommChannel, &self.comm_channel),
        ];
        let mut patch = ProjectPatch::new();
        for (field, value) in tracked {
            if let Some(value) = value {
                patch.fields.insert(field, value.clone());
            }
        }
        patch.internal_notes.clone_from(&self.notes);
        patch.budget.clone_from(&self.budget);
        patch.extra = self.extra.iter().cloned().collect();
        patch
    }
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))
}

fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("key must not be empty".into());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
