//! Shared output layer for pretty/text/JSON parity across all commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its result
//! accordingly: framed sections for humans, one tab-separated row per record
//! for pipes, or stable JSON.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. `output` in the settings file
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use projdesk_core::error::DeskError;
use projdesk_core::model::{HistoryEntry, Project, TrackedField};
use projdesk_core::settings;
use serde::Serialize;
use std::io::{self, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<18} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Tab-separated rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    fn from_name(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "text" => Self::Text,
            _ => Self::Pretty,
        }
    }
}

/// Resolve the output mode from the `--json` flag, `FORMAT`, settings, and TTY.
pub fn resolve_output_mode(json_flag: bool, configured: Option<&str>) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    OutputMode::from_name(settings::resolve_output(
        json_flag,
        configured,
        env_val.as_deref(),
    ))
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode, the value is serialized with `serde_json`. Otherwise the
/// renderer for the mode runs.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E2001", "missing_channel").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Create an error with a suggestion and error code.
    pub fn with_details(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            error_code: Some(error_code.into()),
        }
    }
}

impl From<&DeskError> for CliError {
    fn from(err: &DeskError) -> Self {
        Self {
            message: err.to_string(),
            suggestion: err.hint().map(str::to_string),
            error_code: Some(err.code().code().to_string()),
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error: {}", error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Project and history renderers shared by several commands
// ────────────────────────────────────────────────────────────────────────────

/// Column headers for [`project_row`].
pub const PROJECT_HEADERS: &[&str] = &["id", "client", "status", "category", "owner", "blocker"];

pub fn project_row(w: &mut dyn Write, project: &Project) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}",
        project.id,
        project.client,
        project.get(TrackedField::Status),
        project.get(TrackedField::Category),
        project.get(TrackedField::Owner),
        project.get(TrackedField::Blocker),
    )
}

pub fn project_pretty(w: &mut dyn Write, project: &Project) -> io::Result<()> {
    pretty_section(w, &format!("{} ({})", project.client, project.id))?;
    for field in TrackedField::ALL {
        pretty_kv(w, field.label(), project.get(field))?;
    }
    if let Some(ref updated) = project.last_updated {
        pretty_kv(w, "Last updated", updated)?;
    }
    if let Some(ref notes) = project.internal_notes {
        pretty_kv(w, "Internal notes", notes)?;
    }
    if let Some(ref budget) = project.budget {
        pretty_kv(w, "Budget", budget.to_string())?;
    }
    for (key, value) in &project.extra {
        pretty_kv(w, key, value.to_string())?;
    }
    if !project.history.is_empty() {
        pretty_kv(w, "History", format!("{} entries", project.history.len()))?;
    }
    Ok(())
}

/// One row per changed field: timestamp, user, field, old, new.
pub fn history_lines(w: &mut dyn Write, entry: &HistoryEntry) -> io::Result<()> {
    for (field, change) in &entry.changes {
        writeln!(
            w,
            "{}\t{}\t{field}\t{}\t{}",
            entry.timestamp, entry.user, change.old, change.new
        )?;
    }
    Ok(())
}

pub fn history_pretty(w: &mut dyn Write, entry: &HistoryEntry) -> io::Result<()> {
    writeln!(w, "{}  {}", entry.timestamp, entry.user)?;
    for (field, change) in &entry.changes {
        writeln!(w, "  {field}: {} -> {}", change.old, change.new)?;
    }
    Ok(())
}
