use clap::Args;
use std::io::Write;

use super::Session;
use crate::output::{history_lines, history_pretty, pretty_section, render_mode};

/// Arguments for `pdk history`.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Client name (case-insensitive).
    pub client: String,

    /// Show at most this many entries, newest first.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Print a project's change history, newest first.
///
/// # Errors
///
/// Fails when the caller may not see the project, or it does not exist.
pub fn run_history(args: &HistoryArgs, session: &Session) -> anyhow::Result<()> {
    let entries = session.check(
        session
            .desk
            .get_history(&session.caller, &args.client, args.limit),
    )?;
    render_mode(
        session.output,
        &entries,
        |entries, w| {
            for entry in entries {
                history_lines(w, entry)?;
            }
            Ok(())
        },
        |entries, w| {
            pretty_section(w, &format!("History: {}", args.client.trim()))?;
            if entries.is_empty() {
                return writeln!(w, "No changes recorded.");
            }
            for entry in entries {
                history_pretty(w, entry)?;
            }
            Ok(())
        },
    )
}
