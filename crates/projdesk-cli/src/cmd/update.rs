use clap::Args;
use std::io::Write;

use super::{FieldArgs, Session};
use crate::output::{CliError, history_pretty, render_error, render_mode};

/// Arguments for `pdk update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Client name (case-insensitive).
    pub client: String,

    #[command(flatten)]
    pub fields: FieldArgs,
}

/// Apply field changes to a project and record the tracked ones in its history.
///
/// # Errors
///
/// Fails for non-internal callers, an empty or invalid patch, or a missing project.
pub fn run_update(args: &UpdateArgs, session: &Session) -> anyhow::Result<()> {
    let patch = args.fields.to_patch();
    if patch.is_empty() {
        render_error(
            session.output,
            &CliError::with_details(
                "nothing to update",
                "Pass at least one field flag, e.g. --status or --set key=value.",
                "empty_update",
            ),
        )?;
        anyhow::bail!("nothing to update");
    }

    let outcome = session.check(
        session
            .desk
            .update_project(&session.caller, &args.client, &patch),
    )?;
    render_mode(
        session.output,
        &outcome,
        |o, w| match &o.entry {
            Some(entry) => {
                for (field, change) in &entry.changes {
                    writeln!(w, "{}\t{field}\t{}\t{}", o.project.id, change.old, change.new)?;
                }
                Ok(())
            }
            None if o.persisted => writeln!(w, "{}\tupdated", o.project.id),
            None => writeln!(w, "{}\tunchanged", o.project.id),
        },
        |o, w| match &o.entry {
            Some(entry) => {
                writeln!(w, "Updated {}", o.project.client)?;
                history_pretty(w, entry)
            }
            None if o.persisted => writeln!(w, "Updated {} (no tracked changes)", o.project.client),
            None => writeln!(w, "{} is already up to date", o.project.client),
        },
    )
}
