use clap::Args;

use super::Session;
use crate::output::{project_pretty, project_row, render_mode};

/// Arguments for `pdk show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Client name (case-insensitive).
    pub client: String,
}

/// Print one project. External callers see only their own, without internal fields.
///
/// # Errors
///
/// Fails when the caller may not see the project, or it does not exist.
pub fn run_show(args: &ShowArgs, session: &Session) -> anyhow::Result<()> {
    let project = session.check(session.desk.get_project(&session.caller, &args.client))?;
    render_mode(
        session.output,
        &project,
        |p, w| project_row(w, p),
        |p, w| project_pretty(w, p),
    )
}
