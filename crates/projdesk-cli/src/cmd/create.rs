use clap::Args;
use std::io::Write;

use super::{FieldArgs, Session};
use crate::output::{project_pretty, render_mode};

/// Arguments for `pdk create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Client name; must not match an existing project case-insensitively.
    pub client: String,

    #[command(flatten)]
    pub fields: FieldArgs,
}

/// Create a project. Unspecified tracked fields take the new-project defaults.
///
/// # Errors
///
/// Fails for non-internal callers, invalid fields, or a taken client name.
pub fn run_create(args: &CreateArgs, session: &Session) -> anyhow::Result<()> {
    let project = session.check(session.desk.create_project(
        &session.caller,
        &args.client,
        &args.fields.to_patch(),
    ))?;
    render_mode(
        session.output,
        &project,
        |p, w| writeln!(w, "{}\t{}", p.id, p.client),
        |p, w| {
            writeln!(w, "Created {}", p.client)?;
            project_pretty(w, p)
        },
    )
}
