use clap::Args;
use std::io::Write;

use super::Session;
use crate::output::{pretty_kv, render_mode};

/// Arguments for `pdk rename`.
#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Current client name.
    pub old: String,
    /// New client name.
    pub new: String,
}

/// Rename a client, keeping its id and history; channel mappings follow.
///
/// # Errors
///
/// Fails for non-internal callers, a missing project, or a taken new name.
pub fn run_rename(args: &RenameArgs, session: &Session) -> anyhow::Result<()> {
    let outcome = session.check(
        session
            .desk
            .rename_project(&session.caller, &args.old, &args.new),
    )?;
    render_mode(
        session.output,
        &outcome,
        |o, w| writeln!(w, "{}\t{}\t{}", o.project.id, args.old.trim(), o.project.client),
        |o, w| {
            writeln!(w, "Renamed {} -> {}", args.old.trim(), o.project.client)?;
            pretty_kv(w, "Id", &o.project.id)?;
            if !o.remapped_channels.is_empty() {
                pretty_kv(w, "Channels", o.remapped_channels.join(", "))?;
            }
            Ok(())
        },
    )
}
