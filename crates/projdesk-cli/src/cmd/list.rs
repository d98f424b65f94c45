use clap::Args;
use std::io::Write;

use super::Session;
use crate::output::{PROJECT_HEADERS, pretty_rule, project_row, render_mode};
use projdesk_core::model::TrackedField;

/// Arguments for `pdk list`.
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only projects in this category (exact, case-insensitive).
    #[arg(long)]
    pub category: Option<String>,
}

/// List the projects visible to the caller.
///
/// # Errors
///
/// Fails for a denied caller or when the document cannot be read.
pub fn run_list(args: &ListArgs, session: &Session) -> anyhow::Result<()> {
    let projects = session.check(
        session
            .desk
            .list_projects(&session.caller, args.category.as_deref()),
    )?;
    render_mode(
        session.output,
        &projects,
        |projects, w| {
            if !projects.is_empty() {
                writeln!(w, "{}", PROJECT_HEADERS.join("\t"))?;
            }
            for project in projects {
                project_row(w, project)?;
            }
            Ok(())
        },
        |projects, w| {
            if projects.is_empty() {
                return writeln!(w, "No projects.");
            }
            writeln!(w, "CLIENT                       STATUS               OWNER                BLOCKER")?;
            pretty_rule(w)?;
            for p in projects {
                writeln!(
                    w,
                    "{:<28} {:<20} {:<20} {}",
                    p.client,
                    p.get(TrackedField::Status),
                    p.get(TrackedField::Owner),
                    p.get(TrackedField::Blocker),
                )?;
            }
            Ok(())
        },
    )
}
