use projdesk_core::auth::Scope;
use serde::Serialize;
use std::io::Write;

use super::Session;
use crate::output::{pretty_kv, render_mode};

#[derive(Serialize)]
struct ScopeReport<'a> {
    channel: &'a str,
    email: &'a str,
    #[serde(flatten)]
    scope: &'a Scope,
}

/// Show how the caller's channel and email resolve.
///
/// # Errors
///
/// Fails only when the access configuration cannot be loaded.
pub fn run_scope(session: &Session) -> anyhow::Result<()> {
    let scope = session.check(session.desk.resolve_scope(&session.caller))?;
    let report = ScopeReport {
        channel: &session.caller.channel,
        email: &session.caller.email,
        scope: &scope,
    };
    render_mode(
        session.output,
        &report,
        |r, w| match r.scope {
            Scope::ExternalScoped { client } => writeln!(w, "{}\t{client}", r.scope.label()),
            Scope::Denied { .. } | Scope::InternalFull => writeln!(w, "{}", r.scope.label()),
        },
        |r, w| {
            pretty_kv(w, "Channel", r.channel)?;
            pretty_kv(w, "Email", r.email)?;
            pretty_kv(w, "Scope", r.scope.label())?;
            match r.scope {
                Scope::ExternalScoped { client } => pretty_kv(w, "Client", client),
                Scope::Denied { .. } | Scope::InternalFull => Ok(()),
            }
        },
    )
}
