use clap::{Args, Subcommand};
use projdesk_core::config::{AdminOutcome, Config, Role, UserList};
use serde::Serialize;
use std::io::Write;

use super::Session;
use crate::output::{pretty_kv, pretty_section, render_mode};

/// Arguments for `pdk admin`.
#[derive(Args, Debug)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Authorize a user on the internal or external list.
    #[command(name = "add-user")]
    AddUser {
        /// Which list: internal or external.
        #[arg(long, default_value = "internal")]
        list: UserList,
        /// Email address to authorize.
        email: String,
    },

    /// Remove a user from the internal or external list.
    #[command(name = "remove-user")]
    RemoveUser {
        /// Which list: internal or external.
        #[arg(long, default_value = "internal")]
        list: UserList,
        /// Email address to remove.
        email: String,
    },

    /// Bind a channel to a client with a role.
    #[command(name = "map-channel")]
    MapChannel {
        /// Channel identifier.
        #[arg(value_name = "CHANNEL")]
        channel_id: String,
        /// Client name the channel belongs to.
        client: String,
        /// internal or external.
        #[arg(long, default_value = "internal")]
        role: Role,
    },

    /// Remove a channel binding.
    #[command(name = "unmap-channel")]
    UnmapChannel {
        /// Channel identifier.
        #[arg(value_name = "CHANNEL")]
        channel_id: String,
    },

    /// Show the current access configuration.
    Show,
}

#[derive(Serialize)]
struct AdminReport<'a> {
    action: &'static str,
    target: &'a str,
    #[serde(flatten)]
    outcome: &'a AdminOutcome,
    changed: bool,
}

/// Run an administration subcommand. Internal callers only.
///
/// # Errors
///
/// Fails for non-internal callers, invalid input, an unknown channel on
/// unmap, or a storage failure.
pub fn run_admin(args: &AdminArgs, session: &Session) -> anyhow::Result<()> {
    let caller = &session.caller;
    let desk = &session.desk;
    let (action, target, outcome) = match &args.command {
        AdminCommand::AddUser { list, email } => (
            "add-user",
            email.as_str(),
            session.check(desk.admin_add_user(caller, *list, email))?,
        ),
        AdminCommand::RemoveUser { list, email } => (
            "remove-user",
            email.as_str(),
            session.check(desk.admin_remove_user(caller, *list, email))?,
        ),
        AdminCommand::MapChannel {
            channel_id,
            client,
            role,
        } => (
            "map-channel",
            channel_id.as_str(),
            session.check(desk.admin_map_channel(caller, channel_id, client, *role))?,
        ),
        AdminCommand::UnmapChannel { channel_id } => (
            "unmap-channel",
            channel_id.as_str(),
            session.check(desk.admin_unmap_channel(caller, channel_id))?,
        ),
        AdminCommand::Show => {
            let config = session.check(desk.reload_config(caller))?;
            return render_config(session, &config);
        }
    };

    let report = AdminReport {
        action,
        target: target.trim(),
        outcome: &outcome,
        changed: outcome.changed(),
    };
    render_mode(
        session.output,
        &report,
        |r, w| writeln!(w, "{}\t{}\t{}", r.action, r.target, describe(r.outcome)),
        |r, w| writeln!(w, "{}: {}", r.target, describe(r.outcome)),
    )
}

fn describe(outcome: &AdminOutcome) -> String {
    match outcome {
        AdminOutcome::Added => "added".into(),
        AdminOutcome::AlreadyPresent => "already present".into(),
        AdminOutcome::Removed => "removed".into(),
        AdminOutcome::NotPresent => "not present".into(),
        AdminOutcome::Mapped => "mapped".into(),
        AdminOutcome::Replaced { previous } => {
            format!("remapped (was {} as {})", previous.client, previous.role)
        }
        AdminOutcome::Unmapped { previous } => {
            format!("unmapped (was {} as {})", previous.client, previous.role)
        }
    }
}

fn render_config(session: &Session, config: &Config) -> anyhow::Result<()> {
    render_mode(
        session.output,
        config,
        |c, w| {
            for user in &c.authorized_users {
                writeln!(w, "user\tinternal\t{user}")?;
            }
            for user in &c.external_authorized_users {
                writeln!(w, "user\texternal\t{user}")?;
            }
            for (channel, mapping) in &c.channel_map {
                writeln!(w, "channel\t{channel}\t{}\t{}", mapping.client, mapping.role)?;
            }
            Ok(())
        },
        |c, w| {
            pretty_section(w, "Access configuration")?;
            let or_none = |list: &[String]| {
                if list.is_empty() {
                    "(none)".to_string()
                } else {
                    list.join(", ")
                }
            };
            pretty_kv(w, "Internal users", or_none(&c.authorized_users))?;
            pretty_kv(w, "External users", or_none(&c.external_authorized_users))?;
            if !c.channel_id.is_empty() {
                pretty_kv(w, "Report channel", &c.channel_id)?;
            }
            writeln!(w)?;
            pretty_section(w, "Channels")?;
            if c.channel_map.is_empty() {
                writeln!(w, "(none)")?;
            }
            for (channel, mapping) in &c.channel_map {
                writeln!(w, "{channel:<18} {} ({})", mapping.client, mapping.role)?;
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use projdesk_core::config::ChannelMapping;

    #[test]
    fn replaced_mapping_names_the_previous_binding() {
        let outcome = AdminOutcome::Replaced {
            previous: ChannelMapping {
                client: "Avvika".into(),
                role: Role::External,
            },
        };
        assert_eq!(describe(&outcome), "remapped (was Avvika as external)");
    }

    #[test]
    fn report_serializes_outcome_inline() {
        let outcome = AdminOutcome::AlreadyPresent;
        let report = AdminReport {
            action: "add-user",
            target: "ana@avvika.com",
            outcome: &outcome,
            changed: outcome.changed(),
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["outcome"], "already_present");
        assert_eq!(json["changed"], false);
        assert_eq!(json["action"], "add-user");
    }
}
