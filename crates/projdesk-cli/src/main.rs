#![forbid(unsafe_code)]

mod caller;
mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::Session;
use output::{CliError, OutputMode, render_error};
use projdesk_core::desk::Desk;
use projdesk_core::error::ErrorCode;
use projdesk_core::settings::{self, EnvOverrides, RemoteNotConfigured};
use std::env;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "pdk: client project records with change history and scoped access",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Channel the request comes from (else PROJDESK_CHANNEL).
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Email of the caller (else PROJDESK_ACTOR).
    #[arg(long = "as", global = true, value_name = "EMAIL")]
    as_email: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Projects",
        about = "Show one project",
        long_about = "Show one project by client name. External callers only see their own \
                      client, without internal notes, budget, or free-form fields.",
        after_help = "EXAMPLES:\n    # Show a project\n    pdk show Avvika\n\n    # Emit machine-readable output\n    pdk show avvika --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Projects",
        about = "List projects",
        long_about = "List every project visible to the caller, optionally filtered by category.",
        after_help = "EXAMPLES:\n    # Everything you can see\n    pdk list\n\n    # One pipeline stage\n    pdk list --category \"New / In Progress\""
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Projects",
        about = "Create a project",
        long_about = "Create a project for a new client. Unspecified fields start as \
                      status Initialized, category \"New / In Progress\", developer Unassigned.",
        after_help = "EXAMPLES:\n    # Minimal\n    pdk create \"Northwind\"\n\n    # With an owner and a budget\n    pdk create Northwind --owner Leo --budget '{\"monthly\": 4000}'"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Projects",
        about = "Update project fields",
        long_about = "Update one or more fields. Changes to tracked fields are recorded in \
                      the project's history with the caller's email.",
        after_help = "EXAMPLES:\n    # Close out a project\n    pdk update Avvika --status Completed --blocker Resolved\n\n    # Clear the blocker\n    pdk update Avvika --blocker \"\"\n\n    # Free-form field\n    pdk update Avvika --set seats=12"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Projects",
        about = "Rename a client",
        long_about = "Rename a client. The project keeps its id and history, and channels \
                      mapped to the old name follow the rename.",
        after_help = "EXAMPLES:\n    pdk rename Avvika \"Avvika Labs\""
    )]
    Rename(cmd::rename::RenameArgs),

    #[command(
        next_help_heading = "Projects",
        about = "Show a project's change history",
        after_help = "EXAMPLES:\n    # Last five changes\n    pdk history Avvika -n 5"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Access",
        about = "Show how your channel and email resolve",
        after_help = "EXAMPLES:\n    pdk scope --channel C024BE91L --as ana@avvika.com"
    )]
    Scope,

    #[command(
        next_help_heading = "Access",
        about = "Manage authorized users and channel mappings",
        after_help = "EXAMPLES:\n    pdk admin add-user --list external ana@avvika.com\n    pdk admin map-channel C024BE91L Avvika --role external\n    pdk admin show"
    )]
    Admin(cmd::admin::AdminArgs),

    #[command(
        next_help_heading = "Shell",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    pdk completions bash > /etc/bash_completion.d/pdk"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PROJDESK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "projdesk=debug,info"
        } else {
            "projdesk=info,warn"
        })
    });

    let format = env::var("PROJDESK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Render a setup failure and hand it back as the process error.
fn setup_failure(output: OutputMode, err: anyhow::Error) -> anyhow::Error {
    let code = if err.downcast_ref::<RemoteNotConfigured>().is_some() {
        ErrorCode::RemoteNotConfigured
    } else {
        ErrorCode::SettingsParseError
    };
    let cli_error = CliError::with_details(
        format!("{err:#}"),
        code.hint().unwrap_or_default(),
        code.code(),
    );
    match render_error(output, &cli_error) {
        Ok(()) => err,
        Err(render_err) => render_err,
    }
}

fn open_session(cli: &Cli) -> anyhow::Result<Session> {
    let project_root = env::current_dir()?;
    let settings = settings::load_settings(&project_root)
        .map_err(|err| setup_failure(output::resolve_output_mode(cli.json, None), err))?;
    let output = output::resolve_output_mode(cli.json, settings.output.as_deref());

    let caller = match caller::resolve_caller(cli.channel.as_deref(), cli.as_email.as_deref()) {
        Ok(caller) => caller,
        Err(err) => {
            render_error(
                output,
                &CliError::with_details(
                    err.message.clone(),
                    "Pass --channel and --as, or export PROJDESK_CHANNEL and PROJDESK_ACTOR.",
                    err.code,
                ),
            )?;
            anyhow::bail!(err);
        }
    };

    let target = settings::resolve_target(&settings.remote, &EnvOverrides::from_env())
        .map_err(|err| setup_failure(output, err))?;
    let client = settings::build_client(target, &settings.remote);
    debug!(remote = %client.describe(), "remote document resolved");

    Ok(Session {
        desk: Desk::from_remote(client),
        caller,
        output,
    })
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    if let Commands::Completions(ref args) = cli.command {
        return cmd::completions::run_completions(args.shell, &mut Cli::command());
    }

    let session = open_session(&cli)?;
    match cli.command {
        Commands::Show(ref args) => cmd::show::run_show(args, &session),
        Commands::List(ref args) => cmd::list::run_list(args, &session),
        Commands::Create(ref args) => cmd::create::run_create(args, &session),
        Commands::Update(ref args) => cmd::update::run_update(args, &session),
        Commands::Rename(ref args) => cmd::rename::run_rename(args, &session),
        Commands::History(ref args) => cmd::history::run_history(args, &session),
        Commands::Scope => cmd::scope::run_scope(&session),
        Commands::Admin(ref args) => cmd::admin::run_admin(args, &session),
        Commands::Completions(_) => Ok(()),
    }
}
