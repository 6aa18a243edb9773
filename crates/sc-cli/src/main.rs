mod annotate;
mod commands;

use clap::{Parser, Subcommand};
use sc_api::ContactsApi;
use sc_core::{ContactsError, ContactsResult, ExitCode};
use sc_fs::{WorkspacePaths, load_config, open_or_init, resolve_profile};
use sc_store::StateStore;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "stellar-contacts",
    version,
    about = "Label Stellar accounts and keep the labels in sync",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true)]
    profile: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,

    #[arg(long, global = true)]
    server: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init,
    Doctor,
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },
    Contact {
        #[command(subcommand)]
        command: ContactCommand,
    },
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },
    /// Replace the contact list with the contents of an exported file.
    Import {
        file: PathBuf,
    },
    /// Write active contacts as `{id: {"label": ...}}` JSON.
    Export {
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Label known account ids in text read from a file or stdin.
    Annotate {
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
        #[arg(long)]
        short: bool,
        #[arg(long)]
        sync: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    List,
    Use {
        name: String,
    },
    Set {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        server: String,
    },
}

#[derive(Debug, Subcommand)]
enum KeyCommand {
    Set {
        key: Option<String>,
    },
    Check,
    Clear,
    Status,
}

#[derive(Debug, Subcommand)]
enum ContactCommand {
    List,
    Set {
        id: String,
        label: String,
        #[arg(long)]
        no_sync: bool,
    },
    Remove {
        id: String,
        #[arg(long)]
        no_sync: bool,
    },
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    Run {
        /// Behave like a background trigger: skipped if the last attempt was
        /// less than a minute ago.
        #[arg(long)]
        auto: bool,
    },
    Status,
}

#[derive(Debug, Clone)]
struct GlobalOptions {
    profile: Option<String>,
    workspace: Option<PathBuf>,
    server: Option<String>,
    json: bool,
}

#[derive(Debug)]
struct ProfileContext {
    paths: WorkspacePaths,
    profile: String,
    server: String,
    api: ContactsApi,
    store: StateStore,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    workspace: String,
    created: Vec<String>,
    updated: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProfileChangedOutput {
    profile: String,
    server: String,
}

fn main() {
    let cli = Cli::parse();
    configure_logging(cli.debug, cli.json, cli.no_color);

    let globals = GlobalOptions {
        profile: cli.profile,
        workspace: cli.workspace,
        server: cli.server,
        json: cli.json,
    };

    let result = run_command(cli.command, &globals);

    let exit = match result {
        Ok(code) => code,
        Err(error) => {
            render_error(&error, globals.json);
            error.exit_code()
        }
    };

    std::process::exit(exit.as_i32());
}

/// Logs go to stderr so stdout stays parseable. `RUST_LOG` overrides the
/// default level.
fn configure_logging(debug: bool, json: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!json && !no_color)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_command(command: Command, globals: &GlobalOptions) -> ContactsResult<ExitCode> {
    match command {
        Command::Init => commands::profile::cmd_init(globals),
        Command::Doctor => commands::profile::cmd_doctor(globals),
        Command::Profile { command } => commands::profile::cmd_profile(command, globals),
        Command::Key { command } => commands::key::cmd_key(command, globals),
        Command::Contact { command } => commands::contact::cmd_contact(command, globals),
        Command::Sync { command } => commands::sync::cmd_sync(command, globals),
        Command::Import { file } => commands::transfer::cmd_import(file, globals),
        Command::Export { output } => commands::transfer::cmd_export(output, globals),
        Command::Annotate { file, short, sync } => {
            commands::transfer::cmd_annotate(file, short, sync, globals)
        }
    }
}

fn with_profile_context<F>(globals: &GlobalOptions, run: F) -> ContactsResult<ExitCode>
where
    F: FnOnce(ProfileContext) -> ContactsResult<ExitCode>,
{
    let paths = open_or_init(globals.workspace.as_deref(), globals.server.as_deref())?;
    let config = load_config(&paths)?;
    let resolved = resolve_profile(
        &config,
        globals.profile.as_deref(),
        globals.server.as_deref(),
    )?;
    let api = ContactsApi::new(&resolved.server)?;
    let store = StateStore::from_workspace(&paths)?;

    run(ProfileContext {
        paths,
        profile: resolved.name,
        server: resolved.server,
        api,
        store,
    })
}

/// Files named on the command line: relative paths are tried against the
/// current directory first, then the workspace root.
fn resolve_user_path(path: PathBuf, workspace_root: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        return path;
    }

    workspace_root.join(path)
}

fn render_error(error: &ContactsError, json_output: bool) {
    if !json_output {
        eprintln!("error: {}", error.message);
        return;
    }

    match serde_json::to_string_pretty(&json!({"ok": false, "error": error})) {
        Ok(rendered) => eprintln!("{rendered}"),
        Err(_) => eprintln!("{{\"ok\":false,\"error\":{{\"message\":{:?}}}}}", error.message),
    }
}

fn print_json<T: Serialize>(value: &T) -> ContactsResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| ContactsError::io(format!("failed to render JSON output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
