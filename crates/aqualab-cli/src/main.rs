// crates/aqualab-cli/src/main.rs
// ============================================================================
// Module: AquaLab CLI Entry Point
// Description: Command dispatcher for serving the lab API and checking config.
// Purpose: Provide the `aqualab` binary.
// Dependencies: aqualab-api, aqualab-config, clap, thiserror, tokio
// ============================================================================

//! ## Overview
//! `aqualab serve` loads configuration and runs the HTTP service until
//! Ctrl-C. `aqualab config check` loads and validates configuration and
//! prints a short summary. The config path comes from `--config`, then
//! `AQUALAB_CONFIG`, then `./aqualab.toml`. Errors go to stderr and the
//! process exits with status 1.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use aqualab_api::LabServer;
use aqualab_config::LabConfig;
use aqualab_config::RoleConfirmation;
use aqualab_config::StoreType;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "aqualab", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the AquaLab HTTP service.
    Serve(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a configuration file.
    Check(ConfigArgs),
}

/// Shared `--config` argument.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Optional config file path (defaults to `AQUALAB_CONFIG` or aqualab.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures reported on stderr.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded.
    #[error("failed to load config: {0}")]
    Config(String),
    /// The server failed to start or stopped with an error.
    #[error("server failed: {0}")]
    Serve(String),
    /// Writing to stdout failed.
    #[error("failed to write output: {0}")]
    Output(String),
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the parsed command.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Config {
            command: ConfigCommand::Check(args),
        } => command_config_check(&args),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(args: ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(&args)?;
    let server = tokio::task::spawn_blocking(move || LabServer::from_config(config))
        .await
        .map_err(|err| CliError::Serve(format!("init join failed: {err}")))?
        .map_err(|err| CliError::Serve(err.to_string()))?;
    server.serve().await.map_err(|err| CliError::Serve(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `config check` command.
fn command_config_check(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    write_stdout_line(&config_summary(&config))
        .map_err(|err| CliError::Output(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads configuration using the standard path resolution.
fn load_config(args: &ConfigArgs) -> CliResult<LabConfig> {
    LabConfig::load(args.config.as_deref()).map_err(|err| CliError::Config(err.to_string()))
}

/// Renders the one-line summary printed by `config check`.
fn config_summary(config: &LabConfig) -> String {
    let store = match config.store.store_type {
        StoreType::Memory => "memory",
        StoreType::Sqlite => "sqlite",
    };
    let confirmation = match config.auth.role_confirmation {
        RoleConfirmation::Directory => "directory",
        RoleConfirmation::Claims => "claims",
    };
    format!(
        "config ok: bind={} store={store} directory={} role_confirmation={confirmation}",
        config.server.bind.trim(),
        config.user_directory.base_url(),
    )
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
