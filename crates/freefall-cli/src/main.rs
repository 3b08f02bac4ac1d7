// crates/freefall-cli/src/main.rs
// ============================================================================
// Module: Freefall CLI Entry Point
// Description: Command dispatcher for the freefall ingestion service.
// Purpose: Run the HTTP server, inspect configuration, and ingest files offline.
// Dependencies: clap, freefall-config, freefall-core, freefall-server, tokio.
// ============================================================================

//! ## Overview
//! The `freefall` binary starts the HTTP ingestion server, prints a redacted
//! configuration summary, or pushes a local CSV file through the same
//! ingestion pipeline without HTTP. Security posture: file inputs are
//! untrusted and read under the configured body limit.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use freefall_config::FreefallConfig;
use freefall_core::BatchOutcome;
use freefall_core::CancellationFlag;
use freefall_core::CommitPolicy;
use freefall_core::IngestPipeline;
use freefall_core::ReadingStore;
use freefall_server::FreefallServer;
use freefall_server::build_store;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "freefall", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP ingestion server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Ingest a local CSV file into the configured store.
    Ingest(IngestCommand),
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `freefall.toml` or `FREEFALL_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate configuration and print a redacted summary.
    Check(ConfigCheckCommand),
}

/// Arguments for `config check`.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Config file path (defaults to `freefall.toml` or `FREEFALL_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `ingest`.
#[derive(Args, Debug)]
struct IngestCommand {
    /// CSV file to ingest; the first line is treated as a header.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
    /// Config file path (defaults to `freefall.toml` or `FREEFALL_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the configured commit policy.
    #[arg(long, value_enum, value_name = "POLICY")]
    commit_policy: Option<CommitPolicyArg>,
}

/// Commit policy CLI values.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CommitPolicyArg {
    /// Commit every row independently.
    PerRow,
    /// Commit the whole file at once.
    Batch,
}

impl From<CommitPolicyArg> for CommitPolicy {
    fn from(value: CommitPolicyArg) -> Self {
        match value {
            CommitPolicyArg::PerRow => Self::PerRow,
            CommitPolicyArg::Batch => Self::Batch,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Bounded read failures.
#[derive(Debug)]
enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Ingest(command) => command_ingest(command).await,
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let server = tokio::task::spawn_blocking(move || FreefallServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init failed: init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Check(command) => command_config_check(&command),
    }
}

/// Executes `config check`.
fn command_config_check(command: &ConfigCheckCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let summary = serde_json::to_string_pretty(&config.summary())
        .map_err(|err| CliError::new(format!("config summary encode failed: {err}")))?;
    write_stdout_line(&summary).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Ingest Command
// ============================================================================

/// Executes `ingest`.
async fn command_ingest(command: IngestCommand) -> CliResult<ExitCode> {
    let mut config = load_config(command.config.as_deref())?;
    if let Some(policy) = command.commit_policy {
        config.storage.commit_policy = policy.into();
    }
    let payload = read_input(&command.file, config.server.max_body_bytes)?;
    let outcome = tokio::task::spawn_blocking(move || ingest_payload(&config, &payload))
        .await
        .map_err(|err| CliError::new(format!("ingest failed: worker join failed: {err}")))??;
    let report = serde_json::to_string_pretty(&outcome)
        .map_err(|err| CliError::new(format!("ingest report encode failed: {err}")))?;
    write_stdout_line(&report).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Builds the configured store and runs one payload through the pipeline.
fn ingest_payload(config: &FreefallConfig, payload: &[u8]) -> CliResult<BatchOutcome> {
    let store = build_store(&config.storage)
        .map_err(|err| CliError::new(format!("ingest failed: {err}")))?;
    store
        .ensure_schema()
        .map_err(|err| CliError::new(format!("ingest failed: schema setup: {err}")))?;
    let pipeline = IngestPipeline::new(store, config.storage.commit_policy);
    pipeline
        .ingest(payload, &CancellationFlag::new())
        .map_err(|err| CliError::new(format!("ingest failed: {err}")))
}

/// Reads the ingest input, mapping limit failures to CLI errors.
fn read_input(path: &Path, max_bytes: usize) -> CliResult<Vec<u8>> {
    read_bytes_with_limit(path, max_bytes).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("failed to read {}: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "{} is {size} bytes, which exceeds the {limit} byte limit",
            path.display()
        )),
    })
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads configuration with CLI error mapping.
fn load_config(path: Option<&Path>) -> CliResult<FreefallConfig> {
    FreefallConfig::load(path).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

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

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
