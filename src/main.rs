//! claude-gateway - HTTP API for the claude CLI.
//!
//! Usage:
//!   claude-gateway [serve] [--config /data/options.json]   # Start HTTP server
//!   claude-gateway run "<prompt>" [--model m]             # One-shot from the terminal

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use claude_gateway::config::{ServerConfig, DEFAULT_CONFIG_PATH};
use claude_gateway::environment::{LaunchEnv, DEFAULT_DATA_DIR};
use claude_gateway::executor::{Executor, DEFAULT_BINARY};
use claude_gateway::http_server::{self, PORT};
use claude_gateway::{AppState, ErrorKind, ExecutionRequest, ExecutionResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "claude-gateway")]
#[command(about = "HTTP API for the claude CLI")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log at debug level by default
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct CommonArgs {
    /// Options file with api_enabled and api_timeout
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Root for the redirected home, config, cache, state and data dirs
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Assistant binary to launch
    #[arg(long, global = true, default_value = DEFAULT_BINARY)]
    binary: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Run a single prompt and print the output
    Run {
        /// Prompt text
        prompt: String,

        /// Model passed through as --model
        #[arg(long)]
        model: Option<String>,

        /// Timeout in seconds (defaults to api_timeout, capped at 600)
        #[arg(long)]
        timeout: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    let config = ServerConfig::load_or_default(&args.common.config);
    let env = LaunchEnv::from_process(&args.common.data_dir);
    let executor = Executor::new(args.common.binary.clone(), env);

    match args.command {
        None | Some(Commands::Serve) => serve(config, executor).await,
        Some(Commands::Run {
            prompt,
            model,
            timeout,
        }) => Ok(run_once(&config, &executor, prompt, model, timeout).await),
    }
}

async fn serve(config: ServerConfig, executor: Executor) -> anyhow::Result<ExitCode> {
    info!("{}", "=".repeat(60));
    info!("Claude Terminal API Server v{}", env!("CARGO_PKG_VERSION"));
    info!("{}", "=".repeat(60));

    if !config.api_enabled {
        warn!("API disabled");
        return Ok(ExitCode::SUCCESS);
    }

    info!(
        port = PORT,
        timeout_secs = config.api_timeout_secs,
        binary = executor.binary(),
        "Starting on 0.0.0.0:{}",
        PORT
    );
    http_server::run_server(PORT, AppState::new(config, executor))
        .await
        .context("HTTP server failed")?;
    Ok(ExitCode::SUCCESS)
}

async fn run_once(
    config: &ServerConfig,
    executor: &Executor,
    prompt: String,
    model: Option<String>,
    timeout: Option<i64>,
) -> ExitCode {
    let result = match cli_request(config, prompt, model, timeout) {
        Ok(request) => executor.execute(&request).await,
        Err(rejection) => rejection,
    };
    report(result)
}

/// Validate `run` arguments with the same rules as `POST /api/claude`.
fn cli_request(
    config: &ServerConfig,
    prompt: String,
    model: Option<String>,
    timeout: Option<i64>,
) -> Result<ExecutionRequest, ExecutionResult> {
    ExecutionRequest::validate(prompt, model, timeout, config.api_timeout_secs)
}

/// Print a result and map it to the process exit code.
fn report(result: ExecutionResult) -> ExitCode {
    match result {
        ExecutionResult::Success { output, .. } => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        ExecutionResult::Failure {
            error_message,
            error_kind,
            exit_code,
        } => {
            eprintln!("Error ({}): {}", error_kind, error_message);
            match (error_kind, exit_code) {
                (ErrorKind::Execution, Some(code)) if (1..=255).contains(&code) => {
                    ExitCode::from(code as u8)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}
