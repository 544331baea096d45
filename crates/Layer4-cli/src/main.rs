//! Errand CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use errand_foundation::{ExecutorConfig, JsonStore};
use errand_task::{ExecInput, TaskExecutor};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Errand - run tasks with timeouts and graceful shutdown
#[derive(Parser, Debug)]
#[command(name = "errand")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding executor.json (default: user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count to a number, streaming progress through a line pump
    Count {
        /// Number to count to
        #[arg(short, long, default_value = "10000")]
        max: u64,

        /// Pause between increments in milliseconds
        #[arg(short, long, default_value = "0")]
        pause_ms: u64,

        /// Progress lines buffered before output is truncated
        #[arg(short, long, default_value = "7")]
        queue: usize,

        /// Cancel after this many milliseconds (0: never)
        #[arg(short, long, default_value = "0")]
        timeout_ms: u64,
    },
    /// Run an external program
    Exec {
        /// Program to run
        program: PathBuf,

        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Working directory
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Kill the program after this many milliseconds (0: never)
        #[arg(short, long, default_value = "0")]
        timeout_ms: u64,

        /// Print the captured output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let store = match &args.config {
        Some(dir) => JsonStore::new(dir),
        None => JsonStore::global()?,
    };
    let config = ExecutorConfig::load(&store)?;
    let executor = TaskExecutor::builder().config(config).build()?;

    let result = match args.command {
        Command::Count {
            max,
            pause_ms,
            queue,
            timeout_ms,
        } => {
            cli::count(
                &executor,
                max,
                Duration::from_millis(pause_ms),
                queue,
                Duration::from_millis(timeout_ms),
            )
            .await
        }
        Command::Exec {
            program,
            args,
            cwd,
            timeout_ms,
            json,
        } => {
            let input = ExecInput {
                program,
                args,
                cwd,
                ..Default::default()
            };
            cli::exec(&executor, input, Duration::from_millis(timeout_ms), json).await
        }
    };

    executor.close().await;

    let code = result?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
