//! tq - run shell commands through a throttled queue
//!
//! CLI entry point.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use throttleq::cli::{Cli, Command, OutputFormat};
use throttleq::config::Config;
use throttleq::queue::DeferredQueue;
use throttleq::runner::{CommandStatus, RunSummary, parse_commands, run_commands};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("throttleq")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("tq.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "tq loaded config: interval_ms={}, await_completion={}",
        config.queue.interval_ms, config.queue.await_completion
    );

    match cli.command {
        Some(Command::Run {
            file,
            interval_ms,
            await_completion,
            stop_on_failure,
            format,
        }) => {
            let mut config = config;
            if let Some(ms) = interval_ms {
                config.queue.interval_ms = ms;
            }
            config.queue.await_completion |= await_completion;
            config.runner.stop_on_failure |= stop_on_failure;
            cmd_run(&config, file.as_deref(), format).await
        }
        Some(Command::Config) => cmd_config(&config),
        None => {
            // Default: print help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Read command lines from a file, or stdin for "-"/none
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => {
            fs::read_to_string(path).context(format!("Failed to read {}", path.display()))
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Run commands through the queue
async fn cmd_run(config: &Config, file: Option<&Path>, format: OutputFormat) -> Result<()> {
    let input = read_input(file)?;
    let commands = parse_commands(&input);

    let queue = DeferredQueue::from_config(&config.queue);
    let inherit_stdout = format == OutputFormat::Text;
    let summary = run_commands(&queue, &config.runner, commands, inherit_stdout).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text if summary.reports.is_empty() => println!("No commands to run"),
        OutputFormat::Text => print_summary(&summary),
    }

    let failed = summary.failed();
    if failed > 0 {
        info!(failed, "Run finished with failures");
        std::process::exit(1);
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Run started {}", summary.started_at.format("%Y-%m-%d %H:%M:%S"));
    for report in &summary.reports {
        let marker = match report.status {
            CommandStatus::Succeeded => "[ok]  ".green(),
            CommandStatus::Failed => "[fail]".red(),
            CommandStatus::Skipped => "[skip]".yellow(),
        };
        let offset = report
            .started_ms
            .map(|ms| format!("+{}ms", ms))
            .unwrap_or_else(|| "-".to_string());

        match &report.error {
            Some(error) => println!("{} #{:<3} {:>9}  {}  ({})", marker, report.index, offset, report.command, error),
            None => println!("{} #{:<3} {:>9}  {}", marker, report.index, offset, report.command),
        }
    }
    println!();
    println!(
        "{} commands, {} failed, {} pacing retries",
        summary.reports.len(),
        summary.failed(),
        summary.stats.pacing_retries
    );
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
