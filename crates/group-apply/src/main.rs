//! group-apply CLI entry point.
//!
//! Usage:
//!   group-apply notes.txt sort               # Sort every marked group
//!   group-apply - sh -c 'tr a-z A-Z'         # Read stdin
//!   group-apply --strict-order log.txt cat   # Fully deterministic output

mod cli;

use std::env;
use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{Context, Result};
use group_apply_kernel::{Error, GroupPipeline, RunReport};
use tokio::io::{BufReader, BufWriter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Action, Invocation, Source};

/// Run finished but reported diagnostics.
const EXIT_DIAGNOSTICS: u8 = 1;
/// Usage, configuration, spawn or I/O failure.
const EXIT_ERROR: u8 = 2;
/// Interrupted by Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    // Logs go to stderr so they never mix with the filtered stream
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false),
        )
        .with(filter)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();

    let invocation = match cli::parse_args(&args) {
        Ok(Action::Run(invocation)) => invocation,
        Ok(Action::Help) => {
            cli::print_help();
            return Ok(ExitCode::SUCCESS);
        }
        Ok(Action::Version) => {
            println!(
                "group-apply {} ({} {}, built {})",
                env!("CARGO_PKG_VERSION"),
                env!("GROUP_APPLY_TARGET"),
                env!("GROUP_APPLY_PROFILE"),
                env!("GROUP_APPLY_BUILD_DATE")
            );
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run 'group-apply --help' for usage.");
            return Ok(ExitCode::from(EXIT_ERROR));
        }
    };

    let config = invocation.load_config().context("Failed to load config")?;
    let pipeline = GroupPipeline::new(config, invocation.command.clone())
        .context("Invalid configuration")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let result = rt.block_on(run_pipeline(&pipeline, &invocation));
    // Workers still running after cancellation are killed on drop; don't
    // wait for blocked stdin reads.
    rt.shutdown_background();

    match result {
        Ok(report) => Ok(exit_code(&report)),
        Err(Error::Cancelled) => {
            eprintln!("Interrupted");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_pipeline(
    pipeline: &GroupPipeline,
    invocation: &Invocation,
) -> group_apply_kernel::Result<RunReport> {
    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let stdout = BufWriter::new(tokio::io::stdout());
    match &invocation.source {
        Source::Stdin => pipeline.run(BufReader::new(tokio::io::stdin()), stdout).await,
        Source::File(path) => pipeline.run_path(path, stdout).await,
    }
}

fn exit_code(report: &RunReport) -> ExitCode {
    tracing::debug!(
        groups = report.groups,
        passthrough = report.passthrough_lines,
        diagnostics = report.diagnostics.len(),
        "done"
    );
    if report.is_clean() {
        return ExitCode::SUCCESS;
    }

    let failed = report.failed_groups();
    let failed: Vec<String> = failed.iter().map(ToString::to_string).collect();
    tracing::warn!(
        "{} warning(s): {} marker problem(s), failed groups: [{}]",
        report.diagnostics.len(),
        report.protocol_violations(),
        failed.join(", ")
    );
    ExitCode::from(EXIT_DIAGNOSTICS)
}
