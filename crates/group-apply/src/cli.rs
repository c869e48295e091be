//! Command-line parsing.
//!
//! Options are only recognized before the source path. Everything after it
//! belongs to the worker command, so `group-apply - grep -v x` passes `-v`
//! to grep.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use group_apply_kernel::{OutputOrdering, PipelineConfig, WorkerCommand};

/// What the user asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Help,
    Version,
    Run(Invocation),
}

/// Where the lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub strict_order: bool,
    pub timeout_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub source: Source,
    pub command: WorkerCommand,
}

impl Invocation {
    /// Load the config file and apply command-line overrides on top.
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let config = match &self.config_path {
            Some(path) => PipelineConfig::load_from(path)?,
            None => PipelineConfig::load()?,
        };
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if self.strict_order {
            config = config.with_ordering(OutputOrdering::Strict);
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_worker_timeout(Duration::from_millis(ms));
        }
        if let Some(capacity) = self.queue_capacity {
            config = config.with_queue_capacity(capacity);
        }
        config
    }
}

/// Parse arguments, excluding the program name.
pub fn parse_args(args: &[String]) -> Result<Action> {
    let mut config_path = None;
    let mut strict_order = false;
    let mut timeout_ms = None;
    let mut queue_capacity = None;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-h" | "--help" => return Ok(Action::Help),
            "-V" | "--version" => return Ok(Action::Version),
            "--strict-order" => strict_order = true,
            "--config" => {
                i += 1;
                let value = args.get(i).context("--config requires a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--timeout-ms" => {
                i += 1;
                timeout_ms = Some(parse_positive(args.get(i), "--timeout-ms")?);
            }
            "--queue-capacity" => {
                i += 1;
                queue_capacity = Some(parse_capacity(args.get(i))?);
            }
            "--" => {
                i += 1;
                break;
            }
            "-" => break,
            _ if arg.starts_with("--") && arg.contains('=') => {
                let (flag, value) = arg.split_once('=').unwrap_or((arg, ""));
                let value = value.to_string();
                match flag {
                    "--config" => config_path = Some(PathBuf::from(value)),
                    "--timeout-ms" => timeout_ms = Some(parse_positive(Some(&value), flag)?),
                    "--queue-capacity" => queue_capacity = Some(parse_capacity(Some(&value))?),
                    _ => bail!("unknown option: {flag}"),
                }
            }
            _ if arg.starts_with('-') => bail!("unknown option: {arg}"),
            _ => break,
        }
        i += 1;
    }

    let source = match args.get(i).map(String::as_str) {
        None => bail!("missing source path"),
        Some("-") => Source::Stdin,
        Some(path) => Source::File(PathBuf::from(path)),
    };
    let command = WorkerCommand::from_argv(&args[i + 1..]).context("missing worker command")?;

    Ok(Action::Run(Invocation {
        config_path,
        strict_order,
        timeout_ms,
        queue_capacity,
        source,
        command,
    }))
}

fn parse_positive(value: Option<&String>, flag: &str) -> Result<u64> {
    let value = value.with_context(|| format!("{flag} requires a value"))?;
    let n: u64 = value
        .parse()
        .with_context(|| format!("{flag}: not a number: {value}"))?;
    if n == 0 {
        bail!("{flag} must be at least 1");
    }
    Ok(n)
}

fn parse_capacity(value: Option<&String>) -> Result<usize> {
    let n = parse_positive(value, "--queue-capacity")?;
    usize::try_from(n).context("--queue-capacity is too large")
}

pub fn print_help() {
    println!(
        r#"group-apply v{}

Pipe each marked group of a text stream through its own worker process.
Groups run in parallel; their output is put back where the group was.

Usage:
  group-apply [OPTIONS] <SOURCE> <COMMAND> [ARGS...]

Arguments:
  <SOURCE>                     Input file, or - for stdin
  <COMMAND> [ARGS...]          Worker command, spawned once per group

Options:
  --config <path>              Config file (default: platform config dir)
  --strict-order               Hold passthrough lines until earlier groups finish
  --timeout-ms <n>             Kill workers still running n ms after spawn
  --queue-capacity <n>         Bound each group's line queues to n lines
  -h, --help                   Show this help
  -V, --version                Show version

Markers:
  Lines starting with "= BEGIN =" open a group, lines starting with
  "= END =" close it. Marker lines are not written to the output.

Exit status:
  0 clean run, 1 run completed with warnings, 2 error, 130 interrupted

Examples:
  group-apply notes.txt sort
  cat log | group-apply --strict-order - sh -c 'sort | uniq -c'
"#,
        env!("CARGO_PKG_VERSION")
    );
}
