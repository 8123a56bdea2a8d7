//! Command-line options and layered table configuration.
//!
//! Precedence, lowest first: built-in defaults, `--config` file, environment
//! variables, command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use symposium_table::{TableConfig, Timing};

/// How events and the summary are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    #[default]
    Text,
    Json,
}

/// Parsed command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub philosophers: Option<usize>,
    pub meals: Option<u32>,
    pub config: Option<PathBuf>,
    pub seed: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub immediate: bool,
    pub simulate: bool,
    pub output: Output,
}

impl Options {
    /// Parse arguments (without the program name). `Ok(None)` means help was
    /// requested.
    pub fn parse<I>(args: I) -> Result<Option<Self>, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--philosophers" => options.philosophers = Some(value(&arg, args.next())?),
                "--meals" => options.meals = Some(value(&arg, args.next())?),
                "--seed" => options.seed = Some(value(&arg, args.next())?),
                "--timeout-ms" => options.timeout_ms = Some(value(&arg, args.next())?),
                "--config" => {
                    let path = args.next().ok_or_else(|| format!("{arg} needs a value"))?;
                    options.config = Some(PathBuf::from(path));
                }
                "--immediate" => options.immediate = true,
                "--simulate" => options.simulate = true,
                "--json" => options.output = Output::Json,
                other => return Err(format!("unknown argument: {other}")),
            }
        }

        Ok(Some(options))
    }
}

fn value<T: std::str::FromStr>(flag: &str, raw: Option<String>) -> Result<T, String> {
    let raw = raw.ok_or_else(|| format!("{flag} needs a value"))?;
    raw.parse()
        .map_err(|_| format!("{flag}: '{raw}' is not a valid number"))
}

/// Build the table configuration for a run.
pub fn load(options: &Options) -> Result<TableConfig, Box<dyn std::error::Error>> {
    let base = match &options.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
            serde_json::from_str(&raw)?
        }
        None => TableConfig::default(),
    };
    let config = apply(base, options, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Layer environment variables and flags over `config`.
fn apply(
    mut config: TableConfig,
    options: &Options,
    env: impl Fn(&str) -> Option<String>,
) -> Result<TableConfig, String> {
    if let Some(raw) = env("SYMPOSIUM_PHILOSOPHERS") {
        config.philosophers = value("SYMPOSIUM_PHILOSOPHERS", Some(raw))?;
    }
    if let Some(raw) = env("SYMPOSIUM_MEALS") {
        config.meals = value("SYMPOSIUM_MEALS", Some(raw))?;
    }
    if let Some(raw) = env("SYMPOSIUM_TIMEOUT_MS") {
        config.timeout = timeout(value("SYMPOSIUM_TIMEOUT_MS", Some(raw))?);
    }

    if let Some(n) = options.philosophers {
        config.philosophers = n;
    }
    if let Some(n) = options.meals {
        config.meals = n;
    }
    if let Some(ms) = options.timeout_ms {
        config.timeout = timeout(ms);
    }
    if let Some(seed) = options.seed {
        config.seed = Some(seed);
    }
    if options.immediate {
        config.timing = Timing::immediate();
    }
    Ok(config)
}

fn timeout(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
