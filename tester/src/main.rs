//! Test Harness Runner
//!
//! Runs the built-in scenario suite under a configurable harness:
//! - Selects tests with accept/ignore glob patterns
//! - Grants resources explicitly (`--use`) or by deny-list (`--deny`)
//! - Supervises child processes and reaps leftovers after every test
//! - Optionally samples memory usage for the whole run

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use tester::gating::load_patterns_file;
use tester::scenarios::scenario_group;
use tester::{HarnessConfig, ResourcePolicy, ResourceSet, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "tester")]
#[command(about = "Resource-gated test harness with process supervision")]
struct Args {
    /// Scenario group to run (all, process, isolation)
    #[arg(long, default_value = "all")]
    scenario: String,

    /// Resources to enable, e.g. "network,cpu" or "all,-gui"
    #[arg(short = 'u', long = "use")]
    use_resources: Option<String>,

    /// Resources to deny while everything else stays enabled
    #[arg(long, conflicts_with = "use_resources")]
    deny: Option<String>,

    /// Only run tests matching this glob (repeatable)
    #[arg(short = 'm', long = "match")]
    match_patterns: Vec<String>,

    /// Skip tests matching this glob (repeatable)
    #[arg(short = 'i', long = "ignore")]
    ignore_patterns: Vec<String>,

    /// Read accept patterns from a file, one per line
    #[arg(long)]
    match_file: Option<PathBuf>,

    /// Read ignore patterns from a file, one per line
    #[arg(long)]
    ignore_file: Option<PathBuf>,

    /// JSON harness configuration; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sample memory usage at this interval
    #[arg(long)]
    watchdog_interval_ms: Option<u64>,

    /// Timeout for supervised processes in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// List the selected tests without running them
    #[arg(long)]
    list: bool,

    /// Stop at the first failing test
    #[arg(long)]
    fail_fast: bool,

    /// Print the suite report as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose tracing output
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;

    shared::logging::init_tracing(&config.log_level, args.verbose);
    tracing::info!("🧪 Starting test harness");
    tracing::info!("Scenario group: {}, resources: {}", args.scenario, config.resources);

    let cases = scenario_group(&args.scenario)?;
    let mut runner = TestRunner::new(config).context("invalid harness configuration")?;

    if args.list {
        for case in runner.select(&cases) {
            println!("{}", case.id());
        }
        return Ok(());
    }

    let report = runner.run(&cases).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for record in &report.records {
            println!("{} ... {}", record.id, record.outcome);
        }
        println!("{}", report.summary());
    }

    if !report.is_success() {
        anyhow::bail!("{} test(s) failed", report.failed());
    }

    tracing::info!("🏁 Test harness completed");
    Ok(())
}

/// Layer command-line flags over the optional config file
fn build_config(args: &Args) -> Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    if let Some(spec) = &args.use_resources {
        config.resources = ResourcePolicy::Orchestrated {
            enabled: ResourceSet::parse(spec)?,
        };
    } else if let Some(spec) = &args.deny {
        config.resources = ResourcePolicy::Standalone {
            deny: ResourceSet::parse(spec)?,
        };
    }

    let accept = collect_patterns(&args.match_patterns, args.match_file.as_ref())?;
    if !accept.is_empty() {
        config.accept_patterns = accept;
    }
    let ignore = collect_patterns(&args.ignore_patterns, args.ignore_file.as_ref())?;
    if !ignore.is_empty() {
        config.ignore_patterns = ignore;
    }

    if let Some(secs) = args.timeout_secs {
        config.short_timeout = Duration::from_secs(secs);
        config.long_timeout = config.long_timeout.max(config.short_timeout);
    }
    if let Some(ms) = args.watchdog_interval_ms {
        config.watchdog_interval = Some(Duration::from_millis(ms));
    }
    if args.fail_fast {
        config.fail_fast = true;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    } else if args.verbose {
        config.log_level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

fn collect_patterns(flags: &[String], file: Option<&PathBuf>) -> Result<Vec<String>> {
    let mut patterns = flags.to_vec();
    if let Some(path) = file {
        patterns.extend(
            load_patterns_file(path).with_context(|| format!("failed to read patterns from {}", path.display()))?,
        );
    }
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("tester").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_use_selects_orchestrated_mode() {
        let config = build_config(&parse(&["--use", "network,cpu", "-m", "test_a*", "-m", "test_b*"])).unwrap();
        assert!(config.resources.is_orchestrated());
        assert!(config.resources.is_enabled("cpu"));
        assert!(!config.resources.is_enabled("gui"));
        assert_eq!(config.accept_patterns, vec!["test_a*", "test_b*"]);
    }

    #[test]
    fn test_default_is_standalone_with_everything_enabled() {
        let config = build_config(&parse(&[])).unwrap();
        assert!(!config.resources.is_orchestrated());
        assert!(config.resources.is_enabled("network"));
    }

    #[test]
    fn test_deny_and_use_conflict() {
        let result = Args::try_parse_from(["tester", "--use", "all", "--deny", "gui"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_pattern_fails_before_running() {
        assert!(build_config(&parse(&["--ignore", "test_[x"])).is_err());
    }

    #[test]
    fn test_timeout_raises_long_timeout_when_needed() {
        let config = build_config(&parse(&["--timeout-secs", "600"])).unwrap();
        assert_eq!(config.short_timeout, Duration::from_secs(600));
        assert_eq!(config.long_timeout, Duration::from_secs(600));
    }
}
