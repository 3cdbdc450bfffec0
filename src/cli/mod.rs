//! Command-line parsing for the country-risk composite.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! pipeline; `app` turns these structs into a catalog, scope, and registry.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "crisk", version, about = "Country risk composite scorer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch sources, score the panel, and write the exports.
    Run(RunArgs),
    /// Score a deterministic synthetic panel (no network access).
    Demo(DemoArgs),
    /// Load and validate a catalog without scoring anything.
    Validate(ValidateArgs),
}

/// Catalog and panel scope options shared by `run` and `demo`.
#[derive(Debug, Args, Clone)]
pub struct ScopeArgs {
    /// Indicator catalog (YAML).
    #[arg(long, default_value = "config/indicators.yaml")]
    pub catalog: PathBuf,

    /// First panel year (overrides the catalog default).
    #[arg(long)]
    pub from: Option<i32>,

    /// Last panel year (overrides the catalog default).
    #[arg(long)]
    pub to: Option<i32>,

    /// Restrict the panel to these ISO3 codes (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub countries: Vec<String>,
}

/// Output options shared by `run` and `demo`.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Directory for records.csv, observations.csv, coverage.csv, and meta.json.
    #[arg(short = 'o', long, default_value = "out")]
    pub out: PathBuf,

    /// Show the top-N highest-risk countries of the latest year.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Disable the HTTP sources (also `CRISK_OFFLINE=1`).
    #[arg(long)]
    pub offline: bool,

    /// Directory holding vendor CSV drops (also `CRISK_VENDOR_DIR`).
    #[arg(long)]
    pub vendor_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Random seed for the synthetic panel.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Probability that a single country-year value is missing.
    #[arg(long, default_value_t = 0.15)]
    pub missing_rate: f64,

    /// Probability that a whole source series is down.
    #[arg(long, default_value_t = 0.1)]
    pub outage_rate: f64,
}

#[derive(Debug, Args, Clone)]
pub struct ValidateArgs {
    /// Indicator catalog (YAML).
    #[arg(long, default_value = "config/indicators.yaml")]
    pub catalog: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_country_list() {
        let cli = Cli::parse_from([
            "crisk",
            "run",
            "--countries",
            "USA,bra",
            "--from",
            "2020",
            "--offline",
            "-o",
            "results",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.scope.countries, vec!["USA", "bra"]);
        assert_eq!(args.scope.from, Some(2020));
        assert_eq!(args.scope.to, None);
        assert!(args.offline);
        assert_eq!(args.output.out, PathBuf::from("results"));
        assert_eq!(args.output.top, 10);
    }

    #[test]
    fn demo_defaults() {
        let cli = Cli::parse_from(["crisk", "demo"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.seed, 42);
        assert_eq!(args.scope.catalog, PathBuf::from("config/indicators.yaml"));
        assert!(args.scope.countries.is_empty());
    }
}
