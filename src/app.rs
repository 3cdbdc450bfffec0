//! Top-level application orchestration.
//!
//! `main.rs` only maps the returned error to an exit code; everything else
//! happens here:
//! - loads `.env` and initialises logging
//! - parses CLI arguments
//! - builds the catalog, panel scope, and source registry
//! - runs the scoring pipeline
//! - prints the summary and writes the exports

use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::catalog::Catalog;
use crate::cli::{Cli, Command, DemoArgs, OutputArgs, RunArgs, ScopeArgs, ValidateArgs};
use crate::data::http::HttpFetcher;
use crate::data::{
    AcledCredentials, AcledSource, KNOWN_SOURCES, NdGainSource, OwidPerCapitaSource, OwidSource, SampleConfig,
    SampleSource, SourceRegistry, VendorCsvSource, WorldBankClient, WorldBankSource, fallback_countries,
    filter_countries, load_countries, ndgain,
};
use crate::domain::{CountryMeta, PanelScope, YearRange};
use crate::error::{AppError, PipelineError};

pub mod pipeline;

/// Disables the HTTP sources when set to a truthy value.
pub const ENV_OFFLINE: &str = "CRISK_OFFLINE";
/// Vendor CSV directory override.
pub const ENV_VENDOR_DIR: &str = "CRISK_VENDOR_DIR";
const DEFAULT_VENDOR_DIR: &str = "vendor";

/// Per-run inputs of the non-HTTP-only sources.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub vendor_dir: PathBuf,
    pub acled: Option<AcledCredentials>,
    pub nd_gain_url: Option<String>,
}

impl SourceSettings {
    /// Vendor directory only; the credentialed and URL-configured sources stay off.
    pub fn vendor_only(vendor_dir: &Path) -> Self {
        Self {
            vendor_dir: vendor_dir.to_path_buf(),
            acled: None,
            nd_gain_url: None,
        }
    }
}

/// Entry point for the `crisk` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Demo(args) => handle_demo(args),
        Command::Validate(args) => handle_validate(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let catalog = load_catalog(&args.scope)?;
    catalog.ensure_sources_known(&KNOWN_SOURCES)?;

    let offline = args.offline || env_flag(ENV_OFFLINE);
    let http = if offline {
        info!("offline mode: HTTP sources disabled");
        None
    } else {
        match HttpFetcher::new() {
            Ok(http) => Some(http),
            Err(e) => {
                warn!(error = %e, "HTTP client unavailable; HTTP sources disabled");
                None
            }
        }
    };
    let worldbank = http.clone().map(WorldBankClient::new);

    let countries = load_countries(worldbank.as_ref());
    let scope = build_scope(countries, &args.scope, &catalog);

    let settings = SourceSettings {
        vendor_dir: args
            .vendor_dir
            .or_else(|| env::var(ENV_VENDOR_DIR).ok().filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VENDOR_DIR)),
        acled: AcledCredentials::from_env(),
        nd_gain_url: env::var(ndgain::ENV_URL).ok().filter(|v| !v.trim().is_empty()),
    };

    let registry = build_registry(&catalog, &scope, http.as_ref(), worldbank.as_ref(), &settings);
    score_and_export(&catalog, &registry, &scope, &args.output)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let catalog = load_catalog(&args.scope)?;
    let scope = build_scope(fallback_countries(), &args.scope, &catalog);

    let config = SampleConfig {
        seed: args.seed,
        missing_rate: args.missing_rate,
        outage_rate: args.outage_rate,
    };
    let mut registry = SourceRegistry::new();
    for source_id in catalog.source_ids() {
        registry.register(Box::new(SampleSource::generate(&source_id, &catalog, &scope, &config)?));
    }
    info!(seed = config.seed, sources = registry.len(), "generated synthetic panel");

    score_and_export(&catalog, &registry, &scope, &args.output)
}

fn handle_validate(args: ValidateArgs) -> Result<(), AppError> {
    let catalog = Catalog::load(&args.catalog)?;
    catalog.ensure_sources_known(&KNOWN_SOURCES)?;

    let years = catalog.years();
    println!("Catalog OK: {}", args.catalog.display());
    println!("- indicators: {}", catalog.indicators().len());
    println!("- years: {}-{}", years.start, years.end);
    let pillars: Vec<String> = catalog.pillars().into_iter().collect();
    if !pillars.is_empty() {
        println!("- pillars: {}", pillars.join(", "));
    }
    let sources: Vec<String> = catalog.source_ids().into_iter().collect();
    println!("- sources: {}", sources.join(", "));
    for spec in catalog.indicators() {
        let chain: Vec<&str> = spec.imputation_chain.iter().map(|m| m.as_str()).collect();
        println!(
            "  {:<24} w={:.4} sources=[{}] imputation=[{}]",
            spec.id,
            spec.base_weight,
            spec.source_priority
                .iter()
                .map(|s| s.source.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            chain.join(", ")
        );
    }
    Ok(())
}

/// Load the catalog and apply the `--from/--to` override.
fn load_catalog(args: &ScopeArgs) -> Result<Catalog, AppError> {
    let catalog = Catalog::load(&args.catalog)?;
    if args.from.is_none() && args.to.is_none() {
        return Ok(catalog);
    }
    let years = catalog.years();
    let years = YearRange::new(args.from.unwrap_or(years.start), args.to.unwrap_or(years.end));
    Ok(catalog.with_years(years)?)
}

fn build_scope(countries: Vec<CountryMeta>, args: &ScopeArgs, catalog: &Catalog) -> PanelScope {
    let countries = filter_countries(countries, &args.countries);
    PanelScope::new(countries, catalog.years())
}

/// One adapter per source id the catalog references.
pub fn build_registry(
    catalog: &Catalog,
    scope: &PanelScope,
    http: Option<&HttpFetcher>,
    worldbank: Option<&WorldBankClient>,
    settings: &SourceSettings,
) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for source_id in catalog.source_ids() {
        let series = catalog.series_for_source(&source_id);
        match source_id.as_str() {
            "worldbank" | "wgi" => registry.register(Box::new(WorldBankSource::load(
                &source_id,
                worldbank,
                &series,
                catalog.years(),
            ))),
            OwidSource::ID => registry.register(Box::new(OwidSource::load(http, &series))),
            OwidPerCapitaSource::ID => registry.register(Box::new(OwidPerCapitaSource::load(
                http,
                &catalog.refs_for_source(&source_id),
            ))),
            AcledSource::ID => registry.register(Box::new(AcledSource::load(
                http,
                settings.acled.as_ref(),
                &series,
                catalog.years(),
            ))),
            NdGainSource::ID => registry.register(Box::new(NdGainSource::load(
                http,
                settings.nd_gain_url.as_deref(),
                &settings.vendor_dir,
                scope.countries(),
                &series,
            ))),
            VendorCsvSource::ID => {
                registry.register(Box::new(VendorCsvSource::load(&settings.vendor_dir, &series)))
            }
            other => warn!(source = other, "no adapter for source; it will count as failed"),
        }
    }
    registry
}

fn score_and_export(
    catalog: &Catalog,
    registry: &SourceRegistry,
    scope: &PanelScope,
    output: &OutputArgs,
) -> Result<(), AppError> {
    let run = match pipeline::run_panel(catalog, registry, scope, Utc::now()) {
        Ok(run) => run,
        Err(PipelineError::NoCoverage { keys, meta }) => {
            println!("{}", crate::report::format_run_summary(&meta, scope));
            let path = crate::io::write_diagnostics(&output.out, &meta)?;
            println!("wrote {}", path.display());
            return Err(PipelineError::NoCoverage { keys, meta }.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", crate::report::format_run_summary(&run.meta, scope));
    println!("{}", crate::report::format_top_records(&run.records, output.top));

    let written = crate::io::write_outputs(&output.out, &run, catalog)?;
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
