//! Scan Screener - intraday A-share screening CLI.
//!
//! Runs one screening pass on demand, or stays resident and launches passes
//! at the configured clock times.

use anyhow::Result;
use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use scan_common::config::{Config, ProviderKind, UniverseKind};
use scan_common::logging::init_logging;
use scan_screener::data::{
    FetchOptions, Fetcher, GugudataSource, QuoteSource, StaticUniverse, SyntheticSource,
    SyntheticUniverse, TushareUniverse, UniverseSource,
};
use scan_screener::history::{ExecutionLog, ExecutionRecord, ResultArchive};
use scan_screener::scheduler::{ProcessRunner, Scheduler};
use scan_screener::screener::{EngineSettings, ProfileRegistry, ScreeningEngine};
use scan_screener::sinks::build_sinks;

#[derive(Parser, Debug)]
#[command(name = "scan-screener")]
#[command(version)]
#[command(about = "Intraday A-share screener: fetch, filter, score, rank, report.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one screening pass now
    Screen {
        /// Profile name (default: screening.default_profile)
        #[arg(short, long)]
        profile: Option<String>,

        /// Screen only these codes (comma separated)
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,

        /// Use generated quotes instead of the configured provider
        #[arg(long)]
        synthetic: bool,
    },

    /// Stay resident and run the configured schedule slots
    Schedule,

    /// List available filter profiles
    Profiles,

    /// Show recent screening results
    History {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Selection frequency across recent results
    Stats {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<scan_common::Error>()
                .map_or(1, scan_common::Error::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_and_validate()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::debug!("Scan Screener v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Screen {
            profile,
            symbols,
            synthetic,
        } => cmd_screen(&config, profile, symbols, synthetic).await,
        Commands::Schedule => cmd_schedule(&config).await,
        Commands::Profiles => cmd_profiles(&config),
        Commands::History { limit } => cmd_history(&config, limit),
        Commands::Stats { limit } => cmd_stats(&config, limit),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_screen(
    config: &Config,
    profile: Option<String>,
    symbols: Option<Vec<String>>,
    synthetic: bool,
) -> Result<()> {
    let registry = ProfileRegistry::load(Some(config.profiles_path().as_path()))?;
    let name = profile.unwrap_or_else(|| config.screening.default_profile.clone());
    let profile = registry.resolve(&name)?.clone();

    let source = build_source(config, synthetic)?;
    let universe = build_universe(config, symbols, synthetic)?;

    let settings = EngineSettings::from_config(config);
    let sinks = build_sinks(&config.sinks, &settings.results_dir);
    let engine = ScreeningEngine::new(
        Fetcher::new(source, FetchOptions::from_config(&config.provider)),
        universe,
        settings,
    )
    .with_sinks(sinks);

    let outcome = engine.run(&profile).await;

    let record = match &outcome {
        Ok(o) => ExecutionRecord::now(&profile.name, true, o.result.stocks.len(), o.email_sent()),
        Err(_) => ExecutionRecord::now(&profile.name, false, 0, false),
    };
    if let Err(e) = ExecutionLog::new(&config.results_dir()).append(record) {
        tracing::warn!(error = %e, "Failed to append execution log");
    }

    let outcome = outcome?;
    for report in outcome.sink_reports.iter().filter(|r| !r.is_delivered()) {
        tracing::debug!(sink = %report.sink, status = %report.status, "Sink not delivered");
    }
    Ok(())
}

async fn cmd_schedule(config: &Config) -> Result<()> {
    let runner = ProcessRunner::current_exe(Duration::from_secs(config.scheduler.run_timeout_secs))?;
    let scheduler = Scheduler::new(&config.scheduler, config.scheduler_status_path(), runner)?;
    scheduler.run().await
}

fn cmd_profiles(config: &Config) -> Result<()> {
    let registry = ProfileRegistry::load(Some(config.profiles_path().as_path()))?;

    for profile in registry.iter() {
        let marker = if profile.name == config.screening.default_profile {
            "*"
        } else {
            " "
        };
        println!("{} {:<14} {}", marker, profile.name, profile.description);
        println!("    {}", profile.params_summary());
    }
    Ok(())
}

fn cmd_history(config: &Config, limit: usize) -> Result<()> {
    let results = ResultArchive::new(config.results_dir()).latest(limit)?;
    if results.is_empty() {
        println!("No screening results in {}", config.results_dir().display());
        return Ok(());
    }

    for result in &results {
        println!("{}  {}", result.screening_time, result.summary());
        for (i, c) in result.top(3).iter().enumerate() {
            println!(
                "    {}. {} {} {:.1}",
                i + 1,
                c.quote.symbol,
                c.quote.name,
                c.total_score
            );
        }
    }
    Ok(())
}

fn cmd_stats(config: &Config, limit: usize) -> Result<()> {
    let stats = ResultArchive::new(config.results_dir()).selection_stats(limit)?;
    if stats.is_empty() {
        println!("No selections in the last {} results", limit);
        return Ok(());
    }

    println!(
        "{:<8} {:<10} {:>6} {:>8} {:>8}  {}",
        "代码", "名称", "次数", "平均分", "最高分", "最近入选"
    );
    for s in &stats {
        println!(
            "{:<8} {:<10} {:>6} {:>8.1} {:>8.1}  {}",
            s.symbol, s.name, s.times_selected, s.avg_score, s.best_score, s.last_selected
        );
    }
    Ok(())
}

// ============================================================================
// Wiring
// ============================================================================

fn build_source(config: &Config, synthetic: bool) -> Result<Arc<dyn QuoteSource>> {
    if synthetic || config.provider.kind == ProviderKind::Synthetic {
        // One market per calendar day
        let seed = u64::from(Local::now().date_naive().num_days_from_ce().unsigned_abs());
        return Ok(Arc::new(SyntheticSource::new(seed)));
    }

    let source = GugudataSource::from_config(&config.provider).ok_or_else(|| {
        scan_common::Error::Config("provider.appkey (GUGU_APPKEY) is required for gugudata".into())
    })?;
    Ok(Arc::new(source))
}

fn build_universe(
    config: &Config,
    symbols: Option<Vec<String>>,
    synthetic: bool,
) -> Result<Arc<dyn UniverseSource>> {
    if let Some(symbols) = symbols.filter(|s| !s.is_empty()) {
        return Ok(Arc::new(StaticUniverse::new(symbols)));
    }
    if synthetic {
        return Ok(Arc::new(SyntheticUniverse::new(config.universe.synthetic_size)));
    }

    match config.universe.kind {
        UniverseKind::Static => {
            if config.universe.symbols.is_empty() {
                return Err(scan_common::Error::Config(
                    "universe.symbols is empty; pass --symbols or configure a universe".into(),
                )
                .into());
            }
            Ok(Arc::new(StaticUniverse::new(config.universe.symbols.clone())))
        }
        UniverseKind::Tushare => {
            let universe = TushareUniverse::from_config(&config.universe).ok_or_else(|| {
                scan_common::Error::Config(
                    "universe.tushare_token (TUSHARE_TOKEN) is required for tushare".into(),
                )
            })?;
            Ok(Arc::new(universe))
        }
        UniverseKind::Synthetic => Ok(Arc::new(SyntheticUniverse::new(
            config.universe.synthetic_size,
        ))),
    }
}
