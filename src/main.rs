use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use mpt_optimizer::config::{
    self, DEFAULT_END_DATE, DEFAULT_RISK_FREE_RATE, DEFAULT_START_DATE, DEFAULT_TICKERS, FRONTIER_SAMPLES,
    FRONTIER_SEED,
};
use mpt_optimizer::data::parse_tickers;
use mpt_optimizer::frontier::FrontierScatter;
use mpt_optimizer::portfolio::print_allocation;
use mpt_optimizer::{
    best_by_sharpe, load_prices, portfolio_metrics, simulate_portfolios, Allocation, Allocator,
    AllocatorSettings, DataSettings, MetricsReport, YahooSource,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "MPT optimizer: max-Sharpe long-only allocation from historical prices",
    after_help = "EXAMPLES:
    # Optimize the default basket
    cargo run --release

    # Custom basket and window, JSON output
    cargo run --release -- --tickers NVDA,MSFT,AAPL --start 2021-01-01 --end 2024-12-31 --json

    # Save 5000 random portfolios for a risk/return scatter
    cargo run --release -- --simulations 5000 --seed 7 --frontier-out frontier.json

ENVIRONMENT:
    MPT_L2_GAMMA, MPT_WEIGHT_CUTOFF, MPT_TRADING_DAYS, MPT_RETURNS_METHOD (mean|compounded),
    MPT_SOLVER_MAX_ITER, MPT_YAHOO_BASE_URL, MPT_HTTP_TIMEOUT_SECS. A .env file is read if present."
)]
struct Args {
    /// Comma-separated ticker symbols (e.g., AAPL,MSFT,GOOG)
    #[arg(long, default_value = DEFAULT_TICKERS)]
    tickers: String,

    /// First trading date to load (YYYY-MM-DD)
    #[arg(long, default_value = DEFAULT_START_DATE)]
    start: NaiveDate,

    /// Last trading date to load, inclusive (YYYY-MM-DD)
    #[arg(long, default_value = DEFAULT_END_DATE)]
    end: NaiveDate,

    /// Annual risk-free rate as a decimal (0.02 = 2%)
    #[arg(long, default_value_t = DEFAULT_RISK_FREE_RATE)]
    risk_free_rate: f64,

    /// Number of random portfolios to simulate (0 disables the scatter)
    #[arg(long, default_value_t = FRONTIER_SAMPLES)]
    simulations: usize,

    /// Seed for the random portfolio scatter
    #[arg(long, default_value_t = FRONTIER_SEED)]
    seed: u64,

    /// Write the random portfolio scatter to this JSON file
    #[arg(long)]
    frontier_out: Option<PathBuf>,

    /// Print the allocation and metrics as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct RunReport<'a> {
    start: NaiveDate,
    end: NaiveDate,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    trading_days: usize,
    unadjusted: &'a [String],
    allocation: &'a Allocation,
    metrics: &'a MetricsReport,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mpt_optimizer=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    config::init_cpu_parallelism();

    let args = Args::parse();
    if report_outcome(run(args).await) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Logs a failed run once and tells the caller whether it succeeded.
fn report_outcome(outcome: Result<()>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(e) => {
            error!("{:#}", e);
            false
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let tickers = parse_tickers(&args.tickers);
    let source = YahooSource::new(DataSettings::from_env());
    let prices = load_prices(&source, &tickers, args.start, args.end)
        .await
        .context("Failed to load prices")?;

    let allocator = Allocator::new(AllocatorSettings::from_env());
    let allocation = allocator
        .optimize(&prices, args.risk_free_rate)
        .context("Failed to optimize portfolio")?;
    let metrics = portfolio_metrics(
        &allocation.weights,
        &allocation.mu,
        &allocation.cov,
        allocation.risk_free_rate,
        &prices,
    )?;

    let simulated = if args.simulations > 0 {
        simulate_portfolios(
            &allocation.mu,
            &allocation.cov,
            allocation.risk_free_rate,
            args.simulations,
            args.seed,
        )?
    } else {
        Vec::new()
    };

    if let (Some(best), Some(optimal)) = (best_by_sharpe(&simulated), allocation.performance.sharpe) {
        info!(
            "Best of {} random portfolios: Sharpe={:.4} (optimizer: {:.4})",
            simulated.len(),
            best.sharpe.unwrap_or_default(),
            optimal
        );
    }

    if args.json {
        let report = RunReport {
            start: args.start,
            end: args.end,
            first_date: prices.dates().first().copied(),
            last_date: prices.dates().last().copied(),
            trading_days: prices.len(),
            unadjusted: prices.unadjusted(),
            allocation: &allocation,
            metrics: &metrics,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_allocation(&allocation, &metrics, prices.unadjusted());
    }

    if let Some(path) = args.frontier_out {
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        let scatter = FrontierScatter {
            tickers: prices.tickers(),
            risk_free_rate: allocation.risk_free_rate,
            seed: args.seed,
            optimal: &allocation,
            portfolios: &simulated,
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &scatter)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {} simulated portfolios to {}", simulated.len(), path.display());
    }

    Ok(())
}
