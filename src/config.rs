use crate::estimate::ReturnsMethod;
use rayon::ThreadPoolBuilder;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

pub fn init_cpu_parallelism() {
    RAYON_INIT.get_or_init(|| {
        let num_threads = num_cpus::get().max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!(
                "Initialized Rayon thread pool with {} threads (all logical CPU cores)",
                num_threads
            ),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

/// Annual trading days for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// L2 regularization coefficient added to the max-Sharpe objective.
pub const L2_GAMMA: f64 = 0.01;

/// Weights below this magnitude are rounded to zero before renormalizing.
pub const WEIGHT_CUTOFF: f64 = 1e-4;

/// Risk-free annual rate used when none is supplied.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Interior-point iteration cap handed to the conic solver.
pub const SOLVER_MAX_ITER: u32 = 200;

/// Number of random portfolios for the risk/return scatter.
pub const FRONTIER_SAMPLES: usize = 3000;

/// Seed for the random portfolio scatter when none is supplied.
pub const FRONTIER_SEED: u64 = 42;

pub const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const HTTP_TIMEOUT_SECS: u64 = 20;

pub const DEFAULT_TICKERS: &str = "AAPL,MSFT,GOOG,AMZN";
pub const DEFAULT_START_DATE: &str = "2020-01-01";
pub const DEFAULT_END_DATE: &str = "2025-01-01";

/// Tunables for mu/S estimation, the optimizer and weight cleaning.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocatorSettings {
    pub gamma: f64,
    pub weight_cutoff: f64,
    pub trading_days: f64,
    pub returns_method: ReturnsMethod,
    pub solver_max_iter: u32,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self {
            gamma: L2_GAMMA,
            weight_cutoff: WEIGHT_CUTOFF,
            trading_days: TRADING_DAYS,
            returns_method: ReturnsMethod::Mean,
            solver_max_iter: SOLVER_MAX_ITER,
        }
    }
}

impl AllocatorSettings {
    /// Defaults overridden by `MPT_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gamma: env_or("MPT_L2_GAMMA", defaults.gamma, |v: &f64| *v >= 0.0),
            weight_cutoff: env_or("MPT_WEIGHT_CUTOFF", defaults.weight_cutoff, |v: &f64| {
                (0.0..1.0).contains(v)
            }),
            trading_days: env_or("MPT_TRADING_DAYS", defaults.trading_days, |v: &f64| *v > 0.0),
            returns_method: env_or("MPT_RETURNS_METHOD", defaults.returns_method, |_| true),
            solver_max_iter: env_or("MPT_SOLVER_MAX_ITER", defaults.solver_max_iter, |v: &u32| {
                *v > 0
            }),
        }
    }
}

/// Settings for the market-data client.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            base_url: YAHOO_BASE_URL.to_string(),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }
}

impl DataSettings {
    pub fn from_env() -> Self {
        let base_url = std::env::var("MPT_YAHOO_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| YAHOO_BASE_URL.to_string());
        let timeout_secs = env_or("MPT_HTTP_TIMEOUT_SECS", HTTP_TIMEOUT_SECS, |v: &u64| *v > 0);

        Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

fn env_or<T>(key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => parse_setting(key, &raw, default, valid),
        Err(_) => default,
    }
}

fn parse_setting<T>(key: &str, raw: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!("Invalid {}={} ; keeping default {:?}", key, raw, default);
            default
        }
    }
}
