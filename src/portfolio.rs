use crate::config::AllocatorSettings;
use crate::data::PriceTable;
use crate::error::{AllocError, Result};
use crate::estimate::{mean_historical_return, sample_cov, CovarianceEstimate, ReturnEstimate};
use crate::metrics::MetricsReport;
use serde::Serialize;
use tracing::{debug, info, warn};

// ──────────────────────────────────────────────────────────────────────────────
// Configuration
// ──────────────────────────────────────────────────────────────────────────────

/// Allowed deviation of a weight vector's sum from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Volatility at or below this is treated as zero when forming ratios.
pub const MIN_VOLATILITY: f64 = 1e-12;

// ──────────────────────────────────────────────────────────────────────────────
// Data Structures
// ──────────────────────────────────────────────────────────────────────────────

/// Long-only, fully invested weights in price-table ticker order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeightVector {
    tickers: Vec<String>,
    weights: Vec<f64>,
}

impl WeightVector {
    pub fn new(tickers: Vec<String>, weights: Vec<f64>) -> Result<Self> {
        if tickers.len() != weights.len() {
            return Err(AllocError::InvalidInput(format!(
                "{} weights for {} tickers",
                weights.len(),
                tickers.len()
            )));
        }
        if let Some(pos) = weights.iter().position(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(AllocError::InvalidInput(format!(
                "weight for {} must be a non-negative number, got {}",
                tickers[pos], weights[pos]
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AllocError::InvalidInput(format!("weights sum to {}, expected 1", sum)));
        }
        Ok(Self { tickers, weights })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.tickers.iter().position(|t| t == ticker).map(|i| self.weights[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.tickers.iter().map(String::as_str).zip(self.weights.iter().copied())
    }
}

/// Return, volatility and Sharpe of the chosen weights.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub expected_return: f64,
    pub volatility: f64,
    /// `None` when the volatility is zero.
    pub sharpe: Option<f64>,
}

/// Optimizer output along with the estimates it was solved against.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Allocation {
    pub weights: WeightVector,
    pub performance: PerformanceSummary,
    pub mu: ReturnEstimate,
    pub cov: CovarianceEstimate,
    pub risk_free_rate: f64,
}

// ──────────────────────────────────────────────────────────────────────────────
// Portfolio Helpers
// ──────────────────────────────────────────────────────────────────────────────

pub(crate) fn portfolio_return(weights: &[f64], means: &[f64]) -> f64 {
    weights.iter().zip(means.iter()).map(|(w, r)| w * r).sum()
}

pub(crate) fn portfolio_variance(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let n = weights.len();
    let mut var = 0.0;
    for i in 0..n {
        for j in 0..n {
            var += weights[i] * weights[j] * cov[i][j];
        }
    }
    var
}

/// `(expected - rf) / volatility`, or `None` for a riskless portfolio.
pub(crate) fn sharpe_ratio(expected_return: f64, volatility: f64, risk_free_rate: f64) -> Option<f64> {
    (volatility > MIN_VOLATILITY).then(|| (expected_return - risk_free_rate) / volatility)
}

/// Expected return, volatility and Sharpe of `weights` under `mu` and `cov`.
pub fn portfolio_performance(weights: &[f64], mu: &[f64], cov: &[Vec<f64>], risk_free_rate: f64) -> PerformanceSummary {
    let expected_return = portfolio_return(weights, mu);
    let volatility = portfolio_variance(weights, cov).max(0.0).sqrt();
    PerformanceSummary {
        expected_return,
        volatility,
        sharpe: sharpe_ratio(expected_return, volatility, risk_free_rate),
    }
}

/// Zeroes weights below `cutoff` in magnitude and rescales the rest to sum to 1.
///
/// Returns `None` if nothing survives the cutoff.
pub fn clean_weights(raw: &[f64], cutoff: f64) -> Option<Vec<f64>> {
    let kept: Vec<f64> = raw
        .iter()
        .map(|&w| if w.abs() < cutoff { 0.0 } else { w })
        .collect();
    let sum: f64 = kept.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return None;
    }
    Some(kept.iter().map(|w| w / sum).collect())
}

// ──────────────────────────────────────────────────────────────────────────────
// Optimizer: Max-Sharpe via Clarabel
// ──────────────────────────────────────────────────────────────────────────────

/// Raw max-Sharpe weights with an L2 penalty `gamma * |w|^2`.
///
/// Uses the homogenized form over `x = [y, kappa]`:
///   minimize    y'(S + gamma I)y
///   subject to  (mu - rf)'y = 1,  sum(y) = kappa,  y >= 0,  kappa >= 0
/// and returns `w = y / kappa`.
pub fn max_sharpe(
    mu: &ReturnEstimate,
    cov: &CovarianceEstimate,
    risk_free_rate: f64,
    gamma: f64,
    max_iter: u32,
) -> Result<Vec<f64>> {
    use clarabel::algebra::*;
    use clarabel::solver::*;

    let tickers = mu.tickers().to_vec();
    let failed = |diagnostic: String| AllocError::OptimizationFailed {
        tickers: tickers.clone(),
        diagnostic,
    };

    let n = mu.len();
    if n == 0 || cov.len() != n || cov.tickers() != mu.tickers() {
        return Err(AllocError::InvalidInput(
            "expected returns and covariance must cover the same tickers".to_string(),
        ));
    }

    let excess: Vec<f64> = mu.values().iter().map(|m| m - risk_free_rate).collect();
    if excess.iter().all(|&e| e <= 0.0) {
        return Err(failed(format!(
            "no asset has an expected return above the risk-free rate {:.4}",
            risk_free_rate
        )));
    }

    // P = 2(S + gamma I), upper triangle; the kappa column is empty.
    let s = cov.matrix();
    let mut p_data = Vec::new();
    let mut p_indices = Vec::new();
    let mut p_indptr = vec![0];
    for j in 0..n {
        for i in 0..=j {
            let val = if i == j { 2.0 * (s[i][j] + gamma) } else { 2.0 * s[i][j] };
            if i == j || val != 0.0 {
                p_data.push(val);
                p_indices.push(i);
            }
        }
        p_indptr.push(p_data.len());
    }
    p_indptr.push(p_data.len());
    let p = CscMatrix::new(n + 1, n + 1, p_indptr, p_indices, p_data);

    let q = vec![0.0; n + 1];

    // Rows: 0 excess return, 1 budget, 2.. non-negativity of y then kappa.
    let mut a_data = Vec::new();
    let mut a_indices = Vec::new();
    let mut a_indptr = vec![0];
    for (j, &e) in excess.iter().enumerate() {
        if e != 0.0 {
            a_data.push(e);
            a_indices.push(0);
        }
        a_data.push(1.0);
        a_indices.push(1);
        a_data.push(-1.0);
        a_indices.push(2 + j);
        a_indptr.push(a_data.len());
    }
    a_data.push(-1.0);
    a_indices.push(1);
    a_data.push(-1.0);
    a_indices.push(2 + n);
    a_indptr.push(a_data.len());
    let a = CscMatrix::new(n + 3, n + 1, a_indptr, a_indices, a_data);

    let mut b = vec![1.0, 0.0];
    b.extend(vec![0.0; n + 1]);

    let cones = [ZeroConeT(2), NonnegativeConeT(n + 1)];

    let settings = DefaultSettingsBuilder::default()
        .max_iter(max_iter)
        .verbose(false)
        .build()
        .map_err(|e| failed(format!("failed to build solver settings: {}", e)))?;

    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);

    solver.solve();

    let status = solver.solution.status;
    let iterations = solver.solution.iterations;
    debug!(
        "Clarabel finished: status={:?}, iterations={}, objective={:.6e}",
        status, iterations, solver.solution.obj_val
    );

    match status {
        SolverStatus::Solved => {}
        SolverStatus::AlmostSolved => {
            warn!("Solver reached reduced accuracy after {} iterations", iterations);
        }
        other => {
            return Err(failed(format!(
                "solver status {:?} after {} iterations",
                other, iterations
            )));
        }
    }

    let x = &solver.solution.x;
    let kappa = x[n];
    if !(kappa.is_finite() && kappa > 0.0) {
        return Err(failed(format!(
            "non-positive scaling variable {:e} (status {:?}, {} iterations)",
            kappa, status, iterations
        )));
    }

    let weights: Vec<f64> = x[..n].iter().map(|y| (y / kappa).max(0.0)).collect();
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(failed(format!(
            "non-finite weights (status {:?}, {} iterations)",
            status, iterations
        )));
    }
    Ok(weights)
}

/// Estimates mu and S from prices and solves for max-Sharpe weights.
#[derive(Clone, Debug, Default)]
pub struct Allocator {
    settings: AllocatorSettings,
}

impl Allocator {
    pub fn new(settings: AllocatorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AllocatorSettings {
        &self.settings
    }

    pub fn optimize(&self, prices: &PriceTable, risk_free_rate: f64) -> Result<Allocation> {
        if !risk_free_rate.is_finite() {
            return Err(AllocError::InvalidInput(format!(
                "risk-free rate must be finite, got {}",
                risk_free_rate
            )));
        }

        let n = prices.num_assets();
        info!(
            "Optimizing portfolio with {} assets over {} trading days (rf={:.4})",
            n,
            prices.len(),
            risk_free_rate
        );

        let mu = mean_historical_return(prices, self.settings.returns_method, self.settings.trading_days)?;
        let cov = sample_cov(prices, self.settings.trading_days)?;

        let observations = prices.len().saturating_sub(1);
        if observations <= n {
            warn!(
                "Only {} return observations for {} tickers; sample covariance is singular",
                observations, n
            );
        }

        for (i, ticker) in mu.tickers().iter().enumerate() {
            debug!(
                "  {}: mu={:.4}, sigma={:.4}",
                ticker,
                mu.values()[i],
                cov.matrix()[i][i].max(0.0).sqrt()
            );
        }

        let raw = max_sharpe(
            &mu,
            &cov,
            risk_free_rate,
            self.settings.gamma,
            self.settings.solver_max_iter,
        )?;

        let cleaned = clean_weights(&raw, self.settings.weight_cutoff).ok_or_else(|| {
            AllocError::OptimizationFailed {
                tickers: prices.tickers().to_vec(),
                diagnostic: "every weight fell below the cleaning cutoff".to_string(),
            }
        })?;

        let performance = portfolio_performance(&cleaned, mu.values(), cov.matrix(), risk_free_rate);
        let weights = WeightVector::new(prices.tickers().to_vec(), cleaned)?;

        info!(
            "Max-Sharpe portfolio: E[r]={:.4}, sigma={:.4}, Sharpe={}",
            performance.expected_return,
            performance.volatility,
            performance
                .sharpe
                .map(|s| format!("{:.4}", s))
                .unwrap_or_else(|| "n/a".to_string())
        );

        Ok(Allocation {
            weights,
            performance,
            mu,
            cov,
            risk_free_rate,
        })
    }
}

/// [`Allocator::optimize`] with settings taken from the environment.
pub fn optimize_portfolio(prices: &PriceTable, risk_free_rate: f64) -> Result<Allocation> {
    Allocator::new(AllocatorSettings::from_env()).optimize(prices, risk_free_rate)
}

// ──────────────────────────────────────────────────────────────────────────────
// Output
// ──────────────────────────────────────────────────────────────────────────────

fn fmt_ratio(value: Option<f64>) -> String {
    value.map(|v| format!("{:>7.2}", v)).unwrap_or_else(|| "    n/a".to_string())
}

/// Pretty-prints the allocation and its metrics to stdout.
pub fn print_allocation(alloc: &Allocation, report: &MetricsReport, unadjusted: &[String]) {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║              Max-Sharpe Portfolio Allocation               ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!(
        "║  Expected Annual Return : {:>+7.2}%                          ║",
        report.expected_return * 100.0
    );
    println!(
        "║  Annual Volatility      : {:>7.2}%                          ║",
        report.volatility * 100.0
    );
    println!(
        "║  Sharpe Ratio           : {}                           ║",
        fmt_ratio(report.sharpe)
    );
    println!(
        "║  Sortino Ratio          : {}                           ║",
        fmt_ratio(report.sortino)
    );
    println!(
        "║  Max Drawdown           : {:>7.2}%                          ║",
        report.max_drawdown * 100.0
    );
    println!(
        "║  Risk-Free Rate         : {:>7.2}%                          ║",
        alloc.risk_free_rate * 100.0
    );
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  Symbol    Weight    E[Ann.Ret]   Ann.Vol                  ║");
    println!("╠════════════════════════════════════════════════════════════╣");

    // Sort by weight descending
    let mut sorted: Vec<(usize, &str, f64)> = alloc
        .weights
        .iter()
        .enumerate()
        .map(|(i, (sym, w))| (i, sym, w))
        .collect();
    sorted.sort_by(|a, b| b.2.total_cmp(&a.2));

    for (i, sym, w) in &sorted {
        let vol = alloc.cov.matrix()[*i][*i].max(0.0).sqrt();
        println!(
            "║  {:<8} {:>7.2}%   {:>+8.2}%   {:>6.2}%                  ║",
            sym,
            w * 100.0,
            alloc.mu.values()[*i] * 100.0,
            vol * 100.0
        );
    }

    if !unadjusted.is_empty() {
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Unadjusted close used for: {:<31}║", unadjusted.join(", "));
    }

    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("⚠  Educational use only. Not financial advice.");
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────
