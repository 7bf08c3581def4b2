use crate::data::PriceTable;
use crate::error::{AllocError, Result};
use crate::estimate::{CovarianceEstimate, ReturnEstimate};
use crate::portfolio::{portfolio_return, portfolio_variance, sharpe_ratio, WeightVector};
use serde::Serialize;

/// Risk/return diagnostics for a weight vector.
///
/// Ratios are `None` when the portfolio volatility is zero, or for Sortino
/// when no asset earns less than the risk-free rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MetricsReport {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    /// Worst peak-to-trough loss as a fraction, always <= 0.
    pub max_drawdown: f64,
}

pub fn portfolio_metrics(
    weights: &WeightVector,
    mu: &ReturnEstimate,
    cov: &CovarianceEstimate,
    risk_free_rate: f64,
    prices: &PriceTable,
) -> Result<MetricsReport> {
    let tickers = weights.tickers();
    if mu.tickers() != tickers || cov.tickers() != tickers || prices.tickers() != tickers {
        return Err(AllocError::InvalidInput(
            "weights, estimates and prices must share the same tickers in the same order".to_string(),
        ));
    }

    let w = weights.as_slice();
    let expected_return = portfolio_return(w, mu.values());
    let volatility = portfolio_variance(w, cov.matrix()).max(0.0).sqrt();
    let sharpe = sharpe_ratio(expected_return, volatility, risk_free_rate);

    // Downside deviation is approximated by total volatility.
    let sortino = if mu.values().iter().any(|&m| m < risk_free_rate) {
        sharpe
    } else {
        None
    };

    Ok(MetricsReport {
        expected_return,
        volatility,
        sharpe,
        sortino,
        max_drawdown: max_drawdown(prices, w),
    })
}

/// Largest relative drop of the compounded portfolio value below its running peak.
pub fn max_drawdown(prices: &PriceTable, weights: &[f64]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;

    for row in prices.pct_change() {
        cumulative *= 1.0 + portfolio_return(weights, &row);
        peak = peak.max(cumulative);
        if peak > 0.0 {
            worst = worst.min((cumulative - peak) / peak);
        }
    }
    worst
}
