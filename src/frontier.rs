use crate::error::{AllocError, Result};
use crate::estimate::{CovarianceEstimate, ReturnEstimate};
use crate::portfolio::{portfolio_performance, Allocation};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

/// One randomly weighted portfolio in the risk/return scatter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulatedPortfolio {
    pub weights: Vec<f64>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe: Option<f64>,
}

/// Scatter written next to the optimizer's pick for plotting.
#[derive(Clone, Debug, Serialize)]
pub struct FrontierScatter<'a> {
    pub tickers: &'a [String],
    pub risk_free_rate: f64,
    pub seed: u64,
    pub optimal: &'a Allocation,
    pub portfolios: &'a [SimulatedPortfolio],
}

/// Generates a random weight vector that sums to 1.0, using Dirichlet-like sampling.
fn generate_random_weights(n: usize, rng: &mut impl rand::Rng) -> Vec<f64> {
    use rand_distr::{Distribution, Exp1};
    let raw: Vec<f64> = (0..n).map(|_| Exp1.sample(rng)).collect();
    let sum: f64 = raw.iter().sum();
    raw.iter().map(|v| v / sum).collect()
}

/// Samples `samples` long-only portfolios uniformly on the simplex.
///
/// A root generator seeded with `seed` hands each sample its own stream
/// seed up front, so the output does not depend on the size of the thread
/// pool and neighbouring seeds do not share samples.
pub fn simulate_portfolios(
    mu: &ReturnEstimate,
    cov: &CovarianceEstimate,
    risk_free_rate: f64,
    samples: usize,
    seed: u64,
) -> Result<Vec<SimulatedPortfolio>> {
    let n = mu.len();
    if n == 0 || cov.tickers() != mu.tickers() {
        return Err(AllocError::InvalidInput(
            "expected returns and covariance must cover the same tickers".to_string(),
        ));
    }

    info!("Simulating {} random portfolios over {} assets (seed {})", samples, n, seed);

    let mut root = StdRng::seed_from_u64(seed);
    let stream_seeds: Vec<u64> = (0..samples).map(|_| root.next_u64()).collect();

    let portfolios = stream_seeds
        .into_par_iter()
        .map(|stream_seed| {
            let mut rng = StdRng::seed_from_u64(stream_seed);
            let weights = generate_random_weights(n, &mut rng);
            let perf = portfolio_performance(&weights, mu.values(), cov.matrix(), risk_free_rate);
            SimulatedPortfolio {
                weights,
                expected_return: perf.expected_return,
                volatility: perf.volatility,
                sharpe: perf.sharpe,
            }
        })
        .collect();

    Ok(portfolios)
}

/// Highest-Sharpe sample, ignoring samples without a Sharpe ratio.
pub fn best_by_sharpe(samples: &[SimulatedPortfolio]) -> Option<&SimulatedPortfolio> {
    samples
        .iter()
        .filter_map(|p| p.sharpe.map(|s| (s, p)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, p)| p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> (ReturnEstimate, CovarianceEstimate) {
        let tickers: Vec<String> = ["AAA", "BBB", "CCC"].iter().map(|t| t.to_string()).collect();
        let mu = ReturnEstimate::new(tickers.clone(), vec![0.08, 0.12, 0.05]).unwrap();
        let cov = CovarianceEstimate::new(
            tickers,
            vec![
                vec![0.04, 0.01, 0.00],
                vec![0.01, 0.09, 0.02],
                vec![0.00, 0.02, 0.02],
            ],
        )
        .unwrap();
        (mu, cov)
    }

    #[test]
    fn test_weights_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let w = generate_random_weights(5, &mut rng);
            let sum: f64 = w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-10, "Weights should sum to 1.0, got {}", sum);
            assert!(w.iter().all(|&v| v >= 0.0), "Weights should be non-negative");
        }
    }

    #[test]
    fn test_simulation_is_reproducible() {
        let (mu, cov) = inputs();
        let a = simulate_portfolios(&mu, &cov, 0.02, 200, 42).unwrap();
        let b = simulate_portfolios(&mu, &cov, 0.02, 200, 42).unwrap();
        let c = simulate_portfolios(&mu, &cov, 0.02, 200, 43).unwrap();

        assert_eq!(a.len(), 200);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_adjacent_seeds_share_no_samples() {
        let (mu, cov) = inputs();
        let a = simulate_portfolios(&mu, &cov, 0.02, 300, 7).unwrap();
        let b = simulate_portfolios(&mu, &cov, 0.02, 300, 8).unwrap();
        assert!(
            a.iter().all(|p| !b.contains(p)),
            "Seeds 7 and 8 should produce disjoint scatters"
        );
    }

    #[test]
    fn test_samples_are_consistent() {
        let (mu, cov) = inputs();
        for p in simulate_portfolios(&mu, &cov, 0.02, 50, 7).unwrap() {
            assert!((p.weights.iter().sum::<f64>() - 1.0).abs() < 1e-10);
            assert!(p.volatility > 0.0);
            let sharpe = p.sharpe.unwrap();
            assert!((sharpe - (p.expected_return - 0.02) / p.volatility).abs() < 1e-12);
        }
    }

    #[test]
    fn test_best_by_sharpe() {
        let (mu, cov) = inputs();
        let samples = simulate_portfolios(&mu, &cov, 0.02, 300, 5).unwrap();
        let best = best_by_sharpe(&samples).unwrap();
        let max = samples.iter().filter_map(|p| p.sharpe).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(best.sharpe, Some(max));

        assert!(best_by_sharpe(&[]).is_none());
    }
}
