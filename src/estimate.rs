use crate::data::PriceTable;
use crate::error::{AllocError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Fewest daily returns from which a sample covariance is defined.
pub const MIN_RETURN_OBSERVATIONS: usize = 2;

/// How daily returns are turned into an annual expected return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnsMethod {
    /// Arithmetic mean of daily returns times trading days.
    #[default]
    Mean,
    /// Geometric growth between the first and last price, annualized.
    Compounded,
}

impl fmt::Display for ReturnsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnsMethod::Mean => write!(f, "mean"),
            ReturnsMethod::Compounded => write!(f, "compounded"),
        }
    }
}

impl FromStr for ReturnsMethod {
    type Err = AllocError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(ReturnsMethod::Mean),
            "compounded" => Ok(ReturnsMethod::Compounded),
            other => Err(AllocError::InvalidInput(format!(
                "unknown returns method '{}', expected 'mean' or 'compounded'",
                other
            ))),
        }
    }
}

/// Annualized expected return per ticker (mu).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnEstimate {
    tickers: Vec<String>,
    values: Vec<f64>,
}

impl ReturnEstimate {
    pub fn new(tickers: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if tickers.len() != values.len() {
            return Err(AllocError::InvalidInput(format!(
                "{} expected returns for {} tickers",
                values.len(),
                tickers.len()
            )));
        }
        Ok(Self { tickers, values })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.tickers.iter().position(|t| t == ticker).map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Annualized covariance matrix (S), rows and columns in ticker order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CovarianceEstimate {
    tickers: Vec<String>,
    matrix: Vec<Vec<f64>>,
}

impl CovarianceEstimate {
    pub fn new(tickers: Vec<String>, matrix: Vec<Vec<f64>>) -> Result<Self> {
        let n = tickers.len();
        if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
            return Err(AllocError::InvalidInput(format!(
                "covariance matrix must be {}x{}",
                n, n
            )));
        }
        Ok(Self { tickers, matrix })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn matrix(&self) -> &[Vec<f64>] {
        &self.matrix
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        Some(self.matrix[i][j])
    }

    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

fn require_history(prices: &PriceTable) -> Result<Vec<Vec<f64>>> {
    let returns = prices.pct_change();
    if returns.len() < MIN_RETURN_OBSERVATIONS {
        return Err(AllocError::InsufficientHistory {
            tickers: prices.tickers().to_vec(),
            required: MIN_RETURN_OBSERVATIONS,
            actual: returns.len(),
        });
    }
    Ok(returns)
}

/// Annualized expected return of each ticker.
pub fn mean_historical_return(
    prices: &PriceTable,
    method: ReturnsMethod,
    trading_days: f64,
) -> Result<ReturnEstimate> {
    let returns = require_history(prices)?;
    let n_obs = returns.len() as f64;
    let n_assets = prices.num_assets();

    let values = match method {
        ReturnsMethod::Mean => (0..n_assets)
            .map(|j| returns.iter().map(|r| r[j]).sum::<f64>() / n_obs * trading_days)
            .collect(),
        ReturnsMethod::Compounded => {
            let rows = prices.rows();
            let (first, last) = (&rows[0], &rows[rows.len() - 1]);
            (0..n_assets)
                .map(|j| (last[j] / first[j]).powf(trading_days / n_obs) - 1.0)
                .collect()
        }
    };

    ReturnEstimate::new(prices.tickers().to_vec(), values)
}

/// Annualized sample covariance of daily returns (denominator n - 1).
pub fn sample_cov(prices: &PriceTable, trading_days: f64) -> Result<CovarianceEstimate> {
    let returns = require_history(prices)?;
    let n_obs = returns.len();
    let n_assets = prices.num_assets();

    let means: Vec<f64> = (0..n_assets)
        .map(|j| returns.iter().map(|r| r[j]).sum::<f64>() / n_obs as f64)
        .collect();

    let mut matrix = vec![vec![0.0; n_assets]; n_assets];
    for i in 0..n_assets {
        for j in i..n_assets {
            let cov = returns
                .iter()
                .map(|r| (r[i] - means[i]) * (r[j] - means[j]))
                .sum::<f64>()
                / (n_obs - 1) as f64
                * trading_days;
            matrix[i][j] = cov;
            matrix[j][i] = cov;
        }
    }

    CovarianceEstimate::new(prices.tickers().to_vec(), matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_table;

    const EPS: f64 = 1e-10;

    fn prices_from_returns(start: f64, returns: &[f64]) -> Vec<f64> {
        let mut prices = vec![start];
        for r in returns {
            let last = *prices.last().unwrap();
            prices.push(last * (1.0 + r));
        }
        prices
    }

    #[test]
    fn test_returns_method_parses() {
        assert_eq!("mean".parse::<ReturnsMethod>().unwrap(), ReturnsMethod::Mean);
        assert_eq!(" Compounded ".parse::<ReturnsMethod>().unwrap(), ReturnsMethod::Compounded);
        assert!("ema".parse::<ReturnsMethod>().is_err());
        assert_eq!(ReturnsMethod::default(), ReturnsMethod::Mean);
    }

    #[test]
    fn test_mean_return_is_annualized_average() {
        let returns = [0.01, -0.02, 0.03, 0.00];
        let table = test_table(&["AAA"], vec![prices_from_returns(50.0, &returns)]);

        let mu = mean_historical_return(&table, ReturnsMethod::Mean, 252.0).unwrap();
        let expected = returns.iter().sum::<f64>() / 4.0 * 252.0;
        assert!((mu.values()[0] - expected).abs() < EPS);
        assert_eq!(mu.get("AAA"), Some(mu.values()[0]));
        assert_eq!(mu.get("ZZZ"), None);
    }

    #[test]
    fn test_compounded_return() {
        let table = test_table(&["AAA"], vec![vec![100.0, 105.0, 121.0]]);
        let mu = mean_historical_return(&table, ReturnsMethod::Compounded, 2.0).unwrap();
        assert!((mu.values()[0] - 0.21).abs() < EPS);
    }

    #[test]
    fn test_sample_cov_matches_hand_computation() {
        let ra = [0.01, -0.01, 0.02];
        let rb = [0.00, 0.02, -0.02];
        let table = test_table(
            &["AAA", "BBB"],
            vec![prices_from_returns(10.0, &ra), prices_from_returns(20.0, &rb)],
        );

        let cov = sample_cov(&table, 252.0).unwrap();
        let ma = ra.iter().sum::<f64>() / 3.0;
        let mb = rb.iter().sum::<f64>() / 3.0;
        let var_a = ra.iter().map(|r| (r - ma).powi(2)).sum::<f64>() / 2.0 * 252.0;
        let cov_ab = ra
            .iter()
            .zip(rb.iter())
            .map(|(a, b)| (a - ma) * (b - mb))
            .sum::<f64>()
            / 2.0
            * 252.0;

        assert!((cov.matrix()[0][0] - var_a).abs() < EPS);
        assert!((cov.matrix()[0][1] - cov_ab).abs() < EPS);
        assert_eq!(cov.matrix()[0][1], cov.matrix()[1][0]);
        assert_eq!(cov.get("BBB", "AAA"), Some(cov.matrix()[1][0]));
    }

    #[test]
    fn test_insufficient_history() {
        let table = test_table(&["AAA", "BBB"], vec![vec![10.0, 11.0], vec![5.0, 5.5]]);

        let err = sample_cov(&table, 252.0).unwrap_err();
        assert_eq!(
            err,
            AllocError::InsufficientHistory {
                tickers: vec!["AAA".to_string(), "BBB".to_string()],
                required: 2,
                actual: 1,
            }
        );
        assert!(mean_historical_return(&table, ReturnsMethod::Mean, 252.0).is_err());
    }
}
