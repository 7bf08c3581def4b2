//! Mean-variance portfolio allocation from historical daily prices.
//!
//! The pipeline runs one way: [`data::load_prices`] builds a [`PriceTable`],
//! [`Allocator::optimize`] estimates mu and S and solves for the max-Sharpe
//! weights, and [`metrics::portfolio_metrics`] reports risk statistics for
//! the result. [`frontier::simulate_portfolios`] draws the random-portfolio
//! scatter used for plotting.

pub mod config;
pub mod data;
pub mod error;
pub mod estimate;
pub mod frontier;
pub mod metrics;
pub mod portfolio;

pub use config::{AllocatorSettings, DataSettings};
pub use data::{load_prices, PriceSource, PriceTable, YahooSource};
pub use error::{AllocError, Result};
pub use estimate::{CovarianceEstimate, ReturnEstimate, ReturnsMethod};
pub use frontier::{best_by_sharpe, simulate_portfolios, SimulatedPortfolio};
pub use metrics::{portfolio_metrics, MetricsReport};
pub use portfolio::{optimize_portfolio, Allocation, Allocator, PerformanceSummary, WeightVector};
