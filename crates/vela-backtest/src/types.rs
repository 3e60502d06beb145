//! Backtest configuration and the report produced once a run finishes.

use vela_core::ids::TraderId;

/// Run-wide settings that do not belong to any single venue or strategy.
///
/// Grounded on the teacher's `BacktestConfig` (`mqk-backtest/src/types.rs`)
/// for the named-constructor-with-doc-commented-rationale idiom; none of
/// the teacher's fields (integrity gates, PDT, corporate-action policy)
/// carry over since this domain has no counterpart for them.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Identifies every order this run's strategies submit.
    pub trader_id: TraderId,
    /// Number of return periods per year, used to annualize the Sharpe
    /// ratio by taking its square root: `252` for daily bars, `252 * 390`
    /// for 1-minute equity bars, and so on. The original hardcodes
    /// `sqrt(252)` directly; here the un-rooted period count is a field
    /// instead, so a non-daily bar cadence does not silently misreport.
    pub sharpe_annualization: f64,
}

impl BacktestConfig {
    /// Daily-bar defaults suitable for a first run.
    pub fn test_defaults() -> Self {
        BacktestConfig {
            trader_id: TraderId::new("BACKTESTER-001").expect("literal trader id is never empty"),
            sharpe_annualization: 252.0,
        }
    }
}

/// Summary statistics produced once [`crate::engine::BacktestDriver::run`]
/// finishes walking its data. Every numeric field is `f64`: balances and
/// prices stay `Decimal` everywhere else in the workspace, but a report is
/// the reporting boundary spec.md's design notes call out for converting
/// to float, since ratios like Sharpe and win rate have no exact
/// fixed-point representation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BacktestReport {
    pub start_ts: i64,
    pub end_ts: i64,
    pub total_orders: usize,
    pub total_positions: usize,
    pub total_fills: usize,
    pub starting_balance: f64,
    pub ending_balance: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub total_commissions: f64,
    /// `(ts_event, total_base_balance)` recorded once per processed bar.
    pub balance_curve: Vec<(i64, f64)>,
}

impl BacktestReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
