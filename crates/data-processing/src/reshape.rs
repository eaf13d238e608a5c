use crate::error::ReshapeError;
use core_types::{
    AllocationSeries, BacktestDocument, CoreError, DailyFrame, DayOffset, PortfolioValueSeries,
    StrategyId, decode_trading_key,
    backtest::DayValues,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the single column of a [`PortfolioValueSeries`].
pub const CAPITAL_COLUMN: &str = "capital";

/// A backtest response turned into daily series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReshapedBacktest {
    /// One column per held ticker, one row per calendar day.
    pub allocations: AllocationSeries,
    pub portfolio_values: PortfolioValueSeries,
    /// The `stats` region, untouched.
    pub stats: Value,
    pub strategy_name: String,
    pub legend_key: String,
}

fn malformed(message: impl Into<String>) -> ReshapeError {
    ReshapeError::MalformedDocument(message.into())
}

fn bad_date(context: &str) -> impl FnOnce(CoreError) -> ReshapeError + '_ {
    move |e| malformed(format!("{context}: {e}"))
}

fn decode_bound(offset: Option<&DayOffset>, field: &str) -> Result<NaiveDate, ReshapeError> {
    offset
        .ok_or_else(|| malformed(format!("missing {field}")))?
        .decode()
        .map_err(bad_date(field))
}

/// Writes `values` into `column` of `frame`. `null` cells and dates outside
/// the frame's span are left at 0.0. Without a column every key is still
/// decoded but nothing is written.
fn fill_column(
    frame: &mut DailyFrame,
    column: Option<usize>,
    values: &DayValues,
    label: &str,
) -> Result<(), ReshapeError> {
    for (key, value) in values {
        let date = decode_trading_key(key).map_err(bad_date(label))?;
        let (Some(column), Some(value)) = (column, value) else {
            continue;
        };
        if !frame.set(date, column, *value) {
            tracing::debug!(%label, %date, "Ignoring value outside the backtest span");
        }
    }
    Ok(())
}

/// Converts one backtest response into allocation and portfolio-value series.
///
/// Both series cover every calendar day from `first_day` to `last_market_day`
/// inclusive, weekends included. Cells without data are 0.0. Allocation
/// columns are the last market day's holdings; weights for other tickers are
/// ignored.
pub fn reshape(doc: BacktestDocument) -> Result<ReshapedBacktest, ReshapeError> {
    let (legend_key, strategy_name) = match doc.legend_entry() {
        Some((key, Some(name))) => (key.to_string(), name.to_string()),
        Some((key, None)) => return Err(malformed(format!("legend entry {key} has no name"))),
        None => return Err(malformed("legend is empty")),
    };

    let start = decode_bound(doc.first_day.as_ref(), "first_day")?;
    let end = decode_bound(doc.last_market_day.as_ref(), "last_market_day")?;
    if end < start {
        return Err(malformed(format!("last_market_day {end} is before first_day {start}")));
    }

    let holdings = doc
        .last_market_days_holdings
        .as_ref()
        .ok_or_else(|| malformed("missing last_market_days_holdings"))?;
    let weights = doc.tdvm_weights.as_ref().ok_or_else(|| malformed("missing tdvm_weights"))?;
    let stats = doc.stats.clone().ok_or_else(|| malformed("missing stats"))?;

    let mut allocations = DailyFrame::zeroed(start, end, holdings.tickers());
    for (ticker, ticker_weights) in weights {
        let column = allocations.column_index(ticker);
        if column.is_none() {
            tracing::debug!(%ticker, "Ignoring weights for a ticker outside the holdings");
        }
        fill_column(&mut allocations, column, ticker_weights, ticker)?;
    }

    let capital = doc
        .dvm_capital
        .get(&legend_key)
        .ok_or_else(|| malformed(format!("no capital series for {legend_key}")))?;
    let mut portfolio_values = DailyFrame::zeroed(start, end, vec![CAPITAL_COLUMN.to_string()]);
    fill_column(&mut portfolio_values, Some(0), capital, CAPITAL_COLUMN)?;

    tracing::debug!(
        strategy = %strategy_name,
        days = portfolio_values.len(),
        tickers = allocations.columns().len(),
        "Reshaped backtest"
    );

    Ok(ReshapedBacktest {
        allocations,
        portfolio_values,
        stats,
        strategy_name,
        legend_key,
    })
}

/// Parses and reshapes a raw JSON response.
pub fn reshape_json(document: Value) -> Result<ReshapedBacktest, ReshapeError> {
    let doc: BacktestDocument =
        serde_json::from_value(document).map_err(|e| malformed(e.to_string()))?;
    reshape(doc)
}

/// Reshapes many documents. A malformed document is logged and left out.
pub fn reshape_batch(
    documents: impl IntoIterator<Item = (StrategyId, Value)>,
) -> BTreeMap<StrategyId, ReshapedBacktest> {
    let mut reshaped = BTreeMap::new();
    for (id, document) in documents {
        match reshape_json(document) {
            Ok(backtest) => {
                reshaped.insert(id, backtest);
            }
            Err(e) => tracing::warn!(symphony = %id, error = %e, "Skipping backtest"),
        }
    }
    reshaped
}
