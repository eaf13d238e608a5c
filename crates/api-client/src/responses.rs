use chrono::NaiveDate;
use configuration::BacktestConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The result of one logical API call, after retries.
///
/// Failures that the server reports (or that exhaust the retry budget) are
/// represented here rather than as errors, so a batch can keep going.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub success: bool,
    pub status: u16,
    /// The decoded JSON body, or an empty object when there is none.
    pub document: Value,
}

impl FetchOutcome {
    pub fn failed(status: u16) -> Self {
        Self {
            success: false,
            status,
            document: Value::Object(Default::default()),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// The body of `POST /v2/public/symphonies/{id}/backtest`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub capital: Decimal,
    pub apply_reg_fee: bool,
    pub apply_taf_fee: bool,
    pub backtest_version: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub slippage_percent: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl BacktestRequest {
    pub fn new(settings: &BacktestConfig, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            capital: settings.capital,
            apply_reg_fee: settings.apply_reg_fee,
            apply_taf_fee: settings.apply_taf_fee,
            backtest_version: settings.backtest_version.clone(),
            slippage_percent: settings.slippage_percent,
            start_date,
            end_date,
        }
    }
}
