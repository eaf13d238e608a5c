use crate::dates::{decode_trading_date, decode_trading_key};
use crate::error::CoreError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Day-offset keyed values, e.g. `{"19723": 0.5}`. `null` cells are kept as `None`.
pub type DayValues = BTreeMap<String, Option<f64>>;

/// The raw response of the Composer backtest endpoint.
///
/// Every region is optional at the serde level so that a missing region is
/// reported by the reshaper as a malformed document instead of a parse error.
/// Fields this crate does not use are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestDocument {
    /// Internal backtest key -> `{ "name": ... }`.
    #[serde(default)]
    pub legend: Map<String, Value>,

    /// Ticker -> day offset -> allocation weight.
    #[serde(default)]
    pub tdvm_weights: Option<BTreeMap<String, DayValues>>,

    /// Legend key -> day offset -> portfolio capital.
    #[serde(default)]
    pub dvm_capital: BTreeMap<String, DayValues>,

    #[serde(default)]
    pub first_day: Option<DayOffset>,

    #[serde(default)]
    pub last_market_day: Option<DayOffset>,

    #[serde(default)]
    pub last_market_days_holdings: Option<Holdings>,

    /// Summary statistics computed by Composer, kept verbatim. An explicit
    /// `null` counts as present.
    #[serde(default, deserialize_with = "present")]
    pub stats: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A trading day as it appears in the document: usually an integer, sometimes a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DayOffset {
    Number(i64),
    /// A whole number sent as a float, e.g. `19723.0`.
    Float(f64),
    Text(String),
    Other(Value),
}

impl DayOffset {
    pub fn decode(&self) -> Result<NaiveDate, CoreError> {
        match self {
            DayOffset::Number(days) => decode_trading_date(*days),
            DayOffset::Float(days) if days.is_finite() && days.fract() == 0.0 => {
                decode_trading_date(*days as i64)
            }
            DayOffset::Float(days) => Err(CoreError::InvalidDate(format!(
                "{days} is not a whole trading day"
            ))),
            DayOffset::Text(key) => decode_trading_key(key),
            DayOffset::Other(value) => Err(CoreError::InvalidDate(format!(
                "cannot convert {value} to a trading day"
            ))),
        }
    }
}

/// The tickers held on the last market day.
///
/// Composer sends a ticker -> quantity object; a plain list of tickers is also accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Holdings {
    Quantities(Map<String, Value>),
    Tickers(Vec<String>),
}

impl Holdings {
    /// Tickers in document order.
    pub fn tickers(&self) -> Vec<String> {
        match self {
            Holdings::Quantities(map) => map.keys().cloned().collect(),
            Holdings::Tickers(list) => list.clone(),
        }
    }
}

impl BacktestDocument {
    /// The first legend entry as `(key, name)`, if the legend is non-empty.
    pub fn legend_entry(&self) -> Option<(&str, Option<&str>)> {
        self.legend.iter().next().map(|(key, entry)| {
            (key.as_str(), entry.get("name").and_then(Value::as_str))
        })
    }
}
