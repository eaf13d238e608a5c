use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an absent `config.toml` is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub backtest: BacktestConfig,
    pub metrics: MetricsConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Connection and retry settings for the Composer backtest API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Total attempts per request, including the first one.
    pub retry_attempts: u32,
    /// Pause after an HTTP 429 before trying again.
    pub rate_limit_delay_secs: u64,
    /// Pause after a transport error before trying again.
    pub error_retry_delay_secs: u64,
    /// Upper bound on in-flight requests during a batch fetch.
    pub max_concurrent_requests: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://backtest-api.composer.trade/api".to_string(),
            timeout_secs: 30,
            retry_attempts: 3,
            rate_limit_delay_secs: 10,
            error_retry_delay_secs: 1,
            max_concurrent_requests: 4,
        }
    }
}

/// Parameters sent with every backtest request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// The initial starting capital for the simulation.
    pub capital: Decimal,
    /// 0.0005 corresponds to 0.05%.
    pub slippage_percent: Decimal,
    pub apply_reg_fee: bool,
    pub apply_taf_fee: bool,
    pub backtest_version: String,
    /// The default start date for the backtest period.
    pub start_date: NaiveDate,
    /// The default end date for the backtest period. Today when unset.
    pub end_date: Option<NaiveDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            capital: dec!(100000),
            slippage_percent: dec!(0.0005),
            apply_reg_fee: true,
            apply_taf_fee: true,
            backtest_version: "v2".to_string(),
            start_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            end_date: None,
        }
    }
}

impl BacktestConfig {
    pub fn end_date_or_today(&self) -> NaiveDate {
        self.end_date.unwrap_or_else(|| Local::now().date_naive())
    }
}

/// How an out-of-sample start date is matched against a series index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum OosAlignment {
    /// The start date must be present in the index; otherwise the strategy is skipped.
    #[default]
    Exact,
    /// Use the first index date on or after the start date.
    NextAvailable,
}

/// Controls which metrics are computed and with which parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metric names never computed in batch runs.
    pub denylist: Vec<String>,
    /// Used to annualize returns and volatility.
    pub periods_per_year: u32,
    /// Annual risk-free rate used by the Sharpe-family ratios.
    pub risk_free_rate: f64,
    /// Confidence level for value-at-risk style metrics.
    pub var_confidence: f64,
    pub oos_alignment: OosAlignment,
    /// Out-of-sample start for symphonies that report no `last_semantic_update_at`.
    pub oos_fallback_start: NaiveDate,
}

/// Metrics that are non-scalar, produce derived series, or trim outliers.
pub const DEFAULT_METRIC_DENYLIST: [&str; 12] = [
    "comp",
    "compsum",
    "distribution",
    "implied_volatility",
    "monthly_returns",
    "to_drawdown_series",
    "outliers",
    "remove_outliers",
    "rolling_sharpe",
    "rolling_sortino",
    "rolling_volatility",
    "pct_rank",
];

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            denylist: DEFAULT_METRIC_DENYLIST.iter().map(|s| s.to_string()).collect(),
            periods_per_year: 252,
            risk_free_rate: 0.0,
            var_confidence: 0.95,
            oos_alignment: OosAlignment::Exact,
            oos_fallback_start: NaiveDate::from_ymd_opt(2024, 12, 28).unwrap_or_default(),
        }
    }
}

/// Where run results are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub base_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { base_dir: PathBuf::from("bin") }
    }
}

impl OutputConfig {
    /// `<base_dir>/SYMPHONIES-<end_date>`, the directory for one run's results.
    pub fn run_dir(&self, end_date: NaiveDate) -> PathBuf {
        self.base_dir.join(format!("SYMPHONIES-{}", end_date.format("%Y-%m-%d")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "maestro.log".to_string(),
        }
    }
}
