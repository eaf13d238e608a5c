use crate::error::ConfigError;
use rust_decimal::Decimal;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{
    ApiConfig, BacktestConfig, Config, DEFAULT_METRIC_DENYLIST, LoggingConfig, MetricsConfig,
    OosAlignment, OutputConfig,
};
pub use telemetry::init_tracing;

/// Environment variables such as `MAESTRO__API__RETRY_ATTEMPTS=5` override file values.
const ENV_PREFIX: &str = "MAESTRO";

/// Loads the application configuration from `config.toml` in the working directory.
///
/// The file is optional; missing values fall back to their defaults.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Loads the configuration from an explicit file path plus environment overrides,
/// then validates it.
pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("metrics.denylist"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

impl Config {
    /// Rejects values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.api.retry_attempts == 0 {
            return invalid("api.retry_attempts must be at least 1".to_string());
        }
        if self.api.max_concurrent_requests == 0 {
            return invalid("api.max_concurrent_requests must be at least 1".to_string());
        }
        if self.backtest.capital <= Decimal::ZERO {
            return invalid(format!("backtest.capital must be positive, got {}", self.backtest.capital));
        }
        if self.backtest.slippage_percent.is_sign_negative() {
            return invalid(format!(
                "backtest.slippage_percent cannot be negative, got {}",
                self.backtest.slippage_percent
            ));
        }
        if let Some(end) = self.backtest.end_date {
            if end < self.backtest.start_date {
                return invalid(format!(
                    "backtest.end_date {end} is before start_date {}",
                    self.backtest.start_date
                ));
            }
        }
        if self.metrics.periods_per_year == 0 {
            return invalid("metrics.periods_per_year must be positive".to_string());
        }
        if !(self.metrics.var_confidence > 0.0 && self.metrics.var_confidence < 1.0) {
            return invalid(format!(
                "metrics.var_confidence must be in (0, 1), got {}",
                self.metrics.var_confidence
            ));
        }
        if !self.metrics.risk_free_rate.is_finite() {
            return invalid("metrics.risk_free_rate must be finite".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.retry_attempts, 3);
        assert_eq!(config.backtest.capital, dec!(100000));
        assert_eq!(config.metrics.denylist.len(), DEFAULT_METRIC_DENYLIST.len());
        assert_eq!(config.metrics.oos_alignment, OosAlignment::Exact);
        assert_eq!(config.metrics.oos_fallback_start, NaiveDate::from_ymd_opt(2024, 12, 28).unwrap());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_from("/definitely/not/here/config.toml").unwrap();
        assert_eq!(config.api.base_url, ApiConfig::default().base_url);
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
            [api]
            retry_attempts = 5

            [backtest]
            capital = 25000
            slippage_percent = 0.001
            start_date = "2015-06-01"

            [metrics]
            denylist = ["sharpe"]
            oos_alignment = "next_available"
            "#,
        );

        let config = load_config_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.api.retry_attempts, 5);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.backtest.capital, dec!(25000));
        assert_eq!(config.backtest.slippage_percent, dec!(0.001));
        assert_eq!(config.backtest.start_date, NaiveDate::from_ymd_opt(2015, 6, 1).unwrap());
        assert_eq!(config.metrics.denylist, vec!["sharpe".to_string()]);
        assert_eq!(config.metrics.oos_alignment, OosAlignment::NextAvailable);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config("[api]\nretry_attempts = 0\n");
        assert!(matches!(
            load_config_from(file.path().to_str().unwrap()),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.metrics.var_confidence = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.backtest.end_date = NaiveDate::from_ymd_opt(1999, 1, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn run_dir_is_keyed_by_end_date() {
        let output = OutputConfig::default();
        let dir = output.run_dir(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        assert_eq!(dir, std::path::PathBuf::from("bin/SYMPHONIES-2025-01-31"));
    }
}
