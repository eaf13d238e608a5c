use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to build the HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    #[error("Invalid symphony reference: {0}")]
    InvalidReference(#[from] core_types::CoreError),

    #[error("Invalid backtest date range: {start} is after {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}
