use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Invalid symphony reference: {0}")]
    InvalidReference(String),

    #[error("Invalid trading date: {0}")]
    InvalidDate(String),
}
