use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReshapeError {
    #[error("Malformed backtest document: {0}")]
    MalformedDocument(String),
}

#[derive(Error, Debug)]
pub enum DiscordExportError {
    #[error("Discord export missing 'messages' key")]
    MissingMessages,

    #[error("Discord 'messages' should be a list")]
    InvalidMessages,

    #[error("Failed to read Discord export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in Discord export: {0}")]
    Json(#[from] serde_json::Error),
}
