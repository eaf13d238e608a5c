//! Turns raw inputs into the shapes the analytics engine consumes: backtest
//! responses into daily series, and chat exports into symphony lists.

pub mod discord;
pub mod error;
pub mod reshape;
pub mod symphony;

pub use discord::{SymphonyMeta, extract_symphonies, load_symphonies};
pub use error::{DiscordExportError, ReshapeError};
pub use reshape::{CAPITAL_COLUMN, ReshapedBacktest, reshape, reshape_batch, reshape_json};
pub use symphony::oos_start_from_symphony;
