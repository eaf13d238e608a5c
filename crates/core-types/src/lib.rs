pub mod backtest;
pub mod dates;
pub mod error;
pub mod frame;
pub mod identifier;

// Re-export the core types to provide a clean public API.
pub use backtest::{BacktestDocument, DayOffset, Holdings};
pub use dates::{decode_trading_date, decode_trading_key, encode_trading_date};
pub use error::CoreError;
pub use frame::{AllocationSeries, DailyFrame, PortfolioValueSeries};
pub use identifier::{resolve, StrategyId};
