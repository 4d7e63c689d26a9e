//! Shared types, error definitions, and strategy parameters for the swing bot.

pub mod error;
pub mod params;
pub mod types;

pub use error::Error;
pub use params::StrategyParams;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
