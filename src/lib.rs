pub mod config;
pub mod error;
pub mod measurement;
pub mod mqtt;
pub mod rollup;
pub mod shelly;

pub use config::Config;
pub use error::{AppError, Result};
pub use rollup::{rollup, RollupResult};
