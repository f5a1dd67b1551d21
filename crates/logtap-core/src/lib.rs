//! logtap core - shared types, configuration, and error handling

pub mod backoff;
pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use backoff::BackoffPolicy;
pub use config::{ConfigFormat, Settings};
pub use constants::*;
pub use error::{Error, Result};
pub use types::*;
