//! Common functionality for the ingestion crates.
#![warn(missing_docs)]

mod pool;
mod statsd;
mod time;

pub use self::pool::*;
pub use self::time::*;
