//! Configuration for the ingestion layer.
//!
//! The configuration is loaded from a `config.yml` file within a configuration directory, see
//! [`Config::from_path`]. All sections and fields are optional and fall back to defaults.
#![warn(missing_docs)]

mod byte_size;
mod config;

pub use self::byte_size::*;
pub use self::config::*;
