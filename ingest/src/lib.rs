//! Ingestion of DataDog metrics and JSON log lines.
//!
//! This crate ties the request body reader, the protocol decoders and the object pools together.
//! An [`Ingest`] instance is created once from the [`Config`] and shared by all request handlers.
//! The handlers pass in the raw body together with the relevant request headers and receive the
//! decoded samples or log fields through a callback:
//!
//! ```
//! use std::convert::Infallible;
//!
//! use ingest::{Config, ContentEncoding, Ingest, PayloadFormat, Protocol};
//!
//! let ingest = Ingest::new(&Config::default());
//!
//! let body = br#"{"series":[{"metric":"requests","points":[[1700000000,3]],"tags":["env:prod"]}]}"#;
//! let mut samples = Vec::new();
//!
//! let count = ingest
//!     .insert_datadog(
//!         Protocol::V1,
//!         &body[..],
//!         ContentEncoding::Identity,
//!         PayloadFormat::Json,
//!         |sample| {
//!             samples.push(sample.to_string());
//!             Ok::<_, Infallible>(())
//!         },
//!     )
//!     .unwrap();
//!
//! assert_eq!(count, 1);
//! assert_eq!(samples, [r#"{__name__="requests",env="prod"} 3 1700000000000"#]);
//! ```
//!
//! Samples and log fields borrow from pooled buffers. The callback must copy anything it needs to
//! keep beyond the call.
#![warn(missing_docs)]

mod insert;
mod setup;
mod statsd;

pub use self::insert::*;
pub use self::setup::*;

pub use ingest_body::{ContentEncoding, ReadError};
pub use ingest_config::Config;
pub use ingest_datadog::{DecodeError, Label, PayloadFormat, Protocol, Sample};
pub use ingest_ourlogs::{LogField, ParseError, ParserContext};
