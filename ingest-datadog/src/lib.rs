//! Decoders for the DataDog metrics submission protocols.
//!
//! DataDog agents submit metrics through three endpoints, each with its own payload format:
//!
//!  - [`v1`]: `POST /api/v1/series`, a JSON object with a list of series and `[timestamp, value]`
//!    point pairs.
//!  - [`v2`]: `POST /api/v2/series`, either JSON or the `MetricPayload` protobuf, with resources
//!    instead of host and device fields.
//!  - [`sketches`]: `POST /api/beta/sketches`, the `SketchPayload` protobuf carrying aggregated
//!    distributions.
//!
//! All of them are decoded into a [`Request`] and then converted into canonical [`Sample`]s,
//! which consist of a label set, a millisecond timestamp and a value. The metric name is stored
//! in the `__name__` label.
//!
//! ```
//! use ingest_datadog::{PayloadFormat, Protocol, RequestPools, Sanitizer};
//!
//! let pools = RequestPools::new(4);
//! let mut request = pools.get(Protocol::V1);
//!
//! let body = br#"{"series":[{"metric":"system.load.1","host":"web-1","points":[[1700000000,0.5]]}]}"#;
//! request.decode(body, PayloadFormat::Json).unwrap();
//!
//! let mut names = Vec::new();
//! request
//!     .extract(&Sanitizer::default(), |sample| {
//!         names.push(sample.to_string());
//!         Ok::<_, std::convert::Infallible>(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(
//!     names,
//!     [r#"{__name__="system.load.1",host="web-1"} 0.5 1700000000000"#]
//! );
//! ```
#![warn(missing_docs)]

mod json;
mod request;
mod sample;
mod sanitize;
mod statsd;

pub mod sketches;
pub mod v1;
pub mod v2;

pub use self::request::*;
pub use self::sample::*;
pub use self::sanitize::*;
