use std::fmt;

use ingest_common::{Pool, Pooled, Reset};
use ingest_statsd::metric;

use crate::sample::Sample;
use crate::sanitize::Sanitizer;
use crate::statsd::DatadogCounters;
use crate::{sketches, v1, v2};

/// The DataDog endpoint a request was sent to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Protocol {
    /// `/api/v1/series`
    V1,
    /// `/api/v2/series`
    V2,
    /// `/api/beta/sketches`
    Sketches,
}

impl Protocol {
    /// Returns the name of the protocol used in metrics and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::V1 => "datadog_v1",
            Self::V2 => "datadog_v2",
            Self::Sketches => "datadog_sketches",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The serialization format of a request body.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PayloadFormat {
    /// A JSON document.
    #[default]
    Json,
    /// A protobuf message.
    Protobuf,
}

impl PayloadFormat {
    /// Determines the format from the value of a `Content-Type` header.
    ///
    /// Anything other than `application/x-protobuf` is treated as JSON.
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type.split(';').next().unwrap_or_default().trim();

        match mime.eq_ignore_ascii_case("application/x-protobuf") {
            true => Self::Protobuf,
            false => Self::Json,
        }
    }
}

/// The reason a request body could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeErrorKind {
    /// The body is not valid JSON or has an unexpected structure.
    #[error("invalid json payload")]
    Json(#[from] serde_json::Error),
    /// The body is not a valid protobuf message.
    #[error("invalid protobuf payload")]
    Protobuf(#[from] prost::DecodeError),
}

/// An error returned by [`Request::decode`].
#[derive(Debug, thiserror::Error)]
#[error("cannot decode {protocol} request of {size} bytes")]
pub struct DecodeError {
    protocol: Protocol,
    size: usize,
    #[source]
    kind: DecodeErrorKind,
}

impl DecodeError {
    /// Returns the protocol of the request.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the size of the body in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the reason the body could not be decoded.
    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }
}

/// A decoded DataDog request of any protocol.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// A request to `/api/v1/series`.
    V1(v1::Request),
    /// A request to `/api/v2/series`.
    V2(v2::Request),
    /// A request to `/api/beta/sketches`.
    Sketches(sketches::SketchPayload),
}

impl Request {
    /// Creates an empty request for the given protocol.
    pub fn new(protocol: Protocol) -> Self {
        match protocol {
            Protocol::V1 => Self::V1(Default::default()),
            Protocol::V2 => Self::V2(Default::default()),
            Protocol::Sketches => Self::Sketches(Default::default()),
        }
    }

    /// Returns the protocol of this request.
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::V1(_) => Protocol::V1,
            Self::V2(_) => Protocol::V2,
            Self::Sketches(_) => Protocol::Sketches,
        }
    }

    /// Decodes a request body, replacing the previous contents of this request.
    ///
    /// The `format` only applies to v2 requests. v1 requests are always JSON, and sketches are
    /// always protobuf.
    pub fn decode(&mut self, data: &[u8], format: PayloadFormat) -> Result<(), DecodeError> {
        let result = match self {
            Self::V1(request) => request.decode(data).map_err(DecodeErrorKind::from),
            Self::V2(request) => request.decode(data, format),
            Self::Sketches(request) => request.decode(data).map_err(DecodeErrorKind::from),
        };

        result.map_err(|kind| {
            let protocol = self.protocol();
            metric!(
                counter(DatadogCounters::UnmarshalErrors) += 1,
                protocol = protocol.name()
            );

            DecodeError {
                protocol,
                size: data.len(),
                kind,
            }
        })
    }

    /// Calls `on_sample` for every sample in the request and returns the number of samples.
    ///
    /// Samples are produced in the order of the request. The first error returned by `on_sample`
    /// stops extraction and is returned unchanged.
    pub fn extract<F, E>(&self, sanitizer: &Sanitizer, on_sample: F) -> Result<usize, E>
    where
        F: FnMut(Sample<'_>) -> Result<(), E>,
    {
        let count = match self {
            Self::V1(request) => request.extract(sanitizer, on_sample)?,
            Self::V2(request) => request.extract(sanitizer, on_sample)?,
            Self::Sketches(request) => request.extract(sanitizer, on_sample)?,
        };

        metric!(
            counter(DatadogCounters::RowsRead) += count as i64,
            protocol = self.protocol().name()
        );

        Ok(count)
    }
}

impl Reset for Request {
    fn reset(&mut self) {
        match self {
            Self::V1(request) => request.reset(),
            Self::V2(request) => request.reset(),
            Self::Sketches(request) => request.reset(),
        }
    }
}

/// Pools of reusable [`Request`]s, one per protocol.
#[derive(Debug)]
pub struct RequestPools {
    v1: Pool<Request>,
    v2: Pool<Request>,
    sketches: Pool<Request>,
}

impl RequestPools {
    /// Creates pools that each keep up to `capacity` idle requests in their fast tier.
    pub fn new(capacity: usize) -> Self {
        Self {
            v1: Pool::new("datadog_v1", capacity, || Request::new(Protocol::V1)),
            v2: Pool::new("datadog_v2", capacity, || Request::new(Protocol::V2)),
            sketches: Pool::new("datadog_sketches", capacity, || {
                Request::new(Protocol::Sketches)
            }),
        }
    }

    /// Checks out an empty request for the given protocol.
    pub fn get(&self, protocol: Protocol) -> Pooled<'_, Request> {
        match protocol {
            Protocol::V1 => self.v1.get(),
            Protocol::V2 => self.v2.get(),
            Protocol::Sketches => self.sketches.get(),
        }
    }
}
