//! The `/api/v2/series` protocol.
//!
//! The endpoint accepts JSON, or the `MetricPayload` protobuf message if the request is sent with
//! `Content-Type: application/x-protobuf`. Both formats decode into the same [`Request`].
//!
//! ```json
//! {
//!   "series": [
//!     {
//!       "metric": "system.load.1",
//!       "type": 0,
//!       "points": [{"timestamp": 1636629071, "value": 0.7}],
//!       "resources": [{"name": "dummyhost", "type": "host"}],
//!       "tags": ["environment:test"]
//!     }
//!   ]
//! }
//! ```
//!
//! Timestamps are used as given, without substituting the current time for zero.

use ingest_common::Reset;
use prost::Message;
use serde::Deserialize;

use crate::json::{decode_series, nullable};
use crate::request::{DecodeErrorKind, PayloadFormat};
use crate::sample::{Label, Labels, Sample, push_tags};
use crate::sanitize::Sanitizer;

/// A decoded v2 request, corresponding to the `MetricPayload` message.
#[derive(Clone, PartialEq, Message)]
pub struct Request {
    /// All series in the request.
    #[prost(message, repeated, tag = "1")]
    pub series: Vec<Series>,
}

/// A single v2 series.
#[derive(Clone, PartialEq, Message, Deserialize)]
pub struct Series {
    /// Resources the series relates to, such as the host.
    #[prost(message, repeated, tag = "1")]
    #[serde(default, deserialize_with = "nullable")]
    pub resources: Vec<Resource>,
    /// The metric name.
    #[prost(string, tag = "2")]
    #[serde(default, deserialize_with = "nullable")]
    pub metric: String,
    /// Tags in `name:value` format.
    #[prost(string, repeated, tag = "3")]
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
    /// Data points of the series.
    #[prost(message, repeated, tag = "4")]
    #[serde(default, deserialize_with = "nullable")]
    pub points: Vec<Point>,
}

/// A typed resource, converted into a label named after its type.
#[derive(Clone, PartialEq, Message, Deserialize)]
pub struct Resource {
    /// The kind of resource, for instance `host`.
    #[prost(string, tag = "1")]
    #[serde(default, deserialize_with = "nullable")]
    pub r#type: String,
    /// The name of the resource.
    #[prost(string, tag = "2")]
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
}

/// A data point with the timestamp in seconds.
#[derive(Clone, PartialEq, Message, Deserialize)]
pub struct Point {
    /// The measured value.
    #[prost(double, tag = "1")]
    #[serde(default)]
    pub value: f64,
    /// Unix timestamp in seconds.
    #[prost(int64, tag = "2")]
    #[serde(default)]
    pub timestamp: i64,
}

impl Request {
    /// Decodes a body into this request, replacing its previous contents.
    pub fn decode(&mut self, data: &[u8], format: PayloadFormat) -> Result<(), DecodeErrorKind> {
        self.series.clear();

        match format {
            PayloadFormat::Json => decode_series(data, &mut self.series)?,
            PayloadFormat::Protobuf => self.merge(data)?,
        }

        Ok(())
    }

    /// Calls `on_sample` for every point in the request and returns the number of samples.
    ///
    /// Extraction stops at the first error returned by the callback.
    pub fn extract<F, E>(&self, sanitizer: &Sanitizer, mut on_sample: F) -> Result<usize, E>
    where
        F: FnMut(Sample<'_>) -> Result<(), E>,
    {
        let mut labels = Labels::new();
        let mut count = 0;

        for series in &self.series {
            labels.clear();
            labels.push(Label::metric_name(sanitizer.apply(&series.metric)));
            for resource in &series.resources {
                labels.push(Label::new(
                    sanitizer.apply(&resource.r#type),
                    resource.name.as_str(),
                ));
            }
            push_tags(&mut labels, &series.tags, sanitizer);

            for point in &series.points {
                on_sample(Sample {
                    labels: &labels,
                    timestamp: point.timestamp.saturating_mul(1000),
                    value: point.value,
                })?;
                count += 1;
            }
        }

        Ok(count)
    }
}

impl Reset for Request {
    fn reset(&mut self) {
        self.series.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn extract(data: &[u8], format: PayloadFormat) -> Vec<String> {
        let mut request = Request::default();
        request.decode(data, format).unwrap();

        let mut samples = Vec::new();
        request
            .extract(&Sanitizer::default(), |sample| {
                samples.push(sample.to_string());
                Ok::<_, Infallible>(())
            })
            .unwrap();

        samples
    }

    #[test]
    fn test_extract_json() {
        let samples = extract(
            br#"{
                "series": [{
                    "metric": "system.load.1",
                    "type": 0,
                    "points": [{"timestamp": 1636629071, "value": 0.7}, {"timestamp": 0, "value": 2}],
                    "resources": [{"name": "dummyhost", "type": "host"}, {"name": "x", "type": "my-type"}],
                    "tags": ["environment:test", "host:other"]
                }]
            }"#,
            PayloadFormat::Json,
        );

        insta::assert_debug_snapshot!(samples, @r#"
        [
            "{__name__=\"system.load.1\",host=\"dummyhost\",my_type=\"x\",environment=\"test\",exported_host=\"other\"} 0.7 1636629071000",
            "{__name__=\"system.load.1\",host=\"dummyhost\",my_type=\"x\",environment=\"test\",exported_host=\"other\"} 2 0",
        ]
        "#);
    }

    #[test]
    fn test_extract_empty() {
        assert!(extract(b"{}", PayloadFormat::Json).is_empty());
        assert!(extract(b"", PayloadFormat::Protobuf).is_empty());
    }

    #[test]
    fn test_decode_invalid_json() {
        for input in ["", "foobar", r#"{"series":123"#, "1234", "[]"] {
            let mut request = Request::default();
            let result = request.decode(input.as_bytes(), PayloadFormat::Json);
            assert!(
                matches!(result, Err(DecodeErrorKind::Json(_))),
                "input: {input:?}"
            );
        }
    }

    #[test]
    fn test_extract_protobuf() {
        // series { metric: "m", points { value: 1.0, timestamp: 2 } }
        let data = [
            0x0a, 0x10, 0x12, 0x01, b'm', 0x22, 0x0b, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0xf0, 0x3f, 0x10, 0x02,
        ];

        let samples = extract(&data, PayloadFormat::Protobuf);
        assert_eq!(samples, [r#"{__name__="m"} 1 2000"#]);
    }

    #[test]
    fn test_decode_protobuf() {
        let payload = Request {
            series: vec![Series {
                resources: vec![Resource {
                    r#type: "host".into(),
                    name: "web-1".into(),
                }],
                metric: "requests".into(),
                tags: vec!["env:prod".into()],
                points: vec![Point {
                    value: 3.0,
                    timestamp: 1_700_000_000,
                }],
            }],
        };

        let mut request = Request::default();
        request
            .decode(&payload.encode_to_vec(), PayloadFormat::Protobuf)
            .unwrap();

        assert_eq!(request, payload);
    }

    #[test]
    fn test_decode_truncated_protobuf() {
        let data = [0x0a, 0x10, 0x12, 0x01, b'm'];

        let mut request = Request::default();
        let result = request.decode(&data, PayloadFormat::Protobuf);
        assert!(matches!(result, Err(DecodeErrorKind::Protobuf(_))));
    }
}
