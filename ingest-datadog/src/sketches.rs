//! The `/api/beta/sketches` protobuf protocol.
//!
//! Sketches summarize a distribution of values. Each point is converted into five samples, one
//! per aggregate, named after the metric with a `_max`, `_min`, `_cnt`, `_avg` or `_sum` suffix.
//! The bins of the sketch are not decoded.

use std::borrow::Cow;

use ingest_common::Reset;
use prost::Message;

use crate::sample::{Label, Labels, Sample, push_tags};
use crate::sanitize::Sanitizer;

/// Suffixes of the samples derived from every sketch point, in emission order.
const STATS: [&str; 5] = ["max", "min", "cnt", "avg", "sum"];

/// A decoded sketch request, corresponding to the `SketchPayload` message.
#[derive(Clone, PartialEq, Message)]
pub struct SketchPayload {
    /// All sketches in the request.
    #[prost(message, repeated, tag = "1")]
    pub sketches: Vec<Sketch>,
}

/// The sketches of one metric.
#[derive(Clone, PartialEq, Message)]
pub struct Sketch {
    /// The metric name.
    #[prost(string, tag = "1")]
    pub metric: String,
    /// The host that submitted the sketch.
    #[prost(string, tag = "2")]
    pub host: String,
    /// Points in the legacy distribution format.
    #[prost(message, repeated, tag = "3")]
    pub distributions: Vec<Distribution>,
    /// Tags in `name:value` format.
    #[prost(string, repeated, tag = "4")]
    pub tags: Vec<String>,
    /// Points in the DDSketch format.
    #[prost(message, repeated, tag = "7")]
    pub dogsketches: Vec<Dogsketch>,
}

/// A DDSketch point.
#[derive(Clone, PartialEq, Message)]
pub struct Dogsketch {
    /// Unix timestamp in seconds.
    #[prost(int64, tag = "1")]
    pub ts: i64,
    /// Number of values in the sketch.
    #[prost(int64, tag = "2")]
    pub cnt: i64,
    /// Smallest value.
    #[prost(double, tag = "3")]
    pub min: f64,
    /// Largest value.
    #[prost(double, tag = "4")]
    pub max: f64,
    /// Average of all values.
    #[prost(double, tag = "5")]
    pub avg: f64,
    /// Sum of all values.
    #[prost(double, tag = "6")]
    pub sum: f64,
}

/// A point in the legacy distribution format.
#[derive(Clone, PartialEq, Message)]
pub struct Distribution {
    /// Unix timestamp in seconds.
    #[prost(int64, tag = "1")]
    pub ts: i64,
    /// Number of values in the sketch.
    #[prost(int64, tag = "2")]
    pub cnt: i64,
    /// Smallest value.
    #[prost(double, tag = "3")]
    pub min: f64,
    /// Largest value.
    #[prost(double, tag = "4")]
    pub max: f64,
    /// Average of all values.
    #[prost(double, tag = "5")]
    pub avg: f64,
    /// Sum of all values.
    #[prost(double, tag = "6")]
    pub sum: f64,
}

/// Aggregates of one sketch point in the order of [`STATS`].
type Stats = (i64, [f64; 5]);

impl Dogsketch {
    fn stats(&self) -> Stats {
        let Self {
            ts,
            cnt,
            min,
            max,
            avg,
            sum,
        } = *self;
        (ts, [max, min, cnt as f64, avg, sum])
    }
}

impl Distribution {
    fn stats(&self) -> Stats {
        let Self {
            ts,
            cnt,
            min,
            max,
            avg,
            sum,
        } = *self;
        (ts, [max, min, cnt as f64, avg, sum])
    }
}

impl SketchPayload {
    /// Decodes a protobuf body into this request, replacing its previous contents.
    pub fn decode(&mut self, data: &[u8]) -> Result<(), prost::DecodeError> {
        self.sketches.clear();
        self.merge(data)
    }

    /// Calls `on_sample` for every aggregate of every sketch point and returns the number of
    /// samples.
    ///
    /// For each sketch, all points of the first aggregate are emitted before the next aggregate,
    /// starting with DDSketch points followed by distribution points. Extraction stops at the
    /// first error returned by the callback.
    pub fn extract<F, E>(&self, sanitizer: &Sanitizer, mut on_sample: F) -> Result<usize, E>
    where
        F: FnMut(Sample<'_>) -> Result<(), E>,
    {
        let mut series: [Vec<(i64, f64)>; 5] = Default::default();
        let mut labels = Labels::new();
        let mut count = 0;

        for sketch in &self.sketches {
            for points in &mut series {
                points.clear();
            }

            let dogsketches = sketch.dogsketches.iter().map(Dogsketch::stats);
            let distributions = sketch.distributions.iter().map(Distribution::stats);
            for (ts, values) in dogsketches.chain(distributions) {
                let timestamp = ts.saturating_mul(1000);
                for (points, value) in series.iter_mut().zip(values) {
                    points.push((timestamp, value));
                }
            }

            if series[0].is_empty() {
                continue;
            }

            let name = sanitizer.apply(&sketch.metric);
            labels.clear();
            labels.push(Label::metric_name(""));
            if !sketch.host.is_empty() {
                labels.push(Label::new("host", sketch.host.as_str()));
            }
            push_tags(&mut labels, &sketch.tags, sanitizer);

            for (stat, points) in STATS.iter().zip(&series) {
                labels[0].value = Cow::Owned(format!("{name}_{stat}"));

                for &(timestamp, value) in points {
                    on_sample(Sample {
                        labels: &labels,
                        timestamp,
                        value,
                    })?;
                    count += 1;
                }
            }
        }

        Ok(count)
    }
}

impl Reset for SketchPayload {
    fn reset(&mut self) {
        self.sketches.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn extract(payload: &SketchPayload) -> Vec<String> {
        let mut request = SketchPayload::default();
        request.decode(&payload.encode_to_vec()).unwrap();

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
    fn test_extract() {
        let payload = SketchPayload {
            sketches: vec![Sketch {
                metric: "request.latency".into(),
                host: "web-1".into(),
                distributions: vec![Distribution {
                    ts: 20,
                    cnt: 1,
                    min: 7.0,
                    max: 7.0,
                    avg: 7.0,
                    sum: 7.0,
                }],
                tags: vec!["env:prod".into(), "host:lb".into()],
                dogsketches: vec![Dogsketch {
                    ts: 10,
                    cnt: 4,
                    min: 1.0,
                    max: 5.0,
                    avg: 2.5,
                    sum: 10.0,
                }],
            }],
        };

        insta::assert_debug_snapshot!(extract(&payload), @r#"
        [
            "{__name__=\"request.latency_max\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 5 10000",
            "{__name__=\"request.latency_max\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 7 20000",
            "{__name__=\"request.latency_min\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 1 10000",
            "{__name__=\"request.latency_min\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 7 20000",
            "{__name__=\"request.latency_cnt\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 4 10000",
            "{__name__=\"request.latency_cnt\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 1 20000",
            "{__name__=\"request.latency_avg\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 2.5 10000",
            "{__name__=\"request.latency_avg\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 7 20000",
            "{__name__=\"request.latency_sum\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 10 10000",
            "{__name__=\"request.latency_sum\",host=\"web-1\",env=\"prod\",exported_host=\"lb\"} 7 20000",
        ]
        "#);
    }

    #[test]
    fn test_extract_without_host() {
        let payload = SketchPayload {
            sketches: vec![Sketch {
                metric: "m".into(),
                dogsketches: vec![Dogsketch {
                    ts: 1,
                    cnt: 1,
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let samples = extract(&payload);
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[2], r#"{__name__="m_cnt"} 1 1000"#);
    }

    #[test]
    fn test_extract_skips_empty_sketches() {
        let payload = SketchPayload {
            sketches: vec![Sketch {
                metric: "m".into(),
                ..Default::default()
            }],
        };

        assert!(extract(&payload).is_empty());
    }

    #[test]
    fn test_decode_empty() {
        let mut request = SketchPayload::default();
        request.decode(b"").unwrap();
        assert!(request.sketches.is_empty());
    }

    #[test]
    fn test_decode_invalid() {
        let mut request = SketchPayload::default();
        assert!(request.decode(b"foobar").is_err());
        assert!(request.decode(&[0x0a, 0x10, 0x12]).is_err());
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        // sketch { metric: "m", bins field 9: "xy" } followed by metadata (field 2)
        let data = [
            0x0a, 0x07, 0x0a, 0x01, b'm', 0x4a, 0x02, b'x', b'y', 0x12, 0x00,
        ];

        let mut request = SketchPayload::default();
        request.decode(&data).unwrap();
        assert_eq!(request.sketches.len(), 1);
        assert_eq!(request.sketches[0].metric, "m");
    }
}
