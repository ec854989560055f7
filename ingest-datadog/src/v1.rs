//! The `/api/v1/series` JSON protocol.
//!
//! ```json
//! {
//!   "series": [
//!     {
//!       "metric": "system.load.1",
//!       "host": "web-1",
//!       "device": "sda1",
//!       "points": [[1575317847, 0.5]],
//!       "tags": ["environment:test"]
//!     }
//!   ]
//! }
//! ```
//!
//! Timestamps are given in seconds. Points with a timestamp of zero or less are recorded at the
//! time of extraction.

use ingest_common::{Reset, UnixTimestamp};
use serde::Deserialize;

use crate::json::{decode_series, nullable};
use crate::sample::{Label, Labels, Sample, push_tags};
use crate::sanitize::Sanitizer;

/// A decoded v1 request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    /// All series in the request.
    pub series: Vec<Series>,
}

/// A single v1 series.
///
/// The `interval` and `type` fields sent by the agent are ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Series {
    /// The metric name.
    #[serde(default, deserialize_with = "nullable")]
    pub metric: String,
    /// The host that submitted the series.
    #[serde(default, deserialize_with = "nullable")]
    pub host: String,
    /// The device the series relates to.
    ///
    /// Not part of the documented protocol, but sent by the agent for disk and network metrics.
    #[serde(default, deserialize_with = "nullable")]
    pub device: String,
    /// Data points of the series.
    #[serde(default, deserialize_with = "nullable")]
    pub points: Vec<Point>,
    /// Tags in `name:value` format.
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
}

/// A `[timestamp, value]` pair with the timestamp in seconds.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
pub struct Point(pub f64, pub f64);

impl Request {
    /// Decodes a JSON body into this request, replacing its previous contents.
    pub fn decode(&mut self, data: &[u8]) -> serde_json::Result<()> {
        self.series.clear();
        decode_series(data, &mut self.series)
    }

    /// Calls `on_sample` for every point in the request and returns the number of samples.
    ///
    /// Extraction stops at the first error returned by the callback.
    pub fn extract<F, E>(&self, sanitizer: &Sanitizer, mut on_sample: F) -> Result<usize, E>
    where
        F: FnMut(Sample<'_>) -> Result<(), E>,
    {
        let now = UnixTimestamp::now().as_millis();
        let mut labels = Labels::new();
        let mut count = 0;

        for series in &self.series {
            labels.clear();
            labels.push(Label::metric_name(sanitizer.apply(&series.metric)));
            if !series.host.is_empty() {
                labels.push(Label::new("host", series.host.as_str()));
            }
            if !series.device.is_empty() {
                labels.push(Label::new("device", series.device.as_str()));
            }
            push_tags(&mut labels, &series.tags, sanitizer);

            for &Point(timestamp, value) in &series.points {
                let timestamp = match timestamp {
                    t if t <= 0.0 => now,
                    t => (t * 1000.0) as i64,
                };

                on_sample(Sample {
                    labels: &labels,
                    timestamp,
                    value,
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
