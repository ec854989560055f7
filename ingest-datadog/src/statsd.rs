use ingest_statsd::CounterMetric;

/// Counter metrics for the DataDog decoders.
pub enum DatadogCounters {
    /// Number of samples extracted from requests.
    ///
    /// This metric is tagged with:
    ///  - `protocol`: `datadog_v1`, `datadog_v2` or `datadog_sketches`.
    RowsRead,
    /// Incremented every time a request body cannot be decoded.
    ///
    /// This metric is tagged with:
    ///  - `protocol`: `datadog_v1`, `datadog_v2` or `datadog_sketches`.
    UnmarshalErrors,
}

impl CounterMetric for DatadogCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::RowsRead => "datadog.rows.read",
            Self::UnmarshalErrors => "datadog.unmarshal.errors",
        }
    }
}
