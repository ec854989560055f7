use ingest_statsd::{CounterMetric, DistributionMetric, TimerMetric};

/// Counter metrics for reading request bodies.
pub enum BodyCounters {
    /// Incremented for every request body that is read.
    ///
    /// This metric is tagged with:
    ///  - `protocol`: The ingestion protocol of the request.
    ReadCalls,
    /// Incremented when reading a request body fails for any reason.
    ///
    /// This metric is tagged with:
    ///  - `protocol`: The ingestion protocol of the request.
    ReadErrors,
}

impl CounterMetric for BodyCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::ReadCalls => "body.read.calls",
            Self::ReadErrors => "body.read.errors",
        }
    }
}

/// Distribution metrics for reading request bodies.
pub enum BodyDistributions {
    /// The size of a request body after decompression, in bytes.
    ///
    /// This metric is tagged with:
    ///  - `protocol`: The ingestion protocol of the request.
    ///  - `encoding`: The content encoding of the request body.
    Size,
}

impl DistributionMetric for BodyDistributions {
    fn name(&self) -> &'static str {
        match self {
            Self::Size => "body.read.size",
        }
    }
}

/// Timer metrics for reading request bodies.
pub enum BodyTimers {
    /// Time spent reading and decompressing a request body.
    ///
    /// This metric is tagged with:
    ///  - `protocol`: The ingestion protocol of the request.
    ReadDuration,
}

impl TimerMetric for BodyTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::ReadDuration => "body.read.duration",
        }
    }
}
