use ingest_statsd::CounterMetric;

/// Counter metrics for the JSON lines log endpoint.
pub enum LogCounters {
    /// Number of log lines that were parsed and passed on.
    LinesParsed,
    /// Incremented for every request rejected because of an invalid log line.
    ParseErrors,
}

impl CounterMetric for LogCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::LinesParsed => "logs.lines.parsed",
            Self::ParseErrors => "logs.parse.errors",
        }
    }
}
