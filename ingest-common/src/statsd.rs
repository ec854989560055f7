use ingest_statsd::CounterMetric;

/// Counter metrics for object pools.
pub enum PoolCounters {
    /// Incremented every time an object is checked out of a pool.
    ///
    /// This metric is tagged with:
    ///  - `pool`: The name of the pool.
    ///  - `tier`: `fast` or `overflow` for reused objects, `new` when a fresh object was created.
    Acquire,
}

impl CounterMetric for PoolCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::Acquire => "pool.acquire",
        }
    }
}
