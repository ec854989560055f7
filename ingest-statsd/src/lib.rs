//! StatsD metrics for the ingestion layer, sent through cadence.
//!
//! Every crate declares its metrics as enums implementing one of [`CounterMetric`],
//! [`DistributionMetric`] or [`TimerMetric`], usually in a private `statsd` module, and records
//! them with the [`metric!`] macro:
//!
//! ```
//! use ingest_statsd::{metric, CounterMetric};
//!
//! enum RequestCounters {
//!     Rejected,
//! }
//!
//! impl CounterMetric for RequestCounters {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::Rejected => "requests.rejected",
//!         }
//!     }
//! }
//!
//! metric!(counter(RequestCounters::Rejected) += 1, protocol = "datadog_v1");
//! ```
//!
//! Until [`init`] has been called, recording a metric does nothing.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::{ToSocketAddrs, UdpSocket};
use std::ops::Deref;
use std::sync::Arc;

use cadence::{
    BufferedUdpMetricSink, Metric, MetricBuilder, MetricError, MetricSink, QueuingMetricSink,
    StatsdClient, UdpMetricSink,
};
use parking_lot::RwLock;

/// Number of metrics queued for the sender thread before new metrics are dropped.
const QUEUE_CAPACITY: usize = 100_000;

/// A sample rate between `0.0` (= 0%) and `1.0` (= 100%).
#[derive(Debug, Clone, Copy)]
pub struct SampleRate(f64);

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        match value.is_nan() {
            true => Self(0.0),
            false => Self(value.clamp(0.0, 1.0)),
        }
    }
}

/// Configuration for [`init`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix prepended to all metric names.
    pub prefix: &'a str,
    /// Address of the statsd server.
    pub host: A,
    /// Tags added to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Fraction of metrics that are sent.
    pub default_sample_rate: SampleRate,
    /// Packs several metrics into one datagram instead of sending each on its own.
    pub buffering: bool,
}

/// The installed statsd client along with its default tags and sample rate.
#[derive(Debug)]
pub struct MetricsClient {
    statsd: StatsdClient,
    default_tags: BTreeMap<String, String>,
    sample_rate: SampleRate,
}

impl MetricsClient {
    fn new(
        statsd: StatsdClient,
        default_tags: BTreeMap<String, String>,
        sample_rate: SampleRate,
    ) -> Self {
        Self {
            statsd,
            default_tags,
            sample_rate,
        }
    }

    /// Sends a metric built from this client, subject to the sample rate.
    #[doc(hidden)]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        let SampleRate(rate) = self.sample_rate;
        if !rand::random_bool(rate) {
            return;
        }

        for (key, value) in &self.default_tags {
            metric = metric.with_tag(key, value);
        }

        if rate < 1.0 {
            metric = metric.with_sampling_rate(rate);
        }

        if let Err(error) = metric.try_send() {
            ingest_log::error!(
                error = &error as &dyn std::error::Error,
                queue_capacity = QUEUE_CAPACITY,
                "failed to send metric",
            );
        }
    }
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd
    }
}

static GLOBAL_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    // Threads take a copy of the global client on first use to avoid the lock afterwards.
    static THREAD_CLIENT: RefCell<Option<Arc<MetricsClient>>> =
        RefCell::new(GLOBAL_CLIENT.read().clone());
}

#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

fn install(client: MetricsClient) {
    let client = Arc::new(client);
    *GLOBAL_CLIENT.write() = Some(Arc::clone(&client));
    THREAD_CLIENT.with(|cell| cell.replace(Some(client)));
}

fn queued<S>(prefix: &str, sink: S) -> StatsdClient
where
    S: MetricSink + Send + Sync + std::panic::RefUnwindSafe + 'static,
{
    StatsdClient::from_sink(prefix, QueuingMetricSink::with_capacity(sink, QUEUE_CAPACITY))
}

/// Starts reporting metrics to the configured statsd server.
///
/// Metrics are handed to a background thread through a bounded queue.
pub fn init<A: ToSocketAddrs>(config: MetricsClientConfig<'_, A>) -> Result<(), MetricError> {
    let addrs: Vec<_> = config.host.to_socket_addrs()?.collect();
    if let Some(addr) = addrs.first() {
        ingest_log::info!("reporting metrics to statsd at {addr}");
    }

    let SampleRate(rate) = config.default_sample_rate;
    if rate == 0.0 {
        ingest_log::warn!("metrics sample rate is 0, no metrics will be reported");
    }

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let statsd = match config.buffering {
        true => queued(config.prefix, BufferedUdpMetricSink::from(&addrs[..], socket)?),
        false => queued(config.prefix, UdpMetricSink::from(&addrs[..], socket)?),
    };

    install(MetricsClient::new(
        statsd,
        config.default_tags,
        config.default_sample_rate,
    ));

    Ok(())
}

/// Runs `f` with the client of the current thread, if metrics are enabled.
#[doc(hidden)]
#[inline(always)]
pub fn with_client<F>(f: F)
where
    F: FnOnce(&MetricsClient),
{
    THREAD_CLIENT.with(|cell| {
        if let Some(client) = cell.borrow().as_deref() {
            f(client);
        }
    })
}

#[cfg(any(test, feature = "test"))]
fn capture(sample_rate: f64, f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let client = MetricsClient::new(
        StatsdClient::from_sink("", sink),
        BTreeMap::new(),
        sample_rate.into(),
    );

    THREAD_CLIENT.with(|cell| {
        let previous = cell.replace(Some(Arc::new(client)));
        f();
        cell.replace(previous);
    });

    rx.try_iter()
        .map(|metric| String::from_utf8_lossy(&metric).into_owned())
        .collect()
}

/// Captures all metrics recorded on this thread while `f` runs, in statsd line format.
#[cfg(any(test, feature = "test"))]
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    capture(1.0, f)
}

/// A metric counting events, such as rejected requests or decoded rows.
pub trait CounterMetric {
    /// Returns the metric name.
    fn name(&self) -> &'static str;
}

/// A metric recording the distribution of a value, such as body sizes.
pub trait DistributionMetric {
    /// Returns the metric name.
    fn name(&self) -> &'static str;
}

/// A metric recording durations. Values are reported in milliseconds.
///
/// ```
/// use std::time::Instant;
///
/// use ingest_statsd::{metric, TimerMetric};
///
/// struct DecodeDuration;
///
/// impl TimerMetric for DecodeDuration {
///     fn name(&self) -> &'static str {
///         "decode.duration"
///     }
/// }
///
/// let start = Instant::now();
/// metric!(timer(DecodeDuration) = start.elapsed(), protocol = "datadog_v2");
/// ```
pub trait TimerMetric {
    /// Returns the metric name.
    fn name(&self) -> &'static str;
}

/// Records a metric with the client of the current thread.
///
/// Supported forms are `counter(M) += value`, `distribution(M) = value` and
/// `timer(M) = duration`, each followed by optional `key = value` tags. Counter increments of
/// zero are not sent.
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $k:ident = $v:expr)* $(,)?) => {{
        let value = $value;
        if value != 0 {
            $crate::with_client(|client| {
                use $crate::_pred::*;
                client.send_metric(
                    client.count_with_tags($crate::CounterMetric::name(&$id), value)
                        $(.with_tag(stringify!($k), $v))*
                )
            })
        }
    }};

    (distribution($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.distribution_with_tags($crate::DistributionMetric::name(&$id), $value)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    (timer($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            // cadence has no millisecond float conversion for durations
            let millis = $value.as_nanos() as f64 / 1e6;
            client.send_metric(
                client.distribution_with_tags($crate::TimerMetric::name(&$id), millis)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };
}
