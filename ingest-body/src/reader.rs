use std::io::{self, Read};
use std::time::{Duration, Instant};

use ingest_common::{Pool, Pooled};
use ingest_log::LogError;
use ingest_statsd::metric;

use crate::encoding::ContentEncoding;
use crate::inflate::{InflateReader, Inflater, InvalidStream};
use crate::statsd::{BodyCounters, BodyDistributions, BodyTimers};

/// An error returned by [`BodyReader::read`].
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The body is not a valid stream of the declared content encoding.
    #[error("cannot decompress {encoding} request body")]
    Decompression {
        /// The declared content encoding.
        encoding: ContentEncoding,
        /// The underlying error, carrying an [`InvalidStream`].
        #[source]
        source: io::Error,
    },
    /// The decompressed body is larger than the configured limit.
    #[error("request body exceeds the maximum size of {limit} bytes")]
    SizeExceeded {
        /// The configured limit in bytes.
        limit: usize,
    },
    /// Reading from the transport failed.
    #[error("cannot read request body after {:.3}s", elapsed.as_secs_f64())]
    Io {
        /// Time spent reading until the error occurred.
        elapsed: Duration,
        /// The transport error.
        #[source]
        source: io::Error,
    },
}

impl ReadError {
    fn from_io(source: io::Error, encoding: ContentEncoding, elapsed: Duration) -> Self {
        let corrupt = source
            .get_ref()
            .is_some_and(|inner| inner.is::<InvalidStream>());

        match corrupt {
            true => Self::Decompression { encoding, source },
            false => Self::Io { elapsed, source },
        }
    }
}

/// Reads request bodies into pooled buffers, up to a size limit.
///
/// The reader owns the pools for body buffers and decompression state. It is meant to be created
/// once and shared by all request handlers.
#[derive(Debug)]
pub struct BodyReader {
    limit: usize,
    buffers: Pool<Vec<u8>>,
    inflaters: Pool<Inflater>,
}

impl BodyReader {
    /// Creates a reader that accepts bodies of at most `limit` decompressed bytes.
    ///
    /// `pool_capacity` is the number of idle buffers and inflaters kept in the fast pool tier.
    pub fn new(limit: usize, pool_capacity: usize) -> Self {
        Self {
            limit,
            buffers: Pool::new("body_buffers", pool_capacity, Vec::new),
            inflaters: Pool::new("inflaters", pool_capacity, Inflater::new),
        }
    }

    /// Returns the maximum accepted body size in bytes.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reads and decompresses the full `body`.
    ///
    /// At most one byte more than the limit is decompressed before the read stops. The returned
    /// buffer goes back to the pool when dropped. `protocol` tags the metrics of this read.
    pub fn read<R: Read>(
        &self,
        body: R,
        encoding: ContentEncoding,
        protocol: &'static str,
    ) -> Result<Pooled<'_, Vec<u8>>, ReadError> {
        metric!(counter(BodyCounters::ReadCalls) += 1, protocol = protocol);

        let start = Instant::now();
        let result = self.read_limited(body, encoding, start);

        match &result {
            Ok(buf) => {
                metric!(
                    distribution(BodyDistributions::Size) = buf.len() as u64,
                    protocol = protocol,
                    encoding = encoding.name(),
                );
            }
            Err(error) => {
                metric!(counter(BodyCounters::ReadErrors) += 1, protocol = protocol);
                ingest_log::debug!(protocol, "{}", LogError(error));
            }
        }

        metric!(
            timer(BodyTimers::ReadDuration) = start.elapsed(),
            protocol = protocol
        );

        result
    }

    fn read_limited<R: Read>(
        &self,
        body: R,
        encoding: ContentEncoding,
        start: Instant,
    ) -> Result<Pooled<'_, Vec<u8>>, ReadError> {
        let mut buf = self.buffers.get();
        let cap = (self.limit as u64).saturating_add(1);

        let result = match encoding {
            ContentEncoding::Identity => body.take(cap).read_to_end(&mut buf),
            ContentEncoding::Gzip => {
                let mut inflater = self.inflaters.get();
                InflateReader::gzip(body, &mut inflater)
                    .take(cap)
                    .read_to_end(&mut buf)
            }
            ContentEncoding::Deflate => {
                let mut inflater = self.inflaters.get();
                InflateReader::zlib(body, &mut inflater)
                    .take(cap)
                    .read_to_end(&mut buf)
            }
        };

        if let Err(source) = result {
            return Err(ReadError::from_io(source, encoding, start.elapsed()));
        }

        if buf.len() > self.limit {
            return Err(ReadError::SizeExceeded { limit: self.limit });
        }

        Ok(buf)
    }
}
