use std::io::Read;

use ingest_body::{BodyReader, ContentEncoding, ReadError};
use ingest_common::Pool;
use ingest_config::Config;
use ingest_datadog::{DecodeError, PayloadFormat, Protocol, RequestPools, Sample, Sanitizer};
use ingest_log::LogError;
use ingest_ourlogs::{Line, ParseError, ParserContext};
use ingest_statsd::metric;

use crate::statsd::LogCounters;

/// Name of the field holding the log message.
pub const MESSAGE_FIELD: &str = "_msg";

/// Protocol name of the JSON lines log endpoint, used to tag metrics.
const JSON_LINES: &str = "jsonline";

/// An error returned when a request cannot be ingested.
///
/// No data from a failed request should be considered accepted.
#[derive(Debug, thiserror::Error)]
pub enum InsertError<E> {
    /// The request body could not be read.
    #[error("failed to read request body")]
    Read(#[from] ReadError),
    /// The request body is not a valid payload for the protocol.
    #[error("failed to decode request body")]
    Decode(#[from] DecodeError),
    /// A log line is invalid.
    #[error("failed to parse log line {line}")]
    Parse {
        /// The 1-based line number within the body.
        line: usize,
        /// The parsing error.
        #[source]
        source: ParseError,
    },
    /// The callback consuming the data returned an error.
    #[error("failed to store ingested data")]
    Callback(#[source] E),
}

/// Decodes ingestion requests using pooled buffers.
#[derive(Debug)]
pub struct Ingest {
    reader: BodyReader,
    requests: RequestPools,
    contexts: Pool<ParserContext>,
    sanitizer: Sanitizer,
    message_field: Option<String>,
}

impl Ingest {
    /// Creates a new instance with pools sized according to the configuration.
    pub fn new(config: &Config) -> Self {
        let capacity = config.pool_capacity();

        Self {
            reader: BodyReader::new(config.max_request_size().as_usize(), capacity),
            requests: RequestPools::new(capacity),
            contexts: Pool::new("log_contexts", capacity, ParserContext::new),
            sanitizer: Sanitizer::new(config.sanitize_metric_names()),
            message_field: config.log_message_field().map(str::to_owned),
        }
    }

    /// Reads a DataDog request and passes all samples to `on_sample`.
    ///
    /// `encoding` and `format` are derived from the `Content-Encoding` and `Content-Type` headers
    /// of the request. Returns the number of samples. Errors from the callback stop ingestion and
    /// are returned as [`InsertError::Callback`].
    pub fn insert_datadog<R, F, E>(
        &self,
        protocol: Protocol,
        body: R,
        encoding: ContentEncoding,
        format: PayloadFormat,
        on_sample: F,
    ) -> Result<usize, InsertError<E>>
    where
        R: Read,
        F: FnMut(Sample<'_>) -> Result<(), E>,
    {
        let body = self.reader.read(body, encoding, protocol.name())?;

        let mut request = self.requests.get(protocol);
        if let Err(error) = request.decode(&body, format) {
            ingest_log::debug!(protocol = protocol.name(), "{}", LogError(&error));
            return Err(error.into());
        }

        request
            .extract(&self.sanitizer, on_sample)
            .map_err(InsertError::Callback)
    }

    /// Reads a body of newline delimited JSON objects and passes each parsed line to `on_line`.
    ///
    /// Blank lines are skipped. If a message field is configured, it is renamed to
    /// [`MESSAGE_FIELD`] in every line. Returns the number of lines. All lines are validated
    /// before the first call to `on_line`, so an invalid line rejects the entire body.
    pub fn insert_json_lines<R, F, E>(
        &self,
        body: R,
        encoding: ContentEncoding,
        on_line: F,
    ) -> Result<usize, InsertError<E>>
    where
        R: Read,
        F: FnMut(&ParserContext) -> Result<(), E>,
    {
        let body = self.reader.read(body, encoding, JSON_LINES)?;
        let mut context = self.contexts.get();

        if let Err(error) = validate_lines(&body, &mut context) {
            if let InsertError::Parse { line, source } = &error {
                metric!(counter(LogCounters::ParseErrors) += 1);
                ingest_log::debug!(line, "{}", LogError(source));
            }
            return Err(error);
        }

        let mut count = 0;
        let result = self.emit_lines(&body, &mut context, &mut count, on_line);
        metric!(counter(LogCounters::LinesParsed) += count as i64);

        result.map(|()| count)
    }

    fn emit_lines<F, E>(
        &self,
        body: &[u8],
        context: &mut ParserContext,
        count: &mut usize,
        mut on_line: F,
    ) -> Result<(), InsertError<E>>
    where
        F: FnMut(&ParserContext) -> Result<(), E>,
    {
        for line in ingest_ourlogs::lines(body) {
            parse_line(context, line)?;

            if let Some(field) = &self.message_field {
                context.rename_field(field, MESSAGE_FIELD);
            }

            on_line(context).map_err(InsertError::Callback)?;
            *count += 1;
        }

        Ok(())
    }
}

fn parse_line<E>(context: &mut ParserContext, line: Line<'_>) -> Result<(), InsertError<E>> {
    context
        .parse(line.data)
        .map_err(|source| InsertError::Parse {
            line: line.number,
            source,
        })
}

fn validate_lines<E>(body: &[u8], context: &mut ParserContext) -> Result<(), InsertError<E>> {
    for line in ingest_ourlogs::lines(body) {
        parse_line(context, line)?;
    }

    Ok(())
}
