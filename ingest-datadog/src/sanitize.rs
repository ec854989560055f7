use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Value of a label created from a tag without a `:` separator.
pub const NO_LABEL_VALUE: &str = "no_label_value";

static UNSUPPORTED_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9a-zA-Z_\.]+").unwrap());
static REPEATED_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__+").unwrap());
static UNDERSCORES_AROUND_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\._?|\._").unwrap());

/// Splits a DataDog tag into a label name and value.
///
/// The tag is split at the first `:`. Tags without a separator get the value
/// [`NO_LABEL_VALUE`].
///
/// ```
/// use ingest_datadog::split_tag;
///
/// assert_eq!(split_tag("env:prod"), ("env", "prod"));
/// assert_eq!(split_tag("url:http://x"), ("url", "http://x"));
/// assert_eq!(split_tag("canary"), ("canary", "no_label_value"));
/// ```
pub fn split_tag(tag: &str) -> (&str, &str) {
    tag.split_once(':').unwrap_or((tag, NO_LABEL_VALUE))
}

/// Rewrites a DataDog metric name or tag key into the `[0-9A-Za-z_.]` alphabet.
///
/// Runs of unsupported characters become a single `_`, and underscores directly next to a `.`
/// are removed. Names that are already valid are returned without allocating.
///
/// ```
/// use ingest_datadog::sanitize_name;
///
/// assert_eq!(sanitize_name("system.cpu.user"), "system.cpu.user");
/// assert_eq!(sanitize_name("requests!.total"), "requests.total");
/// assert_eq!(sanitize_name("http-request latency"), "http_request_latency");
/// ```
pub fn sanitize_name(name: &str) -> Cow<'_, str> {
    let name = replace(Cow::Borrowed(name), &UNSUPPORTED_CHARS, "_");
    let name = replace(name, &REPEATED_UNDERSCORES, "_");
    replace(name, &UNDERSCORES_AROUND_DOTS, ".")
}

fn replace<'a>(input: Cow<'a, str>, regex: &Regex, replacement: &str) -> Cow<'a, str> {
    match input {
        Cow::Borrowed(s) => regex.replace_all(s, replacement),
        Cow::Owned(s) if regex.is_match(&s) => {
            Cow::Owned(regex.replace_all(&s, replacement).into_owned())
        }
        owned => owned,
    }
}

/// Applies [`sanitize_name`] to metric names and tag keys, if enabled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Sanitizer {
    enabled: bool,
}

impl Sanitizer {
    /// Creates a sanitizer. A disabled sanitizer passes all names through unchanged.
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Returns `true` if names are rewritten.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sanitizes a metric name or tag key.
    pub fn apply<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self.enabled {
            true => sanitize_name(name),
            false => Cow::Borrowed(name),
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(true)
    }
}
