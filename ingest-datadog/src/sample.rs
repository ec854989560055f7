use std::borrow::Cow;
use std::fmt;

use smallvec::SmallVec;

use crate::sanitize::{Sanitizer, split_tag};

/// Name of the label holding the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A label attached to a [`Sample`].
///
/// Names and values borrow from the decoded request wherever possible.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Label<'a> {
    /// The label name.
    pub name: Cow<'a, str>,
    /// The label value.
    pub value: Cow<'a, str>,
}

impl<'a> Label<'a> {
    /// Creates a new label.
    pub fn new(name: impl Into<Cow<'a, str>>, value: impl Into<Cow<'a, str>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates the `__name__` label for a metric.
    pub fn metric_name(value: impl Into<Cow<'a, str>>) -> Self {
        Self::new(METRIC_NAME_LABEL, value)
    }

    /// Converts this label into an owned label that no longer borrows from the request.
    pub fn into_owned(self) -> Label<'static> {
        Label {
            name: Cow::Owned(self.name.into_owned()),
            value: Cow::Owned(self.value.into_owned()),
        }
    }
}

/// A single timestamped measurement extracted from a request.
///
/// Samples are passed to the extraction callback by value, but borrow their labels from storage
/// that is reused for the next sample. Consumers that need to keep the labels must copy them,
/// for instance with [`Label::into_owned`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample<'a> {
    /// Labels of the sample. The first label is always `__name__`.
    pub labels: &'a [Label<'a>],
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    /// The measured value.
    pub value: f64,
}

impl Sample<'_> {
    /// Returns the metric name from the `__name__` label.
    pub fn name(&self) -> &str {
        self.labels
            .iter()
            .find(|label| label.name == METRIC_NAME_LABEL)
            .map_or("", |label| &label.value)
    }
}

/// Formats the sample in a notation similar to the Prometheus text format, including all labels.
impl fmt::Display for Sample<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, label) in self.labels.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        write!(f, "}} {} {}", self.value, self.timestamp)
    }
}

/// Scratch space for the labels of one series.
pub(crate) type Labels<'a> = SmallVec<[Label<'a>; 8]>;

/// Appends labels for DataDog tags.
///
/// A `host` tag is renamed to `exported_host`, so that it does not collide with the host label
/// of the series itself.
pub(crate) fn push_tags<'a>(labels: &mut Labels<'a>, tags: &'a [String], sanitizer: &Sanitizer) {
    for tag in tags {
        let (name, value) = split_tag(tag);
        let name = match name {
            "host" => "exported_host",
            name => name,
        };
        labels.push(Label::new(sanitizer.apply(name), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_tags() {
        let tags = [
            "env:prod".to_owned(),
            "host:web-1".to_owned(),
            "canary".to_owned(),
            "bad!key:v!alue".to_owned(),
        ];

        let mut labels = Labels::new();
        push_tags(&mut labels, &tags, &Sanitizer::default());

        assert_eq!(
            labels.as_slice(),
            [
                Label::new("env", "prod"),
                Label::new("exported_host", "web-1"),
                Label::new("canary", "no_label_value"),
                Label::new("bad_key", "v!alue"),
            ]
        );
    }

    #[test]
    fn test_display() {
        let labels = [Label::metric_name("cpu"), Label::new("host", "a\"b")];
        let sample = Sample {
            labels: &labels,
            timestamp: 1_500,
            value: 2.5,
        };

        assert_eq!(sample.name(), "cpu");
        insta::assert_snapshot!(sample, @r#"{__name__="cpu",host="a\"b"} 2.5 1500"#);
    }
}
