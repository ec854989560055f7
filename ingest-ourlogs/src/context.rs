use std::fmt::{self, Write};
use std::ops::Range;

use ingest_common::Reset;
use serde::de::value::SeqAccessDeserializer;
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// The type of a JSON value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JsonKind {
    /// `{...}`
    Object,
    /// `[...]`
    Array,
    /// A string.
    String,
    /// A number.
    Number,
    /// `true` or `false`.
    Bool,
    /// `null`.
    Null,
}

impl JsonKind {
    /// Guesses the kind of a JSON document from its first non-whitespace byte.
    fn sniff(data: &[u8]) -> Option<Self> {
        let first = data.iter().find(|b| !b.is_ascii_whitespace())?;

        Some(match first {
            b'{' => Self::Object,
            b'[' => Self::Array,
            b'"' => Self::String,
            b'-' | b'0'..=b'9' => Self::Number,
            b't' | b'f' => Self::Bool,
            b'n' => Self::Null,
            _ => return None,
        })
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Null => "null",
        })
    }
}

/// An error returned by [`ParserContext::parse`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The line is valid JSON, but not an object.
    #[error("log line must be a JSON object, got {0}")]
    NotAnObject(JsonKind),
    /// The line is not valid JSON.
    #[error("invalid JSON in log line")]
    Json(#[from] serde_json::Error),
}

/// A field of a parsed log line.
///
/// Both name and value borrow from the [`ParserContext`] that produced them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LogField<'a> {
    /// The field name. Keys of nested objects are joined with `.`.
    pub name: &'a str,
    /// The field value as text.
    pub value: &'a str,
}

impl fmt::Display for LogField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

#[derive(Clone, Debug)]
struct FieldRange {
    name: Range<usize>,
    value: Range<usize>,
}

/// Reusable state for parsing JSON log lines.
///
/// Names and values of all fields are stored in a single scratch buffer, which keeps its
/// allocation across lines. Put contexts into a [`Pool`](ingest_common::Pool) to reuse them
/// across requests.
#[derive(Clone, Debug, Default)]
pub struct ParserContext {
    buf: String,
    prefix: String,
    fields: Vec<FieldRange>,
}

impl ParserContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object into a flat list of fields, replacing the previous fields.
    ///
    /// Nested objects are flattened into dotted names, `null` values are skipped, arrays are
    /// stored as compact JSON and numbers and booleans in their textual form. Strings are stored
    /// unescaped.
    ///
    /// On error, the context is left empty.
    pub fn parse(&mut self, line: &[u8]) -> Result<(), ParseError> {
        self.reset();

        let result = self.parse_object(line);
        if result.is_err() {
            self.reset();
        }

        result
    }

    fn parse_object(&mut self, line: &[u8]) -> Result<(), ParseError> {
        match JsonKind::sniff(line) {
            Some(JsonKind::Object) | None => (),
            Some(kind) => {
                serde_json::from_slice::<IgnoredAny>(line)?;
                return Err(ParseError::NotAnObject(kind));
            }
        }

        let mut deserializer = serde_json::Deserializer::from_slice(line);
        (&mut deserializer).deserialize_map(ObjectVisitor {
            context: self,
            nested: false,
        })?;
        deserializer.end()?;

        Ok(())
    }

    /// Returns the fields of the last parsed line in document order.
    pub fn fields(&self) -> impl ExactSizeIterator<Item = LogField<'_>> + '_ {
        self.fields.iter().map(|range| LogField {
            name: &self.buf[range.name.clone()],
            value: &self.buf[range.value.clone()],
        })
    }

    /// Returns the value of the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields()
            .find(|field| field.name == name)
            .map(|field| field.value)
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renames the first field called `old` to `new`.
    ///
    /// Does nothing if `old` is empty or there is no such field.
    pub fn rename_field(&mut self, old: &str, new: &str) {
        if old.is_empty() {
            return;
        }

        let buf = &self.buf;
        let Some(field) = self
            .fields
            .iter_mut()
            .find(|range| buf[range.name.clone()] == *old)
        else {
            return;
        };

        let start = self.buf.len();
        self.buf.push_str(new);
        field.name = start..self.buf.len();
    }

    /// Adds a field whose value is written by `write_value`, named after the current prefix.
    fn push_field(&mut self, write_value: impl FnOnce(&mut String)) {
        let name_start = self.buf.len();
        self.buf.push_str(&self.prefix);
        let value_start = self.buf.len();
        write_value(&mut self.buf);

        self.fields.push(FieldRange {
            name: name_start..value_start,
            value: value_start..self.buf.len(),
        });
    }

    fn push_display(&mut self, value: impl fmt::Display) {
        // Writing into a `String` does not fail.
        self.push_field(|buf| write!(buf, "{value}").unwrap_or_default());
    }
}

impl Reset for ParserContext {
    fn reset(&mut self) {
        self.buf.clear();
        self.prefix.clear();
        self.fields.clear();
    }
}

/// Visits the entries of an object and flattens them into the context.
///
/// Keys of nested objects are joined to the key of their parent with a `.`, even if the parent
/// key is empty.
struct ObjectVisitor<'a> {
    context: &'a mut ParserContext,
    nested: bool,
}

impl<'de> Visitor<'de> for ObjectVisitor<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let context = self.context;

        loop {
            let base = context.prefix.len();
            let key = KeySeed {
                prefix: &mut context.prefix,
                nested: self.nested,
            };
            if map.next_key_seed(key)?.is_none() {
                break;
            }

            map.next_value_seed(ValueSeed(&mut *context))?;
            context.prefix.truncate(base);
        }

        Ok(())
    }
}

/// Appends an object key to the prefix.
struct KeySeed<'a> {
    prefix: &'a mut String,
    nested: bool,
}

impl<'de> DeserializeSeed<'de> for KeySeed<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(self)
    }
}

impl<'de> Visitor<'de> for KeySeed<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an object key")
    }

    fn visit_str<E>(self, key: &str) -> Result<(), E>
    where
        E: de::Error,
    {
        if self.nested {
            self.prefix.push('.');
        }
        self.prefix.push_str(key);
        Ok(())
    }
}

/// Stores a value under the current prefix.
struct ValueSeed<'a>(&'a mut ParserContext);

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ValueSeed<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON value")
    }

    fn visit_unit<E>(self) -> Result<(), E>
    where
        E: de::Error,
    {
        Ok(())
    }

    fn visit_bool<E>(self, value: bool) -> Result<(), E>
    where
        E: de::Error,
    {
        self.0.push_field(|buf| buf.push_str(if value { "true" } else { "false" }));
        Ok(())
    }

    fn visit_i64<E>(self, value: i64) -> Result<(), E>
    where
        E: de::Error,
    {
        self.0.push_display(value);
        Ok(())
    }

    fn visit_u64<E>(self, value: u64) -> Result<(), E>
    where
        E: de::Error,
    {
        self.0.push_display(value);
        Ok(())
    }

    fn visit_f64<E>(self, value: f64) -> Result<(), E>
    where
        E: de::Error,
    {
        self.0.push_display(value);
        Ok(())
    }

    fn visit_str<E>(self, value: &str) -> Result<(), E>
    where
        E: de::Error,
    {
        self.0.push_field(|buf| buf.push_str(value));
        Ok(())
    }

    fn visit_map<A>(self, map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let visitor = ObjectVisitor {
            context: self.0,
            nested: true,
        };
        visitor.visit_map(map)
    }

    fn visit_seq<A>(self, seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let value = serde_json::Value::deserialize(SeqAccessDeserializer::new(seq))?;
        self.0.push_display(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Vec<String> {
        let mut context = ParserContext::new();
        context.parse(line.as_bytes()).unwrap();
        context.fields().map(|field| field.to_string()).collect()
    }

    #[test]
    fn test_nested_object() {
        assert_eq!(parse(r#"{"foo":{"bar":"baz"}}"#), ["foo.bar=baz"]);
    }

    #[test]
    fn test_empty_keys_keep_separator() {
        assert_eq!(
            parse(r#"{"":{"a":1},"a":2,"b":{"":{"":3}}}"#),
            [".a=1", "a=2", "b..=3"]
        );
    }

    #[test]
    fn test_null_is_skipped() {
        assert!(parse(r#"{"a":null}"#).is_empty());
    }

    #[test]
    fn test_scalars_and_arrays() {
        assert_eq!(
            parse(r#"{"a":[1,2],"b":true}"#),
            ["a=[1,2]", "b=true"]
        );
    }

    #[test]
    fn test_flatten() {
        let fields = parse(
            r#"{
                "_msg": "line\twith \"escapes\"",
                "level": "warn",
                "count": -3,
                "ratio": 0.25,
                "big": 18446744073709551615,
                "ok": false,
                "http": {"request": {"method": "GET", "headers": {}}, "status": 404},
                "after": {"x": null, "y": [{"z": 1}, null, "s"]},
                "last": ""
            }"#,
        );

        insta::assert_debug_snapshot!(fields, @r#"
        [
            "_msg=line\twith \"escapes\"",
            "level=warn",
            "count=-3",
            "ratio=0.25",
            "big=18446744073709551615",
            "ok=false",
            "http.request.method=GET",
            "http.status=404",
            "after.y=[{\"z\":1},null,\"s\"]",
            "last=",
        ]
        "#);
    }

    #[test]
    fn test_not_an_object() {
        let cases = [
            ("[1,2]", JsonKind::Array),
            (r#""text""#, JsonKind::String),
            (" 42", JsonKind::Number),
            ("true", JsonKind::Bool),
            ("null", JsonKind::Null),
        ];

        let mut context = ParserContext::new();
        for (line, kind) in cases {
            match context.parse(line.as_bytes()) {
                Err(ParseError::NotAnObject(actual)) => assert_eq!(actual, kind),
                other => panic!("unexpected result for {line}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_json() {
        let mut context = ParserContext::new();

        for line in ["", "{", r#"{"a":1"#, "[1,", "nope", r#"{"a":1} x"#] {
            assert!(
                matches!(context.parse(line.as_bytes()), Err(ParseError::Json(_))),
                "line: {line:?}"
            );
        }
    }

    #[test]
    fn test_error_message() {
        let mut context = ParserContext::new();
        let error = context.parse(b"[]").unwrap_err();

        insta::assert_snapshot!(error, @"log line must be a JSON object, got array");
    }

    #[test]
    fn test_error_leaves_context_empty() {
        let mut context = ParserContext::new();
        context.parse(br#"{"a":"b"}"#).unwrap();

        assert!(context.parse(br#"{"c":"d","e":"#).is_err());
        assert!(context.is_empty());
    }

    #[test]
    fn test_parse_replaces_fields() {
        let mut context = ParserContext::new();
        context.parse(br#"{"a":"1","b":"2"}"#).unwrap();
        context.parse(br#"{"c":"3"}"#).unwrap();

        assert_eq!(context.len(), 1);
        assert_eq!(context.get("c"), Some("3"));
        assert_eq!(context.get("a"), None);
    }

    #[test]
    fn test_rename_field() {
        let mut context = ParserContext::new();
        context
            .parse(br#"{"message":"hello","nested":{"message":"x"}}"#)
            .unwrap();

        context.rename_field("message", "_msg");
        context.rename_field("", "ignored");
        context.rename_field("missing", "ignored");

        let fields: Vec<_> = context.fields().map(|f| f.to_string()).collect();
        assert_eq!(fields, ["_msg=hello", "nested.message=x"]);
    }

    #[test]
    fn test_rename_first_match_only() {
        let mut context = ParserContext::new();
        context.parse(br#"{"a":"1","a":"2"}"#).unwrap();
        context.rename_field("a", "b");

        let fields: Vec<_> = context.fields().map(|f| f.to_string()).collect();
        assert_eq!(fields, ["b=1", "a=2"]);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut context = ParserContext::new();
        context.parse(br#"{"a":{"b":"some value"}}"#).unwrap();
        let capacity = context.buf.capacity();

        context.reset();
        assert!(context.is_empty());
        assert!(context.buf.is_empty());
        assert!(context.prefix.is_empty());
        assert_eq!(context.buf.capacity(), capacity);
    }
}
