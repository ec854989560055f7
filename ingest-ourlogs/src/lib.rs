//! Flattening of JSON log lines into a list of fields.
//!
//! Each log line is a JSON object. A [`ParserContext`] parses one line at a time into a flat list
//! of [`LogField`]s, joining the keys of nested objects with a `.`:
//!
//! ```
//! use ingest_ourlogs::ParserContext;
//!
//! let mut context = ParserContext::new();
//! context
//!     .parse(br#"{"level":"info","http":{"status":200,"path":"/"},"tags":["a","b"]}"#)
//!     .unwrap();
//!
//! let fields: Vec<_> = context.fields().map(|f| (f.name, f.value)).collect();
//! assert_eq!(
//!     fields,
//!     [
//!         ("level", "info"),
//!         ("http.status", "200"),
//!         ("http.path", "/"),
//!         ("tags", r#"["a","b"]"#),
//!     ]
//! );
//! ```
#![warn(missing_docs)]

mod context;
mod lines;

pub use self::context::*;
pub use self::lines::*;
