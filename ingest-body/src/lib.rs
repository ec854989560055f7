//! Bounded reading of request bodies with transparent decompression.
//!
//! The [`BodyReader`] reads a request body into a pooled buffer. Bodies compressed with `gzip` or
//! `deflate` are decompressed while reading, and the size limit applies to the decompressed data.
//!
//! ```
//! use ingest_body::{BodyReader, ContentEncoding};
//!
//! let reader = BodyReader::new(1024, 4);
//! let body = reader.read(&b"{}"[..], ContentEncoding::Identity, "example").unwrap();
//! assert_eq!(&body[..], b"{}");
//! ```
#![warn(missing_docs)]

mod encoding;
mod inflate;
mod reader;
mod statsd;

pub use self::encoding::*;
pub use self::inflate::*;
pub use self::reader::*;
