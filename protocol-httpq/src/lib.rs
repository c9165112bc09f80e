//! Sans-IO HTTP building blocks for kernel request-queue servers.
//!
//! A kernel-resident listener hands requests over pre-split: a verb from a
//! fixed table, well-known headers in fixed slots, and everything else as
//! name/value pairs. Responses go back the same way. This crate holds the
//! tables and the codecs around them; it performs no I/O.
//!
//! - **Tables**: [`RequestHeader`], [`ResponseHeader`] and [`Verb`], whose
//!   indices are fixed.
//! - **Requests**: [`RequestHead::parse`] reads a wire-format head.
//! - **Responses**: [`classify()`] sorts named headers into slots and decides
//!   framing; [`chunked`] frames and decodes chunked bodies.
//!
//! # Example
//!
//! ```
//! use protocol_httpq::{RequestHead, RequestHeader, Verb, classify};
//!
//! let (head, _) = RequestHead::parse(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
//! assert_eq!(head.verb, Verb::Get);
//! assert_eq!(head.known(RequestHeader::Host), Some("a"));
//!
//! let headers = classify([("Content-Type", "text/plain")]);
//! assert!(headers.chunked);
//! ```

pub mod chunked;
mod classify;
mod error;
mod header;
mod request;
mod verb;

pub use classify::{ClassifiedHeaders, classify};
pub use error::ParseError;
pub use header::{
    REQUEST_HEADER_COUNT, REQUEST_HEADER_NAMES, RESPONSE_HEADER_COUNT, RESPONSE_HEADER_NAMES,
    RequestHeader, ResponseHeader,
};
pub use request::{RequestHead, Version};
pub use verb::{UNKNOWN_VERB_INDEX, VERB_COUNT, VERB_NAMES, Verb};
