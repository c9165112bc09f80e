//! httpq: a single-threaded event bridge for kernel HTTP request queues.
//!
//! A kernel-resident HTTP listener parses requests and queues them; the
//! application receives and answers them through overlapped operations on
//! the queue. httpq runs that per-request protocol: accept, stream the body,
//! write the response head and body chunks, and release every resource
//! exactly once, with at most one kernel operation outstanding per request.
//! The application sees it as typed [`Event`]s delivered to an
//! [`EventSink`].
//!
//! # Quick Start
//!
//! ```rust
//! use httpq::loopback::LoopbackKernel;
//! use httpq::{Config, Event, EventSink, Flow, Host, RequestHandle, ResponseHead, ServerHandle};
//!
//! #[derive(Default)]
//! struct Ready(Vec<RequestHandle>);
//!
//! impl EventSink for Ready {
//!     fn on_event(&mut self, req: RequestHandle, _: ServerHandle, event: Event<'_>) -> Flow {
//!         if let Event::EndRequest = event {
//!             self.0.push(req);
//!         }
//!         Flow::Continue
//!     }
//! }
//!
//! fn main() -> Result<(), httpq::Error> {
//!     let kernel = LoopbackKernel::new();
//!     let mut host = Host::new(Config::default(), kernel.clone(), Ready::default())?;
//!     host.listen("http://*:8080/")?;
//!
//!     let client = kernel.control("http://*:8080/").expect("bound");
//!     client.push_request(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n", []);
//!     host.turn(); // accept and deliver the request
//!
//!     for req in std::mem::take(&mut host.sink_mut().0) {
//!         let head = ResponseHead::new(200, "OK").chunk(b"hello").last(true);
//!         host.write_headers(req, &head)?;
//!     }
//!     host.turn();
//!     assert_eq!(client.responses()[0].body, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! # Structure
//!
//! - [`Host`] owns listeners, request contexts and the sink, and is driven
//!   by [`Host::turn`] once per scheduler iteration.
//! - [`Kernel`] / [`RequestQueue`] abstract the queue; [`loopback`] is an
//!   in-memory implementation.
//! - Request-head parsing, header tables and chunked framing live in
//!   [`protocol_httpq`], re-exported here.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod budget;
pub(crate) mod context;
pub(crate) mod host;
pub(crate) mod lifecycle;
pub(crate) mod listener;
pub(crate) mod writer;

// ── Public modules ──────────────────────────────────────────────────────
pub mod completion;
pub mod config;
pub mod error;
pub mod handler;
pub mod loopback;
pub mod metrics;
pub mod queue;
pub mod response;
pub mod status;

// ── Re-exports: Host ────────────────────────────────────────────────────

pub use host::{Host, HostStats};
pub use listener::queue_name;

// ── Re-exports: Handler types ───────────────────────────────────────────

pub use handler::{Event, EventSink, Flow, RequestHandle, ServerHandle};

// ── Re-exports: Kernel capability ───────────────────────────────────────

pub use completion::{Completion, Issue, Lent, OpTag, RequestId, UserData};
pub use queue::{Kernel, RequestQueue};

// ── Re-exports: Responses ───────────────────────────────────────────────

pub use response::{CachePolicy, Outbound, ResponseDescriptor, ResponseHead, UnknownHeader};

// ── Re-exports: Config and errors ───────────────────────────────────────

pub use config::{Config, ConfigBuilder};
pub use error::{Error, ErrorKind};

// ── Re-exports: Protocol ────────────────────────────────────────────────

pub use protocol_httpq;
pub use protocol_httpq::{RequestHead, RequestHeader, ResponseHeader, Verb};
