use protocol_httpq::RequestHead;

use crate::error::ErrorKind;

/// Opaque handle to an in-flight request.
///
/// Carries the context slot and its generation; a handle kept past the
/// request's release is detected and refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl RequestHandle {
    /// Context slot index (for logging and per-request application state).
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Opaque handle to a listener returned by [`Host::listen`](crate::Host::listen).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ServerHandle {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Whether the request should keep flowing after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop reading until [`Host::resume`](crate::Host::resume).
    Pause,
}

/// A request-scoped event.
#[derive(Debug)]
pub enum Event<'a> {
    /// A request head arrived.
    NewRequest(&'a RequestHead),
    /// A piece of the entity body. The slice is only valid for the call.
    RequestBody(&'a [u8]),
    /// The entity body is complete; the response may be written.
    EndRequest,
    /// A write that returned `Ok(true)` has completed.
    Written,
    /// The request failed and has already been released.
    Error { kind: ErrorKind, code: u32 },
}

/// Receives events from a [`Host`](crate::Host).
///
/// Callbacks run synchronously inside the host call that produced them and
/// have no access to the host; work that needs the host (writing a
/// response, resuming) is recorded and performed after the call returns.
/// The returned [`Flow`] matters only for `NewRequest` and `RequestBody`.
pub trait EventSink {
    fn on_event(&mut self, request: RequestHandle, server: ServerHandle, event: Event<'_>)
    -> Flow;

    /// A listener-level failure (accept errors, replenishment starvation).
    fn on_server_error(&mut self, server: ServerHandle, kind: ErrorKind, code: u32) {
        let _ = (server, kind, code);
    }
}
