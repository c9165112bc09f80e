//! Native status codes reported by the request queue.
//!
//! Completions and failed initiations carry a raw `u32`; these are the
//! values the bridge interprets. Anything else is passed through to the
//! application unchanged.

pub const NO_ERROR: u32 = 0;
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
pub const ERROR_INVALID_DATA: u32 = 13;
/// End of the request entity body.
pub const ERROR_HANDLE_EOF: u32 = 38;
pub const ERROR_INVALID_PARAMETER: u32 = 87;
pub const ERROR_ALREADY_EXISTS: u32 = 183;
/// The receive buffer is too small for the request head.
pub const ERROR_MORE_DATA: u32 = 234;
/// The queue was closed while the operation was outstanding.
pub const ERROR_OPERATION_ABORTED: u32 = 995;
pub const ERROR_IO_PENDING: u32 = 997;
/// The request id is unknown to the queue.
pub const ERROR_CONNECTION_INVALID: u32 = 1229;
