//! Kernel request-queue capability.
//!
//! A [`Kernel`] opens or creates named request queues; a [`RequestQueue`]
//! runs overlapped operations against one queue.
//!
//! # Contract
//!
//! Every initiation returns an [`Issue`]:
//!
//! - `Issue::Inline(c)`: the operation finished during the call, or failed
//!   to start (`c.status` is then the initiation failure). No completion
//!   for it is ever returned by [`poll`](RequestQueue::poll).
//! - `Issue::Pending`: exactly one completion will be returned by a later
//!   `poll`, carrying the same `UserData`.
//!
//! Buffers are lent by value and must come back in the completion's
//! [`Lent`](crate::Lent). After [`close`](RequestQueue::close), every
//! outstanding operation completes with
//! [`ERROR_OPERATION_ABORTED`](crate::status::ERROR_OPERATION_ABORTED) and
//! new initiations fail inline with the same status.
//!
//! Implementations must never block.

use crate::completion::{Completion, Issue, RequestId, UserData};
use crate::response::{CachePolicy, Outbound};

/// Opens request queues by name.
pub trait Kernel {
    type Queue: RequestQueue;

    /// Open an existing queue. Fails with
    /// [`ERROR_FILE_NOT_FOUND`](crate::status::ERROR_FILE_NOT_FOUND) when no
    /// queue of that name exists.
    fn open_queue(&mut self, name: &str) -> Result<Self::Queue, u32>;

    /// Create a queue, with its session and URL group, bind `url` to it and
    /// set its length.
    fn create_queue(&mut self, name: &str, url: &str, queue_length: u32)
    -> Result<Self::Queue, u32>;
}

/// Overlapped operations against one request queue.
pub trait RequestQueue {
    /// Receive the next request head into `buffer`. A head that does not
    /// fit completes with [`ERROR_MORE_DATA`](crate::status::ERROR_MORE_DATA)
    /// and the request id, which a later receive for the same id could
    /// retry with a larger buffer.
    fn receive_request(&mut self, user_data: UserData, buffer: Vec<u8>) -> Issue;

    /// Receive the next piece of a request's entity body into `buffer`.
    /// End of body completes with
    /// [`ERROR_HANDLE_EOF`](crate::status::ERROR_HANDLE_EOF).
    fn receive_body(&mut self, user_data: UserData, request: RequestId, buffer: Vec<u8>) -> Issue;

    /// Send the response head, plus the optional first chunk. `more_data`
    /// is set while further body sends will follow.
    fn send_response(
        &mut self,
        user_data: UserData,
        request: RequestId,
        outbound: Outbound,
        more_data: bool,
        cache: CachePolicy,
    ) -> Issue;

    /// Send one body chunk.
    fn send_body(
        &mut self,
        user_data: UserData,
        request: RequestId,
        outbound: Outbound,
        more_data: bool,
    ) -> Issue;

    /// Tell the kernel the application is done with `request` without
    /// sending a response. No completion is produced.
    fn cancel_request(&mut self, request: RequestId) -> Result<(), u32>;

    /// Append finished operations to `completions` without blocking.
    fn poll(&mut self, completions: &mut Vec<Completion>);

    /// Close the queue. Outstanding operations are aborted.
    fn close(&mut self) -> Result<(), u32>;
}
