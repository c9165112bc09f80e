//! Request lifecycle: accept, head delivery and the body read loop.
//!
//! Every handler here serves both inline completions (the kernel finished
//! the operation during the initiating call) and queued ones (delivered
//! later by the dispatcher). The body read loop is iterative: a run of
//! inline completions is consumed by the loop in [`Host::read_body_loop`]
//! instead of recursing, so stack depth does not depend on body length.

use protocol_httpq::RequestHead;
use tracing::{debug, trace, warn};

use crate::completion::{Completion, Issue, Lent, OpTag, UserData, flags};
use crate::context::Phase;
use crate::error::{Error, ErrorKind};
use crate::handler::{Event, EventSink, Flow, RequestHandle};
use crate::host::{Host, server_handle};
use crate::metrics;
use crate::queue::{Kernel, RequestQueue};
use crate::status;

/// How a completion reached its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invocation {
    /// Returned by the initiating call.
    Inline,
    /// Delivered by the dispatcher.
    Queued,
}

/// Whether the body read loop should issue another read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Next,
    Stop,
}

impl Step {
    #[inline]
    pub(crate) fn is_next(self) -> bool {
        self == Step::Next
    }
}

impl<K: Kernel, S: EventSink> Host<K, S> {
    /// Submit a new-request receive for a freshly allocated context.
    pub(crate) fn begin_accept(&mut self, slot: u32, buffer: Vec<u8>) {
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return;
        };
        ctx.pending = Some(OpTag::Accept);
        ctx.phase = Phase::Accepting;
        let ud = UserData::encode(OpTag::Accept, slot, ctx.generation);
        let Some(listener) = self.listeners.get_mut(ctx.listener) else {
            self.release_slot(slot);
            return;
        };
        match listener.queue.receive_request(ud, buffer) {
            Issue::Pending => trace!(slot, "accept pending"),
            Issue::Inline(completion) => self.complete_accept(slot, completion),
        }
    }

    /// A new-request receive finished.
    ///
    /// A head larger than the receive buffer completes with
    /// [`ERROR_MORE_DATA`](status::ERROR_MORE_DATA) and is reported like
    /// any other accept failure. Growing the buffer belongs here: keep the
    /// request id from the completion, resize the context's buffer to the
    /// reported size and re-issue the receive for that id instead of
    /// releasing the context.
    pub(crate) fn complete_accept(&mut self, slot: u32, completion: Completion) {
        let received = completion.is_success();
        let Completion {
            status: code,
            bytes,
            flags: accept_flags,
            request_id,
            lent,
            ..
        } = completion;
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return;
        };
        ctx.pending = None;
        if received {
            ctx.request_id = request_id;
        }
        let key = ctx.listener;
        let server = server_handle(&self.listeners, key);

        // Every accept completion is owed a replacement.
        let listening = match self.listeners.get_mut(key) {
            Some(listener) if listener.is_listening() => {
                listener.pending_accepts += 1;
                true
            }
            _ => false,
        };
        if !listening {
            // aborted by stop_listen, or raced it
            self.abandon(slot);
            return;
        }
        if !received {
            warn!(slot, code, "accept failed");
            self.release_slot(slot);
            self.sink.on_server_error(server, ErrorKind::Accept, code);
            return;
        }

        metrics::REQUESTS_ACCEPTED.increment();
        let buffer = match lent {
            Lent::Receive(buffer) => buffer,
            Lent::Send(_) => Vec::new(),
        };
        let len = (bytes as usize).min(buffer.len());
        let head = match RequestHead::parse(&buffer[..len]) {
            Ok((head, _)) => head,
            Err(e) => {
                let err = Error::from(e);
                warn!(slot, request_id = request_id.0, error = %err, "malformed request head");
                self.abandon(slot);
                let code = err.code().unwrap_or(status::ERROR_INVALID_DATA);
                self.sink.on_server_error(server, err.kind(), code);
                return;
            }
        };

        let Some(ctx) = self.requests.slot_mut(slot) else {
            return;
        };
        ctx.buffer = Some(buffer);
        ctx.has_body = accept_flags & flags::MORE_ENTITY_BODY != 0;
        ctx.phase = Phase::HeadersDelivered;
        let handle = RequestHandle {
            index: slot,
            generation: ctx.generation,
        };
        debug!(
            slot,
            request_id = request_id.0,
            verb = %head.verb,
            url = %head.url,
            "new request"
        );

        match self
            .sink
            .on_event(handle, server, Event::NewRequest(&head))
        {
            Flow::Continue => self.start_body(slot),
            Flow::Pause => self.pause(slot),
        }
    }

    /// Move past `HeadersDelivered`: read the body, or finish the request
    /// at once when the kernel reported none.
    pub(crate) fn start_body(&mut self, slot: u32) {
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return;
        };
        if ctx.has_body {
            self.read_body_loop(slot);
        } else {
            self.end_request(slot);
        }
    }

    /// Issue body reads until one is pending, the sink pauses, or the
    /// request finishes.
    pub(crate) fn read_body_loop(&mut self, slot: u32) {
        loop {
            let Some(ctx) = self.requests.slot_mut(slot) else {
                return;
            };
            let Some(buffer) = ctx.buffer.take() else {
                debug_assert!(false, "body read without a receive buffer");
                return;
            };
            ctx.phase = Phase::ReadingBody;
            ctx.pending = Some(OpTag::ReadBody);
            let ud = UserData::encode(OpTag::ReadBody, slot, ctx.generation);
            let request_id = ctx.request_id;
            let issue = match self.listeners.get_mut(ctx.listener) {
                Some(listener) => listener.queue.receive_body(ud, request_id, buffer),
                None => Issue::Inline(Completion::failed(
                    ud,
                    status::ERROR_OPERATION_ABORTED,
                    request_id,
                    Lent::Receive(buffer),
                )),
            };
            match issue {
                Issue::Pending => return,
                Issue::Inline(completion) => {
                    if !self.complete_read(slot, completion).is_next() {
                        return;
                    }
                }
            }
        }
    }

    /// A body read finished. Returns whether the loop should read again;
    /// never issues the next read itself.
    pub(crate) fn complete_read(&mut self, slot: u32, completion: Completion) -> Step {
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return Step::Stop;
        };
        ctx.pending = None;
        if let Lent::Receive(buffer) = completion.lent {
            ctx.buffer = Some(buffer);
        }
        let key = ctx.listener;

        match completion.status {
            status::NO_ERROR if completion.bytes > 0 => {}
            // a successful empty read is treated as end of body
            status::NO_ERROR | status::ERROR_HANDLE_EOF => {
                self.end_request(slot);
                return Step::Stop;
            }
            code => {
                let kind = self.failure_kind(key, ErrorKind::ReadBody, code);
                warn!(slot, code, ?kind, "body read failed");
                self.fail(slot, kind, code);
                return Step::Stop;
            }
        }

        let server = server_handle(&self.listeners, key);
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return Step::Stop;
        };
        let handle = RequestHandle {
            index: slot,
            generation: ctx.generation,
        };
        let data = match ctx.buffer.as_deref() {
            Some(buffer) => &buffer[..(completion.bytes as usize).min(buffer.len())],
            None => &[][..],
        };
        metrics::BYTES_RECEIVED.add(data.len() as u64);
        trace!(slot, bytes = data.len(), "request body");

        match self
            .sink
            .on_event(handle, server, Event::RequestBody(data))
        {
            Flow::Continue => Step::Next,
            Flow::Pause => {
                self.pause(slot);
                Step::Stop
            }
        }
    }

    fn end_request(&mut self, slot: u32) {
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return;
        };
        ctx.phase = Phase::BodyComplete;
        let handle = RequestHandle {
            index: slot,
            generation: ctx.generation,
        };
        let server = server_handle(&self.listeners, ctx.listener);
        trace!(slot, "end of request");
        self.sink.on_event(handle, server, Event::EndRequest);
    }

    fn pause(&mut self, slot: u32) {
        if let Some(ctx) = self.requests.slot_mut(slot) {
            ctx.paused = true;
            trace!(slot, "paused");
        }
    }
}
