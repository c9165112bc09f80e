//! Response writer.
//!
//! Header and body writes copy the caller's data into buffers owned by the
//! request before the kernel sees them. A write that completes inline
//! reports through its return value (`Ok(false)`); one that goes pending
//! reports through exactly one later `Written` or `Error` event.

use tracing::{debug, trace, warn};

use crate::completion::{Completion, Issue, Lent, OpTag, RequestId, UserData};
use crate::context::Phase;
use crate::error::{Error, ErrorKind};
use crate::handler::{Event, EventSink, RequestHandle};
use crate::host::{Host, server_handle};
use crate::lifecycle::Invocation;
use crate::metrics;
use crate::queue::{Kernel, RequestQueue};
use crate::response::{CachePolicy, Outbound, ResponseDescriptor, ResponseHead};
use crate::status;

const OUT_OF_MEMORY: Error = Error::Write {
    code: status::ERROR_NOT_ENOUGH_MEMORY,
};

impl<K: Kernel, S: EventSink> Host<K, S> {
    /// Write the response head, optionally with the first body chunks.
    ///
    /// Valid once `EndRequest` has been delivered, and only once per
    /// request. Returns `Ok(true)` when the write is pending (a `Written`
    /// or `Error` event follows) and `Ok(false)` when it finished inline.
    /// When `head` is marked last the request has been released by the
    /// time an inline write returns.
    ///
    /// If a copy cannot be allocated, or the kernel rejects the send
    /// inline, the request is released and `Error::Write` is returned.
    pub fn write_headers(
        &mut self,
        handle: RequestHandle,
        head: &ResponseHead<'_>,
    ) -> Result<bool, Error> {
        let slot = handle.index;
        let ctx = self
            .requests
            .get_mut(slot, handle.generation)
            .ok_or(Error::ContractViolation("stale request handle"))?;
        if ctx.pending.is_some() {
            return Err(Error::ContractViolation(
                "write with a kernel operation outstanding",
            ));
        }
        if ctx.phase != Phase::BodyComplete {
            return Err(Error::ContractViolation(
                "headers written before end of request, or twice",
            ));
        }

        let descriptor = ctx.response.insert(ResponseDescriptor::default());
        let mut copied = descriptor.fill(head, &mut self.budget, &mut ctx.charged);
        if copied {
            ctx.free_chunk(&mut self.budget);
            if !head.chunks.is_empty() {
                match self.budget.gather(&mut ctx.charged, head.chunks.as_slice()) {
                    Some(chunk) => ctx.chunk = Some(chunk).filter(|c| !c.is_empty()),
                    None => copied = false,
                }
            }
        }
        if !copied {
            warn!(slot, "cannot allocate response buffers");
            self.abandon(slot);
            return Err(OUT_OF_MEMORY);
        }

        let cache = match self.config.cache_ttl() {
            Some(default) => CachePolicy::TimeToLive(head.cache_duration.unwrap_or(default)),
            None => CachePolicy::NoCache,
        };
        ctx.last_chunk_sent = head.is_last;
        ctx.phase = Phase::WritingHeaders;
        ctx.pending = Some(OpTag::SendResponse);
        let ud = UserData::encode(OpTag::SendResponse, slot, ctx.generation);
        let request_id = ctx.request_id;
        let more_data = !ctx.last_chunk_sent;
        let outbound = Outbound {
            response: ctx.response.take(),
            chunk: ctx.chunk.take(),
        };
        debug!(slot, status = head.status, is_last = head.is_last, ?cache, "writing headers");

        let issue = match self.listeners.get_mut(ctx.listener) {
            Some(listener) => {
                listener
                    .queue
                    .send_response(ud, request_id, outbound, more_data, cache)
            }
            None => aborted(ud, request_id, outbound),
        };
        self.finish_write(slot, issue)
    }

    /// Write body chunks after the header write has completed.
    ///
    /// The fragments are concatenated into one buffer. `is_last` ends the
    /// response; no write may follow it. Returns as
    /// [`write_headers`](Self::write_headers) does.
    pub fn write_body<B: AsRef<[u8]>>(
        &mut self,
        handle: RequestHandle,
        chunks: &[B],
        is_last: bool,
    ) -> Result<bool, Error> {
        let slot = handle.index;
        let ctx = self
            .requests
            .get_mut(slot, handle.generation)
            .ok_or(Error::ContractViolation("stale request handle"))?;
        if ctx.pending.is_some() {
            return Err(Error::ContractViolation(
                "write with a kernel operation outstanding",
            ));
        }
        if ctx.phase != Phase::WritingBody || ctx.last_chunk_sent {
            return Err(Error::ContractViolation(
                "body written before headers completed, or after the last chunk",
            ));
        }

        ctx.free_chunk(&mut self.budget);
        match self.budget.gather(&mut ctx.charged, chunks) {
            Some(chunk) => ctx.chunk = Some(chunk).filter(|c| !c.is_empty()),
            None => {
                warn!(slot, "cannot allocate response chunk");
                self.abandon(slot);
                return Err(OUT_OF_MEMORY);
            }
        }

        ctx.last_chunk_sent = is_last;
        ctx.pending = Some(OpTag::SendBody);
        let ud = UserData::encode(OpTag::SendBody, slot, ctx.generation);
        let request_id = ctx.request_id;
        let outbound = Outbound {
            response: None,
            chunk: ctx.chunk.take(),
        };
        trace!(slot, is_last, "writing body");

        let issue = match self.listeners.get_mut(ctx.listener) {
            Some(listener) => listener
                .queue
                .send_body(ud, request_id, outbound, !is_last),
            None => aborted(ud, request_id, outbound),
        };
        self.finish_write(slot, issue)
    }

    fn finish_write(&mut self, slot: u32, issue: Issue) -> Result<bool, Error> {
        match issue {
            Issue::Pending => Ok(true),
            Issue::Inline(completion) => self
                .complete_write(slot, completion, Invocation::Inline)
                .map(|()| false),
        }
    }

    /// A header or body send finished.
    ///
    /// Inline: failures release the request and are returned; success is
    /// silent. Queued: failures release the request and become an `Error`
    /// event; success becomes `Written`. The last chunk releases the
    /// request either way.
    pub(crate) fn complete_write(
        &mut self,
        slot: u32,
        completion: Completion,
        how: Invocation,
    ) -> Result<(), Error> {
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return Ok(());
        };
        ctx.pending = None;
        let sent = completion.is_success();
        // Buffers come back to their owner; the reclaimer frees them.
        if let Lent::Send(outbound) = completion.lent {
            if outbound.response.is_some() {
                ctx.response = outbound.response;
            }
            ctx.chunk = outbound.chunk;
        }
        let key = ctx.listener;
        let last = ctx.last_chunk_sent;
        let handle = RequestHandle {
            index: slot,
            generation: ctx.generation,
        };

        let code = completion.status;
        if !sent {
            let kind = self.failure_kind(key, ErrorKind::Write, code);
            warn!(slot, code, ?kind, ?how, "write failed");
            return match how {
                Invocation::Inline => {
                    self.abandon(slot);
                    Err(Error::Write { code })
                }
                Invocation::Queued => {
                    self.fail(slot, kind, code);
                    Ok(())
                }
            };
        }

        ctx.phase = Phase::WritingBody;
        metrics::BYTES_SENT.add(u64::from(completion.bytes));
        let server = server_handle(&self.listeners, key);
        if last {
            trace!(slot, "response complete");
            self.release_slot(slot);
        }
        if how == Invocation::Queued {
            self.sink.on_event(handle, server, Event::Written);
        }
        Ok(())
    }
}

fn aborted(ud: UserData, request_id: RequestId, outbound: Outbound) -> Issue {
    Issue::Inline(Completion::failed(
        ud,
        status::ERROR_OPERATION_ABORTED,
        request_id,
        Lent::Send(outbound),
    ))
}
