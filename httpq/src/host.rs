use slab::Slab;
use tracing::{debug, error, trace, warn};

use crate::budget::ResponseBudget;
use crate::completion::{Completion, OpTag, RequestId};
use crate::config::Config;
use crate::context::{Phase, RequestTable};
use crate::error::{Error, ErrorKind};
use crate::handler::{Event, EventSink, RequestHandle, ServerHandle};
use crate::lifecycle::Invocation;
use crate::listener::{self, Listener};
use crate::metrics;
use crate::queue::{Kernel, RequestQueue};
use crate::status;

/// Point-in-time counters for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostStats {
    /// Request contexts allocated since creation (accepts issued).
    pub allocated: u64,
    /// Request contexts released since creation.
    pub released: u64,
    /// Request contexts currently allocated.
    pub active: usize,
    /// Bytes held by response descriptors and chunks.
    pub response_bytes: usize,
    /// Listeners still registered, draining ones included.
    pub listeners: usize,
}

/// The bridge between kernel request queues and an [`EventSink`].
///
/// A host owns its listeners, every request context and the sink. It is
/// driven by the caller's scheduler: call [`turn`](Self::turn) once per
/// iteration to replenish accepts and dispatch finished operations. Sink
/// callbacks run inside these calls.
pub struct Host<K: Kernel, S: EventSink> {
    pub(crate) config: Config,
    pub(crate) kernel: K,
    pub(crate) sink: S,
    pub(crate) listeners: Slab<Listener<K::Queue>>,
    pub(crate) requests: RequestTable,
    pub(crate) budget: ResponseBudget,
    batch: Vec<Completion>,
    scratch: Vec<usize>,
    next_generation: u32,
}

impl<K: Kernel, S: EventSink> Host<K, S> {
    /// Create a host. The configuration is validated.
    pub fn new(config: Config, kernel: K, sink: S) -> Result<Self, Error> {
        config.validate()?;
        Ok(Host {
            requests: RequestTable::new(config.max_requests),
            budget: ResponseBudget::new(config.response_memory_limit),
            batch: Vec::with_capacity(config.completion_batch),
            scratch: Vec::new(),
            listeners: Slab::new(),
            next_generation: 0,
            config,
            kernel,
            sink,
        })
    }

    /// Bind `url` and start accepting requests for it on the next turn.
    pub fn listen(&mut self, url: &str) -> Result<ServerHandle, Error> {
        let queue = listener::bind(&mut self.kernel, url, self.config.request_queue_length)?;
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        let index = self.listeners.insert(Listener::new(
            queue,
            url,
            self.config.pending_accepts,
            generation,
        ));
        debug!(url, server = index, "listening");
        Ok(ServerHandle {
            index: index as u32,
            generation,
        })
    }

    /// Stop a listener.
    ///
    /// The queue is closed and no further requests are accepted. Requests
    /// with no kernel operation outstanding are released at once and get
    /// `Error { Aborted }`; the rest are released as their aborted
    /// operations complete. The handle is invalid after this call.
    pub fn stop_listen(&mut self, server: ServerHandle) -> Result<(), Error> {
        let key = self.listener_key(server)?;
        let idle: Vec<u32> = self
            .requests
            .slots_of(key)
            .into_iter()
            .filter(|&slot| {
                self.requests
                    .slot_mut(slot)
                    .is_some_and(|ctx| ctx.pending.is_none() && ctx.phase != Phase::Accepting)
            })
            .collect();
        // Idle requests are cancelled while the queue is still open.
        for &slot in &idle {
            self.cancel_request(slot);
        }
        let result = match self.listeners.get_mut(key) {
            Some(listener) => listener.stop(),
            None => Ok(()),
        };
        debug!(server = key, idle = idle.len(), "draining");

        for slot in idle {
            self.fail(slot, ErrorKind::Aborted, status::ERROR_OPERATION_ABORTED);
        }
        self.reap_listeners();
        result
    }

    /// One scheduler iteration: replenish accepts, then dispatch every
    /// completion the queues have ready. Returns the number dispatched.
    pub fn turn(&mut self) -> usize {
        self.replenish();
        self.poll()
    }

    /// Dispatch every completion the queues have ready without
    /// replenishing. Returns the number dispatched.
    pub fn poll(&mut self) -> usize {
        let mut batch = std::mem::take(&mut self.batch);
        for (_, listener) in self.listeners.iter_mut() {
            listener.queue.poll(&mut batch);
        }
        let count = batch.len();
        for completion in batch.drain(..) {
            self.dispatch(completion);
        }
        self.batch = batch;
        self.reap_listeners();
        count
    }

    /// Issue the new-request receives each listener is owed.
    ///
    /// The owed count is snapshotted per listener, so accepts that complete
    /// inline during this call are re-issued on the next turn rather than
    /// looping here.
    pub fn replenish(&mut self) {
        let mut keys = std::mem::take(&mut self.scratch);
        keys.clear();
        keys.extend(
            self.listeners
                .iter()
                .filter(|(_, l)| l.is_listening() && l.pending_accepts > 0)
                .map(|(key, _)| key),
        );
        for &key in &keys {
            self.replenish_listener(key);
        }
        self.scratch = keys;
    }

    fn replenish_listener(&mut self, key: usize) {
        let Some(owed) = self.listeners.get(key).map(|l| l.pending_accepts) else {
            return;
        };
        for _ in 0..owed {
            match self.listeners.get(key) {
                Some(l) if l.is_listening() && l.pending_accepts > 0 => {}
                _ => return,
            }
            let Some(slot) = self.allocate_slot(key) else {
                self.starve(key);
                return;
            };
            let size = self.config.initial_buffer_size as usize;
            let mut buffer = Vec::new();
            if buffer.try_reserve_exact(size).is_err() {
                self.release_slot(slot);
                self.starve(key);
                return;
            }
            buffer.resize(size, 0);
            if let Some(listener) = self.listeners.get_mut(key) {
                listener.pending_accepts -= 1;
                listener.starved = false;
            }
            self.begin_accept(slot, buffer);
        }
    }

    /// Report starvation once per episode.
    fn starve(&mut self, key: usize) {
        metrics::ACCEPT_STARVED.increment();
        let server = server_handle(&self.listeners, key);
        let Some(listener) = self.listeners.get_mut(key) else {
            return;
        };
        if listener.starved {
            return;
        }
        listener.starved = true;
        error!(
            url = %listener.url,
            owed = listener.pending_accepts,
            "cannot allocate request context; accepts deferred"
        );
        self.sink.on_server_error(
            server,
            ErrorKind::OutOfMemory,
            status::ERROR_NOT_ENOUGH_MEMORY,
        );
    }

    fn dispatch(&mut self, completion: Completion) {
        metrics::COMPLETIONS_DISPATCHED.increment();
        let ud = completion.user_data;
        let slot = ud.slot();
        let tag = ud.tag().filter(|tag| {
            self.requests
                .get(slot, ud.generation())
                .is_some_and(|ctx| ctx.pending == Some(*tag))
        });
        let Some(tag) = tag else {
            metrics::COMPLETIONS_STALE.increment();
            warn!(user_data = ud.raw(), slot, "dropping stale completion");
            return;
        };

        match tag {
            OpTag::Accept => self.complete_accept(slot, completion),
            OpTag::ReadBody => {
                if self.complete_read(slot, completion).is_next() {
                    self.read_body_loop(slot);
                }
            }
            OpTag::SendResponse | OpTag::SendBody => {
                // queued failures are reported through the sink
                let _ = self.complete_write(slot, completion, Invocation::Queued);
            }
        }
    }

    /// Resume a request paused by its sink.
    pub fn resume(&mut self, handle: RequestHandle) -> Result<(), Error> {
        let ctx = self
            .requests
            .get_mut(handle.index, handle.generation)
            .ok_or(Error::ContractViolation("stale request handle"))?;
        let resumable = matches!(ctx.phase, Phase::HeadersDelivered | Phase::ReadingBody);
        if !ctx.paused || ctx.pending.is_some() || !resumable {
            return Err(Error::ContractViolation("resume on a request that is not paused"));
        }
        ctx.paused = false;
        trace!(slot = handle.index, "resumed");
        if ctx.phase == Phase::HeadersDelivered {
            self.start_body(handle.index);
        } else {
            self.read_body_loop(handle.index);
        }
        Ok(())
    }

    /// Release a request without completing it, e.g. when the application
    /// failed while handling it. No event is delivered.
    pub fn release(&mut self, handle: RequestHandle) -> Result<(), Error> {
        let ctx = self
            .requests
            .get(handle.index, handle.generation)
            .ok_or(Error::ContractViolation("stale request handle"))?;
        if ctx.pending.is_some() {
            return Err(Error::ContractViolation(
                "release with a kernel operation outstanding",
            ));
        }
        debug!(slot = handle.index, "released by application");
        self.abandon(handle.index);
        Ok(())
    }

    /// Counters for the request table, the response budget and listeners.
    pub fn stats(&self) -> HostStats {
        HostStats {
            allocated: self.requests.allocated(),
            released: self.requests.released(),
            active: self.requests.active_count(),
            response_bytes: self.budget.used(),
            listeners: self.listeners.len(),
        }
    }

    /// New-request receives still owed to a listener.
    pub fn pending_accepts(&self, server: ServerHandle) -> Option<u32> {
        let key = self.listener_key(server).ok()?;
        self.listeners.get(key).map(|l| l.pending_accepts)
    }

    /// The configuration the host was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The event sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The event sink, for draining what it collected.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The kernel the host drives.
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// The kernel, mutably.
    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn listener_key(&self, server: ServerHandle) -> Result<usize, Error> {
        let key = server.index as usize;
        match self.listeners.get(key) {
            Some(l) if l.generation == server.generation && l.is_listening() => Ok(key),
            _ => Err(Error::ContractViolation("stale server handle")),
        }
    }

    pub(crate) fn allocate_slot(&mut self, key: usize) -> Option<u32> {
        let slot = self.requests.allocate(key)?;
        metrics::REQUESTS_ACTIVE.increment();
        if let Some(listener) = self.listeners.get_mut(key) {
            listener.live += 1;
        }
        Some(slot)
    }

    /// Release a slot whose request the kernel still tracks.
    pub(crate) fn abandon(&mut self, slot: u32) {
        self.cancel_request(slot);
        self.release_slot(slot);
    }

    /// Tell the kernel to forget the slot's request, if it has one.
    fn cancel_request(&mut self, slot: u32) {
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return;
        };
        let request = std::mem::take(&mut ctx.request_id);
        if request == RequestId::NULL {
            return;
        }
        if let Some(listener) = self.listeners.get_mut(ctx.listener)
            && let Err(code) = listener.queue.cancel_request(request)
        {
            debug!(slot, request_id = request.0, code, "cancel failed");
        }
    }

    /// Run the reclaimer for a slot and update listener bookkeeping.
    pub(crate) fn release_slot(&mut self, slot: u32) {
        let Some(key) = self.requests.release(slot, &mut self.budget) else {
            return;
        };
        metrics::REQUESTS_RELEASED.increment();
        metrics::REQUESTS_ACTIVE.decrement();
        if let Some(listener) = self.listeners.get_mut(key) {
            listener.live = listener.live.saturating_sub(1);
        }
        trace!(slot, "request released");
    }

    /// Abandon a request, then tell the sink why.
    pub(crate) fn fail(&mut self, slot: u32, kind: ErrorKind, code: u32) {
        let Some(ctx) = self.requests.slot_mut(slot) else {
            return;
        };
        let handle = RequestHandle {
            index: slot,
            generation: ctx.generation,
        };
        let server = server_handle(&self.listeners, ctx.listener);
        self.abandon(slot);
        self.sink
            .on_event(handle, server, Event::Error { kind, code });
    }

    /// `Aborted` when a listener being drained cancelled the operation,
    /// `kind` otherwise.
    pub(crate) fn failure_kind(&self, key: usize, kind: ErrorKind, code: u32) -> ErrorKind {
        let draining = self.listeners.get(key).is_none_or(|l| !l.is_listening());
        if draining && code == status::ERROR_OPERATION_ABORTED {
            ErrorKind::Aborted
        } else {
            kind
        }
    }

    fn reap_listeners(&mut self) {
        self.listeners.retain(|key, l| {
            let keep = l.is_listening() || l.live > 0;
            if !keep {
                debug!(server = key, url = %l.url, "listener drained");
            }
            keep
        });
    }
}

/// Handle for the listener at `key`, valid or not.
pub(crate) fn server_handle<Q>(listeners: &Slab<Listener<Q>>, key: usize) -> ServerHandle {
    ServerHandle {
        index: key as u32,
        generation: listeners.get(key).map_or(0, |l| l.generation),
    }
}
