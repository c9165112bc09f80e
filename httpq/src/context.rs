use crate::budget::ResponseBudget;
use crate::completion::{OpTag, RequestId};
use crate::response::ResponseDescriptor;

/// Lifecycle phase of a request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A new-request receive is outstanding.
    Accepting,
    /// `NewRequest` has been delivered; body reading has not started.
    HeadersDelivered,
    ReadingBody,
    /// `EndRequest` has been delivered; awaiting the header write.
    BodyComplete,
    WritingHeaders,
    /// Headers are out; body writes may follow.
    WritingBody,
}

/// Per-request state tracked by the host.
pub struct RequestContext {
    /// Whether the slot is in use.
    pub active: bool,
    /// Generation counter to detect stale handles and completions.
    pub generation: u32,
    /// Owning listener (slab key). Non-owning back-reference.
    pub listener: usize,
    pub request_id: RequestId,
    /// Receive buffer. `None` while lent to the kernel.
    pub buffer: Option<Vec<u8>>,
    /// Response head. `None` until a header write builds it, and while lent.
    pub response: Option<ResponseDescriptor>,
    /// Current body chunk. `None` while lent or when the write had no data.
    pub chunk: Option<Vec<u8>>,
    pub last_chunk_sent: bool,
    /// The single outstanding kernel operation, if any.
    pub pending: Option<OpTag>,
    pub phase: Phase,
    pub paused: bool,
    /// The kernel reported an entity body on accept.
    pub has_body: bool,
    /// Bytes charged to the response budget by this request.
    pub charged: usize,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        RequestContext {
            active: false,
            generation: 0,
            listener: 0,
            request_id: RequestId::NULL,
            buffer: None,
            response: None,
            chunk: None,
            last_chunk_sent: false,
            pending: None,
            phase: Phase::Accepting,
            paused: false,
            has_body: false,
            charged: 0,
        }
    }

    fn activate(&mut self, listener: usize) {
        self.active = true;
        self.listener = listener;
        self.phase = Phase::Accepting;
    }

    /// Drop every owned buffer and reset the slot for reuse.
    fn deactivate(&mut self, budget: &mut ResponseBudget) {
        self.active = false;
        self.request_id = RequestId::NULL;
        self.buffer = None;
        self.response = None;
        self.chunk = None;
        self.last_chunk_sent = false;
        self.pending = None;
        self.phase = Phase::Accepting;
        self.paused = false;
        self.has_body = false;
        let charged = self.charged;
        budget.credit(&mut self.charged, charged);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Free the current chunk buffer and return its charge.
    pub fn free_chunk(&mut self, budget: &mut ResponseBudget) {
        if let Some(chunk) = self.chunk.take() {
            budget.credit(&mut self.charged, chunk.len());
        }
    }
}

/// Request context slots with a free list for O(1) allocation.
pub struct RequestTable {
    slots: Vec<RequestContext>,
    free_list: Vec<u32>,
    allocated: u64,
    released: u64,
}

impl RequestTable {
    pub fn new(max_requests: u32) -> Self {
        let mut slots = Vec::with_capacity(max_requests as usize);
        for _ in 0..max_requests {
            slots.push(RequestContext::new());
        }
        // Free list: indices in reverse order so pop gives lowest first.
        let free_list: Vec<u32> = (0..max_requests).rev().collect();
        RequestTable {
            slots,
            free_list,
            allocated: 0,
            released: 0,
        }
    }

    /// Allocate a context for `listener`. Returns the slot index, or `None`
    /// when the table is full.
    pub fn allocate(&mut self, listener: usize) -> Option<u32> {
        let idx = self.free_list.pop()?;
        self.slots[idx as usize].activate(listener);
        self.allocated += 1;
        Some(idx)
    }

    /// The resource reclaimer.
    ///
    /// Frees every buffer the request owns, returns its budget charge,
    /// clears the outstanding-operation tag and invalidates its handles.
    /// Releasing an inactive slot does nothing. Returns the owning listener
    /// when the slot was released by this call.
    pub fn release(&mut self, idx: u32, budget: &mut ResponseBudget) -> Option<usize> {
        let slot = self.slots.get_mut(idx as usize)?;
        if !slot.active {
            return None;
        }
        let listener = slot.listener;
        slot.deactivate(budget);
        self.free_list.push(idx);
        self.released += 1;
        Some(listener)
    }

    /// Get a context, checking it is active and of the given generation.
    pub fn get(&self, idx: u32, generation: u32) -> Option<&RequestContext> {
        self.slots
            .get(idx as usize)
            .filter(|s| s.active && s.generation == generation)
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, idx: u32, generation: u32) -> Option<&mut RequestContext> {
        self.slots
            .get_mut(idx as usize)
            .filter(|s| s.active && s.generation == generation)
    }

    /// Get an active context without a generation check (for handlers that
    /// already validated the slot).
    pub fn slot_mut(&mut self, idx: u32) -> Option<&mut RequestContext> {
        self.slots.get_mut(idx as usize).filter(|s| s.active)
    }

    /// Active slots belonging to `listener`.
    pub fn slots_of(&self, listener: usize) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.active && s.listener == listener)
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Number of active contexts.
    pub fn active_count(&self) -> usize {
        self.slots.len().saturating_sub(self.free_list.len())
    }

    /// Total contexts allocated since creation.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Total contexts released since creation.
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Get the generation for a slot (valid even if inactive).
    #[cfg(test)]
    pub fn generation(&self, idx: u32) -> u32 {
        self.slots[idx as usize].generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_lowest_first() {
        let mut table = RequestTable::new(4);
        assert_eq!(table.allocate(0), Some(0));
        assert_eq!(table.allocate(0), Some(1));
        assert_eq!(table.active_count(), 2);
    }

    #[test]
    fn table_full() {
        let mut table = RequestTable::new(1);
        assert!(table.allocate(0).is_some());
        assert_eq!(table.allocate(0), None);
    }

    #[test]
    fn release_exactly_once() {
        let mut budget = ResponseBudget::new(0);
        let mut table = RequestTable::new(2);
        let idx = table.allocate(3).unwrap();
        assert_eq!(table.release(idx, &mut budget), Some(3));
        assert_eq!(table.release(idx, &mut budget), None);
        assert_eq!(table.allocated(), 1);
        assert_eq!(table.released(), 1);
        assert_eq!(table.active_count(), 0);
        // the slot was pushed back once, so two allocations still fit
        assert!(table.allocate(0).is_some());
        assert!(table.allocate(0).is_some());
        assert_eq!(table.allocate(0), None);
    }

    #[test]
    fn release_bumps_generation() {
        let mut budget = ResponseBudget::new(0);
        let mut table = RequestTable::new(1);
        let idx = table.allocate(0).unwrap();
        let generation = table.generation(idx);
        assert!(table.get(idx, generation).is_some());
        table.release(idx, &mut budget);
        assert!(table.get(idx, generation).is_none());

        let again = table.allocate(0).unwrap();
        assert_eq!(again, idx);
        assert!(table.get(idx, generation).is_none());
        assert!(table.get(idx, generation + 1).is_some());
    }

    #[test]
    fn release_frees_charged_buffers() {
        let mut budget = ResponseBudget::new(0);
        let mut table = RequestTable::new(1);
        let idx = table.allocate(0).unwrap();
        let ctx = table.slot_mut(idx).unwrap();
        ctx.chunk = budget.copy(&mut ctx.charged, b"chunk data");
        ctx.buffer = Some(vec![0; 16]);
        ctx.pending = Some(OpTag::SendBody);
        assert_eq!(budget.used(), 10);

        table.release(idx, &mut budget);
        assert_eq!(budget.used(), 0);
        let generation = table.generation(idx);
        let idx = table.allocate(0).unwrap();
        let ctx = table.get(idx, generation).unwrap();
        assert!(ctx.chunk.is_none());
        assert!(ctx.buffer.is_none());
        assert!(ctx.pending.is_none());
        assert_eq!(ctx.charged, 0);
    }

    #[test]
    fn free_chunk_credits() {
        let mut budget = ResponseBudget::new(0);
        let mut ctx = RequestContext::new();
        ctx.chunk = budget.copy(&mut ctx.charged, b"abc");
        ctx.free_chunk(&mut budget);
        assert!(ctx.chunk.is_none());
        assert_eq!(ctx.charged, 0);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn slots_of_listener() {
        let mut table = RequestTable::new(4);
        let a = table.allocate(0).unwrap();
        let _b = table.allocate(1).unwrap();
        let c = table.allocate(0).unwrap();
        assert_eq!(table.slots_of(0), vec![a, c]);
    }
}
