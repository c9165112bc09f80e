use crate::response::Outbound;

/// Operation tags encoded in the upper 8 bits of user_data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpTag {
    /// New-request receive.
    Accept = 0,
    /// Entity body receive.
    ReadBody = 1,
    /// Response headers send (optionally with the first body chunk).
    SendResponse = 2,
    /// Response body chunk send.
    SendBody = 3,
}

impl OpTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(OpTag::Accept),
            1 => Some(OpTag::ReadBody),
            2 => Some(OpTag::SendResponse),
            3 => Some(OpTag::SendBody),
            _ => None,
        }
    }
}

/// Encoded user_data identifying the request context an operation belongs
/// to.
///
/// Layout (64-bit):
/// ```text
/// Bits 63..56: OpTag (8 bits)
/// Bits 55..32: Slot (24 bits, request context index)
/// Bits 31..0:  Generation (32 bits, slot generation at submit time)
/// ```
///
/// A completion whose generation no longer matches its slot belongs to a
/// context that has since been released and is dropped by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserData(pub u64);

impl UserData {
    const TAG_SHIFT: u64 = 56;
    const SLOT_SHIFT: u64 = 32;
    const TAG_MASK: u64 = 0xFF << Self::TAG_SHIFT;
    const SLOT_MASK: u64 = 0x00FF_FFFF << Self::SLOT_SHIFT;
    const GENERATION_MASK: u64 = 0xFFFF_FFFF;

    /// Encode an operation tag, slot and generation into user_data.
    #[inline]
    pub fn encode(tag: OpTag, slot: u32, generation: u32) -> Self {
        debug_assert!(slot < (1 << 24), "slot exceeds 24 bits");
        let v = ((tag as u64) << Self::TAG_SHIFT)
            | (((slot as u64) & 0x00FF_FFFF) << Self::SLOT_SHIFT)
            | (generation as u64);
        UserData(v)
    }

    /// Decode the operation tag.
    #[inline]
    pub fn tag(self) -> Option<OpTag> {
        let raw = ((self.0 & Self::TAG_MASK) >> Self::TAG_SHIFT) as u8;
        OpTag::from_u8(raw)
    }

    /// Decode the slot index.
    #[inline]
    pub fn slot(self) -> u32 {
        ((self.0 & Self::SLOT_MASK) >> Self::SLOT_SHIFT) as u32
    }

    /// Decode the generation.
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 & Self::GENERATION_MASK) as u32
    }

    /// Get the raw u64 value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Kernel-assigned request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RequestId(pub u64);

impl RequestId {
    /// The id carried before the kernel has assigned one.
    pub const NULL: RequestId = RequestId(0);
}

/// Flag bits on a new-request completion.
pub mod flags {
    /// The request has an entity body still to be received.
    pub const MORE_ENTITY_BODY: u32 = 1;
}

/// Buffers lent to the kernel for the duration of an operation, returned
/// with its completion.
#[derive(Debug)]
pub enum Lent {
    /// Receive buffer of a new-request or body receive.
    Receive(Vec<u8>),
    /// Response descriptor and chunk of a send.
    Send(Outbound),
}

/// Result of an operation, whether finished inline or delivered later by
/// [`RequestQueue::poll`](crate::RequestQueue::poll).
#[derive(Debug)]
pub struct Completion {
    pub user_data: UserData,
    /// Native status; [`status::NO_ERROR`](crate::status::NO_ERROR) on success.
    pub status: u32,
    /// Bytes transferred.
    pub bytes: u32,
    /// [`flags`] bits (new-request receives only).
    pub flags: u32,
    /// Request id assigned by a new-request receive; echoed otherwise.
    pub request_id: RequestId,
    pub lent: Lent,
}

impl Completion {
    /// A completion carrying only a status, used for initiation failures
    /// and aborts.
    pub fn failed(user_data: UserData, status: u32, request_id: RequestId, lent: Lent) -> Self {
        Completion {
            user_data,
            status,
            bytes: 0,
            flags: 0,
            request_id,
            lent,
        }
    }

    /// The operation finished with `NO_ERROR`.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == crate::status::NO_ERROR
    }
}

/// Outcome of initiating an operation.
#[derive(Debug)]
#[must_use]
pub enum Issue {
    /// The operation finished (or failed to start) during the call. No
    /// later completion will be delivered for it.
    Inline(Completion),
    /// The operation is in flight; exactly one completion will be returned
    /// by a later poll.
    Pending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_tags() {
        for tag_val in 0..=3u8 {
            let tag = OpTag::from_u8(tag_val).unwrap();
            let slot = 0x00AB_CDEFu32;
            let generation = 0xDEAD_BEEFu32;
            let ud = UserData::encode(tag, slot, generation);
            assert_eq!(ud.tag(), Some(tag));
            assert_eq!(ud.slot(), slot);
            assert_eq!(ud.generation(), generation);
        }
    }

    #[test]
    fn max_slot() {
        let max_slot = (1u32 << 24) - 1;
        let ud = UserData::encode(OpTag::SendBody, max_slot, u32::MAX);
        assert_eq!(ud.slot(), max_slot);
        assert_eq!(ud.generation(), u32::MAX);
    }

    #[test]
    fn invalid_tag() {
        let ud = UserData(0xFF << 56);
        assert_eq!(ud.tag(), None);
    }
}
