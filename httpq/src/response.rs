//! Response descriptions.
//!
//! [`ResponseHead`] borrows the application's strings for the duration of a
//! [`Host::write_headers`](crate::Host::write_headers) call. The writer
//! copies them into a [`ResponseDescriptor`] owned by the request, so the
//! caller's buffers are never retained across the kernel operation.

use protocol_httpq::{ClassifiedHeaders, RESPONSE_HEADER_COUNT, ResponseHeader};

use crate::budget::ResponseBudget;

/// Kernel response cache policy attached to a header write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    NoCache,
    /// Cache the response for this many seconds.
    TimeToLive(u32),
}

/// A response head as described by the application.
#[derive(Debug, Clone)]
pub struct ResponseHead<'a> {
    pub(crate) status: u16,
    pub(crate) reason: &'a str,
    pub(crate) known: Vec<(ResponseHeader, &'a str)>,
    pub(crate) unknown: Vec<(&'a str, &'a str)>,
    pub(crate) chunks: Vec<&'a [u8]>,
    pub(crate) is_last: bool,
    pub(crate) cache_duration: Option<u32>,
}

impl<'a> ResponseHead<'a> {
    pub fn new(status: u16, reason: &'a str) -> Self {
        ResponseHead {
            status,
            reason,
            known: Vec::new(),
            unknown: Vec::new(),
            chunks: Vec::new(),
            is_last: false,
            cache_duration: None,
        }
    }

    /// Set a known header. A later value for the same header replaces the
    /// earlier one.
    pub fn known(mut self, header: ResponseHeader, value: &'a str) -> Self {
        self.known.push((header, value));
        self
    }

    /// Add a header outside the known table.
    pub fn unknown(mut self, name: &'a str, value: &'a str) -> Self {
        self.unknown.push((name, value));
        self
    }

    /// Add a header by name, routed to the known table when it is in it.
    pub fn header(self, name: &'a str, value: &'a str) -> Self {
        match ResponseHeader::from_name(name) {
            Some(header) => self.known(header, value),
            None => self.unknown(name, value),
        }
    }

    /// Add headers already sorted by [`protocol_httpq::classify`].
    pub fn classified(mut self, headers: &'a ClassifiedHeaders) -> Self {
        self.known
            .extend(headers.known.iter().map(|(h, v)| (*h, v.as_str())));
        self.unknown.extend(
            headers
                .unknown
                .iter()
                .map(|(n, v)| (n.as_str(), v.as_str())),
        );
        self
    }

    /// Append a body fragment to send with the headers.
    pub fn chunk(mut self, data: &'a [u8]) -> Self {
        self.chunks.push(data);
        self
    }

    /// Mark this write as the whole response.
    pub fn last(mut self, is_last: bool) -> Self {
        self.is_last = is_last;
        self
    }

    /// Override the configured cache TTL for this response. Ignored when
    /// caching is disabled.
    pub fn cache_for(mut self, secs: u32) -> Self {
        self.cache_duration = Some(secs);
        self
    }
}

/// A header outside the known table, owned by the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHeader {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

/// Owned response head handed to the kernel with a header send.
#[derive(Debug, Default)]
pub struct ResponseDescriptor {
    status: u16,
    reason: Vec<u8>,
    known: [Option<Vec<u8>>; RESPONSE_HEADER_COUNT],
    unknown: Vec<UnknownHeader>,
}

impl ResponseDescriptor {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &[u8] {
        &self.reason
    }

    pub fn known(&self, header: ResponseHeader) -> Option<&[u8]> {
        self.known[header.index()].as_deref()
    }

    /// Known headers present, in table order.
    pub fn known_headers(&self) -> impl Iterator<Item = (ResponseHeader, &[u8])> {
        ResponseHeader::iter().filter_map(|h| self.known(h).map(|v| (h, v)))
    }

    pub fn unknown(&self) -> &[UnknownHeader] {
        &self.unknown
    }

    /// Copy every string of `head` into this descriptor, charging the
    /// budget. Returns `false` at the first copy that cannot be made; the
    /// copies made so far stay in the descriptor (and on the charge) so the
    /// reclaimer frees them.
    pub(crate) fn fill(
        &mut self,
        head: &ResponseHead<'_>,
        budget: &mut ResponseBudget,
        charge: &mut usize,
    ) -> bool {
        self.status = head.status;

        let Some(reason) = budget.copy(charge, head.reason.as_bytes()) else {
            return false;
        };
        self.reason = reason;

        for (header, value) in &head.known {
            let Some(value) = budget.copy(charge, value.as_bytes()) else {
                return false;
            };
            if let Some(previous) = self.known[header.index()].replace(value) {
                budget.credit(charge, previous.len());
            }
        }

        if self.unknown.try_reserve_exact(head.unknown.len()).is_err() {
            return false;
        }
        for (name, value) in &head.unknown {
            let Some(name) = budget.copy(charge, name.as_bytes()) else {
                return false;
            };
            let Some(value) = budget.copy(charge, value.as_bytes()) else {
                budget.credit(charge, name.len());
                return false;
            };
            self.unknown.push(UnknownHeader { name, value });
        }
        true
    }

    /// Bytes owned by this descriptor.
    #[cfg(test)]
    pub(crate) fn owned_bytes(&self) -> usize {
        self.reason.len()
            + self.known.iter().flatten().map(Vec::len).sum::<usize>()
            + self
                .unknown
                .iter()
                .map(|h| h.name.len() + h.value.len())
                .sum::<usize>()
    }
}

/// Buffers handed to the kernel by a send.
#[derive(Debug, Default)]
pub struct Outbound {
    /// Present on header sends.
    pub response: Option<ResponseDescriptor>,
    /// The body chunk, if the write carried data.
    pub chunk: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_routes_by_name() {
        let head = ResponseHead::new(200, "OK")
            .header("Content-Type", "text/plain")
            .header("X-Custom", "1");
        assert_eq!(head.known, vec![(ResponseHeader::ContentType, "text/plain")]);
        assert_eq!(head.unknown, vec![("X-Custom", "1")]);
    }

    #[test]
    fn fill_copies_everything() {
        let head = ResponseHead::new(404, "Not Found")
            .known(ResponseHeader::ContentLength, "0")
            .known(ResponseHeader::ContentLength, "00")
            .unknown("x-a", "b");
        let mut budget = ResponseBudget::new(0);
        let mut charge = 0;
        let mut desc = ResponseDescriptor::default();
        assert!(desc.fill(&head, &mut budget, &mut charge));

        assert_eq!(desc.status(), 404);
        assert_eq!(desc.reason(), b"Not Found");
        assert_eq!(desc.known(ResponseHeader::ContentLength), Some(&b"00"[..]));
        assert_eq!(desc.unknown()[0].name, b"x-a");
        // the replaced value was credited back
        assert_eq!(charge, desc.owned_bytes());
        assert_eq!(budget.used(), charge);
    }

    #[test]
    fn fill_stops_at_exhaustion() {
        let head = ResponseHead::new(200, "OK").unknown("x-long-header-name", "value");
        let mut budget = ResponseBudget::new(10);
        let mut charge = 0;
        let mut desc = ResponseDescriptor::default();
        assert!(!desc.fill(&head, &mut budget, &mut charge));
        assert_eq!(desc.reason(), b"OK");
        assert_eq!(charge, desc.owned_bytes());
    }

    #[test]
    fn classified_headers() {
        let classified = protocol_httpq::classify([("Server", "httpq"), ("X-Id", "7")]);
        let head = ResponseHead::new(200, "OK").classified(&classified);
        assert!(head.known.contains(&(ResponseHeader::Server, "httpq")));
        assert!(head.known.contains(&(ResponseHeader::TransferEncoding, "chunked")));
        assert_eq!(head.unknown, vec![("x-id", "7")]);
    }
}
