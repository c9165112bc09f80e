/// Byte budget for response buffers owned by the library.
///
/// Every string and chunk copied out of a caller's response is charged to
/// the budget and to the owning request's running charge. The reclaimer
/// credits a request's whole charge back when it releases the request.
/// Copies that would exceed the limit, or whose allocation fails, return
/// `None`.
pub(crate) struct ResponseBudget {
    /// 0 = unlimited.
    limit: usize,
    used: usize,
}

impl ResponseBudget {
    pub(crate) fn new(limit: usize) -> Self {
        ResponseBudget { limit, used: 0 }
    }

    fn reserve(&mut self, charge: &mut usize, len: usize) -> bool {
        if self.limit != 0 && self.used.saturating_add(len) > self.limit {
            return false;
        }
        self.used += len;
        *charge += len;
        true
    }

    /// Copy `src` into a freshly owned buffer.
    pub(crate) fn copy(&mut self, charge: &mut usize, src: &[u8]) -> Option<Vec<u8>> {
        self.gather(charge, std::slice::from_ref(&src))
    }

    /// Concatenate `parts` into one freshly owned buffer.
    pub(crate) fn gather<B: AsRef<[u8]>>(
        &mut self,
        charge: &mut usize,
        parts: &[B],
    ) -> Option<Vec<u8>> {
        let total: usize = parts.iter().map(|p| p.as_ref().len()).sum();
        if !self.reserve(charge, total) {
            return None;
        }
        let mut buf = Vec::new();
        if buf.try_reserve_exact(total).is_err() {
            self.credit(charge, total);
            return None;
        }
        for part in parts {
            buf.extend_from_slice(part.as_ref());
        }
        Some(buf)
    }

    /// Return `len` bytes of a request's charge.
    pub(crate) fn credit(&mut self, charge: &mut usize, len: usize) {
        let len = len.min(*charge);
        *charge -= len;
        self.used = self.used.saturating_sub(len);
    }

    /// Bytes currently charged across all requests.
    pub(crate) fn used(&self) -> usize {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_copies() {
        let mut budget = ResponseBudget::new(0);
        let mut charge = 0;
        let buf = budget.copy(&mut charge, b"hello").unwrap();
        assert_eq!(buf, b"hello");
        assert_eq!(charge, 5);
        assert_eq!(budget.used(), 5);
    }

    #[test]
    fn gather_concatenates() {
        let mut budget = ResponseBudget::new(0);
        let mut charge = 0;
        let buf = budget
            .gather(&mut charge, &[&b"ab"[..], &b""[..], &b"cde"[..]])
            .unwrap();
        assert_eq!(buf, b"abcde");
        assert_eq!(charge, 5);
    }

    #[test]
    fn exhaustion() {
        let mut budget = ResponseBudget::new(8);
        let mut charge = 0;
        assert!(budget.copy(&mut charge, b"12345").is_some());
        assert!(budget.copy(&mut charge, b"6789").is_none());
        assert_eq!(charge, 5);
        assert_eq!(budget.used(), 5);
    }

    #[test]
    fn credit_returns_charge() {
        let mut budget = ResponseBudget::new(8);
        let mut a = 0;
        let mut b = 0;
        budget.copy(&mut a, b"1234").unwrap();
        budget.copy(&mut b, b"5678").unwrap();
        budget.credit(&mut a, 4);
        assert_eq!(a, 0);
        assert_eq!(budget.used(), 4);
        // over-crediting is clamped to the request's own charge
        budget.credit(&mut b, 100);
        assert_eq!(b, 0);
        assert_eq!(budget.used(), 0);
    }
}
