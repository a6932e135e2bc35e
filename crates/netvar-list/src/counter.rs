/// Wrapping 16-bit send counter.
///
/// Counters are a monitoring aid for whoever captures the traffic; receivers
/// never reorder or drop frames based on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u16,
}

impl SequenceCounter {
    /// Counter for single-variable frames: the first send carries 0.
    pub fn per_variable() -> Self {
        Self { next: 0 }
    }

    /// Counter for packed frames: the first send carries 1, and 65535 is
    /// followed by 0.
    pub fn packed() -> Self {
        Self { next: 1 }
    }

    /// Take the value for the next send.
    pub fn advance(&mut self) -> u16 {
        let current = self.next;
        self.next = self.next.wrapping_add(1);
        current
    }

    /// The value the next send will carry.
    pub fn peek(&self) -> u16 {
        self.next
    }
}
