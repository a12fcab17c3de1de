//! Request sequence numbering.

/// Client-wide sequence counter used to correlate requests with replies.
///
/// The header field is a single byte, so the counter wraps from
/// [`SequenceCounter::MAX`] back to 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter {
    value: u8,
}

impl SequenceCounter {
    pub const MAX: u8 = u8::MAX;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u8 {
        self.value
    }

    /// The value the next [`advance`](Self::advance) will produce.
    pub fn peek_next(&self) -> u8 {
        if self.value >= Self::MAX { 0 } else { self.value + 1 }
    }

    /// Move to the next value and return it.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifx_lan_client::SequenceCounter;
    ///
    /// let mut counter = SequenceCounter::new();
    /// assert_eq!(counter.advance(), 1);
    /// assert_eq!(counter.current(), 1);
    /// ```
    pub fn advance(&mut self) -> u8 {
        self.value = self.peek_next();
        self.value
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, value: u8) {
        self.value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_zero() {
        assert_eq!(SequenceCounter::new().current(), 0);
    }

    #[test]
    fn test_counter_wraps_after_max() {
        let mut counter = SequenceCounter::new();
        counter.set(SequenceCounter::MAX);
        assert_eq!(counter.peek_next(), 0);
        assert_eq!(counter.advance(), 0);
        assert_eq!(counter.advance(), 1);
    }
}
