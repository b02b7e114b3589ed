/// A bounded retry budget that refills on success.
///
/// Starts at `bound`; every failure that still has budget consumes one unit
/// and allows another attempt. Once empty, further failures are terminal until
/// the next success refills it. With a bound of 3 an operation gets one
/// initial try plus three retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    bound: u32,
    remaining: u32,
}

impl RetryCounter {
    pub const DEFAULT_BOUND: u32 = 3;

    pub fn new(bound: u32) -> Self {
        Self {
            bound,
            remaining: bound,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn bound(&self) -> u32 {
        self.bound
    }

    pub fn reset(&mut self) {
        self.remaining = self.bound;
    }

    /// Records a failure. Returns `true` when a retry is still allowed.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

impl Default for RetryCounter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BOUND)
    }
}
