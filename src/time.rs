//! # Ticks and Wait Options

/// Kernel time in ticks since [`Kernel::start`](crate::Kernel::start).
pub type Tick = u64;

/// How long a service may suspend the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Return immediately if the request cannot be satisfied.
    NoWait,
    /// Suspend until the request is satisfied.
    Forever,
    /// Suspend for at most this many ticks. `Ticks(0)` is `NoWait`.
    Ticks(u32),
}

impl Timeout {
    /// `true` if the caller must not be suspended.
    #[inline]
    pub const fn is_no_wait(self) -> bool {
        matches!(self, Timeout::NoWait | Timeout::Ticks(0))
    }

    /// Absolute expiry tick for a wait starting at `now`, or `None` for
    /// an unbounded wait.
    pub(crate) fn deadline(self, now: Tick) -> Option<Tick> {
        match self {
            Timeout::Ticks(n) => Some(now + n as Tick),
            Timeout::NoWait | Timeout::Forever => None,
        }
    }
}
