use std::time::Duration;

/// Number of counters tracked by [`RunStats`].
const COUNTER_COUNT: usize = 6;

/// Events counted during a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Counter {
    /// Instructions in the loaded program.
    InstructionsLoaded = 0,
    /// Instructions dispatched.
    InstructionsExecuted = 1,
    /// Interrupt requests that redirected `ip`.
    InterruptsAccepted = 2,
    /// Interrupt requests dropped while interrupts were disabled.
    InterruptsRejected = 3,
    /// `syscall` instructions routed to a callable.
    SyscallsDispatched = 4,
    /// Memory slots allocated by `alloc`.
    SlotsAllocated = 5,
}

impl Counter {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Counter::InstructionsLoaded => "Instructions loaded",
            Counter::InstructionsExecuted => "Instructions executed",
            Counter::InterruptsAccepted => "Interrupts accepted",
            Counter::InterruptsRejected => "Interrupts rejected",
            Counter::SyscallsDispatched => "Syscalls dispatched",
            Counter::SlotsAllocated => "Slots allocated",
        }
    }

    /// All counters in discriminant order.
    const ALL: [Counter; COUNTER_COUNT] = [
        Counter::InstructionsLoaded,
        Counter::InstructionsExecuted,
        Counter::InterruptsAccepted,
        Counter::InterruptsRejected,
        Counter::SyscallsDispatched,
        Counter::SlotsAllocated,
    ];
}

/// Runtime statistics of a VM.
///
/// Backed by a flat array indexed by [`Counter`] discriminant.
#[derive(Clone, Debug, Default)]
pub struct RunStats {
    counts: [u64; COUNTER_COUNT],
    /// Wall time spent inside [`VM::run`](super::VM::run).
    pub elapsed: Duration,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn add(&mut self, counter: Counter, amount: u64) {
        let slot = &mut self.counts[counter as usize];
        *slot = slot.saturating_add(amount);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counts[counter as usize]
    }

    /// Returns an iterator over all counters and their values.
    pub fn iter(&self) -> impl Iterator<Item = (Counter, u64)> {
        Counter::ALL.into_iter().zip(self.counts)
    }
}
