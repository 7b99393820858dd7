/// Call stack frame storing the instruction index to resume at.
///
/// Pushed by `call` (next instruction) and by an accepted interrupt (the
/// instruction that was about to run). Popped by `ret`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) struct CallFrame {
    pub(super) return_addr: u64,
}

/// Hook invoked once when execution is killed by a runtime error.
pub type RuntimeCallback = Box<dyn FnMut(&crate::virtual_machine::errors::VMError, u64) + Send>;
