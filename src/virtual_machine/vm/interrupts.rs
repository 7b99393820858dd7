//! Interrupt requests and admission.
//!
//! Background work (for example the timer callable) never touches VM state.
//! It sends an [`InterruptRequest`] over a channel and waits for the VM's
//! verdict. The execution loop drains the channel between instructions and
//! decides whether each request may redirect `ip`.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Rejected requests are retried at most this many times.
pub const INTERRUPT_RETRY_LIMIT: usize = 10;
/// Delay between two delivery attempts.
pub const INTERRUPT_RETRY_DELAY: Duration = Duration::from_millis(1);

/// A request to raise interrupt `id`, answered with whether it was accepted.
#[derive(Debug)]
pub struct InterruptRequest {
    pub id: u64,
    pub(super) reply: oneshot::Sender<bool>,
}

/// Cloneable handle for raising interrupts from other threads.
#[derive(Clone, Debug)]
pub struct InterruptSender {
    tx: mpsc::UnboundedSender<InterruptRequest>,
}

impl InterruptSender {
    /// Raises `id` once and blocks until the VM answers.
    ///
    /// Returns false when the VM rejects the request or is gone. Must not be
    /// called from inside an async runtime.
    pub fn request(&self, id: u64) -> bool {
        let (reply, verdict) = oneshot::channel();
        if self.tx.send(InterruptRequest { id, reply }).is_err() {
            return false;
        }
        verdict.blocking_recv().unwrap_or(false)
    }

    /// Raises `id`, retrying rejected attempts up to `limit` times `delay` apart.
    pub fn request_with_retry(&self, id: u64, limit: usize, delay: Duration) -> bool {
        for attempt in 0..=limit {
            if self.request(id) {
                return true;
            }
            if self.tx.is_closed() {
                return false;
            }
            if attempt < limit {
                thread::sleep(delay);
            }
        }
        false
    }
}

/// What the VM does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Admission {
    /// Interrupts are disabled.
    Rejected,
    /// No handler is registered; acknowledged without effect.
    Unhandled,
    /// Jump to the handler at this instruction index.
    Handler(u64),
}

/// Interrupt flag, handler table and the receiving end of the request channel.
#[derive(Debug)]
pub(super) struct InterruptController {
    enabled: bool,
    table: HashMap<u64, u64>,
    rx: mpsc::UnboundedReceiver<InterruptRequest>,
    tx: mpsc::UnboundedSender<InterruptRequest>,
}

impl InterruptController {
    pub(super) fn new(table: HashMap<u64, u64>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            enabled: false,
            table,
            rx,
            tx,
        }
    }

    pub(super) fn sender(&self) -> InterruptSender {
        InterruptSender {
            tx: self.tx.clone(),
        }
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[cfg(test)]
    fn enabled(&self) -> bool {
        self.enabled
    }

    /// Next pending request, if any.
    pub(super) fn poll(&mut self) -> Option<InterruptRequest> {
        self.rx.try_recv().ok()
    }

    pub(super) fn admit(&self, id: u64) -> Admission {
        if !self.enabled {
            return Admission::Rejected;
        }
        match self.table.get(&id) {
            Some(addr) => Admission::Handler(*addr),
            None => Admission::Unhandled,
        }
    }
}
