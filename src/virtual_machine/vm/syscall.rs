//! Syscall targets.
//!
//! `syscall <n>` dispatches to the n-th registered [`Callable`]. Callables see
//! the machine through a [`View`]: integer registers carry parameters and
//! `op` reports success (1) or failure (0).
//!
//! | id | callable  | parameters                                         |
//! |----|-----------|----------------------------------------------------|
//! | 0  | [`Timer`] | `i0` delay in ms, `i1` interrupt id                |
//! | 1  | [`Print`] | `i0` slot, `i1` offset, `i2` length, `i3` type, `i4` newline |

use super::interrupts::{INTERRUPT_RETRY_DELAY, INTERRUPT_RETRY_LIMIT, InterruptSender};
use super::memman::MemoryManager;
use super::memory::Width;
use crate::virtual_machine::register::{FLOAT_REGISTERS, INTEGER_REGISTERS};
use std::io::Write;
use std::thread;
use std::time::Duration;

/// Mutable window onto the machine handed to a [`Callable`].
pub struct View<'a> {
    pub ints: &'a mut [u64; INTEGER_REGISTERS],
    pub floats: &'a mut [u64; FLOAT_REGISTERS],
    pub op: &'a mut u64,
    pub memory: &'a mut MemoryManager,
}

/// A syscall target.
///
/// Implementations run synchronously inside the dispatch step and must not
/// panic. Long-running work belongs on a separate thread.
pub trait Callable: Send {
    fn name(&self) -> &'static str;

    fn call(&mut self, view: &mut View<'_>);
}

/// Raises an interrupt after a delay.
///
/// Sets `op = 0` and does nothing when the delay is zero. Otherwise spawns a
/// detached thread that sleeps `i0` milliseconds and then requests interrupt
/// `i1`, retrying while interrupts are disabled.
pub struct Timer {
    sender: InterruptSender,
}

impl Timer {
    pub fn new(sender: InterruptSender) -> Self {
        Self { sender }
    }
}

impl Callable for Timer {
    fn name(&self) -> &'static str {
        "timer"
    }

    fn call(&mut self, view: &mut View<'_>) {
        *view.op = 0;
        let delay = view.ints[0];
        let id = view.ints[1];
        if delay == 0 {
            return;
        }

        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("timer-irq-{id}"))
            .spawn(move || {
                thread::sleep(Duration::from_millis(delay));
                if !sender.request_with_retry(id, INTERRUPT_RETRY_LIMIT, INTERRUPT_RETRY_DELAY) {
                    crate::warn!(tag: "timer", "interrupt {id} was not delivered");
                }
            });
        if spawned.is_ok() {
            *view.op = 1;
        }
    }
}

/// Data types understood by [`Print`], selected by `i3`.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrintType {
    U8 = 0,
    I8 = 1,
    U16 = 2,
    I16 = 3,
    U32 = 4,
    I32 = 5,
    U64 = 6,
    I64 = 7,
    Float = 8,
    Ascii = 9,
}

impl PrintType {
    fn from_u64(v: u64) -> Option<Self> {
        Some(match v {
            0 => PrintType::U8,
            1 => PrintType::I8,
            2 => PrintType::U16,
            3 => PrintType::I16,
            4 => PrintType::U32,
            5 => PrintType::I32,
            6 => PrintType::U64,
            7 => PrintType::I64,
            8 => PrintType::Float,
            9 => PrintType::Ascii,
            _ => return None,
        })
    }
}

/// Prints a value stored in a memory slot.
///
/// 8 and 16 bit values occupy a word, matching how the constant pool stores
/// them. `Ascii` prints `i2` raw bytes. A non-zero `i4` appends a newline.
pub struct Print {
    out: Box<dyn Write + Send>,
}

impl Print {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn render(view: &View<'_>) -> Option<String> {
        let slot = view.memory.get_ref(view.ints[0])?;
        let offset = view.ints[1];
        let length = view.ints[2];
        slot.bytes(offset, length)?;

        let word = |w: Width| slot.read(offset, w);
        let text = match PrintType::from_u64(view.ints[3])? {
            PrintType::U8 => (word(Width::Word)? as u8).to_string(),
            PrintType::I8 => (word(Width::Word)? as u8 as i8).to_string(),
            PrintType::U16 => (word(Width::Word)? as u16).to_string(),
            PrintType::I16 => (word(Width::Word)? as u16 as i16).to_string(),
            PrintType::U32 => (word(Width::Double)? as u32).to_string(),
            PrintType::I32 => (word(Width::Double)? as u32 as i32).to_string(),
            PrintType::U64 => word(Width::Quad)?.to_string(),
            PrintType::I64 => (word(Width::Quad)? as i64).to_string(),
            PrintType::Float => f64::from_bits(word(Width::Quad)?).to_string(),
            PrintType::Ascii => String::from_utf8_lossy(slot.bytes(offset, length)?).into_owned(),
        };
        Some(text)
    }
}

impl Callable for Print {
    fn name(&self) -> &'static str {
        "print"
    }

    fn call(&mut self, view: &mut View<'_>) {
        *view.op = 0;
        let Some(text) = Self::render(view) else {
            return;
        };
        let newline = if view.ints[4] != 0 { "\n" } else { "" };
        if write!(self.out, "{text}{newline}").is_ok() && self.out.flush().is_ok() {
            *view.op = 1;
        }
    }
}
