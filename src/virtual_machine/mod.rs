//! Skiff register virtual machine.
//!
//! Source text is assembled into a binary image, the image is loaded into an
//! [`program::Executable`], and the [`vm::VM`] executes it.
//!
//! # Architecture
//!
//! - **Registers**: constants `x0`/`x1`, `ip`, `sp`, `fp`, ten integer
//!   registers `i0..i9`, ten float registers `f0..f9` and the status register
//!   `op`
//! - **Instruction format**: one opcode byte followed by fixed-width operands
//!   (register ids are one byte, targets and immediates eight bytes)
//! - **Memory**: a byte stack plus handle-addressed memory slots; the
//!   constant pool is slot 0
//! - **Interrupts**: requested from other threads through a channel and
//!   routed to `interrupt_<n>` handlers while enabled
//! - **Syscalls**: `syscall <n>` dispatches to the n-th registered callable
//!
//! # Modules
//!
//! - [`assembler`]: Macro expansion, label scan, directives and encoding
//! - [`errors`]: Assembly and execution error types
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`program`]: Binary image layout and loader
//! - [`register`]: Register names and ids
//! - [`vm`]: Execution engine, memory, interrupts and syscalls

pub mod assembler;
pub mod errors;
pub mod isa;
pub mod program;
pub mod register;
pub mod vm;
