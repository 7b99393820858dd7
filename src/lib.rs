//! Skiff library.
//!
//! A compact register instruction set with an assembler, a binary image
//! loader and a virtual machine with a call stack, memory slots, interrupts
//! and syscalls.

pub mod types;
pub mod utils;
pub mod virtual_machine;
