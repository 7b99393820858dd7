//! Core virtual machine implementation.
//!
//! The VM runs a program decoded once at load time. `ip` is an index into
//! that instruction list. Each cycle the loop:
//!
//! 1. answers pending interrupt requests,
//! 2. restores the constant registers `x0 = 0` and `x1 = 1`,
//! 3. bounds-checks `ip` and advances it past the fetched instruction,
//! 4. executes the instruction; branches, `call`, `ret` and `jmp` overwrite
//!    `ip`.
//!
//! Integer arithmetic uses the signed view of a register with wrapping
//! semantics. Float arithmetic reinterprets register bits as IEEE-754 doubles.
//! A runtime error kills the VM: `i0` is set to 1, the error is logged with
//! the failing `ip`, and the registered runtime callback is invoked.

pub mod interrupts;
pub mod memman;
pub mod memory;
pub mod registers;
pub mod stack;
pub mod stats;
pub mod syscall;

mod context;
#[cfg(test)]
mod tests;

pub use context::RuntimeCallback;

use crate::virtual_machine::errors::{RuntimeError, VMError};
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::{DebugLevel, Executable};
use crate::virtual_machine::register::Register;
use crate::{debug, error, warn};
use context::CallFrame;
use interrupts::{Admission, InterruptController, InterruptSender};
use memman::MemoryManager;
use memory::{Slot, Width};
use registers::Registers;
use stack::Stack;
use stats::{Counter, RunStats};
use std::io::{self, Write};
use std::time::Instant;
use syscall::{Callable, Print, Timer, View};

/// Default stack capacity.
pub const STACK_SIZE_BYTES: usize = 1 << 20;
pub const HWORD_SIZE_BYTES: usize = 1;
pub const WORD_SIZE_BYTES: usize = 2;
pub const DWORD_SIZE_BYTES: usize = 4;
pub const QWORD_SIZE_BYTES: usize = 8;

/// Syscall id of the built-in [`Timer`].
pub const TIMER_SYSCALL: u64 = 0;
/// Syscall id of the built-in [`Print`].
pub const PRINT_SYSCALL: u64 = 1;

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        {
            $(
                $variant:ident => $handler:ident $( [ $( $extra:expr ),* ] )? ( $( $field:ident ),* )
            ),* $(,)?
        }
    ) => {{
        match $instr {
            $(
                Instruction::$variant { $( $field ),* } => {
                    let instr_name = $instr.opcode().mnemonic();
                    $vm.$handler(instr_name, $( $( $extra, )* )? $( $field ),*)
                }
            ),*
        }
    }};
}

/// Bytecode virtual machine.
///
/// Owns the decoded program, the register file, the stack, the memory
/// manager and the interrupt controller. Background work reaches the VM only
/// through an [`InterruptSender`].
pub struct VM {
    program: Vec<Instruction>,
    registers: Registers,
    /// Index of the instruction being executed.
    current: u64,
    stack: Stack,
    memory: MemoryManager,
    call_stack: Vec<CallFrame>,
    interrupts: InterruptController,
    /// Syscall targets, indexed by syscall id.
    callables: Vec<Box<dyn Callable>>,
    debug: DebugLevel,
    alive: bool,
    error: Option<VMError>,
    runtime_callback: Option<RuntimeCallback>,
    /// Destination of `debug` and `nop` trace output.
    trace: Box<dyn Write + Send>,
    stats: RunStats,
}

impl VM {
    /// Creates a VM for `exe` with the default stack capacity.
    pub fn new(exe: Executable) -> Self {
        Self::with_stack_size(exe, STACK_SIZE_BYTES)
    }

    /// Creates a VM whose stack holds at most `stack_bytes` bytes.
    ///
    /// A non-empty constant pool is placed in memory slot 0, so `&name`
    /// offsets can be loaded from it directly.
    pub fn with_stack_size(exe: Executable, stack_bytes: usize) -> Self {
        let interrupts = InterruptController::new(exe.interrupt_table());
        let mut memory = MemoryManager::new();
        let pool = exe.pool();
        if !pool.is_empty() {
            memory.insert(Slot::from_bytes(&pool));
        }

        let mut registers = Registers::new();
        registers.ip = exe.entry;
        let mut stats = RunStats::new();
        stats.add(Counter::InstructionsLoaded, exe.instructions.len() as u64);

        let callables: Vec<Box<dyn Callable>> = vec![
            Box::new(Timer::new(interrupts.sender())),
            Box::new(Print::stdout()),
        ];

        Self {
            program: exe.instructions,
            registers,
            current: exe.entry,
            stack: Stack::new(stack_bytes),
            memory,
            call_stack: Vec::new(),
            interrupts,
            callables,
            debug: exe.debug,
            alive: false,
            error: None,
            runtime_callback: None,
            trace: Box::new(io::stdout()),
            stats,
        }
    }

    /// Appends a syscall target and returns its syscall id.
    pub fn register_callable(&mut self, callable: Box<dyn Callable>) -> u64 {
        self.callables.push(callable);
        (self.callables.len() - 1) as u64
    }

    /// Sets the hook invoked with the error and failing `ip` when a runtime
    /// error kills execution.
    pub fn set_runtime_callback(&mut self, callback: RuntimeCallback) {
        self.runtime_callback = Some(callback);
    }

    /// Redirects `debug` and `nop` trace output, stdout by default.
    pub fn set_trace_output(&mut self, out: Box<dyn Write + Send>) {
        self.trace = out;
    }

    /// Handle for raising interrupts from other threads.
    pub fn interrupt_sender(&self) -> InterruptSender {
        self.interrupts.sender()
    }

    /// Executes until `exit`, a failed assertion or a runtime error.
    ///
    /// Returns the exit code (`i0`), or the error that killed execution.
    pub fn run(&mut self) -> Result<u64, VMError> {
        let started = Instant::now();
        self.alive = true;

        while self.alive {
            self.service_interrupts();
            self.registers.reset_constants();

            let ip = self.registers.ip;
            self.current = ip;
            let fetched = usize::try_from(ip)
                .ok()
                .and_then(|i| self.program.get(i))
                .copied();
            let Some(instruction) = fetched else {
                self.kill(VMError::InstructionPointerOutOfRange {
                    ip,
                    len: self.program.len(),
                });
                break;
            };

            self.registers.ip = ip + 1;
            self.stats.add(Counter::InstructionsExecuted, 1);
            if let Err(err) = self.exec(instruction) {
                self.kill(err);
            }
        }

        self.stats.elapsed += started.elapsed();
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.exit_code()),
        }
    }

    /// Exit code: `i0` at halt, 1 after a kill or failed assertion.
    pub fn exit_code(&self) -> u64 {
        self.registers.ints[0]
    }

    /// Error that killed the last run, if any.
    pub fn error(&self) -> Option<&VMError> {
        self.error.as_ref()
    }

    /// Runtime error code of the last kill, if any.
    pub fn error_kind(&self) -> Option<RuntimeError> {
        self.error.as_ref().map(VMError::runtime_kind)
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn register(&self, reg: Register) -> u64 {
        self.registers.get(reg)
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Bytes currently on the stack.
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Stops execution with a runtime error.
    fn kill(&mut self, err: VMError) {
        let ip = self.current;
        error!(tag: "vm", "execution killed at ip {ip}: {err}");
        self.alive = false;
        self.registers.ints[0] = 1;
        if let Some(callback) = self.runtime_callback.as_mut() {
            callback(&err, ip);
        }
        self.error = Some(err);
    }

    /// Answers every pending interrupt request.
    ///
    /// An accepted request pushes the current `ip` and jumps to the handler.
    /// A request for an id without a handler is acknowledged and ignored.
    fn service_interrupts(&mut self) {
        while let Some(request) = self.interrupts.poll() {
            let accepted = match self.interrupts.admit(request.id) {
                Admission::Rejected => {
                    self.stats.add(Counter::InterruptsRejected, 1);
                    false
                }
                Admission::Unhandled => {
                    error!(tag: "vm", "no handler for interrupt {}", request.id);
                    true
                }
                Admission::Handler(address) => {
                    self.call_stack.push(CallFrame {
                        return_addr: self.registers.ip,
                    });
                    self.registers.ip = address;
                    self.stats.add(Counter::InterruptsAccepted, 1);
                    true
                }
            };
            let _ = request.reply.send(accepted);
        }
    }

    /// Executes a single instruction.
    fn exec(&mut self, instruction: Instruction) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            {
                // Control
                Nop => op_nop(),
                Exit => op_exit(),
                Blt => op_blt(lhs, rhs, target),
                Bgt => op_bgt(lhs, rhs, target),
                Beq => op_beq(lhs, rhs, target),
                Jmp => op_jmp(target),
                Call => op_call(target),
                Ret => op_ret(),
                Mov => op_mov(dest, value),
                // Integer arithmetic
                Add => op_add(dest, lhs, rhs),
                Sub => op_sub(dest, lhs, rhs),
                Div => op_div(dest, lhs, rhs),
                Mul => op_mul(dest, lhs, rhs),
                // Float arithmetic
                Addf => op_addf(dest, lhs, rhs),
                Subf => op_subf(dest, lhs, rhs),
                Divf => op_divf(dest, lhs, rhs),
                Mulf => op_mulf(dest, lhs, rhs),
                // Bit operations
                Lsh => op_lsh(dest, lhs, rhs),
                Rsh => op_rsh(dest, lhs, rhs),
                And => op_and(dest, lhs, rhs),
                Or => op_or(dest, lhs, rhs),
                Xor => op_xor(dest, lhs, rhs),
                Not => op_not(dest, src),
                Bltf => op_bltf(lhs, rhs, target),
                Bgtf => op_bgtf(lhs, rhs, target),
                Beqf => op_beqf(lhs, rhs, target),
                Aseq => op_aseq(expected, actual),
                Asne => op_asne(expected, actual),
                // Stack
                PushHw => op_push[Width::Half](src),
                PushW => op_push[Width::Word](src),
                PushDw => op_push[Width::Double](src),
                PushQw => op_push[Width::Quad](src),
                PopHw => op_pop[Width::Half](dest),
                PopW => op_pop[Width::Word](dest),
                PopDw => op_pop[Width::Double](dest),
                PopQw => op_pop[Width::Quad](dest),
                // Memory slots
                Alloc => op_alloc(dest, size),
                Free => op_free(slot),
                Shw => op_store[Width::Half](slot, offset, src),
                Sw => op_store[Width::Word](slot, offset, src),
                Sdw => op_store[Width::Double](slot, offset, src),
                Sqw => op_store[Width::Quad](slot, offset, src),
                Lhw => op_load[Width::Half](slot, offset, dest),
                Lw => op_load[Width::Word](slot, offset, dest),
                Ldw => op_load[Width::Double](slot, offset, dest),
                Lqw => op_load[Width::Quad](slot, offset, dest),
                // System
                Syscall => op_syscall(id),
                Debug => op_debug(id),
                Eirq => op_eirq(),
                Dirq => op_dirq(),
            }
        }
    }

    fn op_nop(&mut self, instr: &'static str) -> Result<(), VMError> {
        if self.debug >= DebugLevel::Minimal {
            let _ = writeln!(self.trace, "{} @ ip = {}", instr.to_uppercase(), self.current);
        }
        Ok(())
    }

    fn op_exit(&mut self, _instr: &'static str) -> Result<(), VMError> {
        debug!(tag: "vm", "exit @ ip = {} with code {}", self.current, self.exit_code());
        self.alive = false;
        Ok(())
    }

    fn branch_if(&mut self, condition: bool, target: u64) -> Result<(), VMError> {
        if condition {
            self.registers.ip = target;
        }
        Ok(())
    }

    fn op_blt(&mut self, _instr: &'static str, lhs: Register, rhs: Register, target: u64) -> Result<(), VMError> {
        let cond = self.registers.get_int(lhs) < self.registers.get_int(rhs);
        self.branch_if(cond, target)
    }

    fn op_bgt(&mut self, _instr: &'static str, lhs: Register, rhs: Register, target: u64) -> Result<(), VMError> {
        let cond = self.registers.get_int(lhs) > self.registers.get_int(rhs);
        self.branch_if(cond, target)
    }

    fn op_beq(&mut self, _instr: &'static str, lhs: Register, rhs: Register, target: u64) -> Result<(), VMError> {
        let cond = self.registers.get(lhs) == self.registers.get(rhs);
        self.branch_if(cond, target)
    }

    fn op_bltf(&mut self, _instr: &'static str, lhs: Register, rhs: Register, target: u64) -> Result<(), VMError> {
        let cond = self.registers.get_float(lhs) < self.registers.get_float(rhs);
        self.branch_if(cond, target)
    }

    fn op_bgtf(&mut self, _instr: &'static str, lhs: Register, rhs: Register, target: u64) -> Result<(), VMError> {
        let cond = self.registers.get_float(lhs) > self.registers.get_float(rhs);
        self.branch_if(cond, target)
    }

    fn op_beqf(&mut self, _instr: &'static str, lhs: Register, rhs: Register, target: u64) -> Result<(), VMError> {
        let cond = self.registers.get_float(lhs) == self.registers.get_float(rhs);
        self.branch_if(cond, target)
    }

    fn op_jmp(&mut self, _instr: &'static str, target: u64) -> Result<(), VMError> {
        self.registers.ip = target;
        Ok(())
    }

    fn op_call(&mut self, _instr: &'static str, target: u64) -> Result<(), VMError> {
        self.call_stack.push(CallFrame {
            return_addr: self.registers.ip,
        });
        self.registers.ip = target;
        Ok(())
    }

    fn op_ret(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let frame = self
            .call_stack
            .pop()
            .ok_or(VMError::ReturnWithEmptyCallStack)?;
        self.registers.ip = frame.return_addr;
        Ok(())
    }

    fn op_mov(&mut self, _instr: &'static str, dest: Register, value: u64) -> Result<(), VMError> {
        self.registers.set(dest, value);
        Ok(())
    }

    fn int_op(&mut self, dest: Register, lhs: Register, rhs: Register, f: fn(i64, i64) -> i64) -> Result<(), VMError> {
        let value = f(self.registers.get_int(lhs), self.registers.get_int(rhs));
        self.registers.set_int(dest, value);
        Ok(())
    }

    fn op_add(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.int_op(dest, lhs, rhs, i64::wrapping_add)
    }

    fn op_sub(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.int_op(dest, lhs, rhs, i64::wrapping_sub)
    }

    fn op_mul(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.int_op(dest, lhs, rhs, i64::wrapping_mul)
    }

    fn op_div(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        if self.registers.get_int(rhs) == 0 {
            return Err(VMError::DivideByZero);
        }
        self.int_op(dest, lhs, rhs, i64::wrapping_div)
    }

    fn float_op(&mut self, dest: Register, lhs: Register, rhs: Register, f: fn(f64, f64) -> f64) -> Result<(), VMError> {
        let value = f(self.registers.get_float(lhs), self.registers.get_float(rhs));
        self.registers.set_float(dest, value);
        Ok(())
    }

    fn op_addf(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.float_op(dest, lhs, rhs, |a, b| a + b)
    }

    fn op_subf(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.float_op(dest, lhs, rhs, |a, b| a - b)
    }

    fn op_mulf(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.float_op(dest, lhs, rhs, |a, b| a * b)
    }

    fn op_divf(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        if self.registers.get_float(rhs) == 0.0 {
            return Err(VMError::DivideByZero);
        }
        self.float_op(dest, lhs, rhs, |a, b| a / b)
    }

    fn bit_op(&mut self, dest: Register, lhs: Register, rhs: Register, f: fn(u64, u64) -> u64) -> Result<(), VMError> {
        let value = f(self.registers.get(lhs), self.registers.get(rhs));
        self.registers.set(dest, value);
        Ok(())
    }

    fn op_lsh(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.bit_op(dest, lhs, rhs, |a, b| a.wrapping_shl(b as u32))
    }

    fn op_rsh(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.bit_op(dest, lhs, rhs, |a, b| a.wrapping_shr(b as u32))
    }

    fn op_and(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.bit_op(dest, lhs, rhs, |a, b| a & b)
    }

    fn op_or(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.bit_op(dest, lhs, rhs, |a, b| a | b)
    }

    fn op_xor(&mut self, _instr: &'static str, dest: Register, lhs: Register, rhs: Register) -> Result<(), VMError> {
        self.bit_op(dest, lhs, rhs, |a, b| a ^ b)
    }

    fn op_not(&mut self, _instr: &'static str, dest: Register, src: Register) -> Result<(), VMError> {
        let value = !self.registers.get(src);
        self.registers.set(dest, value);
        Ok(())
    }

    /// Stops with exit code 1 unless `passed`.
    fn assert(&mut self, instr: &'static str, passed: bool, expected: Register, actual: Register) -> Result<(), VMError> {
        if !passed {
            warn!(
                tag: "vm",
                "{instr} failed at ip {}: {expected} = {}, {actual} = {}",
                self.current,
                self.registers.get(expected),
                self.registers.get(actual)
            );
            self.registers.ints[0] = 1;
            self.alive = false;
        }
        Ok(())
    }

    fn op_aseq(&mut self, instr: &'static str, expected: Register, actual: Register) -> Result<(), VMError> {
        let passed = self.registers.get(expected) == self.registers.get(actual);
        self.assert(instr, passed, expected, actual)
    }

    fn op_asne(&mut self, instr: &'static str, expected: Register, actual: Register) -> Result<(), VMError> {
        let passed = self.registers.get(expected) != self.registers.get(actual);
        self.assert(instr, passed, expected, actual)
    }

    fn op_push(&mut self, _instr: &'static str, width: Width, src: Register) -> Result<(), VMError> {
        self.stack.push(width, self.registers.get(src))?;
        self.registers.sp = self.stack.len() as u64;
        Ok(())
    }

    fn op_pop(&mut self, _instr: &'static str, width: Width, dest: Register) -> Result<(), VMError> {
        let value = self.stack.pop(width)?;
        self.registers.sp = self.stack.len() as u64;
        self.registers.set(dest, value);
        Ok(())
    }

    fn op_alloc(&mut self, _instr: &'static str, dest: Register, size: Register) -> Result<(), VMError> {
        match self.memory.alloc(self.registers.get(size)) {
            Some(id) => {
                self.registers.set(dest, id);
                self.registers.op = 1;
                self.stats.add(Counter::SlotsAllocated, 1);
            }
            None => self.registers.op = 0,
        }
        Ok(())
    }

    fn op_free(&mut self, _instr: &'static str, slot: Register) -> Result<(), VMError> {
        self.registers.op = self.memory.free(self.registers.get(slot)) as u64;
        Ok(())
    }

    fn op_store(
        &mut self,
        _instr: &'static str,
        width: Width,
        slot: Register,
        offset: Register,
        src: Register,
    ) -> Result<(), VMError> {
        let offset = self.registers.get(offset);
        let value = self.registers.get(src);
        let stored = self
            .memory
            .get(self.registers.get(slot))
            .is_some_and(|s| s.write(offset, width, value));
        self.registers.op = stored as u64;
        Ok(())
    }

    fn op_load(
        &mut self,
        _instr: &'static str,
        width: Width,
        slot: Register,
        offset: Register,
        dest: Register,
    ) -> Result<(), VMError> {
        let offset = self.registers.get(offset);
        let loaded = self
            .memory
            .get_ref(self.registers.get(slot))
            .and_then(|s| s.read(offset, width));
        match loaded {
            Some(value) => {
                self.registers.set(dest, value);
                self.registers.op = 1;
            }
            None => self.registers.op = 0,
        }
        Ok(())
    }

    /// Dispatches to the callable at index `id`; an unknown id sets `op = 0`.
    fn op_syscall(&mut self, _instr: &'static str, id: u64) -> Result<(), VMError> {
        let Some(callable) = usize::try_from(id)
            .ok()
            .and_then(|i| self.callables.get_mut(i))
        else {
            self.registers.op = 0;
            return Ok(());
        };

        if self.debug >= DebugLevel::Minimal {
            let _ = writeln!(
                self.trace,
                "SYSCALL {id} {} @ ip = {}",
                callable.name(),
                self.current
            );
        }

        let regs = &mut self.registers;
        let mut view = View {
            ints: &mut regs.ints,
            floats: &mut regs.floats,
            op: &mut regs.op,
            memory: &mut self.memory,
        };
        callable.call(&mut view);
        self.stats.add(Counter::SyscallsDispatched, 1);
        Ok(())
    }

    fn op_debug(&mut self, _instr: &'static str, id: u64) -> Result<(), VMError> {
        if let Err(err) = self.write_debug(id) {
            warn!(tag: "vm", "debug output failed: {err}");
        }
        Ok(())
    }

    /// Writes the `debug` trace for the configured level.
    fn write_debug(&mut self, id: u64) -> io::Result<()> {
        let regs = &self.registers;
        let out = &mut self.trace;

        writeln!(out, "DEBUG INS:{id}")?;
        if self.debug >= DebugLevel::Minimal {
            writeln!(out, "  ip | {}", self.current)?;
        }
        if self.debug >= DebugLevel::Extreme {
            for (i, v) in regs.ints.iter().enumerate() {
                writeln!(out, "  i{i} | {}", *v as i64)?;
            }
            for (i, v) in regs.floats.iter().enumerate() {
                writeln!(out, "  f{i} | {}", f64::from_bits(*v))?;
            }
        }
        if self.debug >= DebugLevel::Moderate {
            writeln!(
                out,
                "  x0 | {}  x1 | {}  ip | {}  sp | {}  fp | {}  op | {}",
                regs.x0, regs.x1, self.current, regs.sp, regs.fp, regs.op
            )?;
        }
        out.flush()
    }

    fn op_eirq(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.interrupts.set_enabled(true);
        Ok(())
    }

    fn op_dirq(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.interrupts.set_enabled(false);
        Ok(())
    }
}
