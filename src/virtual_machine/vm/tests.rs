use super::*;
use crate::utils::test_utils::{SharedBuf, assemble_ok};
use crate::virtual_machine::errors::RuntimeError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Wraps a code body in the minimal header with `main` at index 0.
fn program(body: &str) -> String {
    format!(".init main\n.code\nmain:\n{body}\n")
}

fn run_vm(source: &str) -> VM {
    let mut vm = VM::new(assemble_ok(source));
    vm.run().expect("vm run failed");
    vm
}

fn run_and_get_int(source: &str, reg: Register) -> i64 {
    run_vm(source).registers.get_int(reg)
}

fn run_expect_err(source: &str) -> VMError {
    let mut vm = VM::new(assemble_ok(source));
    vm.run().expect_err("expected vm error")
}

// ==================== Integer arithmetic ====================

#[test]
fn add_program() {
    let mut vm = VM::new(assemble_ok(&program(
        "    mov i0 @5\n    mov i1 @7\n    add i2 i0 i1\n    exit",
    )));
    assert_eq!(vm.run(), Ok(5));
    assert_eq!(vm.register(Register::I2), 12);
    assert_eq!(vm.error(), None);
}

#[test]
fn signed_wrapping_arithmetic() {
    let source = program(
        "    mov i0 @-3
    mov i1 @4
    mul i2 i0 i1
    sub i3 i0 i1
    mov i4 @0x7FFFFFFFFFFFFFFF
    add i5 i4 x1
    exit",
    );
    let vm = run_vm(&source);
    assert_eq!(vm.registers.get_int(Register::I2), -12);
    assert_eq!(vm.registers.get_int(Register::I3), -7);
    assert_eq!(vm.registers.get_int(Register::I5), i64::MIN);
}

#[test]
fn division_truncates_toward_zero() {
    let source = program("    mov i0 @-7\n    mov i1 @2\n    div i2 i0 i1\n    exit");
    assert_eq!(run_and_get_int(&source, Register::I2), -3);
}

#[test]
fn divide_by_zero_kills() {
    let mut vm = VM::new(assemble_ok(&program(
        "    mov i0 @4\n    div i1 i0 i2\n    exit",
    )));
    assert_eq!(vm.run(), Err(VMError::DivideByZero));
    assert_eq!(vm.exit_code(), 1);
    assert_eq!(vm.error(), Some(&VMError::DivideByZero));
    assert_eq!(vm.error_kind(), Some(RuntimeError::DivideByZero));
}

#[test]
fn clean_run_has_no_error_kind() {
    let vm = run_vm(&program("    mov i0 @0\n    exit"));
    assert_eq!(vm.error_kind(), None);
}

#[test]
fn constant_registers_reset_each_cycle() {
    let source = program("    mov x0 @5\n    mov x1 @9\n    add i1 x0 x1\n    exit");
    assert_eq!(run_and_get_int(&source, Register::I1), 1);
}

// ==================== Bit operations ====================

#[test]
fn shifts_are_logical() {
    let source = program(
        "    mov i0 @-1
    mov i2 @60
    rsh i1 i0 i2
    lsh i3 x1 i2
    mov i4 @64
    lsh i5 x1 i4
    exit",
    );
    let vm = run_vm(&source);
    assert_eq!(vm.register(Register::I1), 0xF);
    assert_eq!(vm.register(Register::I3), 1 << 60);
    // shift amount wraps modulo 64
    assert_eq!(vm.register(Register::I5), 1);
}

#[test]
fn bitwise_logic() {
    let source = program(
        "    mov i0 @12
    mov i1 @10
    and i2 i0 i1
    or i3 i0 i1
    xor i4 i0 i1
    not i5 x0
    exit",
    );
    let vm = run_vm(&source);
    assert_eq!(vm.register(Register::I2), 8);
    assert_eq!(vm.register(Register::I3), 14);
    assert_eq!(vm.register(Register::I4), 6);
    assert_eq!(vm.registers.get_int(Register::I5), -1);
}

// ==================== Floats ====================

const FLOAT_PROGRAM: &str = "
.init main
.float a 1.5
.float b 4.0
.code
main:
    mov i1 &a
    lqw x0 i1 f0
    mov i1 &b
    lqw x0 i1 f1
    addf f2 f0 f1
    subf f3 f0 f1
    mulf f4 f0 f1
    divf f5 f1 f0
    bltf f0 f1 less
    exit
less:
    mov i9 @1
    exit
";

#[test]
fn float_arithmetic_and_branch() {
    let vm = run_vm(FLOAT_PROGRAM);
    assert_eq!(vm.registers.get_float(Register::F2), 5.5);
    assert_eq!(vm.registers.get_float(Register::F3), -2.5);
    assert_eq!(vm.registers.get_float(Register::F4), 6.0);
    assert_eq!(vm.registers.get_float(Register::F5), 4.0 / 1.5);
    assert_eq!(vm.register(Register::I9), 1);
}

#[test]
fn float_divide_by_zero_kills() {
    let err = run_expect_err(&program("    divf f0 f1 f2\n    exit"));
    assert_eq!(err, VMError::DivideByZero);
}

// ==================== Branches and calls ====================

#[test]
fn counting_loop() {
    let source = program(
        "    mov i1 @10
loop:
    add i0 i0 x1
    blt i0 i1 loop
    exit",
    );
    let mut vm = VM::new(assemble_ok(&source));
    assert_eq!(vm.run(), Ok(10));
}

#[test]
fn signed_comparisons() {
    let source = program(
        "    mov i0 @-1
    blt i0 x0 negative
    exit
negative:
    bgt x1 i0 done
    exit
done:
    mov i2 @1
    exit",
    );
    assert_eq!(run_and_get_int(&source, Register::I2), 1);
}

#[test]
fn call_and_return() {
    let source = program(
        "    call bump
    call bump
    exit
bump:
    add i0 i0 x1
    add i0 i0 i0
    ret",
    );
    let mut vm = VM::new(assemble_ok(&source));
    assert_eq!(vm.run(), Ok(6));
}

#[test]
fn return_with_empty_call_stack() {
    assert_eq!(
        run_expect_err(&program("    ret")),
        VMError::ReturnWithEmptyCallStack
    );
}

#[test]
fn running_off_the_end() {
    assert_eq!(
        run_expect_err(&program("    nop")),
        VMError::InstructionPointerOutOfRange { ip: 1, len: 1 }
    );
}

// ==================== Assertions ====================

#[test]
fn failed_assertion_exits_with_one() {
    let source = program("    mov i2 @3\n    aseq i2 i3\n    mov i5 @1\n    exit");
    let mut vm = VM::new(assemble_ok(&source));
    assert_eq!(vm.run(), Ok(1));
    assert_eq!(vm.error(), None);
    assert_eq!(vm.register(Register::I5), 0);
}

#[test]
fn passing_assertions_continue() {
    let source = program("    mov i2 @3\n    asne i2 i3\n    aseq i4 i3\n    mov i5 @1\n    exit");
    assert_eq!(run_and_get_int(&source, Register::I5), 1);
}

// ==================== Stack ====================

#[test]
fn stack_is_lifo_across_widths() {
    let source = program(
        "    mov i0 @0x1122
    mov i1 @0x33445566
    push_w i0
    push_dw i1
    push_hw i1
    add i5 sp x0
    pop_hw i4
    pop_dw i3
    pop_w i2
    mov i0 @0
    exit",
    );
    let vm = run_vm(&source);
    assert_eq!(vm.register(Register::I5), 7);
    assert_eq!(vm.register(Register::I4), 0x66);
    assert_eq!(vm.register(Register::I3), 0x33445566);
    assert_eq!(vm.register(Register::I2), 0x1122);
    assert_eq!(vm.register(Register::Sp), 0);
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn stack_underflow_kills() {
    assert_eq!(
        run_expect_err(&program("    push_w i0\n    pop_qw i1\n    exit")),
        VMError::StackPopError {
            width: 8,
            available: 2
        }
    );
}

#[test]
fn stack_overflow_kills() {
    let exe = assemble_ok(&program("    push_dw i0\n    push_w i0\n    exit"));
    let mut vm = VM::with_stack_size(exe, 5);
    assert_eq!(
        vm.run(),
        Err(VMError::StackPushError {
            width: 2,
            capacity: 5
        })
    );
}

// ==================== Memory slots ====================

#[test]
fn alloc_store_load_free() {
    let source = program(
        "    mov i1 @16
    alloc i0 i1
    add i9 op x0
    mov i2 @-2
    mov i3 @8
    sqw i0 i3 i2
    lqw i0 i3 i4
    aseq i2 i4
    lw i0 i3 i5
    free i0
    add i8 op x0
    free i0
    add i7 op x0
    mov i0 @0
    exit",
    );
    let vm = run_vm(&source);
    assert_eq!(vm.exit_code(), 0);
    assert_eq!(vm.register(Register::I9), 1);
    assert_eq!(vm.register(Register::I5), 0xFFFF);
    assert_eq!(vm.register(Register::I8), 1);
    assert_eq!(vm.register(Register::I7), 0);
    assert_eq!(vm.memory().live(), 0);
    assert_eq!(vm.stats().get(Counter::SlotsAllocated), 1);
}

#[test]
fn stored_word_reads_back() {
    let source = program(
        "    mov i8 @33
    mov i9 @0
    mov i2 @1024
    alloc i3 i2
    sw i3 i9 i8
    lw i3 i9 i6
    aseq i6 i8
    exit",
    );
    let vm = run_vm(&source);
    assert_eq!(vm.register(Register::I0), 0);
    assert_eq!(vm.exit_code(), 0);
    assert_eq!(vm.register(Register::I6), 33);
    assert_eq!(vm.register(Register::Op), 1);
}

#[test]
fn failed_memory_operations_clear_op() {
    let source = program(
        "    mov i1 @-1
    alloc i0 i1
    add i2 op x0
    mov i1 @16
    alloc i0 i1
    mov i3 @12
    lqw i0 i3 i4
    add i5 op x0
    mov i6 @7
    sw i6 x0 i1
    add i7 op x0
    exit",
    );
    let vm = run_vm(&source);
    assert_eq!(vm.register(Register::I2), 0);
    assert_eq!(vm.register(Register::I5), 0);
    assert_eq!(vm.register(Register::I7), 0);
}

#[test]
fn constant_pool_is_slot_zero() {
    let source = "
.init main
.string s \"ab\"
.u32 n 9
.code
main:
    mov i1 &n
    ldw x0 i1 i2
    mov i3 #n
    lhw x0 x0 i4
    exit
";
    let vm = run_vm(source);
    assert_eq!(vm.register(Register::I1), 2);
    assert_eq!(vm.register(Register::I2), 9);
    assert_eq!(vm.register(Register::I3), 4);
    assert_eq!(vm.register(Register::I4), u64::from(b'a'));
    assert_eq!(vm.memory().live(), 1);
}

// ==================== Syscalls ====================

#[test]
fn print_syscall() {
    let source = "
.init main
.string msg \"hello\"
.code
main:
    mov i1 &msg
    mov i2 #msg
    mov i3 @9
    mov i4 @1
    syscall 2
    add i5 op x0
    mov i0 @0
    exit
";
    let buf = SharedBuf::default();
    let mut vm = VM::new(assemble_ok(source));
    assert_eq!(vm.register_callable(Box::new(Print::new(Box::new(buf.clone())))), 2);
    assert_eq!(vm.run(), Ok(0));
    assert_eq!(buf.contents(), "hello\n");
    assert_eq!(vm.register(Register::I5), 1);
    assert_eq!(vm.stats().get(Counter::SyscallsDispatched), 1);
}

#[test]
fn unknown_syscall_clears_op() {
    let source = program("    mov i1 @2\n    alloc i2 i1\n    add i3 op x0\n    syscall 42\n    add i4 op x0\n    exit");
    let vm = run_vm(&source);
    assert_eq!(vm.register(Register::I3), 1);
    assert_eq!(vm.register(Register::I4), 0);
    assert_eq!(vm.stats().get(Counter::SyscallsDispatched), 0);
}

const TIMER_PROGRAM: &str = "
.init main
.code
main:
    eirq
    mov i0 @5
    mov i1 @7
    syscall 0
    add i6 op x0
wait:
    beq i5 x1 done
    jmp wait
done:
    mov i0 @0
    exit
interrupt_7:
    mov i5 @1
    ret
";

#[test]
fn timer_raises_interrupt() {
    let mut vm = VM::new(assemble_ok(TIMER_PROGRAM));
    assert_eq!(vm.run(), Ok(0));
    assert_eq!(vm.register(Register::I6), 1);
    assert_eq!(vm.register(Register::I5), 1);
    assert_eq!(vm.stats().get(Counter::InterruptsAccepted), 1);
}

// ==================== Interrupts ====================

const WAIT_FOR_IRQ: &str = "
.init main
.code
main:
    eirq
wait:
    beq i5 x1 done
    jmp wait
done:
    dirq
    mov i0 @0
    exit
interrupt_3:
    add i6 ip x0
    mov i5 @1
    ret
";

#[test]
fn external_interrupt_runs_handler() {
    let mut vm = VM::new(assemble_ok(WAIT_FOR_IRQ));
    let sender = vm.interrupt_sender();
    let raiser = thread::spawn(move || sender.request_with_retry(3, 10_000, Duration::from_millis(1)));

    assert_eq!(vm.run(), Ok(0));
    assert!(raiser.join().unwrap());
    assert_eq!(vm.register(Register::I5), 1);
    // `ip` already points past the executing instruction
    let handler = assemble_ok(WAIT_FOR_IRQ).section_address("interrupt_3").unwrap();
    assert_eq!(vm.register(Register::I6), handler + 1);
    assert_eq!(vm.stats().get(Counter::InterruptsAccepted), 1);
}

#[test]
fn interrupt_fails_once_vm_is_gone() {
    let vm = VM::new(assemble_ok(&program("    exit")));
    let sender = vm.interrupt_sender();
    drop(vm);
    assert!(!sender.request(1));
}

// ==================== Debug output ====================

fn trace_of(source: &str) -> String {
    let buf = SharedBuf::default();
    let mut vm = VM::new(assemble_ok(source));
    vm.set_trace_output(Box::new(buf.clone()));
    vm.run().expect("vm run failed");
    buf.contents()
}

#[test]
fn debug_without_level_prints_id_only() {
    assert_eq!(trace_of(&program("    debug 4\n    exit")), "DEBUG INS:4\n");
}

#[test]
fn debug_levels_add_registers() {
    let minimal = trace_of(".init main\n.debug 1\n.code\nmain:\n    nop\n    debug 4\n    exit\n");
    assert_eq!(minimal, "NOP @ ip = 0\nDEBUG INS:4\n  ip | 1\n");

    let moderate = trace_of(".init main\n.debug 2\n.code\nmain:\n    mov i0 @0\n    debug 2\n    exit\n");
    assert!(moderate.contains("  x0 | 0  x1 | 1  ip | 1  sp | 0  fp | 0  op | 0"));
    assert!(!moderate.contains("i0 |"));

    let extreme = trace_of(".init main\n.debug 3\n.code\nmain:\n    mov i3 @-4\n    debug 3\n    exit\n");
    assert!(extreme.contains("  i3 | -4\n"));
    assert!(extreme.contains("  f9 | 0\n"));
    assert!(extreme.contains("  op | 0"));
}

#[test]
fn syscall_is_traced_with_callable_name() {
    let trace = trace_of(".init main\n.debug 1\n.code\nmain:\n    mov i0 @0\n    syscall 0\n    syscall 9\n    exit\n");
    assert_eq!(trace, "SYSCALL 0 timer @ ip = 1\n");
    assert_eq!(trace_of(&program("    syscall 0\n    exit")), "");
}

// ==================== Runtime callback and stats ====================

#[test]
fn runtime_callback_receives_error_and_ip() {
    let seen: Arc<Mutex<Vec<(RuntimeError, u64)>>> = Arc::default();
    let sink = seen.clone();
    let mut vm = VM::new(assemble_ok(&program(
        "    mov i0 @4\n    nop\n    div i1 i0 i2\n    exit",
    )));
    vm.set_runtime_callback(Box::new(move |err: &VMError, ip: u64| {
        sink.lock().unwrap().push((err.runtime_kind(), ip));
    }));

    assert!(vm.run().is_err());
    assert_eq!(*seen.lock().unwrap(), vec![(RuntimeError::DivideByZero, 2)]);
}

#[test]
fn stats_count_loaded_and_executed() {
    let source = program(
        "    mov i1 @3
loop:
    add i0 i0 x1
    blt i0 i1 loop
    exit",
    );
    let vm = run_vm(&source);
    let stats = vm.stats();
    assert_eq!(stats.get(Counter::InstructionsLoaded), 4);
    // mov, 3 x (add, blt), exit
    assert_eq!(stats.get(Counter::InstructionsExecuted), 8);
    assert_eq!(stats.get(Counter::InterruptsRejected), 0);
}

#[test]
fn width_sizes_match_constants() {
    assert_eq!(Width::Half.bytes(), HWORD_SIZE_BYTES);
    assert_eq!(Width::Word.bytes(), WORD_SIZE_BYTES);
    assert_eq!(Width::Double.bytes(), DWORD_SIZE_BYTES);
    assert_eq!(Width::Quad.bytes(), QWORD_SIZE_BYTES);
}
