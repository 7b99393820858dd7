//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and invokes a callback macro for code
//! generation, so the codec here and the builders in
//! [`assembler`](super::assembler) never drift apart.
//!
//! This module generates:
//! - The [`Opcode`] enum with `TryFrom<u8>`, mnemonics and encoded sizes
//! - The decoded [`Instruction`] form with `encode`/`decode`
//!
//! # Bytecode Format
//!
//! Instructions are variable width, 1 to 11 bytes:
//! - Opcode: 1 byte
//! - `Reg`: 1 byte register id (see [`Register`])
//! - `Target`: 8 byte instruction index (big-endian)
//! - `Imm`: 8 byte immediate (big-endian, two's complement for negatives)
//! - `Id`: 8 byte syscall or debug id (big-endian)

use crate::types::encoding::Decode;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::register::Register;
use std::fmt;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control
            // =========================
            /// nop ; no operation
            Nop = 0x00, "nop" => [],
            /// exit ; halt, exit code is i0
            Exit = 0x01, "exit" => [],
            // =========================
            // Branches
            // =========================
            /// blt lhs rhs label ; if lhs < rhs (signed) then ip = label
            Blt = 0x02, "blt" => [lhs: Reg, rhs: Reg, target: Target],
            /// bgt lhs rhs label ; if lhs > rhs (signed) then ip = label
            Bgt = 0x03, "bgt" => [lhs: Reg, rhs: Reg, target: Target],
            /// beq lhs rhs label ; if lhs == rhs then ip = label
            Beq = 0x04, "beq" => [lhs: Reg, rhs: Reg, target: Target],
            /// jmp label ; ip = label
            Jmp = 0x05, "jmp" => [target: Target],
            /// call label ; push ip + 1, ip = label
            Call = 0x06, "call" => [target: Target],
            /// ret ; ip = pop
            Ret = 0x07, "ret" => [],
            // =========================
            // Moves
            // =========================
            /// mov dest @n|&name|#name ; dest = value
            Mov = 0x08, "mov" => [dest: Reg, value: Imm],
            // =========================
            // Integer arithmetic
            // =========================
            /// add dest lhs rhs ; dest = lhs + rhs
            Add = 0x09, "add" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// sub dest lhs rhs ; dest = lhs - rhs
            Sub = 0x0A, "sub" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// div dest lhs rhs ; dest = lhs / rhs (fatal on zero)
            Div = 0x0B, "div" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// mul dest lhs rhs ; dest = lhs * rhs
            Mul = 0x0C, "mul" => [dest: Reg, lhs: Reg, rhs: Reg],
            // =========================
            // Float arithmetic
            // =========================
            /// addf dest lhs rhs ; dest = lhs + rhs
            Addf = 0x0D, "addf" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// subf dest lhs rhs ; dest = lhs - rhs
            Subf = 0x0E, "subf" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// divf dest lhs rhs ; dest = lhs / rhs (fatal on 0.0)
            Divf = 0x0F, "divf" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// mulf dest lhs rhs ; dest = lhs * rhs
            Mulf = 0x10, "mulf" => [dest: Reg, lhs: Reg, rhs: Reg],
            // =========================
            // Bit operations
            // =========================
            /// lsh dest lhs rhs ; dest = lhs << rhs
            Lsh = 0x11, "lsh" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// rsh dest lhs rhs ; dest = lhs >> rhs (logical)
            Rsh = 0x12, "rsh" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// and dest lhs rhs ; dest = lhs & rhs
            And = 0x13, "and" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// or dest lhs rhs ; dest = lhs | rhs
            Or = 0x14, "or" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// xor dest lhs rhs ; dest = lhs ^ rhs
            Xor = 0x15, "xor" => [dest: Reg, lhs: Reg, rhs: Reg],
            /// not dest src ; dest = !src (bitwise)
            Not = 0x16, "not" => [dest: Reg, src: Reg],
            // =========================
            // Float branches
            // =========================
            /// bltf lhs rhs label ; if lhs < rhs then ip = label
            Bltf = 0x17, "bltf" => [lhs: Reg, rhs: Reg, target: Target],
            /// bgtf lhs rhs label ; if lhs > rhs then ip = label
            Bgtf = 0x18, "bgtf" => [lhs: Reg, rhs: Reg, target: Target],
            /// beqf lhs rhs label ; if lhs == rhs then ip = label
            Beqf = 0x19, "beqf" => [lhs: Reg, rhs: Reg, target: Target],
            // =========================
            // Assertions
            // =========================
            /// aseq expected actual ; halt with exit code 1 unless equal
            Aseq = 0x1A, "aseq" => [expected: Reg, actual: Reg],
            /// asne expected actual ; halt with exit code 1 if equal
            Asne = 0x1B, "asne" => [expected: Reg, actual: Reg],
            // =========================
            // Stack
            // =========================
            /// push_w src ; push low 2 bytes of src
            PushW = 0x1C, "push_w" => [src: Reg],
            /// push_dw src ; push low 4 bytes of src
            PushDw = 0x1D, "push_dw" => [src: Reg],
            /// push_qw src ; push all 8 bytes of src
            PushQw = 0x1E, "push_qw" => [src: Reg],
            /// pop_w dest ; dest = 2 bytes popped
            PopW = 0x1F, "pop_w" => [dest: Reg],
            /// pop_dw dest ; dest = 4 bytes popped
            PopDw = 0x20, "pop_dw" => [dest: Reg],
            /// pop_qw dest ; dest = 8 bytes popped
            PopQw = 0x21, "pop_qw" => [dest: Reg],
            // =========================
            // Memory slots
            // =========================
            /// alloc dest size ; dest = new slot of size bytes, op = success
            Alloc = 0x22, "alloc" => [dest: Reg, size: Reg],
            /// free slot ; release slot, op = success
            Free = 0x23, "free" => [slot: Reg],
            /// sw slot offset src ; store 2 bytes, op = success
            Sw = 0x24, "sw" => [slot: Reg, offset: Reg, src: Reg],
            /// sdw slot offset src ; store 4 bytes, op = success
            Sdw = 0x25, "sdw" => [slot: Reg, offset: Reg, src: Reg],
            /// sqw slot offset src ; store 8 bytes, op = success
            Sqw = 0x26, "sqw" => [slot: Reg, offset: Reg, src: Reg],
            /// lw slot offset dest ; load 2 bytes, op = success
            Lw = 0x27, "lw" => [slot: Reg, offset: Reg, dest: Reg],
            /// ldw slot offset dest ; load 4 bytes, op = success
            Ldw = 0x28, "ldw" => [slot: Reg, offset: Reg, dest: Reg],
            /// lqw slot offset dest ; load 8 bytes, op = success
            Lqw = 0x29, "lqw" => [slot: Reg, offset: Reg, dest: Reg],
            // =========================
            // System
            // =========================
            /// syscall n ; invoke callable n, op = success
            Syscall = 0x2A, "syscall" => [id: Id],
            /// debug n ; print n and a register dump per debug level
            Debug = 0x2B, "debug" => [id: Id],
            /// eirq ; enable interrupts
            Eirq = 0x2C, "eirq" => [],
            /// dirq ; disable interrupts
            Dirq = 0x2D, "dirq" => [],
            // =========================
            // Half words
            // =========================
            /// push_hw src ; push low byte of src
            PushHw = 0x2E, "push_hw" => [src: Reg],
            /// pop_hw dest ; dest = 1 byte popped
            PopHw = 0x2F, "pop_hw" => [dest: Reg],
            /// shw slot offset src ; store 1 byte, op = success
            Shw = 0x30, "shw" => [slot: Reg, offset: Reg, src: Reg],
            /// lhw slot offset dest ; load 1 byte, op = success
            Lhw = 0x31, "lhw" => [slot: Reg, offset: Reg, dest: Reg],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        // =========================
        // Opcodes
        // =========================
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VMError::UnknownOpcode(value)),
                }
            }
        }

        impl Opcode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Looks an opcode up by mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                match name {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Encoded width in bytes, opcode included.
            pub const fn size(&self) -> usize {
                match self {
                    $( Opcode::$name => 1usize $( + define_instructions!(@size $kind) )*, )*
                }
            }

            /// Number of assembly operands.
            pub const fn arity(&self) -> usize {
                match self {
                    $( Opcode::$name => 0usize $( + define_instructions!(@one $field) )*, )*
                }
            }
        }

        // =========================
        // Decoded instructions
        // =========================
        /// An instruction with its operands resolved.
        ///
        /// Register operands identify a register by [`Register`] id; the VM
        /// resolves them against its register file at execution time.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name {
                    $( $field: define_instructions!(@ty $kind) ),*
                },
            )*
        }

        impl Instruction {
            pub const fn opcode(&self) -> Opcode {
                match self {
                    $( Instruction::$name { .. } => Opcode::$name, )*
                }
            }

            /// Appends the big-endian encoding to `out`.
            pub fn encode(&self, out: &mut Vec<u8>) {
                match self {
                    $(
                        Instruction::$name { $( $field ),* } => {
                            out.push($opcode);
                            $( define_instructions!(@emit out, $kind, $field); )*
                        }
                    )*
                }
            }

            /// Decodes the operand bytes of `opcode`.
            ///
            /// `operands` must hold exactly the opcode's operand bytes.
            pub fn decode(opcode: u8, operands: &[u8]) -> Result<Instruction, VMError> {
                let op = Opcode::try_from(opcode)?;
                let expected = op.size() - 1;
                if operands.len() != expected {
                    return Err(VMError::MalformedInstruction {
                        mnemonic: op.mnemonic(),
                        expected,
                        actual: operands.len(),
                    });
                }

                let mut input = operands;
                let instr = match op {
                    $(
                        Opcode::$name => Instruction::$name {
                            $( $field: define_instructions!(@read input, $kind, op)?, )*
                        },
                    )*
                };
                Ok(instr)
            }
        }

        impl fmt::Display for Instruction {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(
                        Instruction::$name { $( $field ),* } => {
                            f.write_str($mnemonic)?;
                            $( define_instructions!(@fmt f, $kind, $field); )*
                            Ok(())
                        }
                    )*
                }
            }
        }
    };

    // ---------- types ----------
    (@ty Reg)    => { Register };
    (@ty Target) => { u64 };
    (@ty Imm)    => { u64 };
    (@ty Id)     => { u64 };

    // ---------- sizes ----------
    (@size Reg)    => { 1usize };
    (@size Target) => { 8usize };
    (@size Imm)    => { 8usize };
    (@size Id)     => { 8usize };

    (@one $x:ident) => { 1usize };

    // ---------- encoding ----------
    (@emit $out:ident, Reg, $v:ident) => {
        $out.push($v.id());
    };

    (@emit $out:ident, $kind:ident, $v:ident) => {
        $out.extend_from_slice(&$v.to_be_bytes());
    };

    // ---------- decoding ----------
    (@read $input:ident, Reg, $op:ident) => {
        read_operand::<u8>(&mut $input, $op).and_then(Register::try_from)
    };

    (@read $input:ident, $kind:ident, $op:ident) => {
        read_operand::<u64>(&mut $input, $op)
    };

    // ---------- disassembly ----------
    (@fmt $f:ident, Reg, $v:ident) => {
        write!($f, " {}", $v)?;
    };

    (@fmt $f:ident, Imm, $v:ident) => {
        write!($f, " @{}", $v)?;
    };

    (@fmt $f:ident, $kind:ident, $v:ident) => {
        write!($f, " {}", $v)?;
    };
}

/// Reads one fixed-width operand, reporting a short read as malformed.
fn read_operand<T: Decode>(input: &mut &[u8], op: Opcode) -> Result<T, VMError> {
    T::decode(input).map_err(|_| VMError::MalformedInstruction {
        mnemonic: op.mnemonic(),
        expected: op.size() - 1,
        actual: input.len(),
    })
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Encoded width in bytes.
    pub const fn size(&self) -> usize {
        self.opcode().size()
    }
}

/// Encodes a sequence of instructions back to back.
pub fn encode_program(instructions: &[Instruction]) -> Vec<u8> {
    let mut out = Vec::with_capacity(instructions.iter().map(Instruction::size).sum());
    for instr in instructions {
        instr.encode(&mut out);
    }
    out
}

/// Splits an instruction stream into decoded instructions.
///
/// Fails with [`VMError::UnknownOpcode`] on an unrecognized opcode and
/// [`VMError::InstructionSizeMismatch`] when the last instruction is cut short.
pub fn decode_program(code: &[u8]) -> Result<Vec<Instruction>, VMError> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let op = Opcode::try_from(opcode)?;
        let end = offset + op.size();
        if end > code.len() {
            return Err(VMError::InstructionSizeMismatch {
                mnemonic: op.mnemonic(),
                offset,
            });
        }
        out.push(Instruction::decode(opcode, &code[offset + 1..end])?);
        offset = end;
    }
    Ok(out)
}
