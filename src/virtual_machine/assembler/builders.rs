//! Phase 4: instruction builders.
//!
//! Generated from [`for_each_instruction!`](crate::for_each_instruction), so
//! every opcode gets an operand-count check and one parser per operand kind:
//!
//! - `Reg`: a register name (`i0`, `f3`, `sp`, ...)
//! - `Target`: a label name
//! - `Imm`: `@n` literal, `&name` address of a label or constant, `#name`
//!   length of a constant (8 for a label)
//! - `Id`: a non-negative number, optionally written `@n`

use super::{AsmContext, CodeLine, parse_integer};
use crate::for_each_instruction;
use crate::virtual_machine::errors::{AsmError, AsmErrorKind};
use crate::virtual_machine::isa::{Instruction, Opcode};
use crate::virtual_machine::register::Register;

/// `#name` of a label: the width of an address.
const ADDRESS_LEN: u64 = 8;

/// Parse a register token like `i0`, `f9`, `op`.
fn parse_register(tok: &str, line: usize) -> Result<Register, AsmError> {
    Register::from_name(tok).ok_or_else(|| {
        AsmError::new(
            AsmErrorKind::InvalidRegister,
            line,
            format!("`{tok}` is not a register"),
        )
    })
}

fn parse_target(ctx: &AsmContext, tok: &str, line: usize) -> Result<u64, AsmError> {
    ctx.resolve_label(tok, line)
}

fn literal(tok: &str, text: &str, line: usize) -> Result<u64, AsmError> {
    parse_integer(text)
        .and_then(|v| {
            if v < 0 {
                i64::try_from(v).ok().map(|v| v as u64)
            } else {
                u64::try_from(v).ok()
            }
        })
        .ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::ValueOutOfRange,
                line,
                format!("`{tok}` is not a 64-bit integer"),
            )
        })
}

fn unknown_name(name: &str, line: usize) -> AsmError {
    AsmError::new(
        AsmErrorKind::UnknownLabel,
        line,
        format!("`{name}` is neither a label nor a constant"),
    )
}

/// Resolves an immediate written with one of the three sigils.
fn parse_value(ctx: &AsmContext, tok: &str, line: usize) -> Result<u64, AsmError> {
    if let Some(text) = tok.strip_prefix('@') {
        return literal(tok, text, line);
    }
    if let Some(name) = tok.strip_prefix('&') {
        if let Some(&index) = ctx.labels.get(name) {
            return Ok(index);
        }
        return ctx
            .constant_refs
            .get(name)
            .map(|c| c.address)
            .ok_or_else(|| unknown_name(name, line));
    }
    if let Some(name) = tok.strip_prefix('#') {
        if ctx.labels.contains_key(name) {
            return Ok(ADDRESS_LEN);
        }
        return ctx
            .constant_refs
            .get(name)
            .map(|c| c.data_len)
            .ok_or_else(|| unknown_name(name, line));
    }
    Err(AsmError::new(
        AsmErrorKind::ValueOutOfRange,
        line,
        format!("immediate `{tok}` needs an @, & or # prefix"),
    ))
}

fn parse_id(tok: &str, line: usize) -> Result<u64, AsmError> {
    let text = tok.strip_prefix('@').unwrap_or(tok);
    parse_integer(text)
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::ValueOutOfRange,
                line,
                format!("`{tok}` is not a valid id"),
            )
        })
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// Builds the instruction on `line`, resolving operands against `ctx`.
        pub(super) fn parse_instruction(
            ctx: &AsmContext,
            line: &CodeLine<'_>,
        ) -> Result<Instruction, AsmError> {
            let operands = &line.tokens[1..];
            match line.opcode {
                $(
                    Opcode::$name => {
                        let expected = Opcode::$name.arity();
                        if operands.len() != expected {
                            return Err(AsmError::new(
                                AsmErrorKind::MalformedDirective,
                                line.number,
                                format!(
                                    "`{}` expects {} operands, got {}",
                                    $mnemonic,
                                    expected,
                                    operands.len()
                                ),
                            ));
                        }

                        define_parse_instruction!(
                            @construct ctx line operands; $name $( $field : $kind ),*
                        )
                    }
                )*
            }
        }
    };

    // ---------- construction ----------
    (@construct $ctx:ident $line:ident $ops:ident; $name:ident) => {
        Ok(Instruction::$name {})
    };

    (@construct $ctx:ident $line:ident $ops:ident; $name:ident $( $field:ident : $kind:ident ),+ ) => {{
        let mut it = $ops.iter().map(|t| t.text);
        Ok(Instruction::$name {
            $(
                $field: define_parse_instruction!(
                    @parse_operand $kind, it.next().unwrap_or_default(), $ctx, $line
                )?,
            )*
        })
    }};

    // ---------- operands ----------
    (@parse_operand Reg, $tok:expr, $ctx:ident, $line:ident) => {
        parse_register($tok, $line.number)
    };

    (@parse_operand Target, $tok:expr, $ctx:ident, $line:ident) => {
        parse_target($ctx, $tok, $line.number)
    };

    (@parse_operand Imm, $tok:expr, $ctx:ident, $line:ident) => {
        parse_value($ctx, $tok, $line.number)
    };

    (@parse_operand Id, $tok:expr, $ctx:ident, $line:ident) => {
        parse_id($tok, $line.number)
    };
}

for_each_instruction!(define_parse_instruction);
