//! Phase 3: directive resolution.
//!
//! | directive                 | effect                                   |
//! |---------------------------|------------------------------------------|
//! | `.init <label>`           | entry point; must be the first directive |
//! | `.debug <0-3>`            | debug level                              |
//! | `.string <name> "<text>"` | string constant, raw bytes               |
//! | `.float <name> <value>`   | 64-bit float constant                    |
//! | `.u8` .. `.u64 <name> <n>` | unsigned constant                       |
//! | `.i8` .. `.i64 <name> <n>` | signed constant                         |
//!
//! Integer values are decimal or `0x` hexadecimal and must fit the type.

use super::{AsmContext, DirectiveLine, is_identifier, parse_integer, unquote};
use crate::virtual_machine::errors::{AsmError, AsmErrorKind};
use crate::virtual_machine::program::{Constant, DebugLevel};

fn malformed(line: usize, detail: impl Into<String>) -> AsmError {
    AsmError::new(AsmErrorKind::MalformedDirective, line, detail)
}

fn out_of_range(line: usize, detail: impl Into<String>) -> AsmError {
    AsmError::new(AsmErrorKind::ValueOutOfRange, line, detail)
}

fn expect_arity(args: &[&str], n: usize, directive: &str, line: usize) -> Result<(), AsmError> {
    if args.len() != n {
        return Err(malformed(
            line,
            format!("{directive} expects {n} arguments, got {}", args.len()),
        ));
    }
    Ok(())
}

/// Parses an integer constant that must fit `T`.
fn integer<T: TryFrom<i128>>(text: &str, directive: &str, line: usize) -> Result<T, AsmError> {
    parse_integer(text)
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| out_of_range(line, format!("`{text}` does not fit {directive}")))
}

/// Builds the constant declared by a typed directive.
fn constant(directive: &str, value: &str, line: usize) -> Result<Constant, AsmError> {
    Ok(match directive {
        ".string" => Constant::String(
            unquote(value)
                .ok_or_else(|| malformed(line, format!("`{value}` is not a string literal")))?
                .to_string(),
        ),
        ".float" => Constant::Float(
            value
                .parse::<f64>()
                .map_err(|_| out_of_range(line, format!("`{value}` is not a float")))?,
        ),
        ".u8" => Constant::U8(integer(value, directive, line)?),
        ".u16" => Constant::U16(integer(value, directive, line)?),
        ".u32" => Constant::U32(integer(value, directive, line)?),
        ".u64" => Constant::U64(integer(value, directive, line)?),
        ".i8" => Constant::I8(integer(value, directive, line)?),
        ".i16" => Constant::I16(integer(value, directive, line)?),
        ".i32" => Constant::I32(integer(value, directive, line)?),
        ".i64" => Constant::I64(integer(value, directive, line)?),
        other => return Err(malformed(line, format!("unknown directive `{other}`"))),
    })
}

fn resolve_one(ctx: &mut AsmContext, index: usize, d: &DirectiveLine<'_>) -> Result<(), AsmError> {
    let line = d.number;
    let directive = d.tokens[0].text;
    let args: Vec<&str> = d.tokens[1..].iter().map(|t| t.text).collect();

    match directive {
        ".init" => {
            if index != 0 {
                return Err(malformed(line, ".init must be the first directive"));
            }
            expect_arity(&args, 1, directive, line)?;
            ctx.entry = Some(ctx.resolve_label(args[0], line)?);
        }
        ".debug" => {
            expect_arity(&args, 1, directive, line)?;
            if ctx.debug.is_some() {
                return Err(malformed(line, "debug level is already set"));
            }
            let level = parse_integer(args[0])
                .and_then(|v| u8::try_from(v).ok())
                .and_then(|v| DebugLevel::from_u8(v).ok())
                .ok_or_else(|| out_of_range(line, format!("debug level `{}` is not 0-3", args[0])))?;
            ctx.debug = Some(level);
        }
        _ => {
            expect_arity(&args, 2, directive, line)?;
            let name = args[0];
            if !is_identifier(name) {
                return Err(malformed(line, format!("invalid constant name `{name}`")));
            }
            let value = constant(directive, args[1], line)?;
            ctx.define_constant(name, value, line)?;
        }
    }
    Ok(())
}

/// Runs phase 3 over the directives found before `.code`.
pub(super) fn resolve(directives: &[DirectiveLine<'_>], ctx: &mut AsmContext) {
    for (index, d) in directives.iter().enumerate() {
        if let Err(err) = resolve_one(ctx, index, d) {
            ctx.push_error(err);
        }
    }
    if ctx.entry.is_none() && !ctx.has_errors() {
        ctx.push_error(AsmError::new(
            AsmErrorKind::MissingInitOrCode,
            0,
            "no .init directive",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{assemble_err, assemble_ok};

    fn program(directives: &str) -> String {
        format!(".init main\n{directives}\n.code\nmain:\n    exit\n")
    }

    fn first_error(directives: &str) -> AsmError {
        assemble_err(&program(directives)).remove(0)
    }

    #[test]
    fn typed_constants() {
        let exe = assemble_ok(&program(
            ".u8 a 255\n.i8 b -128\n.u16 c 0xFFFF\n.i32 d -5\n.u64 e 0x10\n.float f 2.5\n.string s \"hi there\"",
        ));
        assert_eq!(
            exe.constants,
            vec![
                Constant::U8(255),
                Constant::I8(-128),
                Constant::U16(0xFFFF),
                Constant::I32(-5),
                Constant::U64(16),
                Constant::Float(2.5),
                Constant::String("hi there".into()),
            ]
        );
    }

    #[test]
    fn strings_are_raw() {
        let exe = assemble_ok(&program(r#".string s "a\nb""#));
        assert_eq!(exe.constants, vec![Constant::String(r"a\nb".into())]);
    }

    #[test]
    fn debug_level() {
        let exe = assemble_ok(&program(".debug 3"));
        assert_eq!(exe.debug, DebugLevel::Extreme);
        let exe = assemble_ok(&program(""));
        assert_eq!(exe.debug, DebugLevel::None);

        assert_eq!(first_error(".debug 4").kind(), AsmErrorKind::ValueOutOfRange);
        assert_eq!(
            first_error(".debug 1\n.debug 2").kind(),
            AsmErrorKind::MalformedDirective
        );
    }

    #[test]
    fn values_out_of_range() {
        for d in [".u8 a 256", ".i8 a 128", ".u16 a -1", ".i64 a 0x8000000000000000", ".float a x"] {
            assert_eq!(first_error(d).kind(), AsmErrorKind::ValueOutOfRange, "{d}");
        }
    }

    #[test]
    fn init_rules() {
        let errors = assemble_err(".debug 1\n.init main\n.code\nmain:\n exit\n");
        assert_eq!(errors[0].kind(), AsmErrorKind::MalformedDirective);
        assert_eq!(errors[0].line(), 2);

        let errors = assemble_err(".init start\n.code\nmain:\n exit\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), AsmErrorKind::UnknownLabel);

        let errors = assemble_err(".init main\n.init main\n.code\nmain:\n exit\n");
        assert_eq!(errors[0].kind(), AsmErrorKind::MalformedDirective);
    }

    #[test]
    fn duplicate_constants() {
        assert_eq!(
            first_error(".u8 a 1\n.u16 a 2").kind(),
            AsmErrorKind::DuplicateConstant
        );
        assert_eq!(first_error(".u8 main 1").kind(), AsmErrorKind::DuplicateConstant);
    }

    #[test]
    fn malformed_directives() {
        for d in [".bogus a 1", ".u8 a", ".u8 a 1 2", ".string s abc", ".u8 a-b 1"] {
            assert_eq!(first_error(d).kind(), AsmErrorKind::MalformedDirective, "{d}");
        }
    }

    #[test]
    fn errors_accumulate_across_directives() {
        let errors = assemble_err(&program(".u8 a 300\n.bogus\n.i8 b 1"));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line(), 2);
        assert_eq!(errors[1].line(), 3);
    }
}
