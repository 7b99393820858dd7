//! Assembly language parser and image builder.
//!
//! Converts human-readable assembly source into a serialized [`Executable`]
//! image. Assembly runs in four phases, each over the whole source:
//!
//! 1. [`macros`]: strip comments and blank lines, record `#macro` blocks and
//!    expand `#NAME` invocations.
//! 2. Structural scan: split directives from code, bind labels to instruction
//!    indices and register `interrupt_<n>` handlers.
//! 3. [`directives`]: resolve `.init`, `.debug` and the constant directives.
//! 4. [`builders`]: build every instruction, resolving registers and sigils.
//!
//! Errors accumulate within a phase; a phase with errors stops the pipeline
//! and no image is produced.
//!
//! # Syntax
//!
//! ```text
//! .init main              ; first directive, names the entry label
//! .debug 1
//! .string greeting "hi"
//! .code
//! main:
//!     mov i0 @5           ; @n literal, &name address, #name length
//!     exit
//! ```
//!
//! - Mnemonics and register names are lowercase.
//! - `;` starts a comment outside string literals.
//! - Operands are separated by whitespace; commas are optional.
//! - A label stands alone on its line.

mod builders;
mod directives;
mod macros;

use crate::types::encoding::Encode;
use crate::virtual_machine::errors::{AsmError, AsmErrorKind, VMError};
use crate::virtual_machine::isa::{Instruction, Opcode};
use crate::virtual_machine::program::{
    Constant, DebugLevel, Executable, InterruptEntry, SEMANTIC_VERSION, SectionEntry,
};
use crate::{error, warn};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';
const CODE_DIRECTIVE: &str = ".code";
const INTERRUPT_PREFIX: &str = "interrupt_";

/// Formats a compiler-style diagnostic for an assembly error.
///
/// Line 0 refers to the file as a whole and prints no source excerpt.
pub fn render_assembly_diagnostic(file: &str, source: &str, line: usize, message: &str) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    if line == 0 {
        let _ = write!(diag, " --> {file}");
        return diag;
    }
    let _ = writeln!(diag, " --> {file}:{line}");

    if let Some(raw_line) = source.lines().nth(line - 1) {
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, raw_line.trim_end_matches('\r'));
        let _ = write!(diag, "  |");
    }

    diag
}

/// Emit a diagnostic for one assembly error through the logger.
fn log_assembly_error(file: &str, source: &str, err: &AsmError) {
    error!(
        tag: "asm",
        "{}",
        render_assembly_diagnostic(file, source, err.line(), &err.message())
    );
}

/// Byte counts of a successful assembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssembleStats {
    /// Instructions generated.
    pub instructions: usize,
    /// Length of the serialized image.
    pub bytes: usize,
}

/// Result of an assembly run.
///
/// `binary` is present exactly when `errors` is empty.
#[derive(Debug, Clone, Default)]
pub struct Assembled {
    pub binary: Option<Vec<u8>>,
    pub stats: AssembleStats,
    pub errors: Vec<AsmError>,
    pub warnings: Vec<String>,
}

impl Assembled {
    pub fn succeeded(&self) -> bool {
        self.binary.is_some()
    }
}

/// Constant as seen by sigil resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConstantRef {
    /// Offset of the first byte in the constant pool.
    address: u64,
    /// Pool bytes occupied, the value of `#name`.
    data_len: u64,
}

/// State threaded through the assembly phases.
///
/// Tracks labels, constants and interrupt handlers encountered during
/// assembly, along with the accumulated errors and warnings.
pub struct AsmContext {
    /// Label definitions mapping names to instruction indices.
    labels: HashMap<String, u64>,
    constant_refs: HashMap<String, ConstantRef>,
    /// Constants in declaration order.
    constants: Vec<Constant>,
    pool_len: u64,
    interrupts: BTreeMap<u64, u64>,
    entry: Option<u64>,
    debug: Option<DebugLevel>,
    errors: Vec<AsmError>,
    warnings: Vec<String>,
}

impl AsmContext {
    /// Creates an empty assembly context.
    pub fn new() -> Self {
        Self {
            labels: HashMap::new(),
            constant_refs: HashMap::new(),
            constants: Vec::new(),
            pool_len: 0,
            interrupts: BTreeMap::new(),
            entry: None,
            debug: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Registers a label at the given instruction index.
    pub(crate) fn define_label(&mut self, name: &str, index: u64, line: usize) -> Result<(), AsmError> {
        if self.labels.contains_key(name) {
            return Err(AsmError::new(
                AsmErrorKind::DuplicateLabel,
                line,
                format!("label `{name}` is already defined"),
            ));
        }
        self.labels.insert(name.to_string(), index);
        Ok(())
    }

    /// Resolves a label to its instruction index.
    pub(crate) fn resolve_label(&self, name: &str, line: usize) -> Result<u64, AsmError> {
        self.labels.get(name).copied().ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::UnknownLabel,
                line,
                format!("label `{name}` is not defined"),
            )
        })
    }

    /// Appends a constant to the pool under `name`.
    fn define_constant(&mut self, name: &str, value: Constant, line: usize) -> Result<(), AsmError> {
        if self.constant_refs.contains_key(name) || self.labels.contains_key(name) {
            return Err(AsmError::new(
                AsmErrorKind::DuplicateConstant,
                line,
                format!("`{name}` is already defined"),
            ));
        }
        let data_len = value.data_len();
        self.constant_refs.insert(
            name.to_string(),
            ConstantRef {
                address: self.pool_len,
                data_len,
            },
        );
        self.pool_len += data_len;
        self.constants.push(value);
        Ok(())
    }

    fn push_error(&mut self, err: AsmError) {
        self.errors.push(err);
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Every label as a section, ordered by index then name.
    fn sections(&self) -> Vec<SectionEntry> {
        let mut sections: Vec<SectionEntry> = self
            .labels
            .iter()
            .map(|(name, &address)| SectionEntry {
                address,
                name: name.clone(),
            })
            .collect();
        sections.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name)));
        sections
    }

    fn finish(self, executable: Option<Executable>) -> Assembled {
        let mut out = Assembled {
            binary: None,
            stats: AssembleStats::default(),
            errors: self.errors,
            warnings: self.warnings,
        };
        if let Some(exe) = executable.filter(|_| out.errors.is_empty()) {
            let binary = exe.to_bytes();
            out.stats = AssembleStats {
                instructions: exe.instructions.len(),
                bytes: binary.len(),
            };
            out.binary = Some(binary);
        }
        out
    }
}

impl Default for AsmContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A source line after comment stripping and macro expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    /// 1-based line in the original source.
    number: usize,
    text: String,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - whitespace and commas separate tokens
/// - a double-quoted string is one token, quotes included
fn tokenize(line: &str, number: usize, kind: AsmErrorKind) -> Result<Vec<Token<'_>>, AsmError> {
    let mut out = Vec::with_capacity(4);
    let mut start: Option<usize> = None;
    let mut in_str = false;

    for (i, b) in line.bytes().enumerate() {
        match b {
            b'"' => {
                if start.is_none() {
                    start = Some(i);
                }
                in_str = !in_str;
            }
            b',' | b' ' | b'\t' if !in_str => {
                if let Some(s) = start.take() {
                    out.push(Token { text: &line[s..i] });
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }

    if in_str {
        return Err(AsmError::new(
            kind,
            number,
            "unterminated string literal (missing closing quote)",
        ));
    }
    if let Some(s) = start {
        out.push(Token { text: &line[s..] });
    }
    Ok(out)
}

/// Cuts a line at the first comment character outside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut in_str = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_str = !in_str,
            COMMENT_CHAR if !in_str => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Contents of a `"..."` token.
fn unquote(tok: &str) -> Option<&str> {
    if tok.len() < 2 {
        return None;
    }
    tok.strip_prefix('"')?.strip_suffix('"')
}

/// Names of labels, constants and macros: `[A-Za-z0-9_]+`.
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Parses a decimal or `0x` hexadecimal integer with an optional `-`.
pub(crate) fn parse_integer(text: &str) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            i128::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse::<i128>().ok()?
        }
        None => return None,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// An instruction line found by the structural scan.
#[derive(Debug, Clone)]
struct CodeLine<'a> {
    number: usize,
    opcode: Opcode,
    /// Mnemonic followed by the operand tokens.
    tokens: Vec<Token<'a>>,
}

/// A directive line found before `.code`.
#[derive(Debug, Clone)]
struct DirectiveLine<'a> {
    number: usize,
    tokens: Vec<Token<'a>>,
}

#[derive(Debug, Default)]
struct Scan<'a> {
    directives: Vec<DirectiveLine<'a>>,
    code: Vec<CodeLine<'a>>,
}

/// Splits expanded lines into directives and instructions.
///
/// Labels are bound to the number of instructions seen before them. A label
/// named `interrupt_<n>` also registers the handler of interrupt `n`.
fn scan<'a>(lines: &'a [Line], ctx: &mut AsmContext) -> Scan<'a> {
    let mut out = Scan::default();
    let mut code_seen = false;

    for line in lines {
        let number = line.number;
        let tokens = match tokenize(&line.text, number, AsmErrorKind::MalformedDirective) {
            Ok(tokens) if !tokens.is_empty() => tokens,
            Ok(_) => continue,
            Err(err) => {
                ctx.push_error(err);
                continue;
            }
        };
        let head = tokens[0].text;

        if head.starts_with('.') {
            if head == CODE_DIRECTIVE {
                if code_seen {
                    ctx.push_error(AsmError::new(
                        AsmErrorKind::MalformedDirective,
                        number,
                        "second .code directive",
                    ));
                } else if tokens.len() != 1 {
                    ctx.push_error(AsmError::new(
                        AsmErrorKind::MalformedDirective,
                        number,
                        ".code takes no arguments",
                    ));
                }
                code_seen = true;
            } else if code_seen {
                ctx.push_error(AsmError::new(
                    AsmErrorKind::MalformedDirective,
                    number,
                    format!("directive `{head}` after .code"),
                ));
            } else {
                out.directives.push(DirectiveLine { number, tokens });
            }
            continue;
        }

        if !code_seen {
            ctx.push_error(AsmError::new(
                AsmErrorKind::MalformedDirective,
                number,
                format!("`{head}` appears before .code"),
            ));
            continue;
        }

        if let Some(name) = head.strip_suffix(LABEL_SUFFIX) {
            if let Err(err) = bind_label(ctx, name, &tokens, out.code.len() as u64, number) {
                ctx.push_error(err);
            }
            continue;
        }

        match Opcode::from_mnemonic(head) {
            Some(opcode) => out.code.push(CodeLine {
                number,
                opcode,
                tokens,
            }),
            None => ctx.push_error(AsmError::new(
                AsmErrorKind::UnknownMnemonic,
                number,
                format!("`{head}`"),
            )),
        }
    }

    if !code_seen {
        ctx.push_error(AsmError::new(
            AsmErrorKind::MissingInitOrCode,
            0,
            "no .code directive",
        ));
    }
    out
}

fn bind_label(
    ctx: &mut AsmContext,
    name: &str,
    tokens: &[Token<'_>],
    index: u64,
    line: usize,
) -> Result<(), AsmError> {
    if !is_identifier(name) {
        return Err(AsmError::new(
            AsmErrorKind::MalformedDirective,
            line,
            format!("invalid label name `{name}`"),
        ));
    }
    if tokens.len() > 1 {
        return Err(AsmError::new(
            AsmErrorKind::MalformedDirective,
            line,
            format!("label `{name}` must stand alone on its line"),
        ));
    }
    ctx.define_label(name, index, line)?;

    let Some(id) = name
        .strip_prefix(INTERRUPT_PREFIX)
        .and_then(parse_integer)
        .and_then(|n| u64::try_from(n).ok())
    else {
        return Ok(());
    };
    if ctx.interrupts.insert(id, index).is_some() {
        return Err(AsmError::new(
            AsmErrorKind::DuplicateLabel,
            line,
            format!("interrupt {id} already has a handler"),
        ));
    }
    Ok(())
}

/// Runs the four phases over `source`.
fn assemble(source: &str) -> Assembled {
    let mut ctx = AsmContext::new();

    let lines = macros::expand(source, &mut ctx);
    if ctx.has_errors() {
        return ctx.finish(None);
    }

    let scanned = scan(&lines, &mut ctx);
    if ctx.has_errors() {
        return ctx.finish(None);
    }

    directives::resolve(&scanned.directives, &mut ctx);
    if ctx.has_errors() {
        return ctx.finish(None);
    }

    let mut instructions = Vec::with_capacity(scanned.code.len());
    for line in &scanned.code {
        match builders::parse_instruction(&ctx, line) {
            Ok(instr) => {
                if let Instruction::Mov { dest, .. } = instr
                    && dest.is_constant()
                {
                    ctx.warnings.push(format!(
                        "line {}: mov into {dest} has no effect, constant registers are reset every cycle",
                        line.number
                    ));
                }
                instructions.push(instr);
            }
            Err(err) => {
                ctx.push_error(err);
                return ctx.finish(None);
            }
        }
    }

    let Some(entry) = ctx.entry else {
        return ctx.finish(None);
    };
    let executable = Executable {
        version: SEMANTIC_VERSION,
        debug: ctx.debug.unwrap_or_default(),
        sections: ctx.sections(),
        interrupts: ctx
            .interrupts
            .iter()
            .map(|(&id, &address)| InterruptEntry { id, address })
            .collect(),
        constants: ctx.constants.clone(),
        entry,
        instructions,
        warnings: Vec::new(),
    };
    ctx.finish(Some(executable))
}

/// Assemble a full source string into an image.
pub fn assemble_source(source: &str) -> Assembled {
    assemble_source_with_name(source, "<source>")
}

/// Assembles source with an associated filename for error diagnostics.
///
/// Logs a compiler-style diagnostic for every error and a warning line for
/// every warning.
pub fn assemble_source_with_name(source: &str, source_name: &str) -> Assembled {
    let assembled = assemble(source);
    for err in &assembled.errors {
        log_assembly_error(source_name, source, err);
    }
    for warning in &assembled.warnings {
        warn!(tag: "asm", "{source_name}: {warning}");
    }
    assembled
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Assembled, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::Io {
        path: path_ref.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(assemble_source_with_name(
        &source,
        &path_ref.display().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{assemble_err, assemble_ok, labelled_program};
    use crate::virtual_machine::register::Register;

    const ADD_PROGRAM: &str = "
.init main
.code
main:
    mov i0 @5
    mov i1 @7
    add i2 i0 i1
    exit
";

    fn kinds(errors: &[AsmError]) -> Vec<AsmErrorKind> {
        errors.iter().map(AsmError::kind).collect()
    }

    #[test]
    fn strip_comment_respects_strings() {
        assert_eq!(strip_comment("mov i0 @1 ; load"), "mov i0 @1 ");
        assert_eq!(strip_comment(r#".string s "a;b" ; c"#), r#".string s "a;b" "#);
        assert_eq!(strip_comment("; only"), "");
    }

    #[test]
    fn tokenize_keeps_quoted_strings() {
        let tokens = tokenize(r#".string msg "hello world""#, 1, AsmErrorKind::MalformedDirective).unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec![".string", "msg", "\"hello world\""]);

        let tokens = tokenize("add i0, i1,i2", 1, AsmErrorKind::MalformedDirective).unwrap();
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn tokenize_unterminated_string() {
        let err = tokenize(r#".string s "abc"#, 3, AsmErrorKind::MalformedDirective).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::MalformedDirective);
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn parse_integer_forms() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-42"), Some(-42));
        assert_eq!(parse_integer("0xff"), Some(255));
        assert_eq!(parse_integer("-0x10"), Some(-16));
        assert_eq!(parse_integer(""), None);
        assert_eq!(parse_integer("0x"), None);
        assert_eq!(parse_integer("+5"), None);
        assert_eq!(parse_integer("--5"), None);
        assert_eq!(parse_integer("12a"), None);
    }

    #[test]
    fn assemble_add_program() {
        let assembled = assemble_source(ADD_PROGRAM);
        assert!(assembled.errors.is_empty());
        assert_eq!(assembled.stats.instructions, 4);
        assert_eq!(
            assembled.stats.bytes,
            assembled.binary.as_ref().map(Vec::len).unwrap()
        );

        let exe = assemble_ok(ADD_PROGRAM);
        assert_eq!(exe.entry, 0);
        assert_eq!(
            exe.instructions,
            vec![
                Instruction::Mov {
                    dest: Register::I0,
                    value: 5
                },
                Instruction::Mov {
                    dest: Register::I1,
                    value: 7
                },
                Instruction::Add {
                    dest: Register::I2,
                    lhs: Register::I0,
                    rhs: Register::I1
                },
                Instruction::Exit {},
            ]
        );
        assert_eq!(exe.section_address("main"), Some(0));
    }

    #[test]
    fn assembly_is_deterministic() {
        let source = "
.init start
.string b \"bee\"
.u32 a 7
.code
zeta:
alpha:
start:
    mov i0 &a
    jmp alpha
interrupt_2:
    ret
interrupt_1:
    ret
";
        let first = assemble_source(source).binary.unwrap();
        let second = assemble_source(source).binary.unwrap();
        assert_eq!(first, second);

        let exe = Executable::from_bytes(&first).unwrap();
        let names: Vec<&str> = exe.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "start", "zeta", "interrupt_2", "interrupt_1"]);
        assert_eq!(
            exe.interrupts,
            vec![
                InterruptEntry { id: 1, address: 3 },
                InterruptEntry { id: 2, address: 2 }
            ]
        );
    }

    #[test]
    fn constant_addressing() {
        let exe = assemble_ok(
            "
.init main
.u16 first 1
.string name \"abc\"
.code
main:
    mov i0 &name
    mov i1 #name
    mov i2 #main
    mov i3 &main
    exit
",
        );
        assert_eq!(
            &exe.instructions[..4],
            &[
                Instruction::Mov {
                    dest: Register::I0,
                    value: 2
                },
                Instruction::Mov {
                    dest: Register::I1,
                    value: 3
                },
                Instruction::Mov {
                    dest: Register::I2,
                    value: 8
                },
                Instruction::Mov {
                    dest: Register::I3,
                    value: 0
                },
            ]
        );
        assert_eq!(exe.pool(), vec![0, 1, b'a', b'b', b'c']);
    }

    #[test]
    fn immediate_literals() {
        let exe = assemble_ok(
            "
.init main
.code
main:
    mov i0 @-1
    mov i1 @0x10
    mov f0 @18446744073709551615
    syscall 1
    debug @3
",
        );
        assert_eq!(
            exe.instructions,
            vec![
                Instruction::Mov {
                    dest: Register::I0,
                    value: u64::MAX
                },
                Instruction::Mov {
                    dest: Register::I1,
                    value: 16
                },
                Instruction::Mov {
                    dest: Register::F0,
                    value: u64::MAX
                },
                Instruction::Syscall { id: 1 },
                Instruction::Debug { id: 3 },
            ]
        );
    }

    #[test]
    fn label_resolution_matches_definitions() {
        for blocks in [1, 2, 5, 17] {
            let program = labelled_program(blocks);
            let exe = assemble_ok(&program.source);
            for (name, index) in &program.labels {
                assert_eq!(exe.section_address(name), Some(*index), "{name}");
            }
            for (at, label) in &program.targets {
                let expected = exe.section_address(label).unwrap();
                let target = match exe.instructions[*at] {
                    Instruction::Jmp { target }
                    | Instruction::Call { target }
                    | Instruction::Beq { target, .. } => target,
                    other => panic!("unexpected {other}"),
                };
                assert_eq!(target, expected);
            }
        }
    }

    #[test]
    fn missing_code_and_init() {
        let errors = assemble_err(".init main\n");
        assert_eq!(kinds(&errors), vec![AsmErrorKind::MissingInitOrCode]);
        assert_eq!(errors[0].line(), 0);

        let errors = assemble_err(".code\nmain:\n exit\n");
        assert_eq!(kinds(&errors), vec![AsmErrorKind::MissingInitOrCode]);
    }

    #[test]
    fn structural_errors_accumulate() {
        let errors = assemble_err(
            "
.init main
.code
main:
main:
    frob i0
.code
.string s \"x\"
done: exit
",
        );
        assert_eq!(
            kinds(&errors),
            vec![
                AsmErrorKind::DuplicateLabel,
                AsmErrorKind::UnknownMnemonic,
                AsmErrorKind::MalformedDirective,
                AsmErrorKind::MalformedDirective,
                AsmErrorKind::MalformedDirective,
            ]
        );
        assert_eq!(errors[0].line(), 5);
        assert_eq!(errors[1].line(), 6);
    }

    #[test]
    fn instruction_before_code() {
        let errors = assemble_err("mov i0 @1\n.code\n");
        assert_eq!(errors[0].kind(), AsmErrorKind::MalformedDirective);
        assert_eq!(errors[0].line(), 1);
    }

    #[test]
    fn duplicate_interrupt_number() {
        let errors = assemble_err(
            "
.init main
.code
main:
interrupt_1:
interrupt_01:
    exit
",
        );
        assert_eq!(kinds(&errors), vec![AsmErrorKind::DuplicateLabel]);
    }

    #[test]
    fn instruction_errors() {
        let cases = [
            ("add i0 i1", AsmErrorKind::MalformedDirective),
            ("mov q9 @1", AsmErrorKind::InvalidRegister),
            ("jmp nowhere", AsmErrorKind::UnknownLabel),
            ("mov i0 &nowhere", AsmErrorKind::UnknownLabel),
            ("mov i0 5", AsmErrorKind::ValueOutOfRange),
            ("mov i0 @18446744073709551616", AsmErrorKind::ValueOutOfRange),
            ("syscall -1", AsmErrorKind::ValueOutOfRange),
        ];
        for (instr, kind) in cases {
            let source = format!(".init main\n.code\nmain:\n    {instr}\n    {instr}\n");
            let errors = assemble_err(&source);
            assert_eq!(kinds(&errors), vec![kind], "{instr}");
            assert_eq!(errors[0].line(), 4);
        }
    }

    #[test]
    fn mov_into_constant_register_warns() {
        let assembled = assemble_source(".init main\n.code\nmain:\n mov x0 @1\n exit\n");
        assert!(assembled.succeeded());
        assert_eq!(assembled.warnings.len(), 1);
        assert!(assembled.warnings[0].contains("x0"));
    }

    #[test]
    fn failed_assembly_has_no_binary() {
        let assembled = assemble_source(".init main\n.code\nmain:\n jmp out\n");
        assert!(!assembled.succeeded());
        assert_eq!(assembled.stats, AssembleStats::default());
    }

    #[test]
    fn diagnostic_shows_source_line() {
        let diag = render_assembly_diagnostic("prog.asm", "a\nbad line\nc", 2, "unknown mnemonic: `bad`");
        assert!(diag.starts_with("error: unknown mnemonic: `bad`\n --> prog.asm:2\n"));
        assert!(diag.contains("   2 | bad line"));

        let diag = render_assembly_diagnostic("prog.asm", "", 0, "missing .init or .code");
        assert_eq!(diag, "error: missing .init or .code\n --> prog.asm");
    }

    #[test]
    fn assemble_file_missing() {
        assert!(matches!(
            assemble_file("/definitely/not/here.asm"),
            Err(VMError::Io { .. })
        ));
    }
}
