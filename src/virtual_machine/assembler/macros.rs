//! Phase 1: comment stripping and macro expansion.
//!
//! ```text
//! #macro PRINT_LINE "mov i4 @1" \
//!                   "syscall 1"
//! ...
//!     #PRINT_LINE
//! ```
//!
//! A definition is a header with one quoted line, optionally followed by
//! continuation lines while the previous line ends in `\`. An invocation is a
//! line holding only `#NAME`; it is replaced by the recorded lines, each
//! reported under the invocation's line number. Macro bodies are not expanded
//! again.

use super::{AsmContext, Line, is_identifier, strip_comment, tokenize, unquote};
use crate::virtual_machine::errors::{AsmError, AsmErrorKind};
use std::collections::{HashMap, HashSet};

const MACRO_KEYWORD: &str = "#macro";
const CONTINUATION: &str = "\\";
const INVOCATION_PREFIX: char = '#';

fn malformed(line: usize, detail: impl Into<String>) -> AsmError {
    AsmError::new(AsmErrorKind::MalformedMacro, line, detail)
}

struct Macro {
    body: Vec<String>,
    /// Header line, for the unused warning.
    line: usize,
}

/// Source lines with comments stripped, dropping the blank ones.
fn significant_lines(source: &str) -> Vec<Line> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let text = strip_comment(raw).trim();
            (!text.is_empty()).then(|| Line {
                number: i + 1,
                text: text.to_string(),
            })
        })
        .collect()
}

/// Reads one quoted macro line and whether another line follows.
fn macro_line(tokens: &[&str], line: usize, name: &str) -> Result<(String, bool), AsmError> {
    let (literal, rest) = match tokens {
        [literal, rest @ ..] if rest.len() <= 1 => (*literal, rest),
        _ => return Err(malformed(line, format!("`{name}`: continuation malformation"))),
    };
    let text = unquote(literal)
        .ok_or_else(|| malformed(line, format!("`{name}`: invalid string literal")))?;
    let continues = match rest {
        [] => false,
        [marker] if *marker == CONTINUATION => true,
        _ => {
            return Err(malformed(
                line,
                format!("`{name}`: expected '\\' as the last piece of the line"),
            ));
        }
    };
    Ok((strip_comment(text).trim().to_string(), continues))
}

/// Reads the definition whose header is `line`, consuming its continuation
/// lines from `iter`.
fn definition(
    line: &Line,
    iter: &mut impl Iterator<Item = Line>,
) -> Result<(String, Macro), AsmError> {
    let header = tokenize(&line.text, line.number, AsmErrorKind::MalformedMacro)?;
    let chunks: Vec<&str> = header.iter().map(|t| t.text).collect();
    if chunks[0] != MACRO_KEYWORD || !(3..=4).contains(&chunks.len()) {
        return Err(malformed(line.number, format!("`{}`", line.text)));
    }
    let name = chunks[1];
    if !is_identifier(name) {
        return Err(malformed(line.number, format!("invalid macro name `{name}`")));
    }

    let (first, mut continues) = macro_line(&chunks[2..], line.number, name)?;
    let mut body = vec![first];
    while continues {
        let Some(next) = iter.next() else {
            return Err(malformed(
                line.number,
                format!("`{name}`: file ends inside the macro"),
            ));
        };
        let tokens = tokenize(&next.text, next.number, AsmErrorKind::MalformedMacro)?;
        let chunks: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        let (text, more) = macro_line(&chunks, next.number, name)?;
        body.push(text);
        continues = more;
    }

    body.retain(|l| !l.is_empty());
    Ok((
        name.to_string(),
        Macro {
            body,
            line: line.number,
        },
    ))
}

/// Collects every macro definition, returning the lines outside them.
///
/// Each malformed definition is recorded in `ctx` and skipped.
fn collect_definitions(
    lines: Vec<Line>,
    ctx: &mut AsmContext,
) -> (Vec<Line>, HashMap<String, Macro>) {
    let mut macros: HashMap<String, Macro> = HashMap::new();
    let mut rest = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter();

    while let Some(line) = iter.next() {
        if !line.text.starts_with(MACRO_KEYWORD) {
            rest.push(line);
            continue;
        }

        match definition(&line, &mut iter) {
            Ok((name, _)) if macros.contains_key(&name) => {
                ctx.push_error(malformed(line.number, format!("`{name}` is already defined")));
            }
            Ok((name, def)) => {
                macros.insert(name, def);
            }
            Err(err) => ctx.push_error(err),
        }
    }

    for (name, def) in &macros {
        if def.body.iter().any(|l| l.starts_with(INVOCATION_PREFIX)) {
            ctx.warnings.push(format!(
                "line {}: macro `{name}` contains a `#` line, macros are not expanded inside macros",
                def.line
            ));
        }
    }

    (rest, macros)
}

/// Runs phase 1, recording errors and warnings in `ctx`.
pub(super) fn expand(source: &str, ctx: &mut AsmContext) -> Vec<Line> {
    let errors_before = ctx.errors.len();
    let (lines, macros) = collect_definitions(significant_lines(source), ctx);
    if ctx.errors.len() > errors_before {
        return Vec::new();
    }

    let mut used = HashSet::new();
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let invoked = line
            .text
            .strip_prefix(INVOCATION_PREFIX)
            .filter(|name| is_identifier(name));
        let Some(name) = invoked else {
            out.push(line);
            continue;
        };
        match macros.get(name) {
            Some(def) => {
                used.insert(name.to_string());
                out.extend(def.body.iter().map(|text| Line {
                    number: line.number,
                    text: text.clone(),
                }));
            }
            None => ctx.push_error(malformed(line.number, format!("unknown macro `{name}`"))),
        }
    }

    let mut unused: Vec<(&String, &Macro)> = macros
        .iter()
        .filter(|(name, _)| !used.contains(*name))
        .collect();
    unused.sort_by_key(|(_, def)| def.line);
    for (name, def) in unused {
        ctx.warnings.push(format!(
            "line {}: macro `{name}` is defined but never used",
            def.line
        ));
    }

    out
}
