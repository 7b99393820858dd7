//! Skiff assembler CLI.
//!
//! Reads an assembly source file and writes the binary image next to it.
//!
//! # Usage
//! ```text
//! assembler <input.asm> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.asm`: Assembly source file to compile
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.bin`)
//! - `-s, --stats`: Print instruction, byte, error and warning counts
//!
//! # Examples
//! ```text
//! assembler program.asm
//! assembler program.asm -o output.bin
//! assembler program.asm -s
//! ```

use skiff::virtual_machine::assembler::{Assembled, assemble_file};
use skiff::{error, info};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

const IMAGE_EXTENSION: &str = "bin";

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut show_stats = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--stats" | "-s" => {
                show_stats = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {other}\n");
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).is_file() {
        error!("Input file does not exist: {input_path}");
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| default_output(input_path));
    if let Some(dir) = Path::new(&output_path).parent()
        && !dir.as_os_str().is_empty()
        && !dir.is_dir()
    {
        error!("Output directory does not exist: {}", dir.display());
        process::exit(1);
    }

    let assembled = match assemble_file(input_path) {
        Ok(a) => a,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    if show_stats {
        print_stats(&assembled);
    }

    let Some(binary) = assembled.binary else {
        error!(
            "Assembly failed with {} error(s), no binary written",
            assembled.errors.len()
        );
        process::exit(1);
    };

    if let Err(e) = fs::write(&output_path, &binary) {
        error!("Failed to write {output_path}: {e}");
        process::exit(1);
    }

    info!(
        "Compiled {} -> {} ({} instructions, {} bytes, {} warnings)",
        input_path,
        output_path,
        assembled.stats.instructions,
        binary.len(),
        assembled.warnings.len()
    );
}

/// `dir/name.asm` becomes `dir/name.bin`.
fn default_output(input: &str) -> String {
    Path::new(input)
        .with_extension(IMAGE_EXTENSION)
        .to_string_lossy()
        .into_owned()
}

fn print_stats(assembled: &Assembled) {
    let rows = [
        ("instructions", assembled.stats.instructions),
        ("bytes", assembled.stats.bytes),
        ("errors", assembled.errors.len()),
        ("warnings", assembled.warnings.len()),
    ];
    for (name, count) in rows {
        println!("{name:<13}{count:>10}");
    }
}

const USAGE: &str = "\
Skiff Assembler

USAGE:
    {program} <input.asm> [OPTIONS]

ARGS:
    <input.asm>    Assembly source file to compile

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.bin)
    -s, --stats             Print instruction, byte, error and warning counts
    -h, --help              Print this help message

EXAMPLES:
    # Compile to default output name
    {program} program.asm

    # Compile with explicit output
    {program} program.asm -o output.bin
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
