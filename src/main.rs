//! Skiff virtual machine runner.
//!
//! Loads a binary image, or assembles a source file in memory, and executes
//! it. The process exits with the program's exit code.
//!
//! # Usage
//! ```text
//! skiff <file.bin|file.asm> [OPTIONS]
//! ```
//!
//! # Options
//! - `-s, --stats`: Print run statistics after execution
//! - `-q, --quiet`: Only log errors

use skiff::utils::log::{Level, set_min_level};
use skiff::virtual_machine::assembler::assemble_file;
use skiff::virtual_machine::errors::VMError;
use skiff::virtual_machine::program::Executable;
use skiff::virtual_machine::vm::VM;
use skiff::virtual_machine::vm::stats::RunStats;
use skiff::{error, info};
use std::env;
use std::path::Path;
use std::process;

const SOURCE_EXTENSION: &str = "asm";

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut show_stats = false;

    for arg in &args[2..] {
        match arg.as_str() {
            "--stats" | "-s" => show_stats = true,
            "--quiet" | "-q" => set_min_level(Level::Error),
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let exe = match load(input_path) {
        Ok(exe) => exe,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let mut vm = VM::new(exe);
    let code = match vm.run() {
        Ok(code) => code,
        Err(e) => {
            error!("{input_path}: {e}");
            vm.exit_code()
        }
    };

    if show_stats {
        print_stats(vm.stats());
    }
    process::exit(code as i32);
}

/// Reads an image, assembling `.asm` sources first.
fn load(path: &str) -> Result<Executable, VMError> {
    let is_source = Path::new(path)
        .extension()
        .is_some_and(|ext| ext == SOURCE_EXTENSION);
    if !is_source {
        return Executable::load_file(path);
    }

    let assembled = assemble_file(path)?;
    match assembled.binary {
        Some(binary) => Executable::from_bytes(&binary),
        None => {
            error!("{path}: assembly failed with {} error(s)", assembled.errors.len());
            process::exit(1);
        }
    }
}

fn print_stats(stats: &RunStats) {
    let width = stats
        .iter()
        .map(|(c, _)| c.as_str().len())
        .max()
        .unwrap_or(0)
        .max("elapsed".len());

    println!("{}", "-".repeat(width + 16));
    for (counter, amount) in stats.iter() {
        println!("{:<width$} {:>15}", counter.as_str(), amount);
    }
    println!("{:<width$} {:>15}", "elapsed", format!("{:?}", stats.elapsed));
    println!("{}", "-".repeat(width + 16));
}

const USAGE: &str = "\
Skiff Virtual Machine

USAGE:
    {program} <file> [OPTIONS]

ARGS:
    <file>    Binary image, or assembly source ending in .asm

OPTIONS:
    -s, --stats    Print run statistics after execution
    -q, --quiet    Only log errors
    -h, --help     Print this help message
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
