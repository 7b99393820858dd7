//! Test utilities for assembling and running programs.

use crate::virtual_machine::assembler::assemble_source;
use crate::virtual_machine::errors::AsmError;
use crate::virtual_machine::program::Executable;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Assembles `source` and loads the result, panicking on any diagnostic.
pub fn assemble_ok(source: &str) -> Executable {
    let assembled = assemble_source(source);
    assert!(
        assembled.errors.is_empty(),
        "unexpected assembly errors: {:?}",
        assembled.errors
    );
    let binary = assembled.binary.expect("successful assembly has a binary");
    Executable::from_bytes(&binary).expect("assembled binary loads")
}

/// Assembles `source`, expecting it to fail, and returns the diagnostics.
pub fn assemble_err(source: &str) -> Vec<AsmError> {
    let assembled = assemble_source(source);
    assert!(assembled.binary.is_none(), "assembly unexpectedly succeeded");
    assert!(!assembled.errors.is_empty());
    assembled.errors
}

/// Label name that is unique for the test process.
pub fn unique_label(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{n}")
}

/// Generated program together with the addresses it should assemble to.
pub struct GeneratedProgram {
    pub source: String,
    /// Every label and the instruction index it must resolve to.
    pub labels: Vec<(String, u64)>,
    /// Instruction index of each jump and the label it targets.
    pub targets: Vec<(usize, String)>,
}

/// Builds a program of `blocks` labelled blocks that jump and call between
/// each other, with labels written both before and after their first use.
pub fn labelled_program(blocks: usize) -> GeneratedProgram {
    let names: Vec<String> = (0..blocks).map(|_| unique_label("block")).collect();
    let mut source = String::from(".init main\n.code\nmain:\n    exit\n");
    let mut labels = vec![("main".to_string(), 0)];
    let mut targets = Vec::new();
    let mut index = 1usize;

    for (i, name) in names.iter().enumerate() {
        let next = &names[(i + 1) % blocks];
        let callee = &names[(i * 7) % blocks];

        source.push_str(&format!("{name}:\n"));
        labels.push((name.clone(), index as u64));

        source.push_str(&format!("    mov i0 @{i}\n"));
        source.push_str(&format!("    beq i0 i1 {next}\n"));
        targets.push((index + 1, next.clone()));
        source.push_str(&format!("    call {callee}\n"));
        targets.push((index + 2, callee.clone()));
        source.push_str("    jmp main\n");
        targets.push((index + 3, "main".to_string()));
        index += 4;
    }

    GeneratedProgram {
        source,
        labels,
        targets,
    }
}

/// Writer that appends into a shared buffer.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    /// Everything written so far, as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
