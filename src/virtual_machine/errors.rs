use skiff_derive::Error;
use std::fmt;

/// Errors raised while loading or executing an image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VMError {
    /// The image ended before a field it declares.
    #[error("image truncated while reading {0}")]
    TruncatedImage(&'static str),
    /// Unknown opcode encountered in bytecode.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    /// A field holds a value its type does not allow.
    #[error("malformed {0} in image")]
    InvalidImage(&'static str),
    /// Unknown tag in the constant table.
    #[error("unknown constant type {0:#04x}")]
    UnknownConstantType(u8),
    /// The instruction stream does not split into whole instructions.
    #[error("instruction stream ends inside `{mnemonic}` at byte {offset}")]
    InstructionSizeMismatch {
        mnemonic: &'static str,
        offset: usize,
    },
    /// Operand bytes do not match the opcode's declared size.
    #[error("`{mnemonic}` expects {expected} operand bytes, got {actual}")]
    MalformedInstruction {
        mnemonic: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Register id outside the fixed register table.
    #[error("unknown register id {0:#04x}")]
    UnknownRegister(u8),
    #[error("instruction pointer {ip} outside program of {len} instructions")]
    InstructionPointerOutOfRange { ip: u64, len: usize },
    #[error("division by zero")]
    DivideByZero,
    #[error("return with empty call stack")]
    ReturnWithEmptyCallStack,
    /// Push would exceed the stack capacity.
    #[error("push of {width} bytes exceeds stack capacity of {capacity}")]
    StackPushError { width: usize, capacity: usize },
    /// Pop with fewer bytes on the stack than requested.
    #[error("pop of {width} bytes with {available} bytes on the stack")]
    StackPopError { width: usize, available: usize },
    /// The image targets a newer major version.
    #[error("image version {image} is incompatible with vm version {supported}")]
    IncompatibleVersion { image: String, supported: String },
    #[error("invalid debug level {0}")]
    InvalidDebugLevel(u8),
    #[error("duplicate section `{0}`")]
    DuplicateSection(String),
    #[error("duplicate interrupt {0}")]
    DuplicateInterrupt(u64),
    /// Trailing bytes after the instruction stream.
    #[error("{0} unexpected bytes after the instruction stream")]
    TrailingData(usize),
    #[error("{path}: {message}")]
    Io { path: String, message: String },
}

/// Code handed to the runtime-error callback when execution is killed.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    InstructionPointerOutOfRange = 1,
    DivideByZero = 2,
    ReturnWithEmptyCallStack = 3,
    StackPushError = 4,
    StackPopError = 5,
    Other = 0xFF,
}

impl VMError {
    /// Classifies an error raised during execution.
    pub fn runtime_kind(&self) -> RuntimeError {
        match self {
            VMError::InstructionPointerOutOfRange { .. } => RuntimeError::InstructionPointerOutOfRange,
            VMError::DivideByZero => RuntimeError::DivideByZero,
            VMError::ReturnWithEmptyCallStack => RuntimeError::ReturnWithEmptyCallStack,
            VMError::StackPushError { .. } => RuntimeError::StackPushError,
            VMError::StackPopError { .. } => RuntimeError::StackPopError,
            _ => RuntimeError::Other,
        }
    }
}

/// Discriminant of an [`AsmError`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    MalformedDirective,
    MalformedMacro,
    DuplicateLabel,
    DuplicateConstant,
    UnknownLabel,
    UnknownMnemonic,
    InvalidRegister,
    ValueOutOfRange,
    MissingInitOrCode,
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AsmErrorKind::MalformedDirective => "malformed directive",
            AsmErrorKind::MalformedMacro => "malformed macro",
            AsmErrorKind::DuplicateLabel => "duplicate label",
            AsmErrorKind::DuplicateConstant => "duplicate constant",
            AsmErrorKind::UnknownLabel => "unknown label",
            AsmErrorKind::UnknownMnemonic => "unknown mnemonic",
            AsmErrorKind::InvalidRegister => "invalid register",
            AsmErrorKind::ValueOutOfRange => "value out of range",
            AsmErrorKind::MissingInitOrCode => "missing .init or .code",
        };
        f.write_str(s)
    }
}

/// Assembly-time error, tied to the source line it was found on.
///
/// Line numbers are 1-based and refer to the original source, also for
/// lines produced by a macro invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("line {line}: malformed directive: {detail}")]
    MalformedDirective { line: usize, detail: String },
    #[error("line {line}: malformed macro: {detail}")]
    MalformedMacro { line: usize, detail: String },
    #[error("line {line}: duplicate label: {detail}")]
    DuplicateLabel { line: usize, detail: String },
    #[error("line {line}: duplicate constant: {detail}")]
    DuplicateConstant { line: usize, detail: String },
    #[error("line {line}: unknown label: {detail}")]
    UnknownLabel { line: usize, detail: String },
    #[error("line {line}: unknown mnemonic: {detail}")]
    UnknownMnemonic { line: usize, detail: String },
    #[error("line {line}: invalid register: {detail}")]
    InvalidRegister { line: usize, detail: String },
    #[error("line {line}: value out of range: {detail}")]
    ValueOutOfRange { line: usize, detail: String },
    #[error("line {line}: missing .init or .code: {detail}")]
    MissingInitOrCode { line: usize, detail: String },
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, line: usize, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match kind {
            AsmErrorKind::MalformedDirective => AsmError::MalformedDirective { line, detail },
            AsmErrorKind::MalformedMacro => AsmError::MalformedMacro { line, detail },
            AsmErrorKind::DuplicateLabel => AsmError::DuplicateLabel { line, detail },
            AsmErrorKind::DuplicateConstant => AsmError::DuplicateConstant { line, detail },
            AsmErrorKind::UnknownLabel => AsmError::UnknownLabel { line, detail },
            AsmErrorKind::UnknownMnemonic => AsmError::UnknownMnemonic { line, detail },
            AsmErrorKind::InvalidRegister => AsmError::InvalidRegister { line, detail },
            AsmErrorKind::ValueOutOfRange => AsmError::ValueOutOfRange { line, detail },
            AsmErrorKind::MissingInitOrCode => AsmError::MissingInitOrCode { line, detail },
        }
    }

    pub fn kind(&self) -> AsmErrorKind {
        match self {
            AsmError::MalformedDirective { .. } => AsmErrorKind::MalformedDirective,
            AsmError::MalformedMacro { .. } => AsmErrorKind::MalformedMacro,
            AsmError::DuplicateLabel { .. } => AsmErrorKind::DuplicateLabel,
            AsmError::DuplicateConstant { .. } => AsmErrorKind::DuplicateConstant,
            AsmError::UnknownLabel { .. } => AsmErrorKind::UnknownLabel,
            AsmError::UnknownMnemonic { .. } => AsmErrorKind::UnknownMnemonic,
            AsmError::InvalidRegister { .. } => AsmErrorKind::InvalidRegister,
            AsmError::ValueOutOfRange { .. } => AsmErrorKind::ValueOutOfRange,
            AsmError::MissingInitOrCode { .. } => AsmErrorKind::MissingInitOrCode,
        }
    }

    fn parts(&self) -> (usize, &str) {
        match self {
            AsmError::MalformedDirective { line, detail }
            | AsmError::MalformedMacro { line, detail }
            | AsmError::DuplicateLabel { line, detail }
            | AsmError::DuplicateConstant { line, detail }
            | AsmError::UnknownLabel { line, detail }
            | AsmError::UnknownMnemonic { line, detail }
            | AsmError::InvalidRegister { line, detail }
            | AsmError::ValueOutOfRange { line, detail }
            | AsmError::MissingInitOrCode { line, detail } => (*line, detail),
        }
    }

    /// 1-based source line, or 0 when the error concerns the whole file.
    pub fn line(&self) -> usize {
        self.parts().0
    }

    pub fn detail(&self) -> &str {
        self.parts().1
    }

    /// The message without the line prefix.
    pub fn message(&self) -> String {
        format!("{}: {}", self.kind(), self.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asm_error_roundtrips_kind() {
        let err = AsmError::new(AsmErrorKind::UnknownLabel, 7, "`loop`");
        assert_eq!(err.kind(), AsmErrorKind::UnknownLabel);
        assert_eq!(err.line(), 7);
        assert_eq!(err.detail(), "`loop`");
        assert_eq!(err.to_string(), "line 7: unknown label: `loop`");
        assert_eq!(err.message(), "unknown label: `loop`");
    }

    #[test]
    fn vm_error_display() {
        assert_eq!(VMError::UnknownOpcode(0xEE).to_string(), "unknown opcode 0xee");
        assert_eq!(
            VMError::StackPopError {
                width: 8,
                available: 2
            }
            .to_string(),
            "pop of 8 bytes with 2 bytes on the stack"
        );
    }

    #[test]
    fn runtime_kind_classification() {
        assert_eq!(VMError::DivideByZero.runtime_kind(), RuntimeError::DivideByZero);
        assert_eq!(
            VMError::ReturnWithEmptyCallStack.runtime_kind(),
            RuntimeError::ReturnWithEmptyCallStack
        );
        assert_eq!(VMError::UnknownOpcode(1).runtime_kind(), RuntimeError::Other);
    }
}
