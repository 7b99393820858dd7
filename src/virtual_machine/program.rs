//! Executable image representation and serialization.
//!
//! An [`Executable`] is produced by the assembler, serialized with
//! [`Encode::to_bytes`], and read back by [`Executable::from_bytes`]. All
//! multi-byte integers are big-endian.
//!
//! # Image layout
//!
//! ```text
//! u32  compatibility word     (flags << 24 | major << 16 | minor << 8 | patch)
//! u8   debug level            (0 none, 1 minimal, 2 moderate, 3 extreme)
//! u64  section count          count x { u64 address, u64 name_len, name }
//! u64  interrupt count        count x { u64 id, u64 address }
//! u64  constant count         count x { u8 tag, payload }
//! u64  entry instruction index
//! u64  instruction byte length, then the instruction stream
//! ```

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_bytes};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, decode_program, encode_program};
use crate::{debug, warn};
use skiff_derive::BinaryCodec;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// Flags byte marking an experimental image.
pub const EXPERIMENTAL_FLAGS: u8 = 0xFF;

/// Image format version understood by this VM.
pub const SEMANTIC_VERSION: Version = Version::new(0, 1, 0);

/// Compatibility word at the head of every image.
///
/// Encodes as four bytes, which is the big-endian packing of
/// `(flags << 24) | (major << 16) | (minor << 8) | patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub struct Version {
    pub flags: u8,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            flags: 0,
            major,
            minor,
            patch,
        }
    }

    pub const fn experimental(self) -> Self {
        Self {
            flags: EXPERIMENTAL_FLAGS,
            ..self
        }
    }

    pub const fn is_experimental(&self) -> bool {
        self.flags == EXPERIMENTAL_FLAGS
    }

    pub const fn to_word(&self) -> u32 {
        u32::from_be_bytes([self.flags, self.major, self.minor, self.patch])
    }

    pub const fn from_word(word: u32) -> Self {
        let [flags, major, minor, patch] = word.to_be_bytes();
        Self {
            flags,
            major,
            minor,
            patch,
        }
    }

    /// Checks an image version against the `supported` one.
    ///
    /// A newer major version is an error. A newer minor or patch version and
    /// the experimental flag produce warnings.
    pub fn check(&self, supported: &Version) -> Result<Vec<String>, VMError> {
        let mut warnings = Vec::new();
        if self.major > supported.major {
            return Err(VMError::IncompatibleVersion {
                image: self.to_string(),
                supported: supported.to_string(),
            });
        }
        if self.major == supported.major {
            if self.minor > supported.minor {
                warnings.push(format!(
                    "image minor version {} is newer than supported {}; some features may be unavailable",
                    self, supported
                ));
            } else if self.minor == supported.minor && self.patch > supported.patch {
                warnings.push(format!(
                    "image patch version {} is newer than supported {}",
                    self, supported
                ));
            }
        }
        if self.is_experimental() {
            warnings.push(format!("image {} is marked experimental", self));
        }
        Ok(warnings)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Verbosity of the `debug` and `nop` trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, BinaryCodec)]
pub enum DebugLevel {
    #[default]
    None = 0,
    Minimal = 1,
    Moderate = 2,
    Extreme = 3,
}

impl DebugLevel {
    pub fn from_u8(level: u8) -> Result<Self, VMError> {
        DebugLevel::from_bytes(&[level]).map_err(|_| VMError::InvalidDebugLevel(level))
    }
}

/// Label name bound to an instruction index.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct SectionEntry {
    pub address: u64,
    pub name: String,
}

/// Handler instruction index of an interrupt id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub struct InterruptEntry {
    pub id: u64,
    pub address: u64,
}

pub const TAG_U8: u8 = 0x00;
pub const TAG_U16: u8 = 0x01;
pub const TAG_U32: u8 = 0x02;
pub const TAG_U64: u8 = 0x03;
pub const TAG_I8: u8 = 0x10;
pub const TAG_I16: u8 = 0x11;
pub const TAG_I32: u8 = 0x12;
pub const TAG_I64: u8 = 0x13;
pub const TAG_FLOAT: u8 = 0x20;
pub const TAG_STRING: u8 = 0x30;

/// A typed entry of the constant table.
///
/// In the constant pool, 8 and 16 bit values occupy one word (2 bytes), wider
/// values their natural width, and strings their raw bytes.
///
/// String constants come from assembly source and must be valid UTF-8; an
/// image carrying other bytes is rejected as [`VMError::InvalidImage`].
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Float(f64),
    String(String),
}

impl Constant {
    pub fn tag(&self) -> u8 {
        match self {
            Constant::U8(_) => TAG_U8,
            Constant::U16(_) => TAG_U16,
            Constant::U32(_) => TAG_U32,
            Constant::U64(_) => TAG_U64,
            Constant::I8(_) => TAG_I8,
            Constant::I16(_) => TAG_I16,
            Constant::I32(_) => TAG_I32,
            Constant::I64(_) => TAG_I64,
            Constant::Float(_) => TAG_FLOAT,
            Constant::String(_) => TAG_STRING,
        }
    }

    /// Bytes this constant occupies in the constant pool.
    pub fn pool_bytes(&self) -> Vec<u8> {
        match self {
            Constant::U8(v) => (*v as u16).to_bytes(),
            Constant::U16(v) => v.to_bytes(),
            Constant::U32(v) => v.to_bytes(),
            Constant::U64(v) => v.to_bytes(),
            Constant::I8(v) => (*v as i16).to_bytes(),
            Constant::I16(v) => v.to_bytes(),
            Constant::I32(v) => v.to_bytes(),
            Constant::I64(v) => v.to_bytes(),
            Constant::Float(v) => v.to_bytes(),
            Constant::String(s) => s.as_bytes().to_vec(),
        }
    }

    /// Length of the pool bytes, as loaded by `mov reg #name`.
    pub fn data_len(&self) -> u64 {
        match self {
            Constant::U8(_) | Constant::U16(_) | Constant::I8(_) | Constant::I16(_) => 2,
            Constant::U32(_) | Constant::I32(_) => 4,
            Constant::U64(_) | Constant::I64(_) | Constant::Float(_) => 8,
            Constant::String(s) => s.len() as u64,
        }
    }

    /// Reads one tagged constant.
    pub fn read(input: &mut &[u8]) -> Result<Constant, VMError> {
        let tag: u8 = field(input, "constant tag")?;
        let what = "constant payload";
        Ok(match tag {
            TAG_U8 => Constant::U8(field::<u16>(input, what)? as u8),
            TAG_U16 => Constant::U16(field(input, what)?),
            TAG_U32 => Constant::U32(field(input, what)?),
            TAG_U64 => Constant::U64(field(input, what)?),
            TAG_I8 => Constant::I8(field::<i16>(input, what)? as i8),
            TAG_I16 => Constant::I16(field(input, what)?),
            TAG_I32 => Constant::I32(field(input, what)?),
            TAG_I64 => Constant::I64(field(input, what)?),
            TAG_FLOAT => Constant::Float(field(input, what)?),
            TAG_STRING => Constant::String(field(input, "string constant")?),
            other => return Err(VMError::UnknownConstantType(other)),
        })
    }
}

impl Encode for Constant {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.tag().encode(out);
        match self {
            Constant::String(s) => s.encode(out),
            other => out.write(&other.pool_bytes()),
        }
    }
}

/// Decodes one field, naming it in the error.
fn field<T: Decode>(input: &mut &[u8], what: &'static str) -> Result<T, VMError> {
    T::decode(input).map_err(|e| match e {
        DecodeError::InvalidValue => VMError::InvalidImage(what),
        DecodeError::UnexpectedEof | DecodeError::LengthOverflow => VMError::TruncatedImage(what),
    })
}

/// A loaded program.
///
/// Instructions are decoded once, when the image is read; `ip` indexes into
/// [`instructions`](Self::instructions).
#[derive(Debug, Clone, PartialEq)]
pub struct Executable {
    pub version: Version,
    pub debug: DebugLevel,
    pub sections: Vec<SectionEntry>,
    pub interrupts: Vec<InterruptEntry>,
    pub constants: Vec<Constant>,
    pub entry: u64,
    pub instructions: Vec<Instruction>,
    /// Compatibility notes gathered while loading.
    pub warnings: Vec<String>,
}

impl Executable {
    /// Constant pool: every constant's pool bytes, in table order.
    pub fn pool(&self) -> Vec<u8> {
        self.constants.iter().flat_map(Constant::pool_bytes).collect()
    }

    /// Raw instruction stream.
    pub fn code(&self) -> Vec<u8> {
        encode_program(&self.instructions)
    }

    /// Instruction index of the label `name`.
    pub fn section_address(&self, name: &str) -> Option<u64> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.address)
    }

    /// Interrupt id to handler index.
    pub fn interrupt_table(&self) -> HashMap<u64, u64> {
        self.interrupts.iter().map(|i| (i.id, i.address)).collect()
    }

    /// Parses an image, checking it against [`SEMANTIC_VERSION`].
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, VMError> {
        let input = &mut input;

        let version: Version = field(input, "compatibility word")?;
        let warnings = version.check(&SEMANTIC_VERSION)?;
        for w in &warnings {
            warn!(tag: "loader", "{w}");
        }

        let level: u8 = field(input, "debug level")?;
        let debug = DebugLevel::from_u8(level)?;

        let count: u64 = field(input, "section count")?;
        let mut sections = Vec::new();
        let mut names = HashSet::new();
        for _ in 0..count {
            let section: SectionEntry = field(input, "section")?;
            if !names.insert(section.name.clone()) {
                return Err(VMError::DuplicateSection(section.name));
            }
            sections.push(section);
        }

        let count: u64 = field(input, "interrupt count")?;
        let mut interrupts = Vec::new();
        let mut ids = HashSet::new();
        for _ in 0..count {
            let entry: InterruptEntry = field(input, "interrupt")?;
            if !ids.insert(entry.id) {
                return Err(VMError::DuplicateInterrupt(entry.id));
            }
            interrupts.push(entry);
        }

        let count: u64 = field(input, "constant count")?;
        let mut constants = Vec::new();
        for _ in 0..count {
            constants.push(Constant::read(input)?);
        }

        let entry: u64 = field(input, "entry address")?;
        let len: usize = field(input, "instruction length")?;
        let code = read_bytes(input, len).map_err(|_| VMError::TruncatedImage("instructions"))?;
        let instructions = decode_program(code)?;
        if !input.is_empty() {
            return Err(VMError::TrailingData(input.len()));
        }

        debug!(
            tag: "loader",
            "decoded {} sections, {} interrupts, {} constants, {} instructions",
            sections.len(),
            interrupts.len(),
            constants.len(),
            instructions.len()
        );

        Ok(Self {
            version,
            debug,
            sections,
            interrupts,
            constants,
            entry,
            instructions,
            warnings,
        })
    }

    /// Reads and parses an image file.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, VMError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| VMError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }
}

impl Encode for Executable {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.version.encode(out);
        self.debug.encode(out);
        self.sections.len().encode(out);
        for section in &self.sections {
            section.encode(out);
        }
        self.interrupts.len().encode(out);
        for entry in &self.interrupts {
            entry.encode(out);
        }
        self.constants.len().encode(out);
        for constant in &self.constants {
            constant.encode(out);
        }
        self.entry.encode(out);
        self.code().encode(out);
    }
}
