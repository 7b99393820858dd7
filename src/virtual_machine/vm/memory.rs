/// Access granularity for slot and stack operations.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Width {
    /// 1 byte.
    Half = 1,
    /// 2 bytes.
    Word = 2,
    /// 4 bytes.
    Double = 4,
    /// 8 bytes.
    Quad = 8,
}

impl Width {
    pub const fn bytes(&self) -> usize {
        *self as usize
    }
}

/// Writes the low `width` bytes of `value` big-endian into `dst`.
pub(super) fn write_be(dst: &mut [u8], width: Width, value: u64) {
    let bytes = value.to_be_bytes();
    dst.copy_from_slice(&bytes[8 - width.bytes()..]);
}

/// Reads `width` big-endian bytes from `src`, zero-extended.
pub(super) fn read_be(src: &[u8], width: Width) -> u64 {
    let mut buf = [0u8; 8];
    buf[8 - width.bytes()..].copy_from_slice(src);
    u64::from_be_bytes(buf)
}

/// A byte buffer owned by the memory manager.
///
/// The size is fixed at allocation and rounded up to an even number of
/// bytes. Every access is bounds checked; an access with
/// `offset + width > size` fails instead of touching the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    data: Vec<u8>,
}

impl Slot {
    /// Allocates a zeroed slot, or `None` if the buffer cannot be reserved.
    pub fn new(size: u64) -> Option<Self> {
        let size = usize::try_from(size).ok()?;
        let size = size.checked_add(size & 1)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size).ok()?;
        data.resize(size, 0);
        Some(Self { data })
    }

    /// Creates a slot holding `bytes`, padded to an even size.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = bytes.to_vec();
        if data.len() % 2 != 0 {
            data.push(0);
        }
        Self { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn range(&self, offset: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }

    /// Reads a value of `width` bytes at `offset`.
    pub fn read(&self, offset: u64, width: Width) -> Option<u64> {
        let range = self.range(offset, width.bytes())?;
        Some(read_be(&self.data[range], width))
    }

    /// Writes the low `width` bytes of `value` at `offset`.
    pub fn write(&mut self, offset: u64, width: Width, value: u64) -> bool {
        match self.range(offset, width.bytes()) {
            Some(range) => {
                write_be(&mut self.data[range], width, value);
                true
            }
            None => false,
        }
    }

    /// Borrows `len` raw bytes at `offset`.
    pub fn bytes(&self, offset: u64, len: u64) -> Option<&[u8]> {
        let len = usize::try_from(len).ok()?;
        let range = self.range(offset, len)?;
        Some(&self.data[range])
    }
}
