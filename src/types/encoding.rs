//! Binary encoding and decoding traits for the skiff image format.
//!
//! Every multi-byte integer is written big-endian, matching the layout the
//! assembler emits and the loader expects.
//!
//! # Binary Format
//!
//! - Integers: big-endian, fixed-width
//! - `usize`: encoded as `u64`
//! - `Vec<u8>`/`String`: 8-byte length prefix followed by the raw bytes
//! - Arrays `[u8; N]`: raw bytes without a length prefix
//!
//! Record types derive their implementation with
//! [`BinaryCodec`](skiff_derive::BinaryCodec).

use skiff_derive::Error;

/// Sink for writing encoded bytes.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

/// Counts encoded bytes without allocating.
///
/// Used by [`Encode::to_bytes`] to size the output buffer up front.
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self { len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for SizeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Types that can be serialized into the image format.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes to a new buffer with exact capacity.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before the expected data was read.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Data does not represent a valid value for the target type.
    #[error("invalid value")]
    InvalidValue,
    /// A length prefix does not fit in memory.
    #[error("length prefix overflow")]
    LengthOverflow,
}

/// Types that can be deserialized from the image format.
pub trait Decode: Sized {
    /// Reads a value and advances `input` past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value that must consume all of `data`.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(DecodeError::InvalidValue);
        }
        Ok(value)
    }
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub(crate) fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(read_bytes(input, 1)?[0])
    }
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_be_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(read_bytes(input, std::mem::size_of::<$t>())?);
                    Ok(<$t>::from_be_bytes(buf))
                }
            }
        )*
    };
}

impl_int!(u16, u32, u64, i8, i16, i32, i64);

impl Encode for f64 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.to_bits().encode(out);
    }
}

impl Decode for f64 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(f64::from_bits(u64::decode(input)?))
    }
}

impl Encode for usize {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (*self as u64).encode(out);
    }
}

impl Decode for usize {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let v = u64::decode(input)?;
        usize::try_from(v).map_err(|_| DecodeError::LengthOverflow)
    }
}

impl Encode for [u8] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self);
    }
}

impl Encode for Vec<u8> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_slice().encode(out);
    }
}

impl Decode for Vec<u8> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        Ok(read_bytes(input, len)?.to_vec())
    }
}

impl Encode for String {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_bytes().encode(out);
    }
}

impl Encode for &str {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_bytes().encode(out);
    }
}

impl Decode for String {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = Vec::<u8>::decode(input)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidValue)
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(read_bytes(input, N)?);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counter_accumulates() {
        let mut counter = SizeCounter::new();
        assert!(counter.is_empty());
        0x1234u16.encode(&mut counter);
        "abc".encode(&mut counter);
        assert_eq!(counter.len(), 2 + 8 + 3);
    }

    #[test]
    fn integers_are_big_endian() {
        assert_eq!(0x0102u16.to_bytes(), vec![0x01, 0x02]);
        assert_eq!(0x01020304u32.to_bytes(), vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(
            1u64.to_bytes(),
            vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]
        );
        assert_eq!((-1i16).to_bytes(), vec![0xFF, 0xFF]);
    }

    #[test]
    fn decode_advances_input() {
        let data = [0x00, 0x2A, 0xFF, 0x07];
        let mut input = &data[..];
        assert_eq!(u16::decode(&mut input).unwrap(), 42);
        assert_eq!(u8::decode(&mut input).unwrap(), 0xFF);
        assert_eq!(input, &[0x07]);
    }

    #[test]
    fn decode_short_input_is_eof() {
        assert_eq!(u64::from_bytes(&[0x00; 7]), Err(DecodeError::UnexpectedEof));
        assert_eq!(u8::from_bytes(&[]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn from_bytes_rejects_trailing_data() {
        assert_eq!(u8::from_bytes(&[1, 2]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn string_is_length_prefixed() {
        let bytes = "hi".to_bytes();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
        assert_eq!(String::from_bytes(&bytes).unwrap(), "hi");
    }

    #[test]
    fn string_invalid_utf8() {
        let mut bytes = 2u64.to_bytes();
        bytes.extend_from_slice(&[0xC3, 0x28]);
        assert_eq!(String::from_bytes(&bytes), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn byte_vec_length_exceeding_input() {
        let bytes = 10u64.to_bytes();
        assert_eq!(
            Vec::<u8>::from_bytes(&bytes),
            Err(DecodeError::UnexpectedEof)
        );
    }

    #[test]
    fn float_uses_bit_pattern() {
        let bytes = 1.5f64.to_bytes();
        assert_eq!(bytes, 1.5f64.to_bits().to_be_bytes().to_vec());
        assert_eq!(f64::from_bytes(&bytes).unwrap(), 1.5);
    }

    #[test]
    fn fixed_array_has_no_prefix() {
        let bytes = [1u8, 2, 3].to_bytes();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(<[u8; 3]>::from_bytes(&bytes).unwrap(), [1, 2, 3]);
    }
}
