//! Serialization primitives for the binary image format.
//!
//! [`encoding`] defines the big-endian `Encode`/`Decode` traits that
//! `#[derive(BinaryCodec)]` targets.

pub mod encoding;
