//! Derive macros for the skiff crate.
//!
//! Provides:
//! - `#[derive(Error)]` - `Display` and `std::error::Error` from `#[error("...")]` messages
//! - `#[derive(BinaryCodec)]` - big-endian `Encode`/`Decode` for binary image records

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` (from `crate::types::encoding`) for a type.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` for an error enum.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
