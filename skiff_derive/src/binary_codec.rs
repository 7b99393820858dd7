//! `#[derive(BinaryCodec)]` for image records.
//!
//! Supported shapes:
//! - **Named structs**: fields are written in declaration order.
//! - **Fieldless enums**: written as a single `u8` discriminant. Decoding an
//!   unknown discriminant yields `DecodeError::InvalidValue`.
//!
//! The byte order is whatever `crate::types::encoding` implements for the
//! field types (big-endian for the skiff image format).

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataEnum, DeriveInput, Fields, FieldsNamed, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let expanded = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => named_struct(&input, fields),
            _ => Err(syn::Error::new_spanned(
                &input,
                "BinaryCodec supports structs with named fields only",
            )),
        },
        Data::Enum(data) => fieldless_enum(&input, data),
        Data::Union(_) => Err(syn::Error::new_spanned(
            &input,
            "BinaryCodec does not support unions",
        )),
    };
    match expanded {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn named_struct(
    input: &DeriveInput,
    fields: &FieldsNamed,
) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();

    Ok(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #( crate::types::encoding::Encode::encode(&self.#names, out); )*
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                Ok(Self {
                    #( #names: crate::types::encoding::Decode::decode(input)?, )*
                })
            }
        }
    })
}

fn fieldless_enum(input: &DeriveInput, data: &DataEnum) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut next: u8 = 0;
    let mut variants = Vec::with_capacity(data.variants.len());
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "BinaryCodec enums must be fieldless",
            ));
        }
        let discriminant = match &variant.discriminant {
            Some((_, expr)) => discriminant_value(expr)?,
            None => next,
        };
        next = discriminant.wrapping_add(1);
        variants.push((&variant.ident, discriminant));
    }

    let encode_arms = variants.iter().map(|(ident, value)| {
        quote! { Self::#ident => #value, }
    });
    let decode_arms = variants.iter().map(|(ident, value)| {
        quote! { #value => Ok(Self::#ident), }
    });

    Ok(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                let tag: u8 = match self {
                    #(#encode_arms)*
                };
                crate::types::encoding::Encode::encode(&tag, out);
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                let tag: u8 = crate::types::encoding::Decode::decode(input)?;
                match tag {
                    #(#decode_arms)*
                    _ => Err(crate::types::encoding::DecodeError::InvalidValue),
                }
            }
        }
    })
}

/// Accepts integer literal discriminants (`Extreme = 0x03`).
fn discriminant_value(expr: &syn::Expr) -> syn::Result<u8> {
    if let syn::Expr::Lit(syn::ExprLit {
        lit: syn::Lit::Int(lit),
        ..
    }) = expr
    {
        return lit.base10_parse::<u8>();
    }
    Err(syn::Error::new_spanned(
        expr,
        "discriminant must be an integer literal that fits in a u8",
    ))
}
