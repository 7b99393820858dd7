//! `#[derive(Error)]` for error enums.
//!
//! ```ignore
//! use skiff_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum LoadError {
//!     #[error("unknown opcode {0:#04x}")]
//!     UnknownOpcode(u8),
//!
//!     #[error("line {line}: {message}")]
//!     Malformed { line: usize, message: String },
//!
//!     #[error("truncated image")]
//!     Truncated,
//! }
//! ```
//!
//! Tuple fields are referenced positionally (`{0}`), named fields by name.
//! Format specs such as `{0:#04x}` are kept intact.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Variant, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Error can only be derived for enums",
        ));
    };

    let arms = data
        .variants
        .iter()
        .map(display_arm)
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

fn display_arm(variant: &Variant) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &variant.ident;
    let message = error_message(&variant.attrs, variant)?;

    Ok(match &variant.fields {
        Fields::Unit => quote! {
            Self::#ident => f.write_str(#message),
        },
        Fields::Unnamed(fields) => {
            let bindings: Vec<_> = (0..fields.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let format = positional_to_named(&message, bindings.len());
            quote! {
                Self::#ident(#(#bindings),*) => write!(f, #format, #(#bindings = #bindings),*),
            }
        }
        Fields::Named(fields) => {
            let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
            quote! {
                #[allow(unused_variables)]
                Self::#ident { #(#names),* } => write!(f, #message, #(#names = #names),*),
            }
        }
    })
}

/// Reads the string literal from `#[error("...")]`.
fn error_message(attrs: &[Attribute], variant: &Variant) -> syn::Result<String> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                variant,
                format!(
                    "variant `{}` is missing #[error(\"...\")]",
                    variant.ident
                ),
            )
        })?;
    let lit: LitStr = attr.parse_args().map_err(|_| {
        syn::Error::new_spanned(attr, "expected #[error(\"message\")] with a string literal")
    })?;
    Ok(lit.value())
}

/// Rewrites `{0}` / `{0:x}` to `{f0}` / `{f0:x}` so tuple fields bind by name.
fn positional_to_named(format: &str, count: usize) -> String {
    let mut out = format.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    out
}
