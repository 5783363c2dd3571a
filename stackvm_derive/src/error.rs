//! Derive macro for error enums.
//!
//! ```ignore
//! use stackvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum LoadError {
//!     #[error("file not found: {0}")]
//!     NotFound(String),
//!
//!     #[error("unsupported version: expected {expected}, found {found}")]
//!     Version { expected: u16, found: u16 },
//!
//!     #[error("empty module")]
//!     Empty,
//! }
//! ```
//!
//! Messages are passed to `write!` with every field bound as a named argument,
//! so each message must mention every field of its variant.

use proc_macro::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data_enum) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Error can only be derived for enums",
        ));
    };

    let arms = data_enum
        .variants
        .iter()
        .map(|variant| {
            let variant_name = &variant.ident;
            let message = error_message(&variant.attrs, variant_name)?;

            Ok(match &variant.fields {
                Fields::Unit => quote! {
                    Self::#variant_name => write!(f, #message),
                },
                Fields::Unnamed(fields) => {
                    let bindings: Vec<_> = (0..fields.unnamed.len())
                        .map(|i| format_ident!("f{}", i))
                        .collect();
                    let message = positional_to_named(&message, bindings.len());
                    quote! {
                        Self::#variant_name(#(#bindings),*) =>
                            write!(f, #message, #(#bindings = #bindings),*),
                    }
                }
                Fields::Named(fields) => {
                    let bindings: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                    quote! {
                        Self::#variant_name { #(#bindings),* } =>
                            write!(f, #message, #(#bindings = #bindings),*),
                    }
                }
            })
        })
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

/// Reads the string literal out of `#[error("...")]`.
fn error_message<T: ToTokens>(attrs: &[syn::Attribute], target: &T) -> syn::Result<String> {
    let Some(attr) = attrs.iter().find(|a| a.path().is_ident("error")) else {
        return Err(syn::Error::new_spanned(
            target,
            "missing #[error(\"...\")] attribute; every variant needs a display message",
        ));
    };

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] takes a single string literal, e.g. #[error(\"unknown opcode {token}\")]",
        )),
    }
}

/// Rewrites `{0}`, `{1:?}` into `{f0}`, `{f1:?}` so tuple fields can be passed by name.
fn positional_to_named(message: &str, field_count: usize) -> String {
    let mut result = message.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}
