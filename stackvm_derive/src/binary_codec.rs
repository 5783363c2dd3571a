//! Derive macro for wire-format structs.
//!
//! Only structs with named fields are supported. Each field is written with its
//! own `Encode` impl in declaration order, so the layout of a header struct is
//! exactly the concatenation of its fields:
//!
//! ```ignore
//! #[derive(BinaryCodec)]
//! pub struct Header {
//!     pub version: Version, // 6 bytes
//!     pub program_size: u32, // 4 bytes, little-endian
//! }
//! ```
//!
//! Tuple structs, unit structs, enums and unions are rejected at compile time
//! because their layout would be implicit.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_binary_codec(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_binary_codec(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "BinaryCodec requires named fields so the wire layout is explicit",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "BinaryCodec can only be derived for structs",
            ));
        }
    };

    let field_names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();

    Ok(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #( crate::types::encoding::Encode::encode(&self.#field_names, out); )*
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                Ok(Self {
                    #( #field_names: crate::types::encoding::Decode::decode(input)?, )*
                })
            }
        }
    })
}
