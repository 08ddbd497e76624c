//! Derive macro for fixed-layout compiled-file records.
//!
//! A record is marshalled as its fields in declaration order, each field
//! through its own `Marshal` impl. On the way back the unmarshaller collects
//! the field nodes and hands them over in the same order. The record's tag and
//! version prefix belong to the caller; the derive only covers the field block.
//!
//! Only structs with named fields are supported, since the field order is the
//! wire order and must be visible at the definition site.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derives `MarshalRecord` for a named-field struct.
///
/// # Example
///
/// ```ignore
/// use rbc_derive::MarshalRecord;
///
/// #[derive(MarshalRecord)]
/// pub struct Pair {
///     pub first: Value,
///     pub second: Value,
/// }
/// ```
///
/// # Generated Code
///
/// ```ignore
/// impl MarshalRecord for Pair {
///     const FIELD_NAMES: &'static [&'static str] = &["first", "second"];
///
///     fn marshal_fields(&self, out: &mut Vec<u8>) {
///         Marshal::marshal(&self.first, out);
///         Marshal::marshal(&self.second, out);
///     }
///
///     fn from_fields(fields: Vec<Value>) -> Result<Self, CompiledFileError> {
///         let found = fields.len();
///         let mut fields = fields.into_iter();
///         let Some(first) = fields.next() else { return Err(/* RecordArity */) };
///         let Some(second) = fields.next() else { return Err(/* RecordArity */) };
///         if fields.next().is_some() {
///             return Err(/* RecordArity */);
///         }
///         Ok(Self { first: From::from(first), second: From::from(second) })
///     }
/// }
/// ```
pub fn derive_marshal_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => fields,
            _ => {
                return syn::Error::new_spanned(
                    &input.ident,
                    "MarshalRecord derive requires named fields (their order is the wire order)",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(&input.ident, "MarshalRecord derive only supports structs")
                .to_compile_error()
                .into();
        }
    };

    let field_names: Vec<_> = fields.named.iter().filter_map(|f| f.ident.as_ref()).collect();
    let field_strings = field_names.iter().map(|ident| ident.to_string());

    let marshal_fields = field_names.iter().map(|ident| {
        quote! {
            crate::compiled_file::marshal::Marshal::marshal(&self.#ident, out);
        }
    });

    let record = name.to_string();
    let field_count = field_names.len();
    let arity_error = quote! {
        ::std::result::Result::Err(
            crate::compiled_file::errors::CompiledFileError::RecordArity {
                record: #record,
                expected: #field_count,
                found,
            },
        )
    };

    let take_fields = field_names.iter().map(|ident| {
        quote! {
            let ::std::option::Option::Some(#ident) = fields.next() else {
                return #arity_error;
            };
        }
    });

    let expanded = quote! {
        impl #impl_generics crate::compiled_file::marshal::MarshalRecord for #name #ty_generics #where_clause {
            const FIELD_NAMES: &'static [&'static str] = &[#(#field_strings),*];

            fn marshal_fields(&self, out: &mut ::std::vec::Vec<u8>) {
                #(#marshal_fields)*
            }

            fn from_fields(
                fields: ::std::vec::Vec<crate::compiled_file::value::Value>,
            ) -> ::std::result::Result<Self, crate::compiled_file::errors::CompiledFileError> {
                let found = fields.len();
                let mut fields = fields.into_iter();
                #(#take_fields)*
                if fields.next().is_some() {
                    return #arity_error;
                }
                ::std::result::Result::Ok(Self {
                    #( #field_names: ::std::convert::From::from(#field_names), )*
                })
            }
        }
    };

    TokenStream::from(expanded)
}
