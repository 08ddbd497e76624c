//! Derive macros for the `rbc` crate.
//!
//! Provides:
//! - `#[derive(Error)]` - `Display`, `std::error::Error` and `#[from]` conversions for error enums
//! - `#[derive(MarshalRecord)]` - field-order marshalling for fixed compiled-file records

mod error;
mod marshal_record;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` for an error enum.
#[proc_macro_derive(Error, attributes(error, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}

/// Implements `MarshalRecord` for a struct whose fields are marshalled in declaration order.
#[proc_macro_derive(MarshalRecord)]
pub fn derive_marshal_record(input: TokenStream) -> TokenStream {
    marshal_record::derive_marshal_record(input)
}
