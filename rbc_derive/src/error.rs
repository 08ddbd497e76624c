//! Derive macro for error enums.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations.
//!
//! # Usage
//!
//! ```ignore
//! use rbc_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum LoadError {
//!     #[error("invalid opcode {0}")]
//!     InvalidOpcode(u64),
//!
//!     #[error("expected {expected} operands")]
//!     Arity { expected: usize, actual: usize },
//!
//!     #[error("io error: {0}")]
//!     Io(#[from] std::io::Error),
//! }
//! ```
//!
//! # Supported Features
//!
//! - Unit variants: `#[error("message")]`
//! - Tuple variants with positional args: `#[error("error: {0}")]`
//! - Struct variants with named args: `#[error("expected {expected}")]`
//! - Fields not mentioned in the message are ignored
//! - A single-field tuple variant whose field carries `#[from]` gets a `From`
//!   impl and is reported through `Error::source`

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, Variant, parse_macro_input};

/// Derives `Display` and `Error` for an enum.
///
/// Each variant must have an `#[error("...")]` attribute specifying the
/// display message.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let Data::Enum(data_enum) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Error derive only supports enums",
        ));
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let display_arms = data_enum
        .variants
        .iter()
        .map(display_arm)
        .collect::<syn::Result<Vec<_>>>()?;

    let from_variants: Vec<_> = data_enum.variants.iter().filter_map(from_field).collect();

    let source_arms = from_variants.iter().map(|(variant, _)| {
        quote! {
            Self::#variant(inner) => Some(inner as &(dyn ::std::error::Error + 'static)),
        }
    });

    let from_impls = from_variants.iter().map(|(variant, ty)| {
        quote! {
            impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                fn from(inner: #ty) -> Self {
                    Self::#variant(inner)
                }
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, __f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#display_arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            #[allow(unreachable_patterns)]
            fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                match self {
                    #(#source_arms)*
                    _ => None,
                }
            }
        }

        #(#from_impls)*
    })
}

/// Builds the `Display` match arm for one variant, binding only the fields
/// its message refers to.
fn display_arm(variant: &Variant) -> syn::Result<proc_macro2::TokenStream> {
    let variant_name = &variant.ident;
    let message = extract_error_message(variant)?;

    let arm = match &variant.fields {
        Fields::Unit => quote! {
            Self::#variant_name => write!(__f, #message),
        },
        Fields::Unnamed(fields) => {
            let mut patterns = Vec::with_capacity(fields.unnamed.len());
            let mut args = Vec::new();
            for i in 0..fields.unnamed.len() {
                if mentions(&message, &i.to_string()) {
                    let ident = format_ident!("f{}", i);
                    args.push(quote! { #ident = #ident });
                    patterns.push(quote! { #ident });
                } else {
                    patterns.push(quote! { _ });
                }
            }
            let format_str = convert_positional_to_named(&message, fields.unnamed.len());
            quote! {
                Self::#variant_name(#(#patterns),*) => write!(__f, #format_str #(, #args)*),
            }
        }
        Fields::Named(fields) => {
            let used: Vec<_> = fields
                .named
                .iter()
                .filter_map(|f| f.ident.as_ref())
                .filter(|ident| mentions(&message, &ident.to_string()))
                .collect();
            quote! {
                Self::#variant_name { #(#used,)* .. } => write!(__f, #message #(, #used = #used)*),
            }
        }
    };

    Ok(arm)
}

/// Returns the variant name and field type of a `#[from]` variant.
fn from_field(variant: &Variant) -> Option<(syn::Ident, syn::Type)> {
    let Fields::Unnamed(fields) = &variant.fields else {
        return None;
    };
    if fields.unnamed.len() != 1 {
        return None;
    }
    let field = fields.unnamed.first()?;
    field
        .attrs
        .iter()
        .any(|attr| attr.path().is_ident("from"))
        .then(|| (variant.ident.clone(), field.ty.clone()))
}

/// Whether `message` interpolates the argument `name` (`{name}` or `{name:..}`).
fn mentions(message: &str, name: &str) -> bool {
    message.contains(&format!("{{{name}}}")) || message.contains(&format!("{{{name}:"))
}

/// Extracts the error message from a variant's `#[error("...")]` attribute.
fn extract_error_message(variant: &Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        };
        let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
            syn::Error::new_spanned(
                &attr.meta,
                "failed to parse #[error] attribute; expected a string literal like #[error(\"invalid tag: {0}\")]",
            )
        })?;
        if let Lit::Str(lit_str) = lit {
            return Ok(lit_str.value());
        }
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "invalid #[error] attribute: message must be a string literal",
        ));
    }

    Err(syn::Error::new_spanned(
        &variant.ident,
        format!(
            "missing #[error(\"...\")] attribute on variant `{}`; every error variant must declare a display message",
            variant.ident
        ),
    ))
}

/// Converts positional format args `{0}`, `{1:x}` to named args `{f0}`, `{f1:x}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}
