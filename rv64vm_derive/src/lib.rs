//! Derive macros for the rv64vm crate.
//!
//! Provides `#[derive(Error)]`, an in-house replacement for the `thiserror`
//! crate that generates `Display` and `std::error::Error` implementations
//! from `#[error("...")]` variant attributes.

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `std::error::Error` for an error enum.
///
/// Each variant must carry an `#[error("...")]` attribute. The message may
/// interpolate fields: `{name}` for named fields, `{0}`, `{1}`, ... for
/// tuple fields. Standard format specs (`{addr:#x}`) are passed through.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
