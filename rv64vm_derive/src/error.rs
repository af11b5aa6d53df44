//! Codegen for `#[derive(Error)]`.
//!
//! Expands an error enum into `Display` and `std::error::Error` impls. Each
//! variant declares its message with `#[error("...")]`; fields referenced in
//! the message are interpolated, fields the message does not mention are
//! ignored.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "#[derive(Error)] only supports enums",
        ));
    };

    let name = &input.ident;
    let arms = data
        .variants
        .iter()
        .map(display_arm)
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl ::std::fmt::Display for #name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#arms)*
                }
            }
        }

        impl ::std::error::Error for #name {}
    })
}

/// Builds one `match` arm rendering a variant's `#[error("...")]` message.
fn display_arm(variant: &syn::Variant) -> syn::Result<TokenStream2> {
    let ident = &variant.ident;
    let message = error_message(variant)?;

    Ok(match &variant.fields {
        Fields::Unit => quote! {
            Self::#ident => f.write_str(#message),
        },
        Fields::Named(fields) => {
            let names: Vec<_> = fields
                .named
                .iter()
                .map(|f| f.ident.clone().expect("named field"))
                .collect();
            // Only interpolate the fields the message actually mentions;
            // unused named format arguments are a compile error.
            let used: Vec<_> = names
                .iter()
                .filter(|n| mentions(&message, &n.to_string()))
                .collect();
            quote! {
                Self::#ident { #(#names),* } => {
                    #(let _ = #names;)*
                    write!(f, #message, #(#used = #used),*)
                }
            }
        }
        Fields::Unnamed(fields) => {
            let bindings: Vec<_> = (0..fields.unnamed.len())
                .map(|i| format_ident!("f{i}"))
                .collect();
            let mut rewritten = message.clone();
            let mut used = Vec::new();
            for (i, binding) in bindings.iter().enumerate() {
                if mentions(&rewritten, &i.to_string()) {
                    rewritten = rewritten
                        .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
                        .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
                    used.push(binding);
                }
            }
            quote! {
                Self::#ident(#(#bindings),*) => {
                    #(let _ = #bindings;)*
                    write!(f, #rewritten, #(#used = #used),*)
                }
            }
        }
    })
}

/// Extracts the message literal from a variant's `#[error("...")]` attribute.
fn error_message(variant: &syn::Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if attr.path().is_ident("error") {
            let lit: LitStr = attr.parse_args().map_err(|_| {
                syn::Error::new_spanned(
                    attr,
                    "expected a string literal: #[error(\"message\")]",
                )
            })?;
            return Ok(lit.value());
        }
    }
    Err(syn::Error::new_spanned(
        variant,
        format!(
            "variant `{}` is missing its #[error(\"...\")] attribute",
            variant.ident
        ),
    ))
}

/// Whether `message` interpolates the format argument `name`, with or
/// without a format spec (`{name}` / `{name:#x}`).
fn mentions(message: &str, name: &str) -> bool {
    message.contains(&format!("{{{name}}}")) || message.contains(&format!("{{{name}:"))
}
