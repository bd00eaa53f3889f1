#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)]

mod derive_mapped;
mod prelude;
mod utils;

fn expand<F: FnOnce(proc_macro2::TokenStream) -> syn::Result<proc_macro2::TokenStream>>(
    fun: F,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    fun(input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derives `Reflect`, `IntoValue`, `FromValue` and `Mapped` for a struct
/// with named fields, plus a `<snake_case_name>::Fields` enum naming its
/// properties.
#[proc_macro_derive(Mapped, attributes(ordu))]
pub fn mapped(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    expand(derive_mapped::derive_mapped, input)
}
