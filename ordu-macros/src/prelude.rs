pub(crate) use crate::utils::krate;
pub use darling::{
    FromAttributes, FromMeta,
    util::{Flag, Override},
};
pub use heck::{ToSnakeCase, ToUpperCamelCase};
pub use itertools::Itertools;
pub use proc_macro2::{Span, TokenStream};
pub use quote::quote;
pub use syn::{
    Data, DeriveInput, Error, Field, Fields, FieldsNamed, Ident, LitStr, Result, Type, Visibility,
    parse2, spanned::Spanned,
};
