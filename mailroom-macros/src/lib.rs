extern crate proc_macro;

mod has_mail_address;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derive macro for models that can receive mail
///
/// Derive `HasMailAddress` on a struct and mark its fields with `#[mail(...)]`:
/// - `#[mail(address)]` the mailbox address (required, unless a field is named `email` or `address`)
/// - `#[mail(name)]` the display name (optional, defaults to a field named `name`)
/// - `#[mail(locale)]` the preferred locale (optional)
///
/// Address, name and locale fields may be `String`, `&str`, `Option<String>` or `Option<&str>`.
///
/// The derive also implements `IntoAddress` for the model and for references to it,
/// so the model can be passed anywhere a recipient is accepted.
///
/// ### Example
///
/// ```ignore
/// #[derive(mailroom::HasMailAddress)]
/// struct User {
///     id: i64,
///     #[mail(address)]
///     email: String,
///     #[mail(name)]
///     full_name: Option<String>,
///     #[mail(locale)]
///     locale: Option<String>,
/// }
///
/// mailable.to(&user);
/// assert!(mailable.has_to(&user));
/// ```
#[proc_macro_derive(HasMailAddress, attributes(mail))]
pub fn has_mail_address_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    has_mail_address::has_mail_address_derive_impl(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
