use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident};

#[derive(Default)]
struct MailFields {
    address: Option<Ident>,
    name: Option<Ident>,
    locale: Option<Ident>,
}

pub(crate) fn has_mail_address_derive_impl(input: DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "HasMailAddress can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "HasMailAddress can only be derived for structs",
            ))
        }
    };

    let mut marked = MailFields::default();
    let mut by_name = MailFields::default();

    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };

        match ident.to_string().as_str() {
            "email" | "address" if by_name.address.is_none() => by_name.address = Some(ident.clone()),
            "name" => by_name.name = Some(ident.clone()),
            "locale" => by_name.locale = Some(ident.clone()),
            _ => {}
        }

        for attr in &field.attrs {
            if !attr.path().is_ident("mail") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                let slot = if meta.path.is_ident("address") {
                    &mut marked.address
                } else if meta.path.is_ident("name") {
                    &mut marked.name
                } else if meta.path.is_ident("locale") {
                    &mut marked.locale
                } else {
                    return Err(meta.error("expected `address`, `name` or `locale`"));
                };
                if slot.is_some() {
                    return Err(meta.error("field role declared more than once"));
                }
                *slot = Some(ident.clone());
                Ok(())
            })?;
        }
    }

    let Some(address) = marked.address.or(by_name.address) else {
        return Err(syn::Error::new_spanned(
            name,
            "no address field: mark one with #[mail(address)]",
        ));
    };
    let display_name = marked.name.or(by_name.name);
    let locale = marked.locale.or(by_name.locale);

    let name_expr = match display_name {
        Some(field) => quote! { ::mailroom::address::OptionalText::optional_text(&self.#field) },
        None => quote! { ::std::option::Option::None },
    };

    let locale_fn = locale.map(|field| {
        quote! {
            fn preferred_locale(&self) -> ::std::option::Option<::std::string::String> {
                ::mailroom::address::OptionalText::optional_text(&self.#field)
            }
        }
    });

    let expanded = quote! {
        impl #impl_generics ::mailroom::HasMailAddress for #name #ty_generics #where_clause {
            fn mail_address(&self) -> ::std::string::String {
                ::mailroom::address::OptionalText::optional_text(&self.#address).unwrap_or_default()
            }

            fn mail_address_display_name(&self) -> ::std::option::Option<::std::string::String> {
                #name_expr
            }

            #locale_fn
        }

        impl #impl_generics ::mailroom::IntoAddress for #name #ty_generics #where_clause {
            fn into_address(self) -> ::mailroom::Address {
                ::mailroom::address::address_of(&self)
            }

            fn preferred_locale(&self) -> ::std::option::Option<::std::string::String> {
                ::mailroom::HasMailAddress::preferred_locale(self)
            }
        }

        impl #impl_generics ::mailroom::IntoAddress for &#name #ty_generics #where_clause {
            fn into_address(self) -> ::mailroom::Address {
                ::mailroom::address::address_of(self)
            }

            fn preferred_locale(&self) -> ::std::option::Option<::std::string::String> {
                ::mailroom::HasMailAddress::preferred_locale(*self)
            }
        }
    };

    Ok(expanded)
}
