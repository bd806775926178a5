//! Recipient normalization.
//!
//! Mail methods accept recipients in several shapes: a bare address, an
//! `(address, name)` pair, an [`Address`], an application model implementing
//! [`HasMailAddress`], or a collection of any of those. Every shape is
//! normalized into `Vec<Address>` before it is stored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized mail address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }

    /// Whether `self` satisfies an expected recipient.
    ///
    /// An expectation without a name only compares addresses.
    pub fn matches(&self, expected: &Address) -> bool {
        match expected.name {
            None => self.address == expected.address,
            Some(_) => self == expected,
        }
    }

    pub(crate) fn to_mailbox(&self) -> Result<lettre::message::Mailbox, crate::MailError> {
        let email = self
            .address
            .parse::<lettre::Address>()
            .map_err(|_| crate::MailError::InvalidAddress(self.address.clone()))?;
        Ok(lettre::message::Mailbox::new(self.name.clone(), email))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => write!(f, "{} <{}>", name, self.address),
            _ => f.write_str(&self.address),
        }
    }
}

/// Implemented by application models that can receive mail.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(mailroom::HasMailAddress)]
/// struct User {
///     #[mail(address)]
///     email: String,
///     #[mail(name)]
///     display_name: Option<String>,
///     #[mail(locale)]
///     locale: Option<String>,
/// }
/// ```
pub trait HasMailAddress {
    fn mail_address(&self) -> String;

    fn mail_address_display_name(&self) -> Option<String>;

    /// Locale the recipient prefers to read mail in.
    fn preferred_locale(&self) -> Option<String> {
        None
    }
}

/// Normalize a model into an [`Address`].
pub fn address_of<T: HasMailAddress + ?Sized>(model: &T) -> Address {
    Address {
        address: model.mail_address(),
        name: model.mail_address_display_name(),
    }
}

/// A single recipient in any accepted shape.
pub trait IntoAddress {
    fn into_address(self) -> Address;

    fn preferred_locale(&self) -> Option<String> {
        None
    }
}

impl IntoAddress for Address {
    fn into_address(self) -> Address {
        self
    }
}

impl IntoAddress for &Address {
    fn into_address(self) -> Address {
        self.clone()
    }
}

impl IntoAddress for &str {
    fn into_address(self) -> Address {
        Address::new(self)
    }
}

impl IntoAddress for String {
    fn into_address(self) -> Address {
        Address::new(self)
    }
}

impl IntoAddress for &String {
    fn into_address(self) -> Address {
        Address::new(self.as_str())
    }
}

impl IntoAddress for (&str, &str) {
    fn into_address(self) -> Address {
        Address::with_name(self.0, self.1)
    }
}

impl IntoAddress for (String, String) {
    fn into_address(self) -> Address {
        Address::with_name(self.0, self.1)
    }
}

impl IntoAddress for (&str, Option<&str>) {
    fn into_address(self) -> Address {
        Address {
            address: self.0.to_string(),
            name: self.1.map(str::to_string),
        }
    }
}

/// One or many recipients in any accepted shape.
pub trait IntoAddresses {
    fn into_addresses(self) -> Vec<Address>;

    /// Only a single recipient model may express a locale preference.
    fn preferred_locale(&self) -> Option<String> {
        None
    }
}

impl<T: IntoAddress> IntoAddresses for T {
    fn into_addresses(self) -> Vec<Address> {
        vec![self.into_address()]
    }

    fn preferred_locale(&self) -> Option<String> {
        IntoAddress::preferred_locale(self)
    }
}

impl<T: IntoAddress> IntoAddresses for Vec<T> {
    fn into_addresses(self) -> Vec<Address> {
        self.into_iter().map(IntoAddress::into_address).collect()
    }
}

impl<T: IntoAddress, const N: usize> IntoAddresses for [T; N] {
    fn into_addresses(self) -> Vec<Address> {
        self.into_iter().map(IntoAddress::into_address).collect()
    }
}

impl<T: IntoAddress + Clone> IntoAddresses for &[T] {
    fn into_addresses(self) -> Vec<Address> {
        self.iter().cloned().map(IntoAddress::into_address).collect()
    }
}

/// Text-like field accessor used by the `HasMailAddress` derive.
#[doc(hidden)]
pub trait OptionalText {
    fn optional_text(&self) -> Option<String>;
}

impl OptionalText for String {
    fn optional_text(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl OptionalText for &str {
    fn optional_text(&self) -> Option<String> {
        Some((*self).to_string())
    }
}

impl OptionalText for Option<String> {
    fn optional_text(&self) -> Option<String> {
        self.clone()
    }
}

impl OptionalText for Option<&str> {
    fn optional_text(&self) -> Option<String> {
        self.map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Member;

    impl HasMailAddress for Member {
        fn mail_address(&self) -> String {
            "eric@zhu.email".into()
        }

        fn mail_address_display_name(&self) -> Option<String> {
            Some("Eric Zhu".into())
        }
    }

    #[test]
    fn string_shapes_normalize_without_name() {
        assert_eq!("a@b.c".into_addresses(), vec![Address::new("a@b.c")]);
        assert_eq!(
            vec!["a@b.c", "d@e.f"].into_addresses(),
            vec![Address::new("a@b.c"), Address::new("d@e.f")]
        );
    }

    #[test]
    fn pairs_carry_display_name() {
        assert_eq!(
            ("a@b.c", "Alice").into_addresses(),
            vec![Address::with_name("a@b.c", "Alice")]
        );
    }

    #[test]
    fn model_normalizes_through_trait() {
        assert_eq!(address_of(&Member), Address::with_name("eric@zhu.email", "Eric Zhu"));
    }

    #[test]
    fn nameless_expectation_matches_on_address() {
        let stored = Address::with_name("a@b.c", "Alice");
        assert!(stored.matches(&Address::new("a@b.c")));
        assert!(stored.matches(&Address::with_name("a@b.c", "Alice")));
        assert!(!stored.matches(&Address::with_name("a@b.c", "Bob")));
        assert!(!Address::new("a@b.c").matches(&Address::with_name("a@b.c", "Alice")));
    }

    #[test]
    fn display_includes_name() {
        assert_eq!(Address::with_name("a@b.c", "Alice").to_string(), "Alice <a@b.c>");
        assert_eq!(Address::new("a@b.c").to_string(), "a@b.c");
    }
}
