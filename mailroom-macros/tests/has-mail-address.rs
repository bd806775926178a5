use mailroom::{Address, HasMailAddress, IntoAddress, IntoAddresses};

#[derive(Clone, HasMailAddress)]
struct User {
    #[allow(dead_code)]
    id: u32,
    email: String,
    name: Option<String>,
}

#[derive(HasMailAddress)]
struct Customer {
    #[mail(address)]
    contact: String,
    #[mail(name)]
    full_name: String,
    #[mail(locale)]
    language: Option<String>,
}

#[test]
fn field_names_are_picked_up_by_convention() {
    let user = User {
        id: 1,
        email: "eric@zhu.email".into(),
        name: Some("Eric Zhu".into()),
    };

    assert_eq!(user.mail_address(), "eric@zhu.email");
    assert_eq!(user.mail_address_display_name().as_deref(), Some("Eric Zhu"));
    assert_eq!(HasMailAddress::preferred_locale(&user), None);
    assert_eq!(
        (&user).into_address(),
        Address::with_name("eric@zhu.email", "Eric Zhu")
    );
}

#[test]
fn marked_fields_override_convention() {
    let customer = Customer {
        contact: "buyer@shop.test".into(),
        full_name: "Bea Buyer".into(),
        language: Some("fr".into()),
    };

    assert_eq!(
        IntoAddresses::preferred_locale(&&customer).as_deref(),
        Some("fr")
    );
    assert_eq!(
        customer.into_addresses(),
        vec![Address::with_name("buyer@shop.test", "Bea Buyer")]
    );
}

#[test]
fn collections_of_models_flatten() {
    let user = User {
        id: 1,
        email: "eric@zhu.email".into(),
        name: None,
    };

    let addresses = vec![user.clone(), user].into_addresses();
    assert_eq!(addresses.len(), 2);
    assert!(addresses.iter().all(|a| a.name.is_none()));
}
