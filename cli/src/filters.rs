use askama::Result;
use heck::{ToSnakeCase, ToTitleCase};

// Filters referenced from templates/mail.rst.
pub fn snake_case(s: impl AsRef<str>) -> Result<String> {
    Ok(s.as_ref().to_snake_case())
}

pub fn title_case(s: impl AsRef<str>) -> Result<String> {
    Ok(s.as_ref().to_title_case())
}
