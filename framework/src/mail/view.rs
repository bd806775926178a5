use serde_json::{Map, Value};

use crate::MailError;

/// Renders html and text views of a mailable.
///
/// Called from a blocking thread, so implementations may do file IO.
pub trait ViewRenderer: Send + Sync + 'static {
    fn render(
        &self,
        view: &str,
        data: &Map<String, Value>,
        locale: Option<&str>,
    ) -> Result<String, MailError>;
}

/// [`ViewRenderer`] backed by [`tera`].
///
/// The mailable's locale is available to templates as `locale`.
pub struct TeraRenderer {
    tera: tera::Tera,
}

impl TeraRenderer {
    /// Load every template matching `glob`, e.g. `"templates/mail/**/*"`.
    pub fn new(glob: &str) -> Result<Self, MailError> {
        let tera = tera::Tera::new(glob).map_err(|e| MailError::View {
            view: glob.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { tera })
    }

    pub fn from_tera(tera: tera::Tera) -> Self {
        Self { tera }
    }

    /// Build a renderer from in-memory `(name, source)` pairs.
    pub fn from_templates<I, N, S>(templates: I) -> Result<Self, MailError>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let mut tera = tera::Tera::default();
        for (name, source) in templates {
            tera.add_raw_template(name.as_ref(), source.as_ref())
                .map_err(|e| MailError::View {
                    view: name.as_ref().to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(Self { tera })
    }
}

impl ViewRenderer for TeraRenderer {
    fn render(
        &self,
        view: &str,
        data: &Map<String, Value>,
        locale: Option<&str>,
    ) -> Result<String, MailError> {
        let error = |e: tera::Error| MailError::View {
            view: view.to_string(),
            message: match std::error::Error::source(&e) {
                Some(source) => format!("{e}: {source}"),
                None => e.to_string(),
            },
        };

        let mut context = tera::Context::from_serialize(data).map_err(error)?;
        if let Some(locale) = locale {
            context.insert("locale", locale);
        }
        self.tera.render(view, &context).map_err(error)
    }
}
