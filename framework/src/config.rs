//! Mail configuration.
//!
//! [`MailConfig`] can be deserialized from anything `serde` understands, or
//! loaded with [`MailConfig::load`] from an optional file plus `MAIL_`
//! prefixed environment variables (nested keys use `__`):
//!
//! | Variable | Key |
//! |----------|-----|
//! | `MAIL_DEFAULT` | `default` |
//! | `MAIL_FROM__ADDRESS` | `from.address` |
//! | `MAIL_MAILERS__SMTP__DSN` | `mailers.smtp.dsn` |
//! | `MAIL_MAILERS__SMTP__OPTIONS__PORT` | `mailers.smtp.options.port` |
//! | `MAIL_LOGGER__ENABLED` | `logger.enabled` |

use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::Address;

pub use config::ConfigError;

/// Top level mail settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Mailer used when none is named.
    pub default: String,
    pub mailers: HashMap<String, MailerConfig>,
    pub from: Option<Address>,
    pub reply_to: Option<Address>,
    /// Redirect every message to this address (useful in staging).
    pub to: Option<Address>,
    pub return_path: Option<String>,
    pub logger: LoggerConfig,
}

impl Default for MailConfig {
    fn default() -> Self {
        let mut mailers = HashMap::new();
        mailers.insert("smtp".to_string(), MailerConfig::default());
        mailers.insert(
            "sendmail".to_string(),
            MailerConfig::from_dsn("sendmail://default"),
        );
        mailers.insert("log".to_string(), MailerConfig::from_dsn("log://default"));

        Self {
            default: "smtp".to_string(),
            mailers,
            from: Some(Address::with_name("hello@example.com", "Example")),
            reply_to: None,
            to: None,
            return_path: None,
            logger: LoggerConfig::default(),
        }
    }
}

impl MailConfig {
    /// Load from `.env`, the process environment and an optional config file.
    ///
    /// Environment variables win over the file.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(
                config::Environment::with_prefix("MAIL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn mailer(&self, name: &str) -> Option<&MailerConfig> {
        self.mailers.get(name)
    }

    /// Add or replace a mailer definition.
    pub fn with_mailer(mut self, name: impl Into<String>, mailer: MailerConfig) -> Self {
        self.mailers.insert(name.into(), mailer);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = name.into();
        self
    }
}

/// One named mailer.
///
/// The transport comes from `transport` + `options` when a transport is
/// named, otherwise from `dsn`. Address fields override the global ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    pub transport: Option<String>,
    pub options: serde_json::Map<String, serde_json::Value>,
    pub dsn: Option<String>,
    /// Right-hand side of generated Message-IDs.
    pub domain: Option<String>,
    /// Drop the transport connection after every message.
    pub reconnect: bool,
    pub from: Option<Address>,
    pub reply_to: Option<Address>,
    pub to: Option<Address>,
    pub return_path: Option<String>,
}

impl MailerConfig {
    pub fn from_dsn(dsn: impl Into<String>) -> Self {
        Self {
            dsn: Some(dsn.into()),
            ..Default::default()
        }
    }

    pub fn from_transport(transport: impl Into<String>) -> Self {
        Self {
            transport: Some(transport.into()),
            ..Default::default()
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Structured logging of every message a mailer sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub enabled: bool,
    /// Channel name attached to every log event.
    pub name: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "mail".to_string(),
        }
    }
}

/// Deserialize any settings type straight from the environment.
pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
