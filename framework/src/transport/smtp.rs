use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::AsyncSmtpTransportBuilder;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{parse_options, SentMessage, Transport};
use crate::{MailError, Message};

/// Options for [`SmtpTransport`].
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpOptions {
    #[serde(default = "default_host")]
    pub host: String,
    /// Defaults to the port implied by `encryption`.
    pub port: Option<u16>,
    /// `tls`/`ssl` (implicit TLS), `starttls` (required), `opportunistic`,
    /// or none for plaintext.
    pub encryption: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Name sent with EHLO.
    pub local_domain: Option<String>,
    /// `plain`, `login` or `xoauth2`.
    pub auth_mode: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_timeout() -> u64 {
    10
}

/// SMTP delivery through lettre's pooled async client.
///
/// The pool spawns onto the tokio runtime, so it is created on the first
/// `send` or `ping` rather than when the mailer is resolved.
pub struct SmtpTransport {
    options: SmtpOptions,
    inner: RwLock<Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>>,
}

impl SmtpTransport {
    pub fn new(options: SmtpOptions) -> Result<Self, MailError> {
        Self::builder(&options)?;
        Ok(Self {
            options,
            inner: RwLock::new(None),
        })
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self, MailError> {
        Self::new(parse_options("smtp", options)?)
    }

    pub fn options(&self) -> &SmtpOptions {
        &self.options
    }

    fn builder(options: &SmtpOptions) -> Result<AsyncSmtpTransportBuilder, MailError> {
        let host = options.host.as_str();
        let encryption = options
            .encryption
            .as_deref()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let mut builder = match encryption.as_str() {
            "tls" | "ssl" => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
            "starttls" => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
            "opportunistic" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Opportunistic(TlsParameters::new(host.to_string())?)),
            "" | "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            other => {
                return Err(MailError::options(
                    "smtp",
                    format!("unknown encryption [{other}]"),
                ))
            }
        };

        builder = builder.timeout(Some(Duration::from_secs(options.timeout)));
        if let Some(port) = options.port {
            builder = builder.port(port);
        }
        if let Some(domain) = &options.local_domain {
            builder = builder.hello_name(ClientId::Domain(domain.clone()));
        }
        if let (Some(username), Some(password)) = (&options.username, &options.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        if let Some(mode) = &options.auth_mode {
            let mechanism = match mode.to_ascii_lowercase().as_str() {
                "plain" => Mechanism::Plain,
                "login" => Mechanism::Login,
                "xoauth2" => Mechanism::Xoauth2,
                other => {
                    return Err(MailError::options(
                        "smtp",
                        format!("unknown auth_mode [{other}]"),
                    ))
                }
            };
            builder = builder.authentication(vec![mechanism]);
        }

        Ok(builder)
    }

    /// Must be called from within the runtime.
    fn client(&self) -> Result<Arc<AsyncSmtpTransport<Tokio1Executor>>, MailError> {
        if let Some(client) = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(client.clone());
        }

        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = Arc::new(Self::builder(&self.options)?.build());
        tracing::debug!(host = %self.options.host, "smtp connection pool created");
        *slot = Some(client.clone());
        Ok(client)
    }

    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &Message) -> Result<SentMessage, MailError> {
        let mime = message.to_mime()?;
        let response = self.client()?.send(mime).await?;

        tracing::info!(
            host = %self.options.host,
            message_id = message.message_id(),
            code = %response.code(),
            "mail sent over smtp"
        );

        let lines: Vec<&str> = response.message().collect();
        Ok(SentMessage::for_message(message).response(json!({
            "code": response.code().to_string(),
            "message": lines.join("\n"),
        })))
    }

    async fn ping(&self) -> Result<bool, MailError> {
        Ok(self.client()?.test_connection().await?)
    }

    /// Drop the connection pool so the next send opens a fresh connection.
    async fn reset(&self) -> Result<(), MailError> {
        let stale = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(stale);
        tracing::debug!(host = %self.options.host, "smtp connection pool reset");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
