use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{parse_options, provider_error, SentMessage, Transport};
use crate::{MailError, Message};

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunOptions {
    pub key: String,
    pub domain: String,
    /// API host, e.g. `api.eu.mailgun.net`. A full base URL is also accepted.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    "api.mailgun.net".to_string()
}

/// Mailgun's raw MIME sending API.
pub struct MailgunTransport {
    client: reqwest::Client,
    options: MailgunOptions,
}

#[derive(Deserialize)]
struct MailgunResponse {
    id: Option<String>,
    message: Option<String>,
}

impl MailgunTransport {
    pub fn new(options: MailgunOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self, MailError> {
        Ok(Self::new(parse_options("mailgun", options)?))
    }

    pub fn url(&self) -> String {
        let endpoint = self.options.endpoint.trim_end_matches('/');
        let base = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };
        format!("{base}/v3/{}/messages.mime", self.options.domain)
    }

    /// Every To, Cc and Bcc contact, comma separated.
    fn to(message: &Message) -> String {
        message
            .recipients()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl Transport for MailgunTransport {
    async fn send(&self, message: &Message) -> Result<SentMessage, MailError> {
        let mime = message.formatted()?;
        let form = Form::new().text("to", Self::to(message)).part(
            "message",
            Part::bytes(mime).file_name("message.mime"),
        );

        let response = self
            .client
            .post(self.url())
            .basic_auth("api", Some(&self.options.key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error("mailgun", response).await);
        }

        let body: MailgunResponse = response.json().await?;
        tracing::info!(
            domain = %self.options.domain,
            message_id = message.message_id(),
            mailgun_id = body.id.as_deref().unwrap_or_default(),
            "mail accepted by mailgun"
        );

        let mut sent = SentMessage::for_message(message);
        if let Some(text) = body.message {
            sent = sent.response(Value::String(text));
        }
        if let Some(id) = body.id {
            sent = sent.provider_id(id);
        }
        Ok(sent)
    }

    fn name(&self) -> &'static str {
        "mailgun"
    }
}
