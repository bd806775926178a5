use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{parse_options, provider_error, SentMessage, Transport};
use crate::mail::message::{Disposition, XPriority};
use crate::{Address, MailError, Message};

#[derive(Debug, Clone, Deserialize)]
pub struct PostmarkOptions {
    pub token: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Message stream, e.g. `outbound` or `broadcast`.
    pub message_stream: Option<String>,
}

fn default_endpoint() -> String {
    "https://api.postmarkapp.com".to_string()
}

/// Postmark's JSON email API.
pub struct PostmarkTransport {
    client: reqwest::Client,
    options: PostmarkOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Payload {
    from: String,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    headers: Vec<PayloadHeader>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<PayloadAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_stream: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PayloadHeader {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PayloadAttachment {
    name: String,
    content: String,
    content_type: String,
    #[serde(rename = "ContentID", skip_serializing_if = "Option::is_none")]
    content_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkResponse {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: String,
    #[serde(rename = "MessageID")]
    message_id: Option<String>,
}

fn join(addresses: &[Address]) -> Option<String> {
    if addresses.is_empty() {
        return None;
    }
    Some(
        addresses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

impl PostmarkTransport {
    pub fn new(options: PostmarkOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self, MailError> {
        Ok(Self::new(parse_options("postmark", options)?))
    }

    fn payload(&self, message: &Message) -> Result<Payload, MailError> {
        let from = message
            .from()
            .ok_or_else(|| MailError::Build("message has no from address".into()))?;

        let mut headers: Vec<PayloadHeader> = message
            .headers()
            .iter()
            .map(|(name, value)| PayloadHeader {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        if let Some(level) = message.priority() {
            headers.push(PayloadHeader {
                name: "X-Priority".into(),
                value: XPriority(level).to_string(),
            });
        }

        let attachments = message
            .attachments()
            .iter()
            .map(|attachment| PayloadAttachment {
                name: attachment.filename.clone(),
                content: STANDARD.encode(&attachment.data),
                content_type: attachment.content_type.clone(),
                content_id: match &attachment.disposition {
                    Disposition::Inline { content_id } => Some(format!("cid:{content_id}")),
                    Disposition::Attachment => None,
                },
            })
            .collect();

        Ok(Payload {
            from: from.to_string(),
            to: join(message.to()).unwrap_or_default(),
            cc: join(message.cc()),
            bcc: join(message.bcc()),
            reply_to: join(message.reply_to()),
            subject: message.subject().unwrap_or_default().to_string(),
            html_body: message.html().map(str::to_string),
            text_body: message.text().map(str::to_string),
            headers,
            attachments,
            message_stream: self.options.message_stream.clone(),
        })
    }
}

#[async_trait]
impl Transport for PostmarkTransport {
    async fn send(&self, message: &Message) -> Result<SentMessage, MailError> {
        let payload = self.payload(message)?;
        let url = format!("{}/email", self.options.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", &self.options.token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(provider_error("postmark", response).await);
        }

        let body: PostmarkResponse = response.json().await?;
        if body.error_code != 0 {
            return Err(MailError::Provider {
                provider: "postmark",
                status: status.as_u16(),
                message: format!("{} (error code {})", body.message, body.error_code),
            });
        }

        tracing::info!(
            message_id = message.message_id(),
            postmark_id = body.message_id.as_deref().unwrap_or_default(),
            "mail accepted by postmark"
        );

        let mut sent = SentMessage::for_message(message).response(Value::String(body.message));
        if let Some(id) = body.message_id {
            sent = sent.provider_id(id);
        }
        Ok(sent)
    }

    fn name(&self) -> &'static str {
        "postmark"
    }
}
