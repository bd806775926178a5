use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{parse_options, SentMessage, Transport};
use crate::{MailError, Message};

#[derive(Debug, Clone, Deserialize)]
pub struct LogOptions {
    #[serde(default = "default_channel")]
    pub name: String,
}

fn default_channel() -> String {
    "mail.local".to_string()
}

/// Writes the encoded message to the log instead of delivering it.
#[derive(Debug, Clone)]
pub struct LogTransport {
    channel: String,
}

impl LogTransport {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self, MailError> {
        let options: LogOptions = parse_options("log", options)?;
        Ok(Self::new(options.name))
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &Message) -> Result<SentMessage, MailError> {
        let formatted = message.formatted()?;
        tracing::debug!(
            channel = %self.channel,
            message_id = message.message_id(),
            "{}",
            String::from_utf8_lossy(&formatted)
        );
        Ok(SentMessage::for_message(message))
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
