use async_trait::async_trait;
use lettre::{AsyncSendmailTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{parse_options, SentMessage, Transport};
use crate::{MailError, Message};

#[derive(Debug, Clone, Deserialize)]
pub struct SendmailOptions {
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/usr/sbin/sendmail".to_string()
}

/// Pipes messages into a local sendmail binary.
pub struct SendmailTransport {
    path: String,
    inner: AsyncSendmailTransport<Tokio1Executor>,
}

impl SendmailTransport {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            inner: AsyncSendmailTransport::new_with_command(path.clone()),
            path,
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self, MailError> {
        let options: SendmailOptions = parse_options("sendmail", options)?;
        Ok(Self::new(options.path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Transport for SendmailTransport {
    async fn send(&self, message: &Message) -> Result<SentMessage, MailError> {
        self.inner.send(message.to_mime()?).await?;
        tracing::info!(
            path = %self.path,
            message_id = message.message_id(),
            "mail handed to sendmail"
        );
        Ok(SentMessage::for_message(message))
    }

    fn name(&self) -> &'static str {
        "sendmail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_defaults_to_system_sendmail() {
        let transport = SendmailTransport::from_options(&Map::new()).unwrap();
        assert_eq!(transport.path(), "/usr/sbin/sendmail");
    }
}
