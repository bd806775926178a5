//! Hooks around every delivery.

use std::sync::Arc;

use crate::{MailError, Message, SentMessage};

/// Fired before a message is handed to the transport.
pub struct MessageSending<'a> {
    pub mailer: &'a str,
    pub message: &'a Message,
}

/// Fired after the transport accepted a message.
pub struct MessageSent<'a> {
    pub mailer: &'a str,
    pub message: &'a Message,
    pub sent: &'a SentMessage,
}

/// Fired when the transport rejected a message.
pub struct MessageFailed<'a> {
    pub mailer: &'a str,
    pub message: &'a Message,
    pub error: &'a MailError,
}

/// Observes deliveries. Every method has a no-op default.
pub trait MailListener: Send + Sync + 'static {
    /// Return `false` to cancel the delivery.
    fn sending(&self, _event: &MessageSending<'_>) -> bool {
        true
    }

    fn sent(&self, _event: &MessageSent<'_>) {}

    fn failed(&self, _event: &MessageFailed<'_>) {}
}

#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Vec<Arc<dyn MailListener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&mut self, listener: impl MailListener) -> &mut Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Stops at the first listener that vetoes.
    pub fn sending(&self, event: &MessageSending<'_>) -> bool {
        self.listeners.iter().all(|listener| listener.sending(event))
    }

    pub fn sent(&self, event: &MessageSent<'_>) {
        for listener in &self.listeners {
            listener.sent(event);
        }
    }

    pub fn failed(&self, event: &MessageFailed<'_>) {
        for listener in &self.listeners {
            listener.failed(event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Logs every delivery. Registered by the manager when `logger.enabled` is set.
#[derive(Debug, Clone)]
pub struct LogListener {
    channel: String,
}

impl LogListener {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

fn recipients(message: &Message) -> String {
    message
        .recipients()
        .iter()
        .map(|a| a.address.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl MailListener for LogListener {
    fn sending(&self, event: &MessageSending<'_>) -> bool {
        tracing::debug!(
            channel = %self.channel,
            mailer = event.mailer,
            message_id = event.message.message_id(),
            subject = event.message.subject().unwrap_or_default(),
            to = %recipients(event.message),
            "sending mail"
        );
        true
    }

    fn sent(&self, event: &MessageSent<'_>) {
        tracing::info!(
            channel = %self.channel,
            mailer = event.mailer,
            message_id = %event.sent.message_id,
            recipients = event.sent.recipients,
            "mail sent"
        );
    }

    fn failed(&self, event: &MessageFailed<'_>) {
        tracing::error!(
            channel = %self.channel,
            mailer = event.mailer,
            message_id = event.message.message_id(),
            error = %event.error,
            "mail delivery failed"
        );
    }
}
