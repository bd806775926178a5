use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{SentMessage, Transport};
use crate::{MailError, Message};

/// Keeps every message in memory.
///
/// Clones share storage, so a handle kept before registering the transport
/// with [`MailManager::extend`](crate::MailManager::extend) sees what was sent.
#[derive(Debug, Clone, Default)]
pub struct ArrayTransport {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl ArrayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    pub async fn flush(&self) {
        self.messages.lock().await.clear();
    }
}

#[async_trait]
impl Transport for ArrayTransport {
    async fn send(&self, message: &Message) -> Result<SentMessage, MailError> {
        self.messages.lock().await.push(message.clone());
        Ok(SentMessage::for_message(message))
    }

    fn name(&self) -> &'static str {
        "array"
    }
}
