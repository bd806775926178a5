//! A named transport plus the global addresses applied to every message.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::events::{MessageFailed, MessageSending, MessageSent};
use super::mailable::{MailContent, Mailable};
use super::message::Message;
use super::pending::PendingMail;
use super::services::MailServices;
use crate::transport::{SentMessage, Transport};
use crate::{Address, IntoAddress, IntoAddresses, MailError};

/// Resolves the mailer a mailable is sent through.
///
/// Implemented by [`MailManager`](crate::MailManager), which honours the
/// mailer named on the mailable, and by [`Mailer`] itself, which only knows
/// its own name.
pub trait MailDispatcher: Send + Sync {
    fn resolve_mailer(&self, name: Option<&str>) -> Result<Arc<Mailer>, MailError>;
}

impl MailDispatcher for Mailer {
    fn resolve_mailer(&self, name: Option<&str>) -> Result<Arc<Mailer>, MailError> {
        self.ensure_named(name)?;
        Ok(Arc::new(self.clone()))
    }
}

impl MailDispatcher for Arc<Mailer> {
    fn resolve_mailer(&self, name: Option<&str>) -> Result<Arc<Mailer>, MailError> {
        self.ensure_named(name)?;
        Ok(self.clone())
    }
}

/// What happened to a mailable handed to [`Mailer::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Sent(SentMessage),
    /// A `sending` listener cancelled the delivery.
    Vetoed,
    /// Pushed onto a queue; holds the job id.
    Queued(Uuid),
}

impl Dispatched {
    pub fn is_sent(&self) -> bool {
        matches!(self, Dispatched::Sent(_))
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Dispatched::Queued(_))
    }

    pub fn sent(&self) -> Option<&SentMessage> {
        match self {
            Dispatched::Sent(sent) => Some(sent),
            _ => None,
        }
    }
}

/// Sends mailables through one transport.
///
/// Mailers are usually resolved from configuration by the
/// [`MailManager`](crate::MailManager), but can be built directly:
///
/// ```ignore
/// let mut mailer = Mailer::new("outbox", Arc::new(ArrayTransport::new()));
/// mailer.set_always_from(("noreply@example.com", "Example"));
/// mailer.to("jane@example.com").send(Mailable::new(Welcome)).await?;
/// ```
#[derive(Clone)]
pub struct Mailer {
    name: String,
    transport: Arc<dyn Transport>,
    services: MailServices,
    from: Option<Address>,
    reply_to: Option<Address>,
    to: Option<Address>,
    return_path: Option<String>,
    domain: Option<String>,
    reconnect: bool,
}

impl Mailer {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            services: MailServices::default(),
            from: None,
            reply_to: None,
            to: None,
            return_path: None,
            domain: None,
            reconnect: false,
        }
    }

    pub fn with_services(mut self, services: MailServices) -> Self {
        self.services = services;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn services(&self) -> &MailServices {
        &self.services
    }

    /// From address for every message; a mailable's own `from` wins.
    pub fn set_always_from(&mut self, address: impl IntoAddress) -> &mut Self {
        self.from = Some(address.into_address());
        self
    }

    pub fn set_always_reply_to(&mut self, address: impl IntoAddress) -> &mut Self {
        self.reply_to = Some(address.into_address());
        self
    }

    /// Redirect every message to `address`, dropping Cc and Bcc.
    pub fn set_always_to(&mut self, address: impl IntoAddress) -> &mut Self {
        self.to = Some(address.into_address());
        self
    }

    pub fn set_always_return_path(&mut self, address: impl Into<String>) -> &mut Self {
        self.return_path = Some(address.into());
        self
    }

    /// Domain used for generated Message-IDs and content ids.
    pub fn set_domain(&mut self, domain: impl Into<String>) -> &mut Self {
        self.domain = Some(domain.into());
        self
    }

    /// Reset the transport after every delivery.
    pub fn set_reconnect(&mut self, reconnect: bool) -> &mut Self {
        self.reconnect = reconnect;
        self
    }

    pub fn to(&self, users: impl IntoAddresses) -> PendingMail<'_, Self> {
        PendingMail::new(self).to(users)
    }

    pub fn cc(&self, users: impl IntoAddresses) -> PendingMail<'_, Self> {
        PendingMail::new(self).cc(users)
    }

    pub fn bcc(&self, users: impl IntoAddresses) -> PendingMail<'_, Self> {
        PendingMail::new(self).bcc(users)
    }

    pub fn locale(&self, locale: impl Into<String>) -> PendingMail<'_, Self> {
        PendingMail::new(self).locale(locale)
    }

    /// Build the mailable and return its html body, or the text body when
    /// there is no html.
    pub async fn render<C: MailContent>(&self, mailable: &Mailable<C>) -> Result<String, MailError> {
        let mut message = self.create_message();
        mailable.handler(&mut message, &self.services).await?;
        Ok(message
            .html()
            .or(message.text())
            .unwrap_or_default()
            .to_string())
    }

    /// Queue the mailable when its content asks for it, otherwise deliver now.
    pub async fn send<C: MailContent>(&self, mailable: &Mailable<C>) -> Result<Dispatched, MailError> {
        if C::SHOULD_QUEUE {
            return self.queue(mailable, None).await.map(Dispatched::Queued);
        }
        Ok(match self.send_now(mailable).await? {
            Some(sent) => Dispatched::Sent(sent),
            None => Dispatched::Vetoed,
        })
    }

    /// Build and deliver. `Ok(None)` means a listener vetoed the message.
    pub async fn send_now<C: MailContent>(
        &self,
        mailable: &Mailable<C>,
    ) -> Result<Option<SentMessage>, MailError> {
        let mut message = self.create_message();
        mailable.handler(&mut message, &self.services).await?;

        if let Some(to) = &self.to {
            message
                .replace_to(vec![to.clone()])
                .replace_cc(Vec::new())
                .replace_bcc(Vec::new());
        }

        let events = &self.services.events;
        if !events.sending(&MessageSending {
            mailer: &self.name,
            message: &message,
        }) {
            tracing::info!(
                mailer = %self.name,
                message_id = message.message_id(),
                "delivery cancelled by listener"
            );
            return Ok(None);
        }

        let result = self.transport.send(&message).await;

        if self.reconnect {
            if let Err(error) = self.transport.reset().await {
                tracing::warn!(mailer = %self.name, %error, "failed to reset transport");
            }
        }

        match result {
            Ok(sent) => {
                events.sent(&MessageSent {
                    mailer: &self.name,
                    message: &message,
                    sent: &sent,
                });
                Ok(Some(sent))
            }
            Err(error) => {
                events.failed(&MessageFailed {
                    mailer: &self.name,
                    message: &message,
                    error: &error,
                });
                Err(error)
            }
        }
    }

    /// Queue through this mailer's queues. The job remembers this mailer.
    pub async fn queue<C: MailContent>(
        &self,
        mailable: &Mailable<C>,
        queue: Option<&str>,
    ) -> Result<Uuid, MailError> {
        self.stamped(mailable)
            .queue(&self.services.queues, queue)
            .await
    }

    pub async fn later<C: MailContent>(
        &self,
        mailable: &Mailable<C>,
        delay: Duration,
        queue: Option<&str>,
    ) -> Result<Uuid, MailError> {
        self.stamped(mailable)
            .later(&self.services.queues, delay, queue)
            .await
    }

    fn ensure_named(&self, name: Option<&str>) -> Result<(), MailError> {
        match name {
            Some(name) if name != self.name => Err(MailError::MailerNotDefined(name.to_string())),
            _ => Ok(()),
        }
    }

    fn stamped<C: MailContent>(&self, mailable: &Mailable<C>) -> Mailable<C> {
        let mut mailable = mailable.clone();
        mailable.mailer(self.name.clone());
        mailable
    }

    fn create_message(&self) -> Message {
        let mut message = Message::new(self.domain.as_deref());
        if let Some(from) = &self.from {
            message.set_from(from);
        }
        if let Some(reply_to) = &self.reply_to {
            message.set_reply_to(reply_to);
        }
        if let Some(return_path) = &self.return_path {
            message.set_return_path(return_path.clone());
        }
        message
    }
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("name", &self.name)
            .field("transport", &self.transport.name())
            .field("from", &self.from)
            .field("to", &self.to)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}
