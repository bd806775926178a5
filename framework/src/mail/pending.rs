use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::mailable::{MailContent, Mailable};
use super::mailer::{Dispatched, MailDispatcher, Mailer};
use super::manager::MailManager;
use crate::{Address, IntoAddresses, MailError};

/// Recipients and options collected before a mailable is known.
///
/// ```ignore
/// manager
///     .to(&customer)
///     .bcc("audit@example.com")
///     .send(Mailable::new(OrderShipped { order_id: 42, tracking_url }))
///     .await?;
/// ```
///
/// Passing a single recipient that prefers a locale through
/// [`to`](Self::to) also adopts that locale, unless one was set already.
pub struct PendingMail<'a, D: MailDispatcher + ?Sized> {
    dispatcher: &'a D,
    mailer: Option<String>,
    locale: Option<String>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
}

impl<'a, D: MailDispatcher + ?Sized> PendingMail<'a, D> {
    pub fn new(dispatcher: &'a D) -> Self {
        Self {
            dispatcher,
            mailer: None,
            locale: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
        }
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn to(mut self, users: impl IntoAddresses) -> Self {
        if self.locale.is_none() {
            self.locale = users.preferred_locale();
        }
        self.to.extend(users.into_addresses());
        self
    }

    pub fn cc(mut self, users: impl IntoAddresses) -> Self {
        self.cc.extend(users.into_addresses());
        self
    }

    pub fn bcc(mut self, users: impl IntoAddresses) -> Self {
        self.bcc.extend(users.into_addresses());
        self
    }

    /// Copy the collected recipients, locale and mailer onto `mailable`.
    pub fn fill<C: MailContent>(&self, mut mailable: Mailable<C>) -> Mailable<C> {
        mailable
            .to(self.to.clone())
            .cc(self.cc.clone())
            .bcc(self.bcc.clone());
        if let Some(locale) = &self.locale {
            mailable.locale(locale.clone());
        }
        if let Some(mailer) = &self.mailer {
            mailable.mailer(mailer.clone());
        }
        mailable
    }

    pub async fn render<C: MailContent>(&self, mailable: Mailable<C>) -> Result<String, MailError> {
        let mailable = self.fill(mailable);
        self.resolve(&mailable)?.render(&mailable).await
    }

    /// Deliver, or queue when the content asks for it.
    pub async fn send<C: MailContent>(&self, mailable: Mailable<C>) -> Result<Dispatched, MailError> {
        let mailable = self.fill(mailable);
        self.resolve(&mailable)?.send(&mailable).await
    }

    pub async fn send_now<C: MailContent>(
        &self,
        mailable: Mailable<C>,
    ) -> Result<Dispatched, MailError> {
        let mailable = self.fill(mailable);
        Ok(match self.resolve(&mailable)?.send_now(&mailable).await? {
            Some(sent) => Dispatched::Sent(sent),
            None => Dispatched::Vetoed,
        })
    }

    pub async fn queue<C: MailContent>(
        &self,
        mailable: Mailable<C>,
        queue: Option<&str>,
    ) -> Result<Uuid, MailError> {
        let mailable = self.fill(mailable);
        self.resolve(&mailable)?.queue(&mailable, queue).await
    }

    pub async fn later<C: MailContent>(
        &self,
        mailable: Mailable<C>,
        delay: Duration,
        queue: Option<&str>,
    ) -> Result<Uuid, MailError> {
        let mailable = self.fill(mailable);
        self.resolve(&mailable)?
            .later(&mailable, delay, queue)
            .await
    }

    fn resolve<C>(&self, mailable: &Mailable<C>) -> Result<Arc<Mailer>, MailError> {
        self.dispatcher.resolve_mailer(mailable.mailer.as_deref())
    }
}

impl PendingMail<'_, MailManager> {
    /// Send through the named mailer instead of the default one.
    pub fn mailer(mut self, name: impl Into<String>) -> Self {
        self.mailer = Some(name.into());
        self
    }
}
