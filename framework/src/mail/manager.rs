//! Resolves configured mailers by name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

use super::events::{LogListener, MailListener};
use super::mailable::{MailContent, Mailable, MailParts};
use super::mailer::{Dispatched, MailDispatcher, Mailer};
use super::pending::PendingMail;
use super::services::MailServices;
use super::view::ViewRenderer;
use crate::config::{MailConfig, MailerConfig};
use crate::jobs::Queues;
use crate::storage::Disks;
use crate::transport::{self, Dsn, Transport, TransportFactory};
use crate::{IntoAddresses, MailError};

/// Entry point for sending mail.
///
/// Mailers are built lazily from [`MailConfig`] on first use and cached by
/// name.
///
/// ```ignore
/// let manager = MailManager::new(MailConfig::load(None)?)
///     .with_views(TeraRenderer::new("templates/**/*")?)
///     .with_queues(Queues::new().with("mail", MemoryQueue::new()));
///
/// manager.to(&user).send(Mailable::new(Welcome { name })).await?;
/// manager.mailer(Some("postmark"))?.send(&invoice).await?;
/// ```
pub struct MailManager {
    config: MailConfig,
    services: MailServices,
    transports: HashMap<String, TransportFactory>,
    mailers: Mutex<HashMap<String, Arc<Mailer>>>,
}

impl MailManager {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            services: MailServices::default(),
            transports: HashMap::new(),
            mailers: Mutex::new(HashMap::new()),
        }
    }

    /// Build from `.env` and `MAIL_*` environment variables.
    pub fn from_env() -> Result<Self, MailError> {
        Ok(Self::new(MailConfig::load(None)?))
    }

    pub fn config(&self) -> &MailConfig {
        &self.config
    }

    pub fn services(&self) -> &MailServices {
        &self.services
    }

    pub fn with_services(mut self, services: MailServices) -> Self {
        self.services = services;
        self.purge_all();
        self
    }

    pub fn with_views(self, views: impl ViewRenderer) -> Self {
        let services = self.services.clone().with_views(views);
        self.with_services(services)
    }

    pub fn with_disks(self, disks: Disks) -> Self {
        let services = self.services.clone().with_disks(disks);
        self.with_services(services)
    }

    pub fn with_queues(self, queues: Queues) -> Self {
        let services = self.services.clone().with_queues(queues);
        self.with_services(services)
    }

    pub fn listen(self, listener: impl MailListener) -> Self {
        let services = self.services.clone().listen(listener);
        self.with_services(services)
    }

    pub fn build_view_data_using<F>(self, callback: F) -> Self
    where
        F: Fn(&MailParts) -> Map<String, Value> + Send + Sync + 'static,
    {
        let services = self.services.clone().build_view_data_using(callback);
        self.with_services(services)
    }

    /// Register a custom transport. Takes precedence over a bundled
    /// transport of the same name.
    ///
    /// ```ignore
    /// manager.extend("ses", |options| Ok(Arc::new(SesTransport::from_options(options)?)));
    /// ```
    pub fn extend<F>(&mut self, transport: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Map<String, Value>) -> Result<Arc<dyn Transport>, MailError> + Send + Sync + 'static,
    {
        self.transports.insert(transport.into(), Arc::new(factory));
        self.purge_all();
        self
    }

    pub fn default_mailer(&self) -> &str {
        &self.config.default
    }

    /// The named mailer, or the default one.
    pub fn mailer(&self, name: Option<&str>) -> Result<Arc<Mailer>, MailError> {
        let name = name
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.config.default);
        self.get(name)
    }

    /// Cached mailer, resolved on first use.
    pub fn get(&self, name: &str) -> Result<Arc<Mailer>, MailError> {
        let mut mailers = self.cache();
        if let Some(mailer) = mailers.get(name) {
            return Ok(mailer.clone());
        }
        let mailer = Arc::new(self.resolve(name)?);
        mailers.insert(name.to_string(), mailer.clone());
        Ok(mailer)
    }

    /// Forget a cached mailer so the next use rebuilds it.
    pub fn purge(&self, name: &str) {
        self.cache().remove(name);
    }

    fn purge_all(&self) {
        self.cache().clear();
    }

    /// Send through the mailer named on the mailable, or the default.
    pub async fn send<C: MailContent>(&self, mailable: &Mailable<C>) -> Result<Dispatched, MailError> {
        self.mailer(mailable.mailer.as_deref())?
            .send(mailable)
            .await
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

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<Mailer>>> {
        self.mailers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resolve(&self, name: &str) -> Result<Mailer, MailError> {
        let config = self
            .config
            .mailer(name)
            .ok_or_else(|| MailError::MailerNotDefined(name.to_string()))?;
        let transport = self.create_transport(config)?;

        let mut services = self.services.clone();
        if self.config.logger.enabled {
            services
                .events
                .listen(LogListener::new(self.config.logger.name.clone()));
        }

        let mut mailer = Mailer::new(name, transport).with_services(services);
        mailer.set_reconnect(config.reconnect);
        if let Some(domain) = &config.domain {
            mailer.set_domain(domain.clone());
        }
        if let Some(from) = config.from.as_ref().or(self.config.from.as_ref()) {
            mailer.set_always_from(from);
        }
        if let Some(reply_to) = config.reply_to.as_ref().or(self.config.reply_to.as_ref()) {
            mailer.set_always_reply_to(reply_to);
        }
        if let Some(to) = config.to.as_ref().or(self.config.to.as_ref()) {
            mailer.set_always_to(to);
        }
        if let Some(return_path) = config
            .return_path
            .as_ref()
            .or(self.config.return_path.as_ref())
        {
            mailer.set_always_return_path(return_path.clone());
        }

        log::debug!(
            "resolved mailer [{name}] using the {} transport",
            mailer.transport().name()
        );
        Ok(mailer)
    }

    fn create_transport(&self, config: &MailerConfig) -> Result<Arc<dyn Transport>, MailError> {
        let named = config.transport.as_deref().filter(|t| !t.is_empty());
        let dsn = config.dsn.as_deref().filter(|d| !d.is_empty());

        let (name, options) = match (named, dsn) {
            (Some(name), _) => (name.to_string(), config.options.clone()),
            (None, Some(dsn)) => {
                let (name, mut options) = Dsn::parse(dsn)?.into_transport()?;
                for (key, value) in &config.options {
                    options.entry(key.clone()).or_insert_with(|| value.clone());
                }
                (name, options)
            }
            (None, None) => return Err(MailError::TransportNotSpecified),
        };

        match self.transports.get(&name) {
            Some(factory) => factory(&options),
            None => transport::create(&name, &options),
        }
    }
}

impl MailDispatcher for MailManager {
    fn resolve_mailer(&self, name: Option<&str>) -> Result<Arc<Mailer>, MailError> {
        self.mailer(name)
    }
}

impl std::fmt::Debug for MailManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailManager")
            .field("default", &self.config.default)
            .field("transports", &self.transports.keys().collect::<Vec<_>>())
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
