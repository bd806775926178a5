//! Mailables: mail described as data plus a lazily run `build` step.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use heck::ToTitleCase;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::job::QueuedMailableJob;
use super::mailer::MailDispatcher;
use super::message::{AttachOptions, Message};
use super::services::MailServices;
use crate::jobs::Queues;
use crate::{Address, IntoAddress, IntoAddresses, MailError, MailManager, SentMessage};

/// The application-defined part of a mailable.
///
/// Its serialized fields are handed to the views, and it is what travels
/// through the queue when the mailable is sent in the background.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct OrderShipped {
///     order_id: u64,
///     tracking_url: String,
/// }
///
/// impl MailContent for OrderShipped {
///     const MAIL_TYPE: &'static str = "mail::order_shipped";
///     const SHOULD_QUEUE: bool = true;
///
///     fn build(&self, mail: &mut MailParts) -> Result<(), MailError> {
///         mail.subject(format!("Order #{} has shipped", self.order_id))
///             .html_view("mail/order_shipped.html")
///             .text_view("mail/order_shipped.txt");
///         Ok(())
///     }
/// }
///
/// let mut mail = Mailable::new(OrderShipped { order_id: 42, tracking_url });
/// mail.to(&customer);
/// manager.send(&mail).await?;
/// ```
pub trait MailContent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable name used as the job type when queued.
    const MAIL_TYPE: &'static str;

    /// Push onto the queue instead of delivering when sent through a mailer.
    const SHOULD_QUEUE: bool = false;

    /// Queue this content prefers when none is given.
    fn queue(&self) -> Option<String> {
        None
    }

    /// Configure the mail. Runs on a copy of the parts every time the
    /// mailable is rendered or sent.
    fn build(&self, mail: &mut MailParts) -> Result<(), MailError>;
}

/// Ad-hoc mailables configured entirely through [`MailParts`].
impl MailContent for () {
    const MAIL_TYPE: &'static str = "mailroom::mailable";

    fn build(&self, _mail: &mut MailParts) -> Result<(), MailError> {
        Ok(())
    }
}

pub type MessageCallback = Arc<dyn Fn(&mut Message) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub file: String,
    #[serde(default)]
    pub options: AttachOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttachment {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub name: String,
    #[serde(default)]
    pub options: AttachOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAttachment {
    /// Disk name; `None` is the default disk.
    pub storage: Option<String>,
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub options: AttachOptions,
}

/// Recipients, content and attachments of a mailable.
///
/// Setters return `&mut Self` so calls chain. `to`, `cc` and `bcc` append
/// (duplicates are kept); `from` and `reply_to` replace.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MailParts {
    pub locale: Option<String>,
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Option<Address>,
    pub subject: Option<String>,
    pub html_view: Option<String>,
    pub text_view: Option<String>,
    pub view_data: Map<String, Value>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub attachments: Vec<FileAttachment>,
    pub raw_attachments: Vec<RawAttachment>,
    pub storage_attachments: Vec<StorageAttachment>,
    /// 1 (highest) to 5 (lowest); no header is written when unset.
    pub priority: Option<u8>,
    pub mailer: Option<String>,
    #[serde(skip)]
    callbacks: Vec<MessageCallback>,
}

impl MailParts {
    pub fn locale(&mut self, locale: impl Into<String>) -> &mut Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn priority(&mut self, level: u8) -> &mut Self {
        self.priority = Some(level);
        self
    }

    /// Effective priority level (3 when unset).
    pub fn priority_level(&self) -> u8 {
        self.priority.unwrap_or(3)
    }

    pub fn from(&mut self, address: impl IntoAddress) -> &mut Self {
        self.from = Some(address.into_address());
        self
    }

    /// Exact match, display name included.
    pub fn has_from(&self, address: impl IntoAddress) -> bool {
        self.from.as_ref() == Some(&address.into_address())
    }

    pub fn reply_to(&mut self, address: impl IntoAddress) -> &mut Self {
        self.reply_to = Some(address.into_address());
        self
    }

    pub fn has_reply_to(&self, address: impl IntoAddresses) -> bool {
        contains(self.reply_to.iter(), address)
    }

    pub fn to(&mut self, address: impl IntoAddresses) -> &mut Self {
        self.to.extend(address.into_addresses());
        self
    }

    /// An expectation without a display name only compares addresses.
    pub fn has_to(&self, address: impl IntoAddresses) -> bool {
        contains(self.to.iter(), address)
    }

    pub fn cc(&mut self, address: impl IntoAddresses) -> &mut Self {
        self.cc.extend(address.into_addresses());
        self
    }

    pub fn has_cc(&self, address: impl IntoAddresses) -> bool {
        contains(self.cc.iter(), address)
    }

    pub fn bcc(&mut self, address: impl IntoAddresses) -> &mut Self {
        self.bcc.extend(address.into_addresses());
        self
    }

    pub fn has_bcc(&self, address: impl IntoAddresses) -> bool {
        contains(self.bcc.iter(), address)
    }

    pub fn subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a local file. A file already attached is ignored.
    pub fn attach(&mut self, file: impl Into<String>, options: AttachOptions) -> &mut Self {
        let file = file.into();
        if !self.attachments.iter().any(|a| a.file == file) {
            self.attachments.push(FileAttachment { file, options });
        }
        self
    }

    /// Attach a file read from a storage disk when the mail is built.
    ///
    /// `name` defaults to the file name of `path`.
    pub fn attach_from_storage(
        &mut self,
        storage: Option<&str>,
        path: impl Into<String>,
        name: Option<&str>,
        options: AttachOptions,
    ) -> &mut Self {
        let path = path.into();
        let attachment = StorageAttachment {
            storage: storage.filter(|s| !s.is_empty()).map(str::to_string),
            name: name.map(str::to_string).unwrap_or_else(|| base_name(&path)),
            path,
            options,
        };
        let duplicate = self.storage_attachments.iter().any(|a| {
            a.name == attachment.name && a.storage == attachment.storage && a.path == attachment.path
        });
        if !duplicate {
            self.storage_attachments.push(attachment);
        }
        self
    }

    pub fn attach_from_default_storage(
        &mut self,
        path: impl Into<String>,
        name: Option<&str>,
        options: AttachOptions,
    ) -> &mut Self {
        self.attach_from_storage(None, path, name, options)
    }

    /// Attach in-memory data. The same name and data is only attached once.
    pub fn attach_data(
        &mut self,
        data: impl Into<Vec<u8>>,
        name: impl Into<String>,
        options: AttachOptions,
    ) -> &mut Self {
        let attachment = RawAttachment {
            data: data.into(),
            name: name.into(),
            options,
        };
        if !self
            .raw_attachments
            .iter()
            .any(|a| a.name == attachment.name && a.data == attachment.data)
        {
            self.raw_attachments.push(attachment);
        }
        self
    }

    /// Send through the named mailer instead of the default one.
    pub fn mailer(&mut self, mailer: impl Into<String>) -> &mut Self {
        self.mailer = Some(mailer.into());
        self
    }

    /// Customize the built [`Message`] right before attachments are added.
    ///
    /// Callbacks are not serialized, so they do not survive the queue.
    pub fn with_message<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&mut Message) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
        self
    }

    pub fn html_view(&mut self, view: impl Into<String>) -> &mut Self {
        self.html_view = Some(view.into());
        self
    }

    pub fn text_view(&mut self, view: impl Into<String>) -> &mut Self {
        self.text_view = Some(view.into());
        self
    }

    pub fn with(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.view_data.insert(key.into(), value.into());
        self
    }

    pub fn with_data<I, K, V>(&mut self, data: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.view_data
            .extend(data.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Literal html; takes precedence over `html_view`.
    pub fn html_body(&mut self, content: impl Into<String>) -> &mut Self {
        self.html_body = Some(content.into());
        self
    }

    /// Literal text; takes precedence over `text_view`.
    pub fn text_body(&mut self, content: impl Into<String>) -> &mut Self {
        self.text_body = Some(content.into());
        self
    }

    fn view_data_for<C: MailContent>(
        &self,
        content: &C,
        services: &MailServices,
    ) -> Result<Map<String, Value>, MailError> {
        let mut data = self.view_data.clone();
        if let Some(callback) = &services.view_data {
            data.extend(callback(self));
        }
        if let Value::Object(fields) = serde_json::to_value(content)? {
            data.extend(fields);
        }
        Ok(data)
    }

    async fn build_view(
        &self,
        data: &Map<String, Value>,
        services: &MailServices,
    ) -> Result<(Option<String>, Option<String>), MailError> {
        let html_body = non_empty(&self.html_body);
        let text_body = non_empty(&self.text_body);
        let html_view = html_body.is_none().then(|| non_empty(&self.html_view)).flatten();
        let text_view = text_body.is_none().then(|| non_empty(&self.text_view)).flatten();

        let Some(first_view) = html_view.clone().or_else(|| text_view.clone()) else {
            return Ok((html_body, text_body));
        };
        let renderer = services
            .views
            .clone()
            .ok_or(MailError::NoViewRenderer(first_view))?;

        let data = data.clone();
        let locale = self.locale.clone();
        let (html, text) = tokio::task::spawn_blocking(move || {
            let render = |view: Option<String>| {
                view.map(|view| renderer.render(&view, &data, locale.as_deref()))
                    .transpose()
            };
            Ok::<_, MailError>((render(html_view)?, render(text_view)?))
        })
        .await
        .map_err(|e| MailError::Build(format!("view rendering task failed: {e}")))??;

        Ok((html_body.or(html), text_body.or(text)))
    }

    fn build_addresses(&self, message: &mut Message) {
        if let Some(from) = &self.from {
            message.set_from(from);
        }
        if let Some(reply_to) = &self.reply_to {
            message.set_reply_to(reply_to);
        }
        for address in &self.to {
            message.set_to(address);
        }
        for address in &self.cc {
            message.set_cc(address);
        }
        for address in &self.bcc {
            message.set_bcc(address);
        }
    }

    async fn build_attachments(
        &self,
        message: &mut Message,
        services: &MailServices,
    ) -> Result<(), MailError> {
        for attachment in &self.attachments {
            let data = tokio::fs::read(&attachment.file).await?;
            message.attach_data(data, base_name(&attachment.file), &attachment.options);
        }

        for attachment in &self.raw_attachments {
            message.attach_data(
                attachment.data.clone(),
                attachment.name.clone(),
                &attachment.options,
            );
        }

        for attachment in &self.storage_attachments {
            let disk = services.disks.disk(attachment.storage.as_deref())?;
            let data = disk.read(&attachment.path).await?;
            let mut options = attachment.options.clone();
            if options.mime.is_none() {
                options.mime = disk.mime_type(&attachment.path).await?;
            }
            message.attach_data(data, attachment.name.clone(), &options);
        }

        Ok(())
    }
}

impl fmt::Debug for MailParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailParts")
            .field("locale", &self.locale)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("cc", &self.cc)
            .field("bcc", &self.bcc)
            .field("reply_to", &self.reply_to)
            .field("subject", &self.subject)
            .field("html_view", &self.html_view)
            .field("text_view", &self.text_view)
            .field("mailer", &self.mailer)
            .field("attachments", &self.attachments.len())
            .field("raw_attachments", &self.raw_attachments.len())
            .field("storage_attachments", &self.storage_attachments.len())
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

/// A [`MailContent`] together with its [`MailParts`].
///
/// Derefs to the parts, so recipients and options are set directly on the
/// mailable:
///
/// ```ignore
/// let mut mail = Mailable::new(OrderShipped { order_id: 42, tracking_url });
/// mail.to(("jane@example.com", "Jane")).bcc("audit@example.com").locale("fr");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailable<C = ()> {
    pub content: C,
    #[serde(flatten)]
    parts: MailParts,
}

impl Default for Mailable<()> {
    fn default() -> Self {
        Self::new(())
    }
}

impl<C> Deref for Mailable<C> {
    type Target = MailParts;

    fn deref(&self) -> &MailParts {
        &self.parts
    }
}

impl<C> DerefMut for Mailable<C> {
    fn deref_mut(&mut self) -> &mut MailParts {
        &mut self.parts
    }
}

impl<C: MailContent> Mailable<C> {
    pub fn new(content: C) -> Self {
        Self {
            content,
            parts: MailParts::default(),
        }
    }

    pub fn parts(&self) -> &MailParts {
        &self.parts
    }

    /// View data as the views would see it, before `build` runs:
    /// explicit data, then the global callback, then the content's fields.
    pub fn build_view_data(&self, services: &MailServices) -> Result<Map<String, Value>, MailError> {
        self.parts.view_data_for(&self.content, services)
    }

    /// Fill `message` from this mailable.
    ///
    /// Works on a copy of the parts, so the mailable is left untouched and
    /// can be rendered and then sent.
    pub async fn handler(
        &self,
        message: &mut Message,
        services: &MailServices,
    ) -> Result<(), MailError> {
        let mut parts = self.parts.clone();
        self.content.build(&mut parts)?;

        let data = parts.view_data_for(&self.content, services)?;
        let (html, text) = parts.build_view(&data, services).await?;

        parts.build_addresses(message);
        message.set_subject(
            parts
                .subject
                .clone()
                .unwrap_or_else(default_subject::<C>),
        );
        if let Some(level) = parts.priority {
            message.set_priority(level);
        }
        for callback in &parts.callbacks {
            callback(&mut *message);
        }
        parts.build_attachments(message, services).await?;

        if let Some(html) = html {
            message.set_html(html);
        }
        if let Some(text) = text {
            message.set_text(text);
        }
        message.set_data(data);
        Ok(())
    }

    /// Render through the mailer named on the mailable, or the dispatcher's
    /// default.
    pub async fn render<D>(&self, dispatcher: &D) -> Result<String, MailError>
    where
        D: MailDispatcher + ?Sized,
    {
        let mailer = dispatcher.resolve_mailer(self.parts.mailer.as_deref())?;
        mailer.render(self).await
    }

    /// Deliver now, even when the content asks to be queued.
    pub async fn send<D>(&self, dispatcher: &D) -> Result<Option<SentMessage>, MailError>
    where
        D: MailDispatcher + ?Sized,
    {
        let mailer = dispatcher.resolve_mailer(self.parts.mailer.as_deref())?;
        mailer.send_now(self).await
    }

    /// Push onto `queue`, the content's preferred queue, or the default queue.
    pub async fn queue(&self, queues: &Queues, queue: Option<&str>) -> Result<Uuid, MailError> {
        let name = self.queue_name(queue);
        Ok(queues.push(&self.queued_job(), name.as_deref()).await?)
    }

    /// Like [`queue`](Self::queue) but eligible only after `delay`.
    pub async fn later(
        &self,
        queues: &Queues,
        delay: Duration,
        queue: Option<&str>,
    ) -> Result<Uuid, MailError> {
        let name = self.queue_name(queue);
        Ok(queues
            .later(&self.queued_job(), delay, name.as_deref())
            .await?)
    }

    fn queue_name(&self, queue: Option<&str>) -> Option<String> {
        queue.map(str::to_string).or_else(|| self.content.queue())
    }

    fn queued_job(&self) -> QueuedMailableJob<C, MailManager> {
        if !self.parts.callbacks.is_empty() {
            log::warn!(
                "{} queued with message callbacks, which are dropped",
                C::MAIL_TYPE
            );
        }
        QueuedMailableJob::new(self.clone())
    }
}

fn contains<'a>(mut actual: impl Iterator<Item = &'a Address>, expected: impl IntoAddresses) -> bool {
    match expected.into_addresses().into_iter().next() {
        Some(expected) => actual.any(|address| address.matches(&expected)),
        None => false,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Title-cased type name: `OrderShipped` becomes `Order Shipped`.
fn default_subject<C>() -> String {
    let type_name = std::any::type_name::<C>();
    let base = type_name
        .split('<')
        .next()
        .and_then(|path| path.rsplit("::").next())
        .unwrap_or(type_name);
    let title = base.to_title_case();
    if title.is_empty() {
        "Mailable".to_string()
    } else {
        title
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Serialize, Deserialize)]
    struct OrderShipped {
        order_id: u64,
    }

    impl MailContent for OrderShipped {
        const MAIL_TYPE: &'static str = "test::order_shipped";

        fn build(&self, _mail: &mut MailParts) -> Result<(), MailError> {
            Ok(())
        }
    }

    #[test]
    fn default_subject_is_title_cased_type_name() {
        assert_eq!(default_subject::<OrderShipped>(), "Order Shipped");
        assert_eq!(default_subject::<()>(), "Mailable");
    }

    #[test]
    fn storage_attachment_name_defaults_to_basename() {
        let mut mail = Mailable::new(());
        mail.attach_from_default_storage("invoices/2024/inv-7.pdf", None, AttachOptions::new());
        assert_eq!(mail.storage_attachments[0].name, "inv-7.pdf");
        assert_eq!(mail.storage_attachments[0].storage, None);
    }

    #[test]
    fn raw_attachments_survive_serialization() {
        let mut mail = Mailable::new(OrderShipped { order_id: 7 });
        mail.attach_data(vec![0, 159, 146, 150], "blob.bin", AttachOptions::new())
            .to("eric@zhu.email");

        let json = serde_json::to_value(&mail).unwrap();
        assert_eq!(json["raw_attachments"][0]["data"], "AJ+Slg==");
        assert_eq!(json["content"]["order_id"], 7);

        let back: Mailable<OrderShipped> = serde_json::from_value(json).unwrap();
        assert_eq!(back.raw_attachments, mail.raw_attachments);
        assert!(back.has_to("eric@zhu.email"));
    }
}
