//! Mailables, mailers and the manager that resolves them.
//!
//! A [`Mailable`] describes a message as data: recipients, a subject, views
//! or literal bodies, and attachments. A [`Mailer`] builds it into a
//! [`Message`] and hands that to its [`Transport`](crate::Transport). The
//! [`MailManager`] resolves mailers from [`MailConfig`](crate::config::MailConfig).
//!
//! # Quick Start
//!
//! ```ignore
//! let manager = MailManager::from_env()?
//!     .with_views(TeraRenderer::new("templates/mail/**/*")?);
//!
//! // Send directly
//! let mut welcome = Mailable::default();
//! welcome
//!     .subject("Welcome!")
//!     .html_view("welcome.html")
//!     .with("name", "Jane");
//! manager.to(("jane@example.com", "Jane")).send(welcome).await?;
//!
//! // Or queue for background delivery
//! manager.to(&user).queue(Mailable::new(Invoice { id }), None).await?;
//! ```

mod events;
mod job;
mod mailable;
mod mailer;
mod manager;
pub(crate) mod message;
mod pending;
mod services;
mod view;

pub use events::{
    EventDispatcher, LogListener, MailListener, MessageFailed, MessageSending, MessageSent,
};
pub use job::{HasMailManager, QueuedMailableJob};
pub use mailable::{
    FileAttachment, MailContent, MailParts, Mailable, MessageCallback, RawAttachment,
    StorageAttachment,
};
pub use mailer::{Dispatched, MailDispatcher, Mailer};
pub use manager::MailManager;
pub use message::{AttachOptions, Attachment, Disposition, Message, XPriority};
pub use pending::PendingMail;
pub use services::{MailServices, ViewDataCallback};
pub use view::{TeraRenderer, ViewRenderer};
