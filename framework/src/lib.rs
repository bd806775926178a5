extern crate self as mailroom;

pub use mailroom_macros::HasMailAddress;

pub mod address;
pub mod config;
pub mod error;
pub mod jobs;
pub mod mail;
pub mod storage;
pub mod transport;

pub use address::{Address, HasMailAddress, IntoAddress, IntoAddresses};
pub use config::{EnvConfig, MailConfig, MailerConfig};
pub use error::MailError;
pub use mail::{
    AttachOptions, Dispatched, HasMailManager, MailContent, MailDispatcher, MailListener,
    MailManager, MailParts, MailServices, Mailable, Mailer, Message, PendingMail,
    QueuedMailableJob, TeraRenderer, ViewRenderer,
};
pub use storage::{Disks, LocalStorage, MemoryStorage, Storage};
pub use transport::{SentMessage, Transport};
