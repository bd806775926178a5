//! The concrete email assembled for one delivery.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use lettre::address::Envelope;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Attachment as MimeAttachment, MultiPart, SinglePart};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::storage::guess_mime;
use crate::{Address, IntoAddress, MailError};

const DEFAULT_DOMAIN: &str = "localhost";

/// Options accepted when attaching a file or raw data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachOptions {
    /// Content type; guessed from the file name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// File name shown to the recipient.
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AttachOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Attachment,
    /// Embedded part referenced from the html body as `cid:<id>`.
    Inline { content_id: String },
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub disposition: Disposition,
}

impl Attachment {
    pub fn is_inline(&self) -> bool {
        matches!(self.disposition, Disposition::Inline { .. })
    }

    fn to_part(&self) -> Result<SinglePart, MailError> {
        let content_type = ContentType::parse(&self.content_type)
            .or_else(|_| ContentType::parse("application/octet-stream"))
            .map_err(|e| MailError::Build(e.to_string()))?;
        let part = match &self.disposition {
            Disposition::Attachment => MimeAttachment::new(self.filename.clone()),
            Disposition::Inline { content_id } => MimeAttachment::new_inline(content_id.clone()),
        };
        Ok(part.body(self.data.clone(), content_type))
    }
}

/// `X-Priority`, from `1 (Highest)` to `5 (Lowest)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XPriority(pub u8);

impl XPriority {
    fn label(&self) -> &'static str {
        match self.0 {
            0 | 1 => "Highest",
            2 => "High",
            3 => "Normal",
            4 => "Low",
            _ => "Lowest",
        }
    }
}

impl fmt::Display for XPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.clamp(1, 5), self.label())
    }
}

impl Header for XPriority {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Priority")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let level = s.split_whitespace().next().unwrap_or_default().parse::<u8>()?;
        Ok(Self(level))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.to_string())
    }
}

/// An email ready to hand to a [`Transport`](crate::Transport).
///
/// Built by the mailer from a [`Mailable`](crate::Mailable); message
/// callbacks registered with `with_message` receive it mutably. `set_*`
/// recipient methods add, `replace_*` methods overwrite.
#[derive(Debug, Clone)]
pub struct Message {
    message_id: String,
    from: Option<Address>,
    sender: Option<Address>,
    return_path: Option<String>,
    reply_to: Vec<Address>,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    subject: Option<String>,
    priority: Option<u8>,
    html: Option<String>,
    text: Option<String>,
    attachments: Vec<Attachment>,
    headers: Vec<(String, String)>,
    data: Map<String, Value>,
    domain: String,
    embedded: HashMap<PathBuf, String>,
}

impl Default for Message {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Message {
    /// Start an empty message whose ids use `domain` (default `localhost`).
    pub fn new(domain: Option<&str>) -> Self {
        let domain = domain.unwrap_or(DEFAULT_DOMAIN).to_string();
        Self {
            message_id: format!("{}@{}", Uuid::new_v4().simple(), domain),
            from: None,
            sender: None,
            return_path: None,
            reply_to: Vec::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: None,
            priority: None,
            html: None,
            text: None,
            attachments: Vec::new(),
            headers: Vec::new(),
            data: Map::new(),
            domain,
            embedded: HashMap::new(),
        }
    }

    /// Message-ID without the angle brackets.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn set_from(&mut self, address: impl IntoAddress) -> &mut Self {
        self.from = Some(address.into_address());
        self
    }

    pub fn set_sender(&mut self, address: impl IntoAddress) -> &mut Self {
        self.sender = Some(address.into_address());
        self
    }

    /// Envelope sender; bounces go here instead of the From address.
    pub fn set_return_path(&mut self, address: impl Into<String>) -> &mut Self {
        self.return_path = Some(address.into());
        self
    }

    /// Replaces any Reply-To set so far, including the mailer's global one.
    pub fn set_reply_to(&mut self, address: impl IntoAddress) -> &mut Self {
        self.reply_to = vec![address.into_address()];
        self
    }

    pub fn add_reply_to(&mut self, address: impl IntoAddress) -> &mut Self {
        self.reply_to.push(address.into_address());
        self
    }

    pub fn set_to(&mut self, address: impl IntoAddress) -> &mut Self {
        self.to.push(address.into_address());
        self
    }

    pub fn set_cc(&mut self, address: impl IntoAddress) -> &mut Self {
        self.cc.push(address.into_address());
        self
    }

    pub fn set_bcc(&mut self, address: impl IntoAddress) -> &mut Self {
        self.bcc.push(address.into_address());
        self
    }

    pub fn replace_to(&mut self, addresses: Vec<Address>) -> &mut Self {
        self.to = addresses;
        self
    }

    pub fn replace_cc(&mut self, addresses: Vec<Address>) -> &mut Self {
        self.cc = addresses;
        self
    }

    pub fn replace_bcc(&mut self, addresses: Vec<Address>) -> &mut Self {
        self.bcc = addresses;
        self
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn set_priority(&mut self, level: u8) -> &mut Self {
        self.priority = Some(level);
        self
    }

    pub fn set_html(&mut self, html: impl Into<String>) -> &mut Self {
        self.html = Some(html.into());
        self
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(text.into());
        self
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a file from the local filesystem.
    pub fn attach(
        &mut self,
        path: impl AsRef<Path>,
        options: &AttachOptions,
    ) -> Result<&mut Self, MailError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let filename = match &options.name {
            Some(name) => name.clone(),
            None => file_name(path),
        };
        Ok(self.attach_data(data, filename, options))
    }

    pub fn attach_data(
        &mut self,
        data: impl Into<Vec<u8>>,
        name: impl Into<String>,
        options: &AttachOptions,
    ) -> &mut Self {
        let filename = options.name.clone().unwrap_or_else(|| name.into());
        let content_type = options
            .mime
            .clone()
            .or_else(|| guess_mime(&filename))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        self.attachments.push(Attachment {
            filename,
            content_type,
            data: data.into(),
            disposition: Disposition::Attachment,
        });
        self
    }

    /// Embed a file for use in the html body and return its `cid:` reference.
    ///
    /// A file embedded twice is only attached once.
    pub fn embed(&mut self, path: impl AsRef<Path>) -> Result<String, MailError> {
        let path = path.as_ref();
        if let Some(cid) = self.embedded.get(path) {
            return Ok(format!("cid:{cid}"));
        }

        let data = std::fs::read(path)?;
        let content_type =
            guess_mime(path).unwrap_or_else(|| "application/octet-stream".to_string());
        let reference = self.embed_data(data, file_name(path), content_type);
        if let Some(cid) = reference.strip_prefix("cid:") {
            self.embedded.insert(path.to_path_buf(), cid.to_string());
        }
        Ok(reference)
    }

    pub fn embed_data(
        &mut self,
        data: impl Into<Vec<u8>>,
        name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> String {
        let content_id = format!("{}@{}", Uuid::new_v4().simple(), self.domain);
        self.attachments.push(Attachment {
            filename: name.into(),
            content_type: content_type.into(),
            data: data.into(),
            disposition: Disposition::Inline {
                content_id: content_id.clone(),
            },
        });
        format!("cid:{content_id}")
    }

    pub fn set_data(&mut self, data: Map<String, Value>) -> &mut Self {
        self.data = data;
        self
    }

    /// View data the message was rendered with.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn from(&self) -> Option<&Address> {
        self.from.as_ref()
    }

    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    pub fn return_path(&self) -> Option<&str> {
        self.return_path.as_deref()
    }

    pub fn reply_to(&self) -> &[Address] {
        &self.reply_to
    }

    pub fn to(&self) -> &[Address] {
        &self.to
    }

    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn priority(&self) -> Option<u8> {
        self.priority
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Every To, Cc and Bcc address, in that order.
    pub fn recipients(&self) -> Vec<&Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc).collect()
    }

    /// SMTP envelope: the return path (or sender, or From) and every recipient.
    pub fn envelope(&self) -> Result<Envelope, MailError> {
        let reverse_path = match (&self.return_path, &self.sender, &self.from) {
            (Some(path), _, _) => Some(parse_address(path)?),
            (None, Some(sender), _) => Some(parse_address(&sender.address)?),
            (None, None, Some(from)) => Some(parse_address(&from.address)?),
            (None, None, None) => None,
        };
        let recipients = self
            .recipients()
            .into_iter()
            .map(|a| parse_address(&a.address))
            .collect::<Result<Vec<_>, _>>()?;

        Envelope::new(reverse_path, recipients).map_err(|e| MailError::Build(e.to_string()))
    }

    /// Encode as a lettre message; Bcc is kept in the envelope only.
    pub fn to_mime(&self) -> Result<lettre::Message, MailError> {
        let from = self
            .from
            .as_ref()
            .ok_or_else(|| MailError::Build("message has no from address".into()))?;

        let mut builder = lettre::Message::builder()
            .message_id(Some(format!("<{}>", self.message_id)))
            .from(from.to_mailbox()?);

        if let Some(sender) = &self.sender {
            builder = builder.sender(sender.to_mailbox()?);
        }
        for address in &self.reply_to {
            builder = builder.reply_to(address.to_mailbox()?);
        }
        for address in &self.to {
            builder = builder.to(address.to_mailbox()?);
        }
        for address in &self.cc {
            builder = builder.cc(address.to_mailbox()?);
        }
        for address in &self.bcc {
            builder = builder.bcc(address.to_mailbox()?);
        }
        if let Some(subject) = &self.subject {
            builder = builder.subject(subject.clone());
        }
        if let Some(level) = self.priority {
            builder = builder.header(XPriority(level));
        }
        for (name, value) in &self.headers {
            let name = HeaderName::new_from_ascii(name.clone())
                .map_err(|e| MailError::Build(format!("invalid header {name}: {e}")))?;
            builder = builder.raw_header(HeaderValue::new(name, value.clone()));
        }

        builder = builder.envelope(self.envelope()?);

        let built = match self.body()? {
            Body::Single(part) => builder.singlepart(part),
            Body::Multi(part) => builder.multipart(part),
        };
        built.map_err(|e| MailError::Build(e.to_string()))
    }

    /// Full RFC 5322 encoding, Bcc excluded.
    pub fn formatted(&self) -> Result<Vec<u8>, MailError> {
        Ok(self.to_mime()?.formatted())
    }

    fn body(&self) -> Result<Body, MailError> {
        let mut body = match (&self.html, &self.text) {
            (Some(html), Some(text)) => {
                Body::Multi(MultiPart::alternative_plain_html(text.clone(), html.clone()))
            }
            (Some(html), None) => Body::Single(SinglePart::html(html.clone())),
            (None, Some(text)) => Body::Single(SinglePart::plain(text.clone())),
            (None, None) => Body::Single(SinglePart::plain(String::new())),
        };

        let (inline, attached): (Vec<_>, Vec<_>) =
            self.attachments.iter().partition(|a| a.is_inline());

        if !inline.is_empty() {
            let mut related = body.append_to(MultiPart::related().build());
            for attachment in inline {
                related = related.singlepart(attachment.to_part()?);
            }
            body = Body::Multi(related);
        }

        if !attached.is_empty() {
            let mut mixed = body.append_to(MultiPart::mixed().build());
            for attachment in attached {
                mixed = mixed.singlepart(attachment.to_part()?);
            }
            body = Body::Multi(mixed);
        }

        Ok(body)
    }
}

enum Body {
    Single(SinglePart),
    Multi(MultiPart),
}

impl Body {
    fn append_to(self, parent: MultiPart) -> MultiPart {
        match self {
            Body::Single(part) => parent.singlepart(part),
            Body::Multi(part) => parent.multipart(part),
        }
    }
}

fn parse_address(address: &str) -> Result<lettre::Address, MailError> {
    address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}
