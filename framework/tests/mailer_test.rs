use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mailroom::jobs::{MemoryQueue, Queues};
use mailroom::mail::{MailServices, MessageFailed, MessageSending, MessageSent};
use mailroom::transport::ArrayTransport;
use mailroom::{
    Address, Dispatched, HasMailAddress, MailContent, MailError, MailListener, MailParts,
    Mailable, Mailer, Message, SentMessage, Transport,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
struct PasswordReset {
    token: String,
}

impl MailContent for PasswordReset {
    const MAIL_TYPE: &'static str = "test::password_reset";

    fn build(&self, mail: &mut MailParts) -> Result<(), MailError> {
        mail.subject("Reset your password")
            .text_body(format!("token: {}", self.token));
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct Newsletter;

impl MailContent for Newsletter {
    const MAIL_TYPE: &'static str = "test::newsletter";
    const SHOULD_QUEUE: bool = true;

    fn queue(&self) -> Option<String> {
        Some("bulk".into())
    }

    fn build(&self, mail: &mut MailParts) -> Result<(), MailError> {
        mail.html_body("<h1>News</h1>");
        Ok(())
    }
}

#[derive(HasMailAddress)]
struct Member {
    email: String,
    name: String,
    locale: Option<String>,
}

/// Always fails and counts resets.
#[derive(Default)]
struct BrokenTransport {
    resets: AtomicUsize,
}

#[async_trait]
impl Transport for BrokenTransport {
    async fn send(&self, _message: &Message) -> Result<SentMessage, MailError> {
        Err(MailError::Build("connection refused".into()))
    }

    async fn reset(&self) -> Result<(), MailError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl MailListener for Recorder {
    fn sent(&self, _event: &MessageSent<'_>) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    fn failed(&self, _event: &MessageFailed<'_>) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

struct BlockInternal;

impl MailListener for BlockInternal {
    fn sending(&self, event: &MessageSending<'_>) -> bool {
        !event
            .message
            .to()
            .iter()
            .any(|a| a.address.ends_with("@internal.test"))
    }
}

fn mailer(transport: &ArrayTransport) -> Mailer {
    let mut mailer = Mailer::new("array", Arc::new(transport.clone()));
    mailer
        .set_always_from(("noreply@shop.test", "Shop"))
        .set_always_reply_to("support@shop.test")
        .set_domain("shop.test");
    mailer
}

fn reset(token: &str) -> Mailable<PasswordReset> {
    Mailable::new(PasswordReset {
        token: token.into(),
    })
}

#[tokio::test]
async fn send_now_applies_global_addresses() {
    let transport = ArrayTransport::new();
    let mailer = mailer(&transport);

    let mut mail = reset("abc");
    mail.to("jane@example.com");
    let sent = mailer.send_now(&mail).await.unwrap().unwrap();

    let messages = transport.messages().await;
    assert_eq!(messages.len(), 1);
    let message = &messages[0];
    assert_eq!(message.from(), Some(&Address::with_name("noreply@shop.test", "Shop")));
    assert_eq!(message.reply_to(), &[Address::new("support@shop.test")]);
    assert_eq!(message.subject(), Some("Reset your password"));
    assert_eq!(message.text(), Some("token: abc"));
    assert!(message.message_id().ends_with("@shop.test"));
    assert_eq!(sent.message_id, message.message_id());
    assert_eq!(sent.recipients, 1);
}

#[tokio::test]
async fn mailable_addresses_replace_global_ones() {
    let transport = ArrayTransport::new();
    let mailer = mailer(&transport);

    let mut mail = reset("abc");
    mail.to("jane@example.com")
        .from("security@shop.test")
        .reply_to("security@shop.test");
    mailer.send_now(&mail).await.unwrap();

    let message = &transport.messages().await[0];
    assert_eq!(message.from(), Some(&Address::new("security@shop.test")));
    assert_eq!(message.reply_to(), &[Address::new("security@shop.test")]);
}

#[tokio::test]
async fn always_to_redirects_every_message() {
    let transport = ArrayTransport::new();
    let mut mailer = mailer(&transport);
    mailer.set_always_to("staging@shop.test");

    let mut mail = reset("abc");
    mail.to("jane@example.com")
        .cc("boss@example.com")
        .bcc("audit@example.com");
    mailer.send_now(&mail).await.unwrap();

    let message = &transport.messages().await[0];
    assert_eq!(message.to(), &[Address::new("staging@shop.test")]);
    assert!(message.cc().is_empty());
    assert!(message.bcc().is_empty());
}

#[tokio::test]
async fn listeners_can_veto() {
    let transport = ArrayTransport::new();
    let mailer = mailer(&transport)
        .with_services(MailServices::new().listen(BlockInternal));

    let mut blocked = reset("abc");
    blocked.to("ops@internal.test");
    let result = mailer.send(&blocked).await.unwrap();
    assert_eq!(result, Dispatched::Vetoed);

    let mut allowed = reset("abc");
    allowed.to("jane@example.com");
    assert!(mailer.send(&allowed).await.unwrap().is_sent());

    assert_eq!(transport.len().await, 1);
}

#[tokio::test]
async fn failures_fire_events_and_reset_transport() {
    let recorder = Recorder::default();
    let transport = Arc::new(BrokenTransport::default());
    let mut mailer = Mailer::new("broken", transport.clone())
        .with_services(MailServices::new().listen(recorder.clone()));
    mailer.set_always_from("noreply@shop.test").set_reconnect(true);

    let mut mail = reset("abc");
    mail.to("jane@example.com");
    let err = mailer.send_now(&mail).await.unwrap_err();

    assert!(matches!(err, MailError::Build(_)));
    assert_eq!(recorder.failed.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.sent.load(Ordering::SeqCst), 0);
    assert_eq!(transport.resets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transport_is_kept_without_reconnect() {
    let transport = Arc::new(BrokenTransport::default());
    let mailer = Mailer::new("broken", transport.clone());

    let mut mail = reset("abc");
    mail.to("jane@example.com");
    assert!(mailer.send_now(&mail).await.is_err());
    assert_eq!(transport.resets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn queued_content_goes_to_its_queue() {
    let bulk = MemoryQueue::new();
    let transport = ArrayTransport::new();
    let mailer = mailer(&transport).with_services(
        MailServices::new().with_queues(
            Queues::new()
                .with("default", MemoryQueue::new())
                .with("bulk", bulk.clone()),
        ),
    );

    let mut mail = Mailable::new(Newsletter);
    mail.to("jane@example.com");
    let result = mailer.send(&mail).await.unwrap();

    assert!(result.is_queued());
    assert!(transport.is_empty().await);

    let entries = bulk.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].job_type, "test::newsletter");
    assert_eq!(entries[0].payload["mailable"]["mailer"], "array");
    assert_eq!(entries[0].payload["mailable"]["to"][0]["address"], "jane@example.com");
}

#[tokio::test]
async fn queueing_without_queues_fails() {
    let mailer = mailer(&ArrayTransport::new());
    let err = mailer
        .queue(&reset("abc"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::Queue(_)));
}

#[tokio::test]
async fn render_returns_html_or_text() {
    let transport = ArrayTransport::new();
    let mailer = mailer(&transport);

    assert_eq!(mailer.render(&reset("xyz")).await.unwrap(), "token: xyz");
    assert_eq!(
        mailer.render(&Mailable::new(Newsletter)).await.unwrap(),
        "<h1>News</h1>"
    );
    assert!(transport.is_empty().await);
}

#[tokio::test]
async fn pending_mail_adopts_recipient_locale() {
    let transport = ArrayTransport::new();
    let mailer = mailer(&transport);
    let member = Member {
        email: "zhu@example.com".into(),
        name: "Zhu".into(),
        locale: Some("zh_CN".into()),
    };

    let pending = mailer.to(&member).cc("boss@example.com");
    let filled = pending.fill(reset("abc"));
    assert_eq!(filled.locale.as_deref(), Some("zh_CN"));
    assert!(filled.has_to(("zhu@example.com", "Zhu")));
    assert!(filled.has_cc("boss@example.com"));

    let result = pending.send(reset("abc")).await.unwrap();
    assert!(result.is_sent());
    assert_eq!(transport.messages().await[0].cc(), &[Address::new("boss@example.com")]);

    // An explicit locale wins over the recipient's.
    let filled = mailer.locale("en").to(&member).fill(reset("abc"));
    assert_eq!(filled.locale.as_deref(), Some("en"));
}

#[tokio::test]
async fn a_mailer_only_dispatches_as_itself() {
    let transport = ArrayTransport::new();
    let mailer = mailer(&transport);

    let mut other = reset("abc");
    other.to("jane@example.com").mailer("marketing");
    let err = mailer.to("jane@example.com").send(other).await.unwrap_err();
    assert_eq!(err.to_string(), "Mailer [marketing] is not defined.");
    assert!(transport.is_empty().await);

    let mut own = reset("abc");
    own.to("jane@example.com").mailer("array");
    assert!(own.send(&mailer).await.unwrap().is_some());
    assert_eq!(transport.len().await, 1);
}
