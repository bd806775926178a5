use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mailroom::jobs::{JobRegistry, JobStatus, MemoryQueue, Queues, Worker};
use mailroom::transport::ArrayTransport;
use mailroom::{
    Address, Dispatched, MailConfig, MailContent, MailError, MailManager, MailParts, Mailable,
    MailerConfig, Transport,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
struct InvoicePaid {
    invoice: u32,
}

impl MailContent for InvoicePaid {
    const MAIL_TYPE: &'static str = "test::invoice_paid";
    const SHOULD_QUEUE: bool = true;

    fn build(&self, mail: &mut MailParts) -> Result<(), MailError> {
        mail.subject(format!("Invoice #{} paid", self.invoice))
            .text_body("thanks");
        Ok(())
    }
}

fn config() -> MailConfig {
    MailConfig::default()
        .with_mailer("primary", MailerConfig::from_transport("memory"))
        .with_mailer(
            "marketing",
            MailerConfig {
                transport: Some("memory".into()),
                from: Some(Address::with_name("news@shop.test", "Shop News")),
                domain: Some("news.shop.test".into()),
                ..Default::default()
            },
        )
        .with_default("primary")
}

fn manager(transport: &ArrayTransport) -> MailManager {
    let transport = transport.clone();
    let mut manager = MailManager::new(config());
    manager.extend("memory", move |_options| {
        Ok(Arc::new(transport.clone()) as Arc<dyn Transport>)
    });
    manager
}

fn text(body: &str) -> Mailable {
    let mut mail = Mailable::new(());
    mail.text_body(body);
    mail
}

#[tokio::test]
async fn custom_transports_are_used() {
    let transport = ArrayTransport::new();
    let manager = manager(&transport);

    let result = manager.to("jane@example.com").send(text("hi")).await.unwrap();

    assert!(result.is_sent());
    let message = &transport.messages().await[0];
    assert_eq!(
        message.from(),
        Some(&Address::with_name("hello@example.com", "Example"))
    );
    assert_eq!(message.to(), &[Address::new("jane@example.com")]);
}

#[tokio::test]
async fn custom_transports_override_bundled_ones() {
    let transport = ArrayTransport::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let mut manager = MailManager::new(MailConfig::default().with_default("log"));
    let created = counter.clone();
    let shared = transport.clone();
    manager.extend("log", move |_options| {
        created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(shared.clone()) as Arc<dyn Transport>)
    });

    manager.to("jane@example.com").send(text("a")).await.unwrap();
    manager.to("jane@example.com").send(text("b")).await.unwrap();

    assert_eq!(transport.len().await, 2);
    // Mailers are cached, so the factory runs once.
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mailer_config_overrides_globals() {
    let transport = ArrayTransport::new();
    let manager = manager(&transport);

    let mut mail = text("sale");
    mail.to("jane@example.com").mailer("marketing");
    manager.send(&mail).await.unwrap();

    let message = &transport.messages().await[0];
    assert_eq!(
        message.from(),
        Some(&Address::with_name("news@shop.test", "Shop News"))
    );
    assert!(message.message_id().ends_with("@news.shop.test"));
}

#[tokio::test]
async fn pending_mail_can_pick_a_mailer() {
    let transport = ArrayTransport::new();
    let manager = manager(&transport);

    manager
        .to("jane@example.com")
        .mailer("marketing")
        .send(text("sale"))
        .await
        .unwrap();

    let message = &transport.messages().await[0];
    assert_eq!(message.from().unwrap().address, "news@shop.test");
}

#[tokio::test]
async fn undefined_mailer_on_mailable() {
    let manager = manager(&ArrayTransport::new());
    let mut mail = text("x");
    mail.to("jane@example.com").mailer("ses");

    let err = mail.send(&manager).await.unwrap_err();
    assert_eq!(err.to_string(), "Mailer [ses] is not defined.");
}

#[tokio::test]
async fn logger_listener_does_not_change_delivery() {
    let transport = ArrayTransport::new();
    let mut config = config();
    config.logger.enabled = true;
    let shared = transport.clone();
    let mut manager = MailManager::new(config);
    manager.extend("memory", move |_| Ok(Arc::new(shared.clone()) as Arc<dyn Transport>));

    let result = manager.bcc("audit@shop.test").send(text("x")).await.unwrap();

    assert!(result.is_sent());
    assert_eq!(transport.messages().await[0].bcc(), &[Address::new("audit@shop.test")]);
}

#[tokio::test]
async fn queued_mailables_are_delivered_by_the_worker() {
    let transport = ArrayTransport::new();
    let queue = MemoryQueue::new();
    let shared = transport.clone();
    let mut manager = MailManager::new(config()).with_queues(Queues::new().with("mail", queue.clone()));
    manager.extend("memory", move |_| Ok(Arc::new(shared.clone()) as Arc<dyn Transport>));
    let manager = Arc::new(manager);

    let result = manager
        .to("jane@example.com")
        .mailer("marketing")
        .send(Mailable::new(InvoicePaid { invoice: 7 }))
        .await
        .unwrap();
    let Dispatched::Queued(job_id) = result else {
        panic!("expected the mailable to be queued, got {result:?}");
    };
    assert!(transport.is_empty().await);

    let worker = Worker::with_shared_context(
        Arc::new(queue.clone()),
        JobRegistry::new().register_mailable::<InvoicePaid>(),
        manager.clone(),
    );
    assert_eq!(worker.run_pending().await.unwrap(), 1);

    let entry = &queue.entries().await[0];
    assert_eq!(entry.id, job_id);
    assert_eq!(entry.status, JobStatus::Completed);
    assert!(entry.result.as_ref().unwrap()["message_id"]
        .as_str()
        .unwrap()
        .ends_with("@news.shop.test"));

    let message = &transport.messages().await[0];
    assert_eq!(message.subject(), Some("Invoice #7 paid"));
    assert_eq!(message.from().unwrap().address, "news@shop.test");
}

#[tokio::test]
async fn later_delays_delivery() {
    let queue = MemoryQueue::new();
    let manager = manager(&ArrayTransport::new())
        .with_queues(Queues::new().with("mail", queue.clone()));

    manager
        .to("jane@example.com")
        .later(
            Mailable::new(InvoicePaid { invoice: 8 }),
            Duration::from_secs(300),
            Some("mail"),
        )
        .await
        .unwrap();

    let entries = queue.entries().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].run_at > entries[0].created_at);
    assert_eq!(entries[0].payload["mailable"]["mailer"], "primary");
}
