//! Render, send and queue a mailable through the `log` mailer.
//!
//! ```sh
//! MAIL_FROM__ADDRESS=hello@shop.test cargo run --example basic
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use mailroom::jobs::{JobRegistry, MemoryQueue, Queues, Worker};
use mailroom::{
    HasMailAddress, MailConfig, MailContent, MailError, MailManager, MailParts, Mailable,
    TeraRenderer,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
struct Welcome {
    name: String,
}

impl MailContent for Welcome {
    const MAIL_TYPE: &'static str = "shop::welcome";

    fn build(&self, mail: &mut MailParts) -> Result<(), MailError> {
        mail.subject(format!("Welcome, {}!", self.name))
            .html_view("welcome.html")
            .text_view("welcome.txt");
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct WeeklyDigest {
    items: Vec<String>,
}

impl MailContent for WeeklyDigest {
    const MAIL_TYPE: &'static str = "shop::weekly_digest";
    const SHOULD_QUEUE: bool = true;

    fn build(&self, mail: &mut MailParts) -> Result<(), MailError> {
        mail.text_body(self.items.join("\n"));
        Ok(())
    }
}

#[derive(HasMailAddress)]
struct User {
    email: String,
    name: String,
    locale: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MailConfig::load(None)
        .context("loading mail config")?
        .with_default("log");

    let views = TeraRenderer::from_templates([
        ("welcome.html", "<h1>{{ locale | default(value=\"en\") }}: Hi {{ name }}</h1>"),
        ("welcome.txt", "Hi {{ name }}"),
    ])?;

    let queue = MemoryQueue::new();
    let manager = Arc::new(
        MailManager::new(config)
            .with_views(views)
            .with_queues(Queues::new().with("mail", queue.clone())),
    );

    let user = User {
        email: "jane@example.com".into(),
        name: "Jane".into(),
        locale: Some("fr".into()),
    };

    let welcome = Mailable::new(Welcome {
        name: user.name.clone(),
    });
    let html = manager.to(&user).render(welcome.clone()).await?;
    println!("preview: {html}");

    let sent = manager.to(&user).send(welcome).await?;
    println!("welcome: {sent:?}");

    let digest = Mailable::new(WeeklyDigest {
        items: vec!["New arrivals".into(), "Spring sale".into()],
    });
    let queued = manager.to(&user).send(digest).await?;
    println!("digest: {queued:?}");

    let worker = Worker::with_shared_context(
        Arc::new(queue),
        JobRegistry::new().register_mailable::<WeeklyDigest>(),
        manager,
    );
    let processed = worker.run_pending().await?;
    println!("delivered {processed} queued mail(s)");

    Ok(())
}
