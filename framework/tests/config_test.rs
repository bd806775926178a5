use std::io::Write;

use mailroom::config::EnvConfig;
use mailroom::{Address, MailConfig, MailError, MailManager, MailerConfig};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct SmtpSettings {
    host: String,
    port: u16,
    debug: bool,
}

#[test]
fn env_config_with_prefix() {
    std::env::set_var("MRTEST_HOST", "0.0.0.0");
    std::env::set_var("MRTEST_PORT", "2525");
    std::env::set_var("MRTEST_DEBUG", "false");

    let config = SmtpSettings::from_env_with_prefix("MRTEST").unwrap();

    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 2525);
    assert!(!config.debug);

    std::env::remove_var("MRTEST_HOST");
    std::env::remove_var("MRTEST_PORT");
    std::env::remove_var("MRTEST_DEBUG");
}

#[test]
fn defaults_define_smtp_sendmail_and_log() {
    let config = MailConfig::default();

    assert_eq!(config.default, "smtp");
    assert!(config.mailer("smtp").is_some());
    assert_eq!(
        config.mailer("sendmail").unwrap().dsn.as_deref(),
        Some("sendmail://default")
    );
    assert_eq!(config.mailer("log").unwrap().dsn.as_deref(), Some("log://default"));
    assert_eq!(
        config.from,
        Some(Address::with_name("hello@example.com", "Example"))
    );
    assert!(!config.logger.enabled);
    assert_eq!(config.logger.name, "mail");
}

#[test]
fn loads_mailers_from_toml_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
default = "postmark"

[from]
address = "orders@shop.test"
name = "Shop"

[mailers.postmark]
dsn = "postmark+api://token-abc@default"
reply_to = {{ address = "support@shop.test" }}

[mailers.relay]
transport = "smtp"
reconnect = true

[mailers.relay.options]
host = "relay.shop.test"
port = 2525
encryption = "none"
"#
    )
    .unwrap();

    let config = MailConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.default, "postmark");
    assert_eq!(config.from, Some(Address::with_name("orders@shop.test", "Shop")));

    let postmark = config.mailer("postmark").unwrap();
    assert_eq!(postmark.dsn.as_deref(), Some("postmark+api://token-abc@default"));
    assert_eq!(postmark.reply_to, Some(Address::new("support@shop.test")));

    let relay = config.mailer("relay").unwrap();
    assert_eq!(relay.transport.as_deref(), Some("smtp"));
    assert!(relay.reconnect);
    assert_eq!(relay.options["host"], "relay.shop.test");
    assert_eq!(relay.options["port"], 2525);
}

#[test]
fn missing_file_is_ignored() {
    let config = MailConfig::load(Some(std::path::Path::new("/nonexistent/mail.toml"))).unwrap();
    assert!(!config.mailers.is_empty());
}

#[test]
fn undefined_mailer_is_an_error() {
    let manager = MailManager::new(MailConfig::default());
    let err = manager.mailer(Some("ses")).unwrap_err();

    assert!(matches!(err, MailError::MailerNotDefined(ref name) if name == "ses"));
    assert_eq!(err.to_string(), "Mailer [ses] is not defined.");
}

#[test]
fn mailer_without_transport_or_dsn_is_an_error() {
    // The default smtp mailer has neither.
    let manager = MailManager::new(MailConfig::default());
    let err = manager.mailer(None).unwrap_err();

    assert!(matches!(err, MailError::TransportNotSpecified));
}

#[test]
fn unknown_transport_is_unsupported() {
    let config = MailConfig::default()
        .with_mailer("custom", MailerConfig::from_transport("carrier-pigeon"))
        .with_default("custom");
    let manager = MailManager::new(config);
    let err = manager.mailer(None).unwrap_err();

    assert_eq!(err.to_string(), "Unsupported mail transport [carrier-pigeon].");
}

#[test]
fn dsn_mailers_resolve_and_are_cached() {
    let manager = MailManager::new(MailConfig::default().with_default("log"));

    let first = manager.mailer(None).unwrap();
    let second = manager.mailer(Some("log")).unwrap();

    assert_eq!(first.name(), "log");
    assert_eq!(first.transport().name(), "log");
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    manager.purge("log");
    let third = manager.mailer(Some("log")).unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &third));
}

#[test]
fn smtp_mailers_resolve_outside_a_runtime() {
    let manager = MailManager::new(
        MailConfig::default().with_mailer("smtp", MailerConfig::from_dsn("smtp://localhost:2525")),
    );

    let mailer = manager.mailer(None).unwrap();

    assert_eq!(mailer.name(), "smtp");
    assert_eq!(mailer.transport().name(), "smtp");
}
