use mailroom::transport::{AliyunDmTransport, MailgunTransport, PostmarkTransport};
use mailroom::{Address, MailError, Message, Transport};
use mockito::Matcher;
use serde_json::{json, Map, Value};

fn message() -> Message {
    let mut message = Message::new(Some("shop.test"));
    message
        .set_from(("orders@shop.test", "Shop"))
        .set_to("jane@example.com")
        .set_cc(Address::with_name("ops@shop.test", "Ops"))
        .set_subject("Your order shipped")
        .set_html("<p>On its way</p>")
        .set_text("On its way");
    message
}

fn options(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn mailgun_posts_raw_mime() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v3/mg.shop.test/messages.mime")
        .match_header("authorization", "Basic YXBpOmtleS0xMjM=")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("jane@example.com,Ops <ops@shop.test>".into()),
            Matcher::Regex(r#"filename="message.mime""#.into()),
            Matcher::Regex("Subject: Your order shipped".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"<20240101.1@mg.shop.test>","message":"Queued. Thank you."}"#)
        .create_async()
        .await;

    let transport = MailgunTransport::from_options(&options(json!({
        "key": "key-123",
        "domain": "mg.shop.test",
        "endpoint": server.url(),
    })))
    .unwrap();

    let sent = transport.send(&message()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(sent.provider_id.as_deref(), Some("<20240101.1@mg.shop.test>"));
    assert_eq!(sent.recipients, 2);
    assert_eq!(sent.response, Some(json!("Queued. Thank you.")));
}

#[tokio::test]
async fn mailgun_rejection_is_a_provider_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v3/mg.shop.test/messages.mime")
        .with_status(401)
        .with_body("Forbidden")
        .create_async()
        .await;

    let transport = MailgunTransport::from_options(&options(json!({
        "key": "wrong",
        "domain": "mg.shop.test",
        "endpoint": server.url(),
    })))
    .unwrap();

    let err = transport.send(&message()).await.unwrap_err();
    match err {
        MailError::Provider {
            provider,
            status,
            message,
        } => {
            assert_eq!(provider, "mailgun");
            assert_eq!(status, 401);
            assert_eq!(message, "Forbidden");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn postmark_posts_json_payload() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/email")
        .match_header("x-postmark-server-token", "token-abc")
        .match_header("accept", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "From": "Shop <orders@shop.test>",
            "To": "jane@example.com",
            "Cc": "Ops <ops@shop.test>",
            "Subject": "Your order shipped",
            "HtmlBody": "<p>On its way</p>",
            "TextBody": "On its way",
            "MessageStream": "outbound",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"To":"jane@example.com","SubmittedAt":"2024-01-01T00:00:00Z","MessageID":"b7bc2f4a-e38e-4336-af7d-e6c392c2f817","ErrorCode":0,"Message":"OK"}"#,
        )
        .create_async()
        .await;

    let transport = PostmarkTransport::from_options(&options(json!({
        "token": "token-abc",
        "endpoint": server.url(),
        "message_stream": "outbound",
    })))
    .unwrap();

    let sent = transport.send(&message()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(
        sent.provider_id.as_deref(),
        Some("b7bc2f4a-e38e-4336-af7d-e6c392c2f817")
    );
}

#[tokio::test]
async fn postmark_error_code_fails_the_send() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/email")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ErrorCode":406,"Message":"You tried to send to a recipient that has been marked as inactive."}"#)
        .create_async()
        .await;

    let transport = PostmarkTransport::from_options(&options(json!({
        "token": "token-abc",
        "endpoint": server.url(),
    })))
    .unwrap();

    let err = transport.send(&message()).await.unwrap_err();
    assert!(err.to_string().contains("error code 406"), "{err}");
}

#[tokio::test]
async fn aliyun_posts_signed_form() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("Action".into(), "SingleSendMail".into()),
            Matcher::UrlEncoded("AccountName".into(), "orders@shop.test".into()),
            Matcher::UrlEncoded("FromAlias".into(), "Shop".into()),
            Matcher::UrlEncoded("ToAddress".into(), "jane@example.com".into()),
            Matcher::UrlEncoded("RegionId".into(), "ap-southeast-1".into()),
            Matcher::UrlEncoded("AccessKeyId".into(), "LTAI-test".into()),
            Matcher::UrlEncoded("SignatureMethod".into(), "HMAC-SHA1".into()),
            Matcher::Regex("Signature=".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"EnvId":"600000000001","RequestId":"2D0C6A6E-0000-4C00-9E40-000000000000"}"#)
        .create_async()
        .await;

    let transport = AliyunDmTransport::from_options(&options(json!({
        "access_key_id": "LTAI-test",
        "access_secret": "secret",
        "region_id": "ap-southeast-1",
        "endpoint": server.url(),
    })))
    .unwrap();

    let sent = transport.send(&message()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(sent.provider_id.as_deref(), Some("600000000001"));
    assert_eq!(
        sent.response.unwrap()["RequestId"],
        "2D0C6A6E-0000-4C00-9E40-000000000000"
    );
}

#[tokio::test]
async fn missing_credentials_are_invalid_options() {
    let err = PostmarkTransport::from_options(&Map::new()).err().unwrap();
    assert!(matches!(err, MailError::InvalidOptions { ref transport, .. } if transport == "postmark"));
}
