use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha1::Sha1;
use time::macros::format_description;
use time::OffsetDateTime;

use super::{parse_options, provider_error, SentMessage, Transport};
use crate::{MailError, Message};

const API_VERSION: &str = "2015-11-23";

/// RFC 3986 unreserved characters stay as they are, everything else is escaped.
const RPC_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Deserialize)]
pub struct AliyunDmOptions {
    pub access_key_id: String,
    pub access_secret: String,
    #[serde(default = "default_region")]
    pub region_id: String,
    /// `"1"` enables click tracking.
    #[serde(default = "default_click_trace")]
    pub click_trace: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_region() -> String {
    "cn-hangzhou".to_string()
}

fn default_click_trace() -> String {
    "0".to_string()
}

fn default_endpoint() -> String {
    "https://dm.aliyuncs.com".to_string()
}

/// Aliyun DirectMail `SingleSendMail`.
///
/// Only From, To, Subject and the bodies are sent; DirectMail does not take
/// attachments or Cc/Bcc through this action.
pub struct AliyunDmTransport {
    client: reqwest::Client,
    options: AliyunDmOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SingleSendMailResponse {
    env_id: Option<String>,
    request_id: Option<String>,
}

impl AliyunDmTransport {
    pub fn new(options: AliyunDmOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self, MailError> {
        Ok(Self::new(parse_options("aliyun_dm", options)?))
    }

    fn action_params(&self, message: &Message) -> Result<BTreeMap<String, String>, MailError> {
        let from = message
            .from()
            .ok_or_else(|| MailError::Build("message has no from address".into()))?;
        let to = message
            .to()
            .iter()
            .map(|a| a.address.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let mut params = BTreeMap::new();
        params.insert("Action".into(), "SingleSendMail".into());
        params.insert("RegionId".into(), self.options.region_id.clone());
        params.insert("AddressType".into(), "1".into());
        params.insert("ClickTrace".into(), self.options.click_trace.clone());
        params.insert("ReplyToAddress".into(), "false".into());
        params.insert("AccountName".into(), from.address.clone());
        if let Some(alias) = &from.name {
            params.insert("FromAlias".into(), alias.clone());
        }
        params.insert(
            "Subject".into(),
            message.subject().unwrap_or_default().to_string(),
        );
        params.insert("ToAddress".into(), to);
        if let Some(html) = message.html() {
            params.insert("HtmlBody".into(), html.to_string());
        }
        if let Some(text) = message.text() {
            params.insert("TextBody".into(), text.to_string());
        }
        Ok(params)
    }

    fn signed_params(&self, message: &Message) -> Result<BTreeMap<String, String>, MailError> {
        let timestamp = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
            ))
            .map_err(|e| MailError::Build(e.to_string()))?;

        let mut params = self.action_params(message)?;
        params.insert("Format".into(), "JSON".into());
        params.insert("Version".into(), API_VERSION.into());
        params.insert("AccessKeyId".into(), self.options.access_key_id.clone());
        params.insert("SignatureMethod".into(), "HMAC-SHA1".into());
        params.insert("SignatureVersion".into(), "1.0".into());
        params.insert("SignatureNonce".into(), uuid::Uuid::new_v4().to_string());
        params.insert("Timestamp".into(), timestamp);

        let signature = sign(&params, &self.options.access_secret)?;
        params.insert("Signature".into(), signature);
        Ok(params)
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, RPC_ENCODE_SET).to_string()
}

fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// RPC signature: HMAC-SHA1 over `POST&%2F&<encoded canonical query>`,
/// keyed with the secret followed by `&`.
fn sign(params: &BTreeMap<String, String>, secret: &str) -> Result<String, MailError> {
    let string_to_sign = format!("POST&{}&{}", encode("/"), encode(&canonical_query(params)));
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{secret}&").as_bytes())
        .map_err(|e| MailError::options("aliyun_dm", e))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl Transport for AliyunDmTransport {
    async fn send(&self, message: &Message) -> Result<SentMessage, MailError> {
        let params = self.signed_params(message)?;
        let url = format!("{}/", self.options.endpoint.trim_end_matches('/'));

        let response = self.client.post(url).form(&params).send().await?;
        if !response.status().is_success() {
            return Err(provider_error("aliyun_dm", response).await);
        }

        let body: SingleSendMailResponse = response.json().await?;
        tracing::info!(
            region = %self.options.region_id,
            message_id = message.message_id(),
            env_id = body.env_id.as_deref().unwrap_or_default(),
            request_id = body.request_id.as_deref().unwrap_or_default(),
            "mail accepted by aliyun directmail"
        );

        let mut sent = SentMessage::for_message(message).response(json!({
            "EnvId": body.env_id,
            "RequestId": body.request_id,
        }));
        if let Some(env_id) = body.env_id {
            sent = sent.provider_id(env_id);
        }
        Ok(sent)
    }

    fn name(&self) -> &'static str {
        "aliyun_dm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_like_rfc3986() {
        assert_eq!(encode("a b*~/"), "a%20b%2A~%2F");
        assert_eq!(encode("hello@example.com"), "hello%40example.com");
    }

    #[test]
    fn signature_matches_reference() {
        let params: BTreeMap<String, String> = [
            ("Action", "SingleSendMail"),
            ("AccountName", "hello@example.com"),
            ("Subject", "Hi there"),
            ("ToAddress", "eric@zhu.email"),
            ("Version", "2015-11-23"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(
            canonical_query(&params),
            "AccountName=hello%40example.com&Action=SingleSendMail&Subject=Hi%20there\
             &ToAddress=eric%40zhu.email&Version=2015-11-23"
        );
        assert_eq!(sign(&params, "secret").unwrap(), "+hWOiWIdBJCzyIF+sCWrcTflxE0=");
    }

    #[test]
    fn action_params_follow_single_send_mail() {
        let transport = AliyunDmTransport::new(AliyunDmOptions {
            access_key_id: "id".into(),
            access_secret: "secret".into(),
            region_id: default_region(),
            click_trace: default_click_trace(),
            endpoint: default_endpoint(),
        });

        let mut message = Message::default();
        message
            .set_from(("noreply@mail.example.com", "Example"))
            .set_to("a@example.com")
            .set_to("b@example.com")
            .set_subject("Hi")
            .set_text("hello");

        let params = transport.action_params(&message).unwrap();
        assert_eq!(params["AccountName"], "noreply@mail.example.com");
        assert_eq!(params["FromAlias"], "Example");
        assert_eq!(params["ToAddress"], "a@example.com,b@example.com");
        assert_eq!(params["AddressType"], "1");
        assert_eq!(params["ReplyToAddress"], "false");
        assert_eq!(params["TextBody"], "hello");
        assert!(!params.contains_key("HtmlBody"));
    }
}
