//! DingTalk group robot webhook.

use super::{bind_config, ConfigField, Message, Sender};
use crate::cancellation::CancellationToken;
use crate::client::{RequestExecutor, RequestOptions};
use crate::errors::MsgflowError;
use crate::model::JsonMap;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Posts text messages to a DingTalk group robot.
///
/// When `secret` is set the webhook URL carries a millisecond timestamp and
/// a base64 HMAC-SHA256 signature over `"{timestamp}\n{secret}"`, keyed by
/// the secret, as the robot's security setting requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DingTalkSender {
    endpoint: String,
    access_token: String,
    secret: String,
}

impl DingTalkSender {
    fn webhook_url(&self) -> Result<String, MsgflowError> {
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|err| MsgflowError::Config(format!("invalid dingtalk endpoint: {err}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("access_token", &self.access_token);
            if !self.secret.is_empty() {
                let timestamp = chrono::Utc::now().timestamp_millis();
                let sign = self.sign(timestamp)?;
                query.append_pair("timestamp", &timestamp.to_string());
                query.append_pair("sign", &sign);
            }
        }
        Ok(url.into())
    }

    fn sign(&self, timestamp: i64) -> Result<String, MsgflowError> {
        let to_sign = format!("{timestamp}\n{}", self.secret);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|err| MsgflowError::Config(format!("invalid dingtalk secret: {err}")))?;
        mac.update(to_sign.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    fn payload(message: &dyn Message) -> JsonMap {
        let mut payload = JsonMap::new();
        payload.insert("msgtype".to_string(), json!("text"));
        payload.insert("text".to_string(), json!({ "content": message.content() }));
        if message.receiver() == "all" {
            payload.insert("isAtAll".to_string(), json!(true));
        } else {
            payload.insert("atMobiles".to_string(), json!([message.receiver()]));
        }
        payload
    }
}

#[async_trait]
impl Sender for DingTalkSender {
    fn label(&self) -> &str {
        "DingTalk group robot"
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("endpoint", "Webhook endpoint", "robot webhook URL")
                .with_default(json!("https://oapi.dingtalk.com/robot/send")),
            ConfigField::required("access_token", "Access token", "robot access token"),
            ConfigField::optional("secret", "Signing secret", "optional signing secret"),
        ]
    }

    fn set_config(&mut self, config: &JsonMap) -> Result<(), MsgflowError> {
        *self = bind_config(&self.config_fields(), config)?;
        Ok(())
    }

    async fn send(
        &self,
        executor: &RequestExecutor,
        cancel: &Arc<CancellationToken>,
        message: &dyn Message,
    ) -> Result<JsonMap, MsgflowError> {
        let url = self.webhook_url()?;
        let payload = Self::payload(message);
        let response = executor
            .post_json(cancel, &url, &payload, &RequestOptions::default())
            .await?;

        let body = response.json_map();
        if let Some(code) = body.get("errcode").and_then(Value::as_i64) {
            if code != 0 {
                let errmsg = body
                    .get("errmsg")
                    .and_then(Value::as_str)
                    .unwrap_or("dingtalk rejected the message")
                    .to_string();
                return Err(MsgflowError::Delivery {
                    message: errmsg,
                    response: Some(body),
                });
            }
        }
        Ok(body)
    }

    fn clone_sender(&self) -> Box<dyn Sender> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{CaptureMock, StubMessage};
    use super::*;
    use pretty_assertions::assert_eq;

    fn configured(secret: &str) -> DingTalkSender {
        let mut sender = DingTalkSender::default();
        let mut config = JsonMap::new();
        config.insert("access_token".to_string(), json!("tok-1"));
        if !secret.is_empty() {
            config.insert("secret".to_string(), json!(secret));
        }
        sender.set_config(&config).expect("valid config");
        sender
    }

    fn token() -> Arc<CancellationToken> {
        Arc::new(CancellationToken::new())
    }

    #[test]
    fn test_set_config_requires_an_access_token() {
        let mut sender = DingTalkSender::default();
        let err = sender.set_config(&JsonMap::new()).unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn test_signature_matches_the_documented_scheme() {
        let sender = configured("sec-1");
        // Independently computed HMAC-SHA256("1700000000000\nsec-1", "sec-1").
        let sign = sender.sign(1_700_000_000_000).unwrap();
        assert_eq!(sign, {
            let mut mac = HmacSha256::new_from_slice(b"sec-1").unwrap();
            mac.update(b"1700000000000\nsec-1");
            BASE64.encode(mac.finalize().into_bytes())
        });
    }

    #[tokio::test]
    async fn test_send_posts_the_text_payload_with_at_mobiles() {
        let mock = CaptureMock::replying(json!({"errcode": 0, "errmsg": "ok"}));
        let executor = RequestExecutor::new().with_middleware(mock.clone());
        let sender = configured("");

        sender
            .send(&executor, &token(), &StubMessage::new("139xxxx", "hi"))
            .await
            .expect("vendor accepts");

        let url = mock.last_url();
        assert!(url.starts_with("https://oapi.dingtalk.com/robot/send"));
        assert!(url.contains("access_token=tok-1"));
        assert!(!url.contains("sign="));

        let body = mock.last_body();
        assert_eq!(body["msgtype"], "text");
        assert_eq!(body["text"]["content"], "hi");
        assert_eq!(body["atMobiles"], json!(["139xxxx"]));
    }

    #[tokio::test]
    async fn test_receiver_all_broadcasts() {
        let mock = CaptureMock::replying(json!({"errcode": 0}));
        let executor = RequestExecutor::new().with_middleware(mock.clone());
        let sender = configured("");

        sender
            .send(&executor, &token(), &StubMessage::new("all", "hi"))
            .await
            .expect("vendor accepts");

        let body = mock.last_body();
        assert_eq!(body["isAtAll"], json!(true));
        assert!(body.get("atMobiles").is_none());
    }

    #[tokio::test]
    async fn test_secret_adds_timestamp_and_sign_to_the_url() {
        let mock = CaptureMock::replying(json!({"errcode": 0}));
        let executor = RequestExecutor::new().with_middleware(mock.clone());
        let sender = configured("sec-1");

        sender
            .send(&executor, &token(), &StubMessage::new("139xxxx", "hi"))
            .await
            .expect("vendor accepts");

        let url = mock.last_url();
        assert!(url.contains("timestamp="));
        assert!(url.contains("sign="));
    }

    #[tokio::test]
    async fn test_nonzero_errcode_is_a_delivery_failure() {
        let mock = CaptureMock::replying(json!({"errcode": 310_000, "errmsg": "keyword missing"}));
        let executor = RequestExecutor::new().with_middleware(mock);
        let sender = configured("");

        let err = sender
            .send(&executor, &token(), &StubMessage::new("139xxxx", "hi"))
            .await
            .unwrap_err();

        match err {
            MsgflowError::Delivery { message, response } => {
                assert_eq!(message, "keyword missing");
                let response = response.expect("vendor reply kept");
                assert_eq!(response["errcode"], json!(310_000));
            }
            other => panic!("expected a delivery failure, got {other}"),
        }
    }
}
