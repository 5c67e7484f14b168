//! WorkWx (WeCom) group robot webhook.

use super::{bind_config, ConfigField, Message, Sender};
use crate::cancellation::CancellationToken;
use crate::client::{RequestExecutor, RequestOptions};
use crate::errors::MsgflowError;
use crate::model::JsonMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Posts text messages to a WorkWx group robot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkWxSender {
    url: String,
    key: String,
}

impl WorkWxSender {
    /// Appends the robot key unless the stored URL already carries one.
    fn webhook_url(&self) -> String {
        let webhook = self.url.trim();
        let key = self.key.trim();
        if webhook.contains("key=") {
            return webhook.to_string();
        }
        if webhook.ends_with('?') {
            format!("{webhook}key={key}")
        } else if webhook.contains('?') {
            format!("{webhook}&key={key}")
        } else {
            format!("{webhook}?key={key}")
        }
    }
}

#[async_trait]
impl Sender for WorkWxSender {
    fn label(&self) -> &str {
        "WorkWx group robot"
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("url", "Webhook endpoint", "robot webhook URL")
                .with_default(json!("https://qyapi.weixin.qq.com/cgi-bin/webhook/send")),
            ConfigField::required("key", "Robot key", "webhook credential"),
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
        let payload = json!({
            "msgtype": "text",
            "text": {
                "content": message.content(),
                "mentioned_mobile_list": [message.receiver()],
            },
        });
        let response = executor
            .post_json(cancel, &self.webhook_url(), &payload, &RequestOptions::default())
            .await?;

        let body = response.json_map();
        if let Some(code) = body.get("errcode").and_then(Value::as_i64) {
            if code != 0 {
                let errmsg = body
                    .get("errmsg")
                    .and_then(Value::as_str)
                    .unwrap_or("workwx rejected the message")
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
