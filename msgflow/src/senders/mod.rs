//! Vendor integrations: the sender seam, config binding, and the registry.

mod dingtalk;
mod registry;
mod workwx;

pub use dingtalk::DingTalkSender;
pub use registry::{SenderInfo, SenderRegistry};
pub use workwx::WorkWxSender;

use crate::cancellation::CancellationToken;
use crate::client::RequestExecutor;
use crate::errors::MsgflowError;
use crate::model::JsonMap;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The read-only projection of a record handed to a sender.
pub trait Message: Send + Sync {
    /// The recipient address, vendor-interpreted (`"all"` may broadcast).
    fn receiver(&self) -> &str;
    /// The signature prefix already baked into [`content`](Message::content).
    fn signature(&self) -> &str;
    /// The vendor-specific message kind.
    fn vendor_code(&self) -> &str;
    fn title(&self) -> &str;
    /// The fully rendered message body.
    fn content(&self) -> &str;
    fn variables(&self) -> &HashMap<String, String>;
    fn extra(&self) -> &JsonMap;
}

/// One vendor integration.
///
/// Registered senders are unconfigured prototypes; the registry hands out a
/// fresh clone per resolution, and the caller runs `set_config` then `send`
/// on that private clone. Configure-and-send therefore never races between
/// workers, and `set_config` must be idempotent with no effect beyond the
/// sender's own fields.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Human-readable vendor label.
    fn label(&self) -> &str;

    /// The config surface, with per-field defaults and requirements.
    fn config_fields(&self) -> Vec<ConfigField>;

    /// Binds a stored channel config onto this sender's fields.
    ///
    /// # Errors
    ///
    /// Returns [`MsgflowError::Config`] when a required field is missing or
    /// the config does not fit the sender's shape.
    fn set_config(&mut self, config: &JsonMap) -> Result<(), MsgflowError>;

    /// Delivers one message through the shared executor.
    ///
    /// # Errors
    ///
    /// Returns [`MsgflowError::Http`] for transport failures and
    /// [`MsgflowError::Delivery`] when the vendor acknowledges the call but
    /// rejects the message.
    async fn send(
        &self,
        executor: &RequestExecutor,
        cancel: &Arc<CancellationToken>,
        message: &dyn Message,
    ) -> Result<JsonMap, MsgflowError>;

    /// Clones this sender behind the trait object, for per-call resolution.
    fn clone_sender(&self) -> Box<dyn Sender>;
}

/// Metadata for one config field of a sender.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigField {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub placeholder: &'static str,
    /// Applied when the stored config omits the key.
    pub default: Option<Value>,
}

impl ConfigField {
    /// A required field with no default.
    #[must_use]
    pub fn required(key: &'static str, label: &'static str, placeholder: &'static str) -> Self {
        Self {
            key,
            label,
            required: true,
            placeholder,
            default: None,
        }
    }

    /// An optional field.
    #[must_use]
    pub fn optional(key: &'static str, label: &'static str, placeholder: &'static str) -> Self {
        Self {
            key,
            label,
            required: false,
            placeholder,
            default: None,
        }
    }

    /// Attaches a default value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Binds a stored config onto a typed sender: field defaults first, the
/// stored config on top, then required-field validation and a serde
/// deserialization onto `T`.
///
/// # Errors
///
/// Returns [`MsgflowError::Config`] when a required field is absent or
/// blank, or when the merged config does not deserialize into `T`.
pub fn bind_config<T>(fields: &[ConfigField], config: &JsonMap) -> Result<T, MsgflowError>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = JsonMap::new();
    for field in fields {
        if let Some(default) = &field.default {
            merged.insert(field.key.to_string(), default.clone());
        }
    }
    for (key, value) in config {
        merged.insert(key.clone(), value.clone());
    }

    for field in fields {
        if !field.required {
            continue;
        }
        let blank = match merged.get(field.key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if blank {
            return Err(MsgflowError::Config(format!(
                "missing required config field {:?}",
                field.key
            )));
        }
    }

    serde_json::from_value(Value::Object(merged))
        .map_err(|err| MsgflowError::Config(format!("config does not fit sender: {err}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::client::{HttpError, HttpRequest, HttpResponse, Middleware, Next};
    use parking_lot::Mutex;

    /// A fixed message for sender tests.
    pub(crate) struct StubMessage {
        pub receiver: String,
        pub content: String,
    }

    impl StubMessage {
        pub(crate) fn new(receiver: &str, content: &str) -> Self {
            Self {
                receiver: receiver.to_string(),
                content: content.to_string(),
            }
        }
    }

    impl Message for StubMessage {
        fn receiver(&self) -> &str {
            &self.receiver
        }

        fn signature(&self) -> &str {
            ""
        }

        fn vendor_code(&self) -> &str {
            "text"
        }

        fn title(&self) -> &str {
            ""
        }

        fn content(&self) -> &str {
            &self.content
        }

        fn variables(&self) -> &HashMap<String, String> {
            static EMPTY: std::sync::OnceLock<HashMap<String, String>> = std::sync::OnceLock::new();
            EMPTY.get_or_init(HashMap::new)
        }

        fn extra(&self) -> &JsonMap {
            static EMPTY: std::sync::OnceLock<JsonMap> = std::sync::OnceLock::new();
            EMPTY.get_or_init(JsonMap::new)
        }
    }

    /// Captures outbound requests and answers with a canned JSON body.
    pub(crate) struct CaptureMock {
        pub seen: Mutex<Vec<HttpRequest>>,
        pub reply: Value,
    }

    impl CaptureMock {
        pub(crate) fn replying(reply: Value) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                reply,
            })
        }

        pub(crate) fn last_url(&self) -> String {
            self.seen.lock().last().map(|req| req.url.clone()).unwrap_or_default()
        }

        pub(crate) fn last_body(&self) -> Value {
            self.seen
                .lock()
                .last()
                .and_then(|req| serde_json::from_slice(&req.body).ok())
                .unwrap_or(Value::Null)
        }
    }

    #[async_trait]
    impl Middleware for CaptureMock {
        async fn handle(
            &self,
            req: HttpRequest,
            _next: Next<'_>,
        ) -> Result<HttpResponse, HttpError> {
            self.seen.lock().push(req);
            Ok(HttpResponse {
                status: 200,
                headers: std::collections::HashMap::new(),
                body: serde_json::to_vec(&self.reply).unwrap_or_default(),
            })
        }
    }
}
