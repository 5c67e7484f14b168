//! Name-keyed sender registry.

use super::dingtalk::DingTalkSender;
use super::workwx::WorkWxSender;
use super::{ConfigField, Sender};
use crate::errors::MsgflowError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A registered vendor, described for listing.
#[derive(Debug, Clone)]
pub struct SenderInfo {
    pub name: String,
    pub label: String,
    pub fields: Vec<ConfigField>,
}

struct Registered {
    label: String,
    prototype: Box<dyn Sender>,
}

#[derive(Default)]
struct Inner {
    senders: HashMap<String, Registered>,
    order: Vec<String>,
}

/// Holds one unconfigured prototype per vendor name.
///
/// Read-mostly and safe for concurrent dispatch workers. [`resolve`]
/// returns a fresh clone, so a worker's configure-and-send never touches
/// the shared prototype.
///
/// [`resolve`]: SenderRegistry::resolve
#[derive(Default)]
pub struct SenderRegistry {
    inner: RwLock<Inner>,
}

impl SenderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the two reference vendors registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        // Fresh registry; the two names cannot collide.
        let _ = registry.register("dingtalk", "DingTalk group robot", Box::new(DingTalkSender::default()));
        let _ = registry.register("workwx", "WorkWx group robot", Box::new(WorkWxSender::default()));
        registry
    }

    /// Registers a vendor prototype under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MsgflowError::SenderAlreadyRegistered`] when `name` is
    /// taken; existing registrations are never overwritten.
    pub fn register(
        &self,
        name: &str,
        label: &str,
        sender: Box<dyn Sender>,
    ) -> Result<(), MsgflowError> {
        let mut inner = self.inner.write();
        if inner.senders.contains_key(name) {
            return Err(MsgflowError::SenderAlreadyRegistered {
                name: name.to_string(),
            });
        }
        inner.senders.insert(
            name.to_string(),
            Registered {
                label: label.to_string(),
                prototype: sender,
            },
        );
        inner.order.push(name.to_string());
        Ok(())
    }

    /// Hands out a fresh unconfigured clone of the named vendor.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Box<dyn Sender>> {
        let inner = self.inner.read();
        inner
            .senders
            .get(name)
            .map(|registered| registered.prototype.clone_sender())
    }

    /// Lists registered vendors in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<SenderInfo> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| {
                inner.senders.get(name).map(|registered| SenderInfo {
                    name: name.clone(),
                    label: registered.label.clone(),
                    fields: registered.prototype.config_fields(),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SenderRegistry")
            .field("order", &inner.order)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = SenderRegistry::with_defaults();
        let err = registry
            .register("dingtalk", "imposter", Box::new(DingTalkSender::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            MsgflowError::SenderAlreadyRegistered { ref name } if name == "dingtalk"
        ));

        // The original registration survives.
        let listed = registry.list();
        assert_eq!(listed[0].label, "DingTalk group robot");
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let registry = SenderRegistry::with_defaults();
        let names: Vec<_> = registry.list().into_iter().map(|info| info.name).collect();
        assert_eq!(names, vec!["dingtalk", "workwx"]);
    }

    #[test]
    fn test_resolve_returns_a_private_clone() {
        let registry = SenderRegistry::with_defaults();
        let mut first = registry.resolve("dingtalk").expect("registered");
        let mut config = crate::model::JsonMap::new();
        config.insert("access_token".to_string(), serde_json::json!("t-1"));
        first.set_config(&config).expect("valid config");

        // A second resolution starts from the unconfigured prototype and
        // still needs its required fields.
        let mut second = registry.resolve("dingtalk").expect("registered");
        let empty = crate::model::JsonMap::new();
        assert!(second.set_config(&empty).is_err());
    }

    #[test]
    fn test_resolve_unknown_vendor_is_none() {
        let registry = SenderRegistry::with_defaults();
        assert!(registry.resolve("smoke-signal").is_none());
    }
}
