//! KubeObject - change notification for arbitrary resources
//!
//! The resource body is kept as untyped JSON; only `kind` and
//! `metadata.{name,namespace}` are interpreted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ContractError, Verb};

/// Resource change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeObject {
    pub verb: Verb,
    pub obj: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_obj: Option<Value>,
}

impl KubeObject {
    /// Notification for a newly observed object
    pub fn added(obj: Value) -> Self {
        Self {
            verb: Verb::Added,
            obj,
            old_obj: None,
        }
    }

    /// Notification for an updated object
    pub fn updated(old_obj: Value, obj: Value) -> Self {
        Self {
            verb: Verb::Update,
            obj,
            old_obj: Some(old_obj),
        }
    }

    /// Resource kind, empty when the object carries no type information
    pub fn kind(&self) -> &str {
        self.obj.get("kind").and_then(Value::as_str).unwrap_or("")
    }

    /// Namespace and name from the object metadata
    ///
    /// Cluster-scoped objects yield an empty namespace.
    ///
    /// # Errors
    /// Returns an error when the object has no metadata name.
    pub fn namespace_and_name(&self) -> Result<(&str, &str), ContractError> {
        let metadata = self.obj.get("metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ContractError::Other(format!("{} object has no metadata.name", self.kind()))
            })?;
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .unwrap_or("");
        Ok((namespace, name))
    }
}
