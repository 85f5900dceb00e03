//! KubeEvent - change notification for cluster events
//!
//! Mirrors the subset of the core/v1 `Event` resource the router ships.
//! Field names follow the API server's JSON (camelCase) so that flattened
//! attribute keys match what the cluster reports.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change observed by the watch source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    /// First time the resource is seen
    Added,
    /// The resource changed; the previous version is attached
    Update,
}

impl Verb {
    /// Wire representation ("ADDED" / "UPDATE")
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Added => "ADDED",
            Verb::Update => "UPDATE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard object metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

/// Reference to the object an event is about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field_path: String,
}

/// Component that reported the event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
}

/// A cluster event (core/v1)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub involved_object: ObjectReference,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EventSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,

    /// "Normal" or "Warning"
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reporting_component: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reporting_instance: String,
}

/// Event change notification
///
/// `old_event` is only present for [`Verb::Update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeEvent {
    pub verb: Verb,
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_event: Option<Event>,
}

impl KubeEvent {
    /// Notification for a newly observed event
    pub fn added(event: Event) -> Self {
        Self {
            verb: Verb::Added,
            event,
            old_event: None,
        }
    }

    /// Notification for an updated event
    pub fn updated(old_event: Event, event: Event) -> Self {
        Self {
            verb: Verb::Update,
            event,
            old_event: Some(old_event),
        }
    }
}
