//! Infrastructure agent payload envelope (protocol v3)

use serde::Serialize;

use crate::flatten::Attributes;

/// Integration name reported to the agent
pub const INTEGRATION_NAME: &str = "kube_events";

/// Event category for everything this integration ships
pub const CATEGORY: &str = "kubernetes";

/// Top-level integration payload
#[derive(Debug, Serialize)]
pub struct IntegrationPayload<'a> {
    pub name: &'static str,
    pub protocol_version: &'static str,
    pub integration_version: &'a str,
    pub data: Vec<EntityData>,
}

impl<'a> IntegrationPayload<'a> {
    /// Payload carrying a single entity
    pub fn single(integration_version: &'a str, entity: EntityData) -> Self {
        Self {
            name: INTEGRATION_NAME,
            protocol_version: "3",
            integration_version,
            data: vec![entity],
        }
    }
}

/// Entity identity
#[derive(Debug, Serialize)]
pub struct EntityMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id_attributes: Vec<IdAttribute>,
}

/// Extra entity key attribute
#[derive(Debug, Serialize)]
pub struct IdAttribute {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// One event with its attributes
#[derive(Debug, Serialize)]
pub struct InfraEvent {
    pub summary: String,
    pub category: &'static str,
    pub attributes: Attributes,
}

/// Entity with its events
#[derive(Debug, Serialize)]
pub struct EntityData {
    pub entity: EntityMetadata,
    pub metrics: Vec<Attributes>,
    pub inventory: Attributes,
    pub events: Vec<InfraEvent>,
}

impl EntityData {
    /// Entity holding exactly one event
    pub fn with_event(
        name: impl Into<String>,
        entity_type: impl Into<String>,
        summary: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            entity: EntityMetadata {
                name: name.into(),
                entity_type: entity_type.into(),
                id_attributes: Vec::new(),
            },
            metrics: Vec::new(),
            inventory: Attributes::new(),
            events: vec![InfraEvent {
                summary: summary.into(),
                category: CATEGORY,
                attributes,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let mut attrs = Attributes::new();
        attrs.insert("clusterName".into(), json!("minikube"));

        let payload = IntegrationPayload::single(
            "1.2.3",
            EntityData::with_event("nginx", "k8s:minikube:default:pod", "Pulled image", attrs),
        );

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "name": "kube_events",
                "protocol_version": "3",
                "integration_version": "1.2.3",
                "data": [{
                    "entity": {
                        "name": "nginx",
                        "type": "k8s:minikube:default:pod",
                        "id_attributes": []
                    },
                    "metrics": [],
                    "inventory": {},
                    "events": [{
                        "summary": "Pulled image",
                        "category": "kubernetes",
                        "attributes": {"clusterName": "minikube"}
                    }]
                }]
            })
        );
    }
}
