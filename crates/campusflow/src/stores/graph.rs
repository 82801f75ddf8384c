use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

pub const PERSON_LABEL: &str = "Person";
pub const INSTITUTION_LABEL: &str = "Institution";
pub const CAREER_LABEL: &str = "Career";

pub const INTERESTED_IN_INSTITUTION: &str = "INTERESTED_IN_INSTITUTION";
pub const INTERESTED_IN_CAREER: &str = "INTERESTED_IN_CAREER";
pub const OFFERED_AT: &str = "OFFERED_AT";

/// Everything the graph needs to mirror one student interest: the person
/// (keyed by document id, not email), the institution and career as known to
/// tenant configuration, and the relationship properties.
#[derive(Debug, Clone, PartialEq)]
pub struct InterestSnapshot {
    pub person_key: String,
    pub full_name: String,
    pub email: String,
    pub institution_id: String,
    pub institution_name: String,
    pub institution_kind: Option<String>,
    pub career_id: String,
    pub career_name: String,
    pub career_code: Option<String>,
    pub status: String,
    pub stage: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub priority: u32,
}

/// Outcome of a relationship status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphUpdate {
    Applied,
    /// No matching relationship; callers log this, it is not an error.
    NoMatch,
}

/// Port over the property-graph store. Both operations are merge-by-key:
/// re-running them with identical inputs never duplicates nodes or
/// relationships.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upserts the Person/Institution/Career nodes and the three
    /// relationships between them, refreshing relationship properties.
    async fn upsert_interest(&self, snapshot: &InterestSnapshot) -> Result<(), GraphError>;
    /// Mutates only the Person→Institution relationship's status properties.
    async fn update_interest_status(
        &self,
        person_key: &str,
        institution_id: &str,
        status: &str,
        stage: &str,
    ) -> Result<GraphUpdate, GraphError>;
    async fn ping(&self) -> Result<(), GraphError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
}

type NodeId = (&'static str, String);
type RelId = (&'static str, NodeId, NodeId);

#[derive(Debug, Default)]
struct GraphData {
    nodes: HashMap<NodeId, Map<String, Value>>,
    relationships: HashMap<RelId, Map<String, Value>>,
}

impl GraphData {
    fn merge_node(&mut self, label: &'static str, key: &str, props: Map<String, Value>) {
        let entry = self
            .nodes
            .entry((label, key.to_string()))
            .or_default();
        for (name, value) in props {
            entry.insert(name, value);
        }
    }

    fn merge_relationship(&mut self, id: RelId, props: Map<String, Value>) {
        let entry = self.relationships.entry(id).or_default();
        for (name, value) in props {
            entry.insert(name, value);
        }
    }
}

fn props(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Process-local graph holding nodes keyed by `(label, key)` and
/// relationships keyed by `(kind, from, to)`.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    data: RwLock<GraphData>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.data.read().await.nodes.len()
    }

    pub async fn relationship_count(&self) -> usize {
        self.data.read().await.relationships.len()
    }

    /// Status and stage recorded on the Person→Institution relationship.
    pub async fn interest_status(
        &self,
        person_key: &str,
        institution_id: &str,
    ) -> Option<(String, Option<String>)> {
        let data = self.data.read().await;
        let id: RelId = (
            INTERESTED_IN_INSTITUTION,
            (PERSON_LABEL, person_key.to_string()),
            (INSTITUTION_LABEL, institution_id.to_string()),
        );
        let rel = data.relationships.get(&id)?;
        let status = rel.get("status")?.as_str()?.to_string();
        let stage = rel
            .get("stage")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string());
        Some((status, stage))
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_interest(&self, snapshot: &InterestSnapshot) -> Result<(), GraphError> {
        let mut data = self.data.write().await;

        data.merge_node(
            PERSON_LABEL,
            &snapshot.person_key,
            props(vec![
                ("name", json!(snapshot.full_name)),
                ("email", json!(snapshot.email)),
            ]),
        );
        data.merge_node(
            INSTITUTION_LABEL,
            &snapshot.institution_id,
            props(vec![
                ("name", json!(snapshot.institution_name)),
                (
                    "kind",
                    snapshot
                        .institution_kind
                        .as_deref()
                        .map(|kind| json!(kind))
                        .unwrap_or(Value::Null),
                ),
            ]),
        );
        data.merge_node(
            CAREER_LABEL,
            &snapshot.career_id,
            props(vec![
                ("name", json!(snapshot.career_name)),
                (
                    "code",
                    snapshot
                        .career_code
                        .as_deref()
                        .map(|code| json!(code))
                        .unwrap_or(Value::Null),
                ),
            ]),
        );

        let person: NodeId = (PERSON_LABEL, snapshot.person_key.clone());
        let institution: NodeId = (INSTITUTION_LABEL, snapshot.institution_id.clone());
        let career: NodeId = (CAREER_LABEL, snapshot.career_id.clone());

        data.merge_relationship((OFFERED_AT, career.clone(), institution.clone()), Map::new());
        data.merge_relationship(
            (INTERESTED_IN_INSTITUTION, person.clone(), institution),
            props(vec![
                ("status", json!(snapshot.status)),
                (
                    "stage",
                    snapshot
                        .stage
                        .as_deref()
                        .map(|stage| json!(stage))
                        .unwrap_or(Value::Null),
                ),
                ("timestamp", json!(snapshot.registered_at.to_rfc3339())),
            ]),
        );
        data.merge_relationship(
            (INTERESTED_IN_CAREER, person, career),
            props(vec![
                ("timestamp", json!(snapshot.registered_at.to_rfc3339())),
                ("priority", json!(snapshot.priority)),
            ]),
        );

        Ok(())
    }

    async fn update_interest_status(
        &self,
        person_key: &str,
        institution_id: &str,
        status: &str,
        stage: &str,
    ) -> Result<GraphUpdate, GraphError> {
        let mut data = self.data.write().await;
        let id: RelId = (
            INTERESTED_IN_INSTITUTION,
            (PERSON_LABEL, person_key.to_string()),
            (INSTITUTION_LABEL, institution_id.to_string()),
        );
        let Some(rel) = data.relationships.get_mut(&id) else {
            return Ok(GraphUpdate::NoMatch);
        };
        rel.insert("status".to_string(), json!(status));
        rel.insert("stage".to_string(), json!(stage));
        Ok(GraphUpdate::Applied)
    }

    async fn ping(&self) -> Result<(), GraphError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(person_key: &str) -> InterestSnapshot {
        InterestSnapshot {
            person_key: person_key.to_string(),
            full_name: "Ana Diaz".to_string(),
            email: "ana@x.com".to_string(),
            institution_id: "uni-x".to_string(),
            institution_name: "Universidad X".to_string(),
            institution_kind: Some("publica".to_string()),
            career_id: "cs101".to_string(),
            career_name: "Computer Science".to_string(),
            career_code: Some("CS".to_string()),
            status: "interesado".to_string(),
            stage: Some("Interesado".to_string()),
            registered_at: Utc::now(),
            priority: 1,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_key() {
        let graph = InMemoryGraphStore::new();
        let snap = snapshot("30111222");

        graph.upsert_interest(&snap).await.expect("first upsert");
        graph.upsert_interest(&snap).await.expect("second upsert");

        assert_eq!(graph.node_count().await, 3);
        assert_eq!(graph.relationship_count().await, 3);
    }

    #[tokio::test]
    async fn status_update_touches_only_the_institution_relationship() {
        let graph = InMemoryGraphStore::new();
        graph
            .upsert_interest(&snapshot("30111222"))
            .await
            .expect("upsert");

        let outcome = graph
            .update_interest_status("30111222", "uni-x", "en_revision", "En Revision")
            .await
            .expect("update");
        assert_eq!(outcome, GraphUpdate::Applied);
        assert_eq!(
            graph.interest_status("30111222", "uni-x").await,
            Some(("en_revision".to_string(), Some("En Revision".to_string())))
        );
        assert_eq!(graph.relationship_count().await, 3);
    }

    #[tokio::test]
    async fn status_update_without_relationship_is_a_no_op() {
        let graph = InMemoryGraphStore::new();
        let outcome = graph
            .update_interest_status("unknown", "uni-x", "en_revision", "En Revision")
            .await
            .expect("update");
        assert_eq!(outcome, GraphUpdate::NoMatch);
    }
}
