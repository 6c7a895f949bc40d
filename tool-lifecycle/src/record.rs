//! Persisted tool records and the views derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tool_cache::artifact_key;
use tool_primitives::{AgentId, ContentHash, Language, ToolId};

use crate::definition::{ToolDefinition, ToolSchema};
use crate::lifecycle::ToolStatus;

/// Pointer from a tool record to its cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Content hash of the validated source.
    pub content_hash: ContentHash,
    /// Storage key of the artifact record.
    pub key: String,
}

impl ArtifactRef {
    /// Reference to the artifact stored for `content_hash`.
    #[must_use]
    pub fn new(content_hash: ContentHash) -> Self {
        Self {
            key: artifact_key(&content_hash),
            content_hash,
        }
    }
}

/// A registered tool, as stored in the tool index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Identifier generated at registration.
    pub tool_id: ToolId,
    /// Owning agent.
    pub agent_id: AgentId,
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// Caller-chosen version label.
    pub version: String,
    /// Lifecycle status.
    pub status: ToolStatus,
    /// Cached artifact holding the validated source.
    pub artifact: ArtifactRef,
    /// Source language.
    pub language: Language,
    /// Declared interface.
    pub schema: ToolSchema,
    /// Number of recorded executions.
    #[serde(default)]
    pub execution_count: u64,
    /// Time of the most recent recorded execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<DateTime<Utc>>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Time of the last modification.
    pub updated_at: DateTime<Utc>,
    /// Free-form metadata from the definition.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Optimistic-concurrency token maintained by the tool index.
    #[serde(default)]
    pub revision: u64,
}

impl ToolRecord {
    /// Creates an active record for a freshly registered definition.
    #[must_use]
    pub fn new(agent_id: AgentId, definition: &ToolDefinition, artifact: ArtifactRef) -> Self {
        let now = Utc::now();
        Self {
            tool_id: ToolId::random(),
            agent_id,
            name: definition.name.clone(),
            description: definition.description.clone(),
            version: definition.version.clone(),
            status: ToolStatus::Active,
            artifact,
            language: definition.language,
            schema: definition.schema.clone(),
            execution_count: 0,
            last_executed: None,
            created_at: now,
            updated_at: now,
            metadata: definition.metadata.clone(),
            revision: 0,
        }
    }

    /// Copies the definition's declared fields onto the record and refreshes
    /// `updated_at`.
    pub fn apply_definition(&mut self, definition: &ToolDefinition, artifact: ArtifactRef) {
        self.name.clone_from(&definition.name);
        self.description.clone_from(&definition.description);
        self.version.clone_from(&definition.version);
        self.language = definition.language;
        self.schema = definition.schema.clone();
        self.metadata = definition.metadata.clone();
        self.artifact = artifact;
        self.updated_at = Utc::now();
    }

    /// Returns `true` if `agent_id` owns the record.
    #[must_use]
    pub fn is_owned_by(&self, agent_id: AgentId) -> bool {
        self.agent_id == agent_id
    }

    /// Content hash of the referenced artifact.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        self.artifact.content_hash
    }

    /// OpenAPI document describing the tool.
    #[must_use]
    pub fn openapi(&self) -> Value {
        self.schema
            .to_openapi(self.tool_id, &self.name, &self.description, &self.version)
    }

    /// Fields published to the gateway.
    #[must_use]
    pub fn public_metadata(&self) -> ToolPublicMetadata {
        ToolPublicMetadata {
            tool_id: self.tool_id,
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            status: self.status,
            language: self.language,
            openapi: self.openapi(),
            updated_at: self.updated_at,
        }
    }

    /// Persisted counters and timestamps.
    #[must_use]
    pub fn status_report(&self) -> ToolStatusReport {
        ToolStatusReport {
            tool_id: self.tool_id,
            status: self.status,
            version: self.version.clone(),
            execution_count: self.execution_count,
            last_executed: self.last_executed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Subset of a record exposed through the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPublicMetadata {
    /// Tool identifier.
    pub tool_id: ToolId,
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// Version label.
    pub version: String,
    /// Lifecycle status.
    pub status: ToolStatus,
    /// Source language.
    pub language: Language,
    /// OpenAPI 3.0 document.
    pub openapi: Value,
    /// Time of the last modification.
    pub updated_at: DateTime<Utc>,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatusReport {
    /// Tool identifier.
    pub tool_id: ToolId,
    /// Lifecycle status.
    pub status: ToolStatus,
    /// Version label.
    pub version: String,
    /// Number of recorded executions.
    pub execution_count: u64,
    /// Time of the most recent recorded execution.
    pub last_executed: Option<DateTime<Utc>>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Time of the last modification.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ReturnSchema;

    fn definition(code: &str) -> ToolDefinition {
        ToolDefinition::new(
            "noop",
            "Does nothing",
            "1.0.0",
            Language::Python,
            code,
            ToolSchema::new(ReturnSchema::new("null", "Nothing")),
        )
    }

    #[test]
    fn new_records_start_active() {
        let definition = definition("x = 1");
        let owner = AgentId::random();
        let record = ToolRecord::new(owner, &definition, ArtifactRef::new(definition.content_hash()));
        assert_eq!(record.status, ToolStatus::Active);
        assert!(record.is_owned_by(owner));
        assert!(!record.is_owned_by(AgentId::random()));
        assert_eq!(record.execution_count, 0);
        assert_eq!(record.revision, 0);
        assert_eq!(
            record.artifact.key,
            format!("artifacts/{}.json", definition.content_hash())
        );
    }

    #[test]
    fn applying_a_definition_refreshes_fields() {
        let first = definition("x = 1");
        let mut record = ToolRecord::new(AgentId::random(), &first, ArtifactRef::new(first.content_hash()));
        let created = record.created_at;

        let mut second = definition("x = 2");
        second.version = "2.0.0".into();
        record.apply_definition(&second, ArtifactRef::new(second.content_hash()));
        assert_eq!(record.version, "2.0.0");
        assert_eq!(record.content_hash(), second.content_hash());
        assert_eq!(record.created_at, created);
        assert!(record.updated_at >= created);
    }

    #[test]
    fn public_metadata_carries_openapi() {
        let definition = definition("x = 1");
        let record = ToolRecord::new(AgentId::random(), &definition, ArtifactRef::new(definition.content_hash()));
        let public = record.public_metadata();
        assert_eq!(public.tool_id, record.tool_id);
        assert_eq!(public.openapi["info"]["version"], "1.0.0");
        assert_eq!(record.status_report().status, ToolStatus::Active);
    }
}
