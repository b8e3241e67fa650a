//! Metadata Repository
//!
//! The builder and resolver only talk to the repository through
//! [`MetadataRepository`]: create an entity, create a relationship, and find
//! entities by an exact or prefix-pattern property match. Each call either
//! completes or fails on its own.

pub mod memory;

pub use memory::{FailureKind, InMemoryRepository};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

/// Property every entity is searchable by
pub const QUALIFIED_NAME: &str = "qualifiedName";

/// Entity types written by the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// Owning capability (the analytics server)
    SoftwareServerCapability,
    /// Data asset built from containers and items
    InformationView,
    /// Report-like asset built from a visualization tree
    DeployedReport,
    /// Schema type anchored to an asset
    ComplexSchemaType,
    /// Container or item
    SchemaAttribute,
}

impl EntityType {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SoftwareServerCapability => "SoftwareServerCapability",
            Self::InformationView => "InformationView",
            Self::DeployedReport => "DeployedReport",
            Self::ComplexSchemaType => "ComplexSchemaType",
            Self::SchemaAttribute => "SchemaAttribute",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Relationship types written by the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// Capability uses asset
    ServerAssetUse,
    /// Asset is computed from a referenced asset
    DataContentForDataSet,
    /// Asset to its schema type
    AssetSchemaType,
    /// Schema type to a top-level attribute
    AttributeForSchema,
    /// Parent attribute to nested attribute
    NestedSchemaAttribute,
    /// Item to an element it is computed from
    SchemaQueryImplementation,
}

impl RelationshipType {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ServerAssetUse => "ServerAssetUse",
            Self::DataContentForDataSet => "DataContentForDataSet",
            Self::AssetSchemaType => "AssetSchemaType",
            Self::AttributeForSchema => "AttributeForSchema",
            Self::NestedSchemaAttribute => "NestedSchemaAttribute",
            Self::SchemaQueryImplementation => "SchemaQueryImplementation",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Properties supplied when creating an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Qualified name of the schema type embedded in an attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, String>,
}

impl EntityProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_name(mut self, value: Option<&str>) -> Self {
        self.display_name = value.map(String::from);
        self
    }

    pub fn description(mut self, value: Option<&str>) -> Self {
        self.description = value.map(String::from);
        self
    }

    pub fn additional(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional.insert(key.into(), value.into());
        self
    }
}

/// Entity as stored in the repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDetail {
    pub guid: String,
    pub entity_type: EntityType,
    pub qualified_name: String,
    pub properties: EntityProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_guid: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EntityDetail {
    /// Look up a searchable string property
    pub fn property(&self, name: &str) -> Option<&str> {
        match name {
            QUALIFIED_NAME => Some(&self.qualified_name),
            "displayName" => self.properties.display_name.as_deref(),
            "description" => self.properties.description.as_deref(),
            other => self.properties.additional.get(other).map(String::as_str),
        }
    }
}

/// Regex matching every value that starts with `prefix`
pub fn prefix_pattern(prefix: &str) -> String {
    format!("^{}.*", regex::escape(prefix))
}

/// Repository operations used by the builder and resolver
pub trait MetadataRepository {
    /// Create an entity and return its GUID
    fn create_entity(
        &mut self,
        user: &str,
        entity_type: EntityType,
        qualified_name: &str,
        properties: EntityProperties,
        anchor_guid: Option<&str>,
    ) -> Result<String>;

    /// Create a relationship between two existing entities
    fn create_relationship(
        &mut self,
        user: &str,
        relationship_type: RelationshipType,
        source_guid: &str,
        target_guid: &str,
    ) -> Result<()>;

    /// Entities of `entity_type` whose `property_name` equals `value`
    fn find_entities_by_exact_property(
        &self,
        user: &str,
        entity_type: EntityType,
        property_name: &str,
        value: &str,
    ) -> Result<Vec<EntityDetail>>;

    /// One page of entities whose `property_name` matches `pattern`.
    /// An empty page means the search is exhausted.
    fn find_entities_by_prefix_pattern(
        &self,
        user: &str,
        entity_type: EntityType,
        property_name: &str,
        pattern: &str,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<EntityDetail>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_pattern_escapes() {
        let pattern = prefix_pattern("Server::(InformationView)=a1::");
        let re = regex::Regex::new(&pattern).unwrap();
        assert!(re.is_match("Server::(InformationView)=a1::(SchemaAttribute)=x"));
        assert!(!re.is_match("Server::(InformationView)=a10::(SchemaAttribute)=x"));
        assert!(!re.is_match("Other::Server::(InformationView)=a1::"));
    }

    #[test]
    fn test_entity_property_lookup() {
        let entity = EntityDetail {
            guid: "g".into(),
            entity_type: EntityType::SchemaAttribute,
            qualified_name: "qn".into(),
            properties: EntityProperties::new()
                .display_name(Some("X"))
                .additional("type", "column"),
            anchor_guid: None,
            created_at: Utc::now(),
        };
        assert_eq!(entity.property(QUALIFIED_NAME), Some("qn"));
        assert_eq!(entity.property("displayName"), Some("X"));
        assert_eq!(entity.property("type"), Some("column"));
        assert_eq!(entity.property("missing"), None);
    }
}
