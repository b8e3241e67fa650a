//! In-memory repository
//!
//! petgraph-backed [`MetadataRepository`] used by the CLI and the tests.
//! GUIDs are derived from a SHA256 of the qualified name and a creation
//! counter, so a given build always produces the same GUIDs.

use chrono::Utc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::collections::HashMap;

use super::{EntityDetail, EntityProperties, EntityType, MetadataRepository, RelationshipType};
use crate::error::{Result, SyncError};

/// Failure to raise from an injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Server,
    Unauthorized,
}

impl FailureKind {
    fn to_error(self, user: &str, operation: String) -> SyncError {
        match self {
            FailureKind::Server => {
                SyncError::PropertyServer(format!("injected failure during {}", operation))
            }
            FailureKind::Unauthorized => SyncError::UserNotAuthorized {
                user: user.to_string(),
                operation,
            },
        }
    }
}

/// Relationship as stored in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub relationship_type: RelationshipType,
    pub source_guid: String,
    pub target_guid: String,
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    graph: DiGraph<EntityDetail, RelationshipType>,
    by_guid: HashMap<String, NodeIndex>,
    sequence: u64,
    entity_faults: HashMap<EntityType, FailureKind>,
    relationship_faults: HashMap<RelationshipType, FailureKind>,
    search_fault: Option<FailureKind>,
    search_calls: Cell<usize>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every create of `entity_type`
    pub fn fail_entities(&mut self, entity_type: EntityType, kind: FailureKind) {
        self.entity_faults.insert(entity_type, kind);
    }

    /// Fail every create of `relationship_type`
    pub fn fail_relationships(&mut self, relationship_type: RelationshipType, kind: FailureKind) {
        self.relationship_faults.insert(relationship_type, kind);
    }

    /// Fail every search
    pub fn fail_searches(&mut self, kind: FailureKind) {
        self.search_fault = Some(kind);
    }

    pub fn clear_faults(&mut self) {
        self.entity_faults.clear();
        self.relationship_faults.clear();
        self.search_fault = None;
    }

    /// Number of search calls issued so far (exact and prefix)
    pub fn search_calls(&self) -> usize {
        self.search_calls.get()
    }

    pub fn entity_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn entity(&self, guid: &str) -> Option<&EntityDetail> {
        self.by_guid.get(guid).map(|&idx| &self.graph[idx])
    }

    /// All entities with the given qualified name, in creation order
    pub fn entities_named(&self, qualified_name: &str) -> Vec<&EntityDetail> {
        self.graph
            .node_weights()
            .filter(|e| e.qualified_name == qualified_name)
            .collect()
    }

    pub fn entities_of_type(&self, entity_type: EntityType) -> Vec<&EntityDetail> {
        self.graph
            .node_weights()
            .filter(|e| e.entity_type == entity_type)
            .collect()
    }

    pub fn relationships(&self) -> Vec<RelationshipRecord> {
        self.graph
            .edge_references()
            .map(|edge| RelationshipRecord {
                relationship_type: *edge.weight(),
                source_guid: self.graph[edge.source()].guid.clone(),
                target_guid: self.graph[edge.target()].guid.clone(),
            })
            .collect()
    }

    pub fn relationships_of_type(&self, relationship_type: RelationshipType) -> Vec<(String, String)> {
        self.relationships()
            .into_iter()
            .filter(|r| r.relationship_type == relationship_type)
            .map(|r| (r.source_guid, r.target_guid))
            .collect()
    }

    fn next_guid(&mut self, qualified_name: &str) -> String {
        self.sequence += 1;
        let mut hasher = Sha256::new();
        hasher.update(qualified_name.as_bytes());
        hasher.update(self.sequence.to_be_bytes());
        let hex = format!("{:x}", hasher.finalize());
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }

    fn node(&self, guid: &str) -> Result<NodeIndex> {
        self.by_guid
            .get(guid)
            .copied()
            .ok_or_else(|| SyncError::PropertyServer(format!("unknown entity guid {}", guid)))
    }

    fn record_search(&self, user: &str, operation: &str) -> Result<()> {
        self.search_calls.set(self.search_calls.get() + 1);
        match self.search_fault {
            Some(kind) => Err(kind.to_error(user, operation.to_string())),
            None => Ok(()),
        }
    }
}

impl MetadataRepository for InMemoryRepository {
    fn create_entity(
        &mut self,
        user: &str,
        entity_type: EntityType,
        qualified_name: &str,
        properties: EntityProperties,
        anchor_guid: Option<&str>,
    ) -> Result<String> {
        if let Some(kind) = self.entity_faults.get(&entity_type) {
            return Err(kind.to_error(user, format!("create {}", entity_type)));
        }
        if qualified_name.is_empty() {
            return Err(SyncError::invalid_parameter(
                "qualifiedName",
                "entities need a qualified name",
            ));
        }
        if let Some(anchor) = anchor_guid {
            self.node(anchor)?;
        }

        let guid = self.next_guid(qualified_name);
        let idx = self.graph.add_node(EntityDetail {
            guid: guid.clone(),
            entity_type,
            qualified_name: qualified_name.to_string(),
            properties,
            anchor_guid: anchor_guid.map(String::from),
            created_at: Utc::now(),
        });
        self.by_guid.insert(guid.clone(), idx);
        Ok(guid)
    }

    fn create_relationship(
        &mut self,
        user: &str,
        relationship_type: RelationshipType,
        source_guid: &str,
        target_guid: &str,
    ) -> Result<()> {
        if let Some(kind) = self.relationship_faults.get(&relationship_type) {
            return Err(kind.to_error(user, format!("create {}", relationship_type)));
        }
        let source = self.node(source_guid)?;
        let target = self.node(target_guid)?;
        self.graph.add_edge(source, target, relationship_type);
        Ok(())
    }

    fn find_entities_by_exact_property(
        &self,
        user: &str,
        entity_type: EntityType,
        property_name: &str,
        value: &str,
    ) -> Result<Vec<EntityDetail>> {
        self.record_search(user, "find entities by exact property")?;
        Ok(self
            .graph
            .node_weights()
            .filter(|e| e.entity_type == entity_type && e.property(property_name) == Some(value))
            .cloned()
            .collect())
    }

    fn find_entities_by_prefix_pattern(
        &self,
        user: &str,
        entity_type: EntityType,
        property_name: &str,
        pattern: &str,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<EntityDetail>> {
        self.record_search(user, "find entities by prefix pattern")?;
        let re = Regex::new(pattern)?;
        Ok(self
            .graph
            .node_weights()
            .filter(|e| e.entity_type == entity_type)
            .filter(|e| e.property(property_name).map(|v| re.is_match(v)).unwrap_or(false))
            .skip(offset)
            .take(page_size.max(1))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{prefix_pattern, QUALIFIED_NAME};

    fn create(repo: &mut InMemoryRepository, qn: &str) -> String {
        repo.create_entity("u", EntityType::SchemaAttribute, qn, EntityProperties::new(), None)
            .unwrap()
    }

    #[test]
    fn test_guids_are_unique_and_deterministic() {
        let mut a = InMemoryRepository::new();
        let mut b = InMemoryRepository::new();
        let g1 = create(&mut a, "x");
        let g2 = create(&mut a, "x");
        assert_ne!(g1, g2);
        assert_eq!(g1, create(&mut b, "x"));
        assert_eq!(g1.len(), 36);
    }

    #[test]
    fn test_relationship_requires_known_guids() {
        let mut repo = InMemoryRepository::new();
        let g = create(&mut repo, "x");
        let result = repo.create_relationship("u", RelationshipType::NestedSchemaAttribute, &g, "nope");
        assert!(matches!(result, Err(SyncError::PropertyServer(_))));
        assert!(repo.relationships().is_empty());
    }

    #[test]
    fn test_prefix_search_pages() {
        let mut repo = InMemoryRepository::new();
        for i in 0..5 {
            create(&mut repo, &format!("A::{}", i));
        }
        create(&mut repo, "B::0");

        let pattern = prefix_pattern("A::");
        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = repo
                .find_entities_by_prefix_pattern(
                    "u", EntityType::SchemaAttribute, QUALIFIED_NAME, &pattern, offset, 2,
                )
                .unwrap();
            if page.is_empty() {
                break;
            }
            offset += page.len();
            seen.extend(page.into_iter().map(|e| e.qualified_name));
        }
        assert_eq!(seen, vec!["A::0", "A::1", "A::2", "A::3", "A::4"]);
        assert_eq!(repo.search_calls(), 4);
    }

    #[test]
    fn test_injected_faults() {
        let mut repo = InMemoryRepository::new();
        repo.fail_entities(EntityType::SchemaAttribute, FailureKind::Unauthorized);
        let result = repo.create_entity("bob", EntityType::SchemaAttribute, "x", EntityProperties::new(), None);
        assert!(matches!(result, Err(SyncError::UserNotAuthorized { .. })));

        repo.clear_faults();
        repo.fail_searches(FailureKind::Server);
        let result = repo.find_entities_by_exact_property("bob", EntityType::SchemaAttribute, QUALIFIED_NAME, "x");
        assert!(matches!(result, Err(SyncError::PropertyServer(_))));
    }
}
