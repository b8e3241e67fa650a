//! Graph Builder
//!
//! Materializes an analytics asset tree as entities and relationships:
//!
//! ```text
//! capability ──ServerAssetUse──▶ asset ──AssetSchemaType──▶ schema type
//!                                  │                           │
//!                     DataContentForDataSet            AttributeForSchema
//!                                  ▼                           ▼
//!                          referenced asset      container/item ──NestedSchemaAttribute──▶ ...
//!                                                      item ──SchemaQueryImplementation──▶ source
//! ```
//!
//! Sibling items are processed in two passes: every item in a scope is
//! created (and its identifier bound) before any metadata link in that scope
//! is attempted, so an item may name a sibling declared after it.
//!
//! Structural writes (entities and containment relationships) abort the
//! build on failure. Auxiliary edges (asset references and metadata links)
//! are recorded in the [`BuildReport`] instead, unless `strict_links` is set.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::context::{CapabilityContext, PublishSession};
use crate::error::Result;
use crate::model::{AnalyticsAsset, MetadataContainer, MetadataElement, MetadataItem, SchemaElement};
use crate::qualified_name;
use crate::repository::{EntityProperties, EntityType, MetadataRepository, RelationshipType};
use crate::report::{BuildReport, EdgeOutcome, EdgeRecord, SkipReason};
use crate::resolver::IdentifierResolver;

/// Property recording an element's declared type
pub const TYPE_PROPERTY: &str = "type";

/// Property holding the delimited source id list
pub const SOURCE_ID_PROPERTY: &str = "sourceId";

/// Property recording the capability source tag on assets
pub const SOURCE_PROPERTY: &str = "source";

/// Knobs for one builder
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// User id passed to every repository call
    pub user: String,
    /// Page size for prefix searches during resolution
    pub page_size: usize,
    /// Abort on auxiliary edge failures instead of recording them
    pub strict_links: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            user: "analytics-sync".to_string(),
            page_size: 100,
            strict_links: false,
        }
    }
}

/// Assign positions 1..N in list order unless every element already has a
/// non-zero position. Partial positions are discarded, never merged.
pub fn verify_order<E: SchemaElement>(elements: &mut [E]) {
    if elements.iter().all(|e| e.element_position() != 0) {
        return;
    }
    for (index, element) in elements.iter_mut().enumerate() {
        element.set_element_position(index as u32 + 1);
    }
}

/// Where a new attribute hangs
#[derive(Debug, Clone, Copy)]
enum Parent<'p> {
    /// Top-level element, attached to the asset's schema type
    SchemaType { guid: &'p str, qualified_name: &'p str },
    /// Nested inside another container or item
    Attribute { guid: &'p str, qualified_name: &'p str },
}

impl<'p> Parent<'p> {
    fn qualified_name(&self) -> &'p str {
        match *self {
            Parent::SchemaType { qualified_name, .. } | Parent::Attribute { qualified_name, .. } => {
                qualified_name
            }
        }
    }
}

/// Which tree of the asset to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetTree {
    Data,
    Visualization,
}

/// Mutable state threaded through one build
struct BuildState<'r> {
    resolver: &'r mut IdentifierResolver,
    anchor_guid: String,
    entities_created: usize,
    edges: Vec<EdgeRecord>,
}

pub struct GraphBuilder<'a, R: MetadataRepository> {
    repository: &'a mut R,
    capability: &'a CapabilityContext,
    options: BuildOptions,
}

impl<'a, R: MetadataRepository> GraphBuilder<'a, R> {
    pub fn new(repository: &'a mut R, capability: &'a CapabilityContext, options: BuildOptions) -> Self {
        Self {
            repository,
            capability,
            options,
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Publish a data asset (containers and items) as an information view
    pub fn create_asset(
        &mut self,
        session: &mut PublishSession,
        asset: &mut AnalyticsAsset,
    ) -> Result<BuildReport> {
        self.publish(session, asset, EntityType::InformationView, AssetTree::Data)
    }

    /// Publish a report's visualization tree as a deployed report, reusing the
    /// session's resolver when it was built for the same asset
    pub fn create_visualization_asset(
        &mut self,
        session: &mut PublishSession,
        report: &mut AnalyticsAsset,
    ) -> Result<BuildReport> {
        self.publish(session, report, EntityType::DeployedReport, AssetTree::Visualization)
    }

    fn publish(
        &mut self,
        session: &mut PublishSession,
        asset: &mut AnalyticsAsset,
        entity_type: EntityType,
        tree: AssetTree,
    ) -> Result<BuildReport> {
        asset.validate()?;

        let mut resolver = match session.take_resolver_for(&asset.uid) {
            Some(resolver) => {
                debug!(uid = %asset.uid, "reusing session resolver");
                resolver.apply_references(&mut asset.reference);
                resolver
            }
            None => IdentifierResolver::new(
                &*self.repository,
                self.capability,
                &self.options.user,
                self.options.page_size,
                asset,
            ),
        };

        let result = self.build(&mut resolver, asset, entity_type, tree);
        session.store(resolver);
        result
    }

    fn build(
        &mut self,
        resolver: &mut IdentifierResolver,
        asset: &mut AnalyticsAsset,
        entity_type: EntityType,
        tree: AssetTree,
    ) -> Result<BuildReport> {
        let started_at = Utc::now();
        let asset_qn = self.capability.asset_qualified_name(entity_type, &asset.uid);
        info!(qualified_name = %asset_qn, "publishing asset");

        let mut properties = EntityProperties::new()
            .display_name(asset.display_name.as_deref().or(Some(asset.uid.as_str())))
            .description(asset.description.as_deref())
            .additional(SOURCE_PROPERTY, self.capability.source.as_str());
        if let Some(asset_type) = &asset.asset_type {
            properties = properties.additional(TYPE_PROPERTY, asset_type.as_str());
        }
        let asset_guid = self.repository.create_entity(
            &self.options.user,
            entity_type,
            &asset_qn,
            properties,
            None,
        )?;
        debug!(guid = %asset_guid, "created asset");

        self.repository.create_relationship(
            &self.options.user,
            RelationshipType::ServerAssetUse,
            &self.capability.guid,
            &asset_guid,
        )?;

        let mut state = BuildState {
            resolver,
            anchor_guid: asset_guid.clone(),
            entities_created: 1,
            edges: Vec::new(),
        };

        for reference in &asset.reference {
            match &reference.guid {
                Some(target) => {
                    self.link(&mut state, RelationshipType::DataContentForDataSet, &asset_guid, target)?;
                }
                None => {
                    warn!(alias = %reference.alias, uid = %reference.uid, "unresolved referenced base module");
                    state.edges.push(EdgeRecord {
                        relationship_type: RelationshipType::DataContentForDataSet,
                        source_guid: asset_guid.clone(),
                        target_guid: None,
                        outcome: EdgeOutcome::Skipped(SkipReason::UnresolvedReference {
                            alias: reference.alias.clone(),
                            uid: reference.uid.clone(),
                        }),
                    });
                }
            }
        }

        let schema_type_qn =
            qualified_name::build(Some(&asset_qn), EntityType::ComplexSchemaType, &asset.uid);
        let schema_type_guid = self.repository.create_entity(
            &self.options.user,
            EntityType::ComplexSchemaType,
            &schema_type_qn,
            EntityProperties::new().display_name(Some(asset.uid.as_str())),
            Some(&asset_guid),
        )?;
        state.entities_created += 1;
        self.repository.create_relationship(
            &self.options.user,
            RelationshipType::AssetSchemaType,
            &asset_guid,
            &schema_type_guid,
        )?;

        let parent = Parent::SchemaType {
            guid: &schema_type_guid,
            qualified_name: &asset_qn,
        };
        match tree {
            AssetTree::Data => {
                if !asset.container.is_empty() {
                    verify_order(&mut asset.container);
                    for container in asset.container.iter_mut() {
                        self.create_container(&mut state, container, parent)?;
                    }
                }
                if !asset.item.is_empty() {
                    self.create_item_group(&mut state, &mut asset.item, parent)?;
                }
            }
            AssetTree::Visualization => {
                if !asset.visualization.is_empty() {
                    self.create_element_group(&mut state, &mut asset.visualization, parent)?;
                }
            }
        }

        let diagnostics = state.resolver.take_diagnostics();
        let report = BuildReport {
            asset_guid,
            qualified_name: asset_qn,
            entities_created: state.entities_created,
            edges: state.edges,
            diagnostics,
            started_at,
            finished_at: Utc::now(),
        };
        info!("{}", report.summary());
        Ok(report)
    }

    /// Create a container and everything beneath it
    fn create_container(
        &mut self,
        state: &mut BuildState<'_>,
        container: &mut MetadataContainer,
        parent: Parent<'_>,
    ) -> Result<String> {
        let qn = qualified_name::build(
            Some(parent.qualified_name()),
            EntityType::SchemaAttribute,
            &container.identifier,
        );
        let guid = self.create_attribute(state, &*container, parent, &qn)?;
        let this = Parent::Attribute {
            guid: &guid,
            qualified_name: &qn,
        };

        if !container.container.is_empty() {
            verify_order(&mut container.container);
            for nested in container.container.iter_mut() {
                self.create_container(state, nested, this)?;
            }
        }
        if !container.item.is_empty() {
            self.create_item_group(state, &mut container.item, this)?;
        }
        Ok(guid)
    }

    /// Create an item and its nested items, then bind its compound identifier
    fn create_item(
        &mut self,
        state: &mut BuildState<'_>,
        item: &mut MetadataItem,
        parent: Parent<'_>,
    ) -> Result<String> {
        let qn = qualified_name::build(
            Some(parent.qualified_name()),
            EntityType::SchemaAttribute,
            &item.identifier,
        );
        let guid = self.create_attribute(state, &*item, parent, &qn)?;

        if !item.item.is_empty() {
            let this = Parent::Attribute {
                guid: &guid,
                qualified_name: &qn,
            };
            self.create_item_group(state, &mut item.item, this)?;
        }

        let identifier = qualified_name::id_from_qualified_name(&qn, None);
        state.resolver.add_guid_for_identifier(&guid, &identifier);
        Ok(guid)
    }

    /// Create every item in a sibling group, then link each to its sources
    fn create_item_group(
        &mut self,
        state: &mut BuildState<'_>,
        items: &mut [MetadataItem],
        parent: Parent<'_>,
    ) -> Result<()> {
        verify_order(items);

        let mut created = Vec::with_capacity(items.len());
        for item in items.iter_mut() {
            created.push(self.create_item(state, item, parent)?);
        }
        for (item, guid) in items.iter().zip(&created) {
            self.create_links(state, item, guid)?;
        }
        Ok(())
    }

    /// Visualization siblings: containers and items share one scope
    fn create_element_group(
        &mut self,
        state: &mut BuildState<'_>,
        elements: &mut [MetadataElement],
        parent: Parent<'_>,
    ) -> Result<()> {
        verify_order(elements);

        let mut created = Vec::with_capacity(elements.len());
        for element in elements.iter_mut() {
            let guid = match element {
                MetadataElement::Container(container) => self.create_container(state, container, parent)?,
                MetadataElement::Item(item) => self.create_item(state, item, parent)?,
            };
            created.push(guid);
        }
        for (element, guid) in elements.iter().zip(&created) {
            if let MetadataElement::Item(item) = element {
                self.create_links(state, item, guid)?;
            }
        }
        Ok(())
    }

    /// Create the schema attribute entity and attach it to its parent
    fn create_attribute<E: SchemaElement + ?Sized>(
        &mut self,
        state: &mut BuildState<'_>,
        element: &E,
        parent: Parent<'_>,
        qualified_name: &str,
    ) -> Result<String> {
        let properties = attribute_properties(element, qualified_name);
        let guid = self.repository.create_entity(
            &self.options.user,
            EntityType::SchemaAttribute,
            qualified_name,
            properties,
            Some(&state.anchor_guid),
        )?;
        state.entities_created += 1;
        debug!(%guid, qualified_name, "created schema attribute");

        match parent {
            Parent::SchemaType { guid: schema_type_guid, .. } => {
                self.repository.create_relationship(
                    &self.options.user,
                    RelationshipType::AttributeForSchema,
                    schema_type_guid,
                    &guid,
                )?;
            }
            Parent::Attribute { guid: parent_guid, .. } => {
                self.repository.create_relationship(
                    &self.options.user,
                    RelationshipType::NestedSchemaAttribute,
                    parent_guid,
                    &guid,
                )?;
            }
        }
        Ok(guid)
    }

    /// Metadata links from an item to each of its declared sources
    fn create_links(&mut self, state: &mut BuildState<'_>, item: &MetadataItem, guid: &str) -> Result<()> {
        for source in state.resolver.resolve_sources(item) {
            match source.guid {
                Some(target) => {
                    self.link(state, RelationshipType::SchemaQueryImplementation, guid, &target)?;
                }
                None => {
                    let suggestion = state.resolver.suggest(&source.source).map(String::from);
                    warn!(item = %item.identifier, source = %source.source, "unresolved source identifier");
                    state.edges.push(EdgeRecord {
                        relationship_type: RelationshipType::SchemaQueryImplementation,
                        source_guid: guid.to_string(),
                        target_guid: None,
                        outcome: EdgeOutcome::Skipped(SkipReason::UnresolvedSource {
                            identifier: source.source,
                            suggestion,
                        }),
                    });
                }
            }
        }
        Ok(())
    }

    /// Create an auxiliary edge, recording rather than propagating repository
    /// failures unless the builder is strict
    fn link(
        &mut self,
        state: &mut BuildState<'_>,
        relationship_type: RelationshipType,
        source_guid: &str,
        target_guid: &str,
    ) -> Result<()> {
        let outcome = match self.repository.create_relationship(
            &self.options.user,
            relationship_type,
            source_guid,
            target_guid,
        ) {
            Ok(()) => {
                debug!(%relationship_type, source_guid, target_guid, "created edge");
                EdgeOutcome::Created
            }
            Err(e) if e.is_repository_failure() && !self.options.strict_links => {
                warn!(%relationship_type, source_guid, target_guid, error = %e, "edge not created");
                EdgeOutcome::Failed { error: e.to_string() }
            }
            Err(e) => return Err(e),
        };
        state.edges.push(EdgeRecord {
            relationship_type,
            source_guid: source_guid.to_string(),
            target_guid: Some(target_guid.to_string()),
            outcome,
        });
        Ok(())
    }
}

/// Properties shared by containers and items
fn attribute_properties<E: SchemaElement + ?Sized>(element: &E, qualified_name: &str) -> EntityProperties {
    let mut properties = EntityProperties::new()
        .display_name(element.display_name().or(Some(element.identifier())))
        .description(element.description());
    properties.position = Some(element.element_position());
    properties.embedded_type = Some(qualified_name.to_string());

    if let Some(element_type) = element.element_type() {
        properties = properties.additional(TYPE_PROPERTY, element_type);
    }
    if !element.source_ids().is_empty() {
        properties = properties.additional(
            SOURCE_ID_PROPERTY,
            qualified_name::join_source_ids(element.source_ids()),
        );
    }
    for (key, value) in element.payload() {
        properties = properties.additional(key, value);
    }
    properties
}
