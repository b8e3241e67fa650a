//! Identifier Resolution
//!
//! Bridges source identifiers as the caller wrote them (`"x"`,
//! `"orders.amount"`, `"ref.orders.amount"`) and GUIDs as the repository
//! assigned them. Same-asset identifiers are bound as the builder creates
//! items; identifiers under a reference alias are bound up front by matching
//! the referenced asset's schema attributes by qualified name.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::context::CapabilityContext;
use crate::model::{AnalyticsAsset, AssetReference, MetadataContainer, MetadataElement, MetadataItem, SchemaElement};
use crate::qualified_name::{self, IDENTIFIER_SEPARATOR};
use crate::repository::{prefix_pattern, EntityType, MetadataRepository, QUALIFIED_NAME};
use crate::report::{Diagnostic, DiagnosticCode};

/// A declared source and the GUID it resolved to, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTarget {
    /// Identifier or literal GUID as declared on the element
    pub source: String,
    pub guid: Option<String>,
}

#[derive(Debug)]
pub struct IdentifierResolver {
    asset_uid: String,
    required: bool,
    /// Every identifier some element declares as a source
    pending: HashSet<String>,
    bindings: HashMap<String, String>,
    /// alias -> (uid, guid) of resolved references
    references: HashMap<String, (String, String)>,
    diagnostics: Vec<Diagnostic>,
}

impl IdentifierResolver {
    /// Build a resolver for `asset`, resolving its references against the
    /// repository and recording their GUIDs on the asset.
    ///
    /// Repository failures are recorded as diagnostics; a reference that
    /// cannot be resolved only leaves its sources unbound.
    pub fn new<R: MetadataRepository + ?Sized>(
        repository: &R,
        capability: &CapabilityContext,
        user: &str,
        page_size: usize,
        asset: &mut AnalyticsAsset,
    ) -> Self {
        let mut resolver = Self::detached(&asset.uid);
        resolver.required = !asset.reference.is_empty();
        resolver.pending = collect_source_ids(asset);

        if !resolver.required {
            return resolver;
        }

        for reference in asset.reference.iter_mut() {
            resolver.resolve_reference(repository, capability, user, page_size, reference);
        }
        resolver
    }

    /// Resolver with nothing pending and no references
    pub fn detached(asset_uid: &str) -> Self {
        Self {
            asset_uid: asset_uid.to_string(),
            required: false,
            pending: HashSet::new(),
            bindings: HashMap::new(),
            references: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn asset_uid(&self) -> &str {
        &self.asset_uid
    }

    /// True when the asset references other assets
    pub fn required(&self) -> bool {
        self.required
    }

    /// Copy resolved reference GUIDs onto another copy of the same asset
    pub fn apply_references(&self, references: &mut [AssetReference]) {
        for reference in references {
            if let Some((uid, guid)) = self.references.get(&reference.alias) {
                if *uid == reference.uid {
                    reference.guid = Some(guid.clone());
                }
            }
        }
    }

    /// Bind `identifier` to `guid` if some element declared it as a source.
    /// Returns whether a new binding was made.
    pub fn add_guid_for_identifier(&mut self, guid: &str, identifier: &str) -> bool {
        if !self.pending.contains(identifier) || self.bindings.contains_key(identifier) {
            return false;
        }
        debug!(identifier, guid, "bound source identifier");
        self.bindings.insert(identifier.to_string(), guid.to_string());
        true
    }

    pub fn guid_for(&self, identifier: &str) -> Option<&str> {
        self.bindings.get(identifier).map(String::as_str)
    }

    /// Declared sources of `element` with their GUIDs: symbolic identifiers
    /// go through the binding table, literal GUIDs pass through unchanged.
    pub fn resolve_sources<E: SchemaElement + ?Sized>(&self, element: &E) -> Vec<SourceTarget> {
        let symbolic = element.source_ids().iter().map(|id| SourceTarget {
            source: id.clone(),
            guid: self.bindings.get(id).cloned(),
        });
        let literal = element.source_guids().iter().map(|guid| SourceTarget {
            source: guid.clone(),
            guid: Some(guid.clone()),
        });
        symbolic.chain(literal).collect()
    }

    /// GUIDs of the element's sources; `None` where an identifier is unbound
    pub fn item_guids<E: SchemaElement + ?Sized>(&self, element: &E) -> Vec<Option<String>> {
        self.resolve_sources(element).into_iter().map(|s| s.guid).collect()
    }

    /// Declared identifiers that never received a GUID
    pub fn unresolved(&self) -> Vec<&str> {
        let mut unresolved: Vec<&str> = self
            .pending
            .iter()
            .filter(|id| !self.bindings.contains_key(*id))
            .map(String::as_str)
            .collect();
        unresolved.sort_unstable();
        unresolved
    }

    /// Closest bound identifier to an unresolved one
    pub fn suggest(&self, identifier: &str) -> Option<&str> {
        let matcher = SkimMatcherV2::default();
        self.bindings
            .keys()
            .filter_map(|candidate| {
                matcher
                    .fuzzy_match(candidate, identifier)
                    .map(|score| (score, candidate))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, candidate)| candidate.as_str())
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn resolve_reference<R: MetadataRepository + ?Sized>(
        &mut self,
        repository: &R,
        capability: &CapabilityContext,
        user: &str,
        page_size: usize,
        reference: &mut AssetReference,
    ) {
        let qualified_name =
            capability.asset_qualified_name(EntityType::InformationView, &reference.uid);

        let matches = match repository.find_entities_by_exact_property(
            user,
            EntityType::InformationView,
            QUALIFIED_NAME,
            &qualified_name,
        ) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(alias = %reference.alias, error = %e, "reference lookup failed");
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticCode::LookupFailed,
                    format!("lookup of '{}' failed: {}", qualified_name, e),
                ));
                return;
            }
        };

        match matches.as_slice() {
            [] => {
                warn!(alias = %reference.alias, %qualified_name, "referenced asset not found");
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticCode::ReferenceNotFound,
                    format!("no asset named '{}' for alias '{}'", qualified_name, reference.alias),
                ));
            }
            [asset] => {
                reference.guid = Some(asset.guid.clone());
                self.references.insert(
                    reference.alias.clone(),
                    (reference.uid.clone(), asset.guid.clone()),
                );
                self.bind_remote_sources(repository, user, page_size, &reference.alias, &qualified_name);
            }
            duplicates => {
                warn!(alias = %reference.alias, %qualified_name, count = duplicates.len(), "duplicate qualified name");
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticCode::DuplicateQualifiedName,
                    format!("{} assets named '{}'", duplicates.len(), qualified_name),
                ));
            }
        }
    }

    /// Bind every pending `<alias>.` identifier to the remote schema
    /// attribute with the same compound identifier.
    fn bind_remote_sources<R: MetadataRepository + ?Sized>(
        &mut self,
        repository: &R,
        user: &str,
        page_size: usize,
        alias: &str,
        asset_qualified_name: &str,
    ) {
        let alias_prefix = format!("{}{}", alias, IDENTIFIER_SEPARATOR);
        let mut remaining = self
            .pending
            .iter()
            .filter(|id| id.starts_with(&alias_prefix) && !self.bindings.contains_key(*id))
            .count();
        if remaining == 0 {
            debug!(alias, "no sources declared under alias");
            return;
        }

        let pattern = prefix_pattern(&qualified_name::child_prefix(asset_qualified_name));
        let mut offset = 0;
        while remaining > 0 {
            let page = match repository.find_entities_by_prefix_pattern(
                user,
                EntityType::SchemaAttribute,
                QUALIFIED_NAME,
                &pattern,
                offset,
                page_size,
            ) {
                Ok(page) => page,
                Err(e) => {
                    warn!(alias, error = %e, "schema attribute search failed");
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticCode::LookupFailed,
                        format!("search under '{}' failed: {}", asset_qualified_name, e),
                    ));
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            offset += page.len();

            for entity in page {
                let identifier = qualified_name::id_from_qualified_name(&entity.qualified_name, Some(alias));
                if self.add_guid_for_identifier(&entity.guid, &identifier) {
                    remaining -= 1;
                    if remaining == 0 {
                        break;
                    }
                }
            }
        }

        if remaining > 0 {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticCode::UnboundSources,
                format!("{} source(s) under alias '{}' matched no element", remaining, alias),
            ));
        }
    }
}

/// Every source identifier declared anywhere in the asset's trees
fn collect_source_ids(asset: &AnalyticsAsset) -> HashSet<String> {
    let mut ids = HashSet::new();
    for container in &asset.container {
        collect_container(container, &mut ids);
    }
    for item in &asset.item {
        collect_item(item, &mut ids);
    }
    for element in &asset.visualization {
        match element {
            MetadataElement::Container(c) => collect_container(c, &mut ids),
            MetadataElement::Item(i) => collect_item(i, &mut ids),
        }
    }
    ids
}

fn collect_container(container: &MetadataContainer, ids: &mut HashSet<String>) {
    ids.extend(container.source_id.iter().cloned());
    for nested in &container.container {
        collect_container(nested, ids);
    }
    for item in &container.item {
        collect_item(item, ids);
    }
}

fn collect_item(item: &MetadataItem, ids: &mut HashSet<String>) {
    ids.extend(item.source_id.iter().cloned());
    for nested in &item.item {
        collect_item(nested, ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualified_name::build;
    use crate::repository::{EntityProperties, FailureKind, InMemoryRepository};

    const USER: &str = "tester";

    fn capability() -> CapabilityContext {
        CapabilityContext::new("Server", "cap-guid", "test")
    }

    /// Publish a bare remote asset with schema attributes for the given chains
    fn seed_remote(repo: &mut InMemoryRepository, uid: &str, chains: &[&[&str]]) -> (String, HashMap<String, String>) {
        let asset_qn = capability().asset_qualified_name(EntityType::InformationView, uid);
        let asset_guid = repo
            .create_entity(USER, EntityType::InformationView, &asset_qn, EntityProperties::new(), None)
            .unwrap();
        let mut guids = HashMap::new();
        for chain in chains {
            let qn = chain.iter().fold(asset_qn.clone(), |parent, id| {
                build(Some(&parent), EntityType::SchemaAttribute, id)
            });
            let guid = repo
                .create_entity(USER, EntityType::SchemaAttribute, &qn, EntityProperties::new(), Some(&asset_guid))
                .unwrap();
            guids.insert(chain.join("."), guid);
        }
        (asset_guid, guids)
    }

    fn asset_with_sources(sources: &[&str]) -> AnalyticsAsset {
        let mut asset = AnalyticsAsset::new("a2");
        asset.reference.push(AssetReference::new("a1", "ref"));
        asset.item.push(MetadataItem::new("z").with_sources(sources.iter().copied()));
        asset
    }

    #[test]
    fn test_not_required_without_references() {
        let repo = InMemoryRepository::new();
        let mut asset = AnalyticsAsset::new("a1");
        let mut item = MetadataItem::new("y");
        item.source_guid = vec!["g1".into(), "g2".into()];
        asset.item.push(item.clone());

        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        assert!(!resolver.required());
        assert_eq!(repo.search_calls(), 0);
        assert_eq!(
            resolver.item_guids(&item),
            vec![Some("g1".to_string()), Some("g2".to_string())]
        );
    }

    #[test]
    fn test_add_guid_only_for_declared_identifiers() {
        let repo = InMemoryRepository::new();
        let mut asset = AnalyticsAsset::new("a1");
        asset.item.push(MetadataItem::new("x"));
        asset.item.push(MetadataItem::new("y").with_sources(["x"]));

        let mut resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        assert!(!resolver.add_guid_for_identifier("g-y", "y"));
        assert!(resolver.add_guid_for_identifier("g-x", "x"));
        assert!(!resolver.add_guid_for_identifier("g-other", "x"));
        assert_eq!(resolver.guid_for("x"), Some("g-x"));
        assert_eq!(resolver.item_guids(&asset.item[1]), vec![Some("g-x".to_string())]);
    }

    #[test]
    fn test_unbound_identifier_yields_none() {
        let repo = InMemoryRepository::new();
        let mut asset = AnalyticsAsset::new("a1");
        asset.item.push(MetadataItem::new("y").with_sources(["missing"]));

        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        assert_eq!(resolver.item_guids(&asset.item[0]), vec![None]);
        assert_eq!(resolver.unresolved(), vec!["missing"]);
    }

    #[test]
    fn test_cross_asset_sources_bound() {
        let mut repo = InMemoryRepository::new();
        let (remote_guid, guids) = seed_remote(&mut repo, "a1", &[&["x"][..], &["orders"][..], &["orders", "amount"][..]]);
        let mut asset = asset_with_sources(&["ref.x", "ref.orders.amount"]);

        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 2, &mut asset);

        assert!(resolver.required());
        assert_eq!(asset.reference[0].guid.as_deref(), Some(remote_guid.as_str()));
        assert_eq!(resolver.guid_for("ref.x"), guids.get("x").map(String::as_str));
        assert_eq!(
            resolver.guid_for("ref.orders.amount"),
            guids.get("orders.amount").map(String::as_str)
        );
        assert!(resolver.diagnostics().is_empty());
    }

    #[test]
    fn test_reference_without_sources_skips_search() {
        let mut repo = InMemoryRepository::new();
        seed_remote(&mut repo, "a1", &[&["x"]]);
        let mut asset = asset_with_sources(&[]);

        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        assert!(asset.reference[0].guid.is_some());
        // only the exact-match lookup
        assert_eq!(repo.search_calls(), 1);
        assert!(resolver.diagnostics().is_empty());
    }

    #[test]
    fn test_missing_reference_left_unresolved() {
        let repo = InMemoryRepository::new();
        let mut asset = asset_with_sources(&["ref.x"]);

        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        assert!(asset.reference[0].guid.is_none());
        assert_eq!(resolver.guid_for("ref.x"), None);
        assert_eq!(resolver.diagnostics()[0].code, DiagnosticCode::ReferenceNotFound);
    }

    #[test]
    fn test_duplicate_reference_left_unresolved() {
        let mut repo = InMemoryRepository::new();
        seed_remote(&mut repo, "a1", &[&["x"]]);
        seed_remote(&mut repo, "a1", &[&["x"]]);
        let mut asset = asset_with_sources(&["ref.x"]);

        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        assert!(asset.reference[0].guid.is_none());
        assert_eq!(resolver.guid_for("ref.x"), None);
        assert_eq!(resolver.diagnostics()[0].code, DiagnosticCode::DuplicateQualifiedName);
    }

    #[test]
    fn test_search_failure_recorded() {
        let mut repo = InMemoryRepository::new();
        seed_remote(&mut repo, "a1", &[&["x"]]);
        repo.fail_searches(FailureKind::Server);
        let mut asset = asset_with_sources(&["ref.x"]);

        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        assert!(asset.reference[0].guid.is_none());
        assert_eq!(resolver.diagnostics()[0].code, DiagnosticCode::LookupFailed);
    }

    #[test]
    fn test_unmatched_remote_source_reported() {
        let mut repo = InMemoryRepository::new();
        seed_remote(&mut repo, "a1", &[&["x"]]);
        let mut asset = asset_with_sources(&["ref.x", "ref.nope"]);

        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        assert!(resolver.guid_for("ref.x").is_some());
        assert_eq!(resolver.unresolved(), vec!["ref.nope"]);
        assert_eq!(resolver.diagnostics()[0].code, DiagnosticCode::UnboundSources);
    }

    #[test]
    fn test_apply_references_matches_alias_and_uid() {
        let mut repo = InMemoryRepository::new();
        let (remote_guid, _) = seed_remote(&mut repo, "a1", &[]);
        let mut asset = asset_with_sources(&[]);
        let resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);

        let mut copies = vec![AssetReference::new("a1", "ref"), AssetReference::new("other", "ref")];
        resolver.apply_references(&mut copies);

        assert_eq!(copies[0].guid.as_deref(), Some(remote_guid.as_str()));
        assert!(copies[1].guid.is_none());
    }

    #[test]
    fn test_suggest_closest_binding() {
        let repo = InMemoryRepository::new();
        let mut asset = AnalyticsAsset::new("a1");
        asset.item.push(MetadataItem::new("y").with_sources(["orders.amount", "ordamt"]));
        let mut resolver = IdentifierResolver::new(&repo, &capability(), USER, 10, &mut asset);
        resolver.add_guid_for_identifier("g", "orders.amount");

        assert_eq!(resolver.suggest("ordamt"), Some("orders.amount"));
        assert_eq!(resolver.suggest("zzz"), None);
    }
}
