//! Publishing context
//!
//! [`CapabilityContext`] scopes every qualified name the builder produces;
//! [`PublishSession`] owns the identifier resolver across the calls that
//! publish one family of related assets (an asset and its visualization).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::qualified_name;
use crate::repository::{EntityProperties, EntityType, MetadataRepository, QUALIFIED_NAME};
use crate::resolver::IdentifierResolver;

/// Owning software server capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityContext {
    /// Namespace root for every qualified name
    pub qualified_name: String,
    pub guid: String,
    /// Tag recorded on assets created through this capability
    pub source: String,
}

impl CapabilityContext {
    pub fn new(
        qualified_name: impl Into<String>,
        guid: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            guid: guid.into(),
            source: source.into(),
        }
    }

    /// Find the capability entity by qualified name, creating it when absent
    pub fn register<R: MetadataRepository>(
        repository: &mut R,
        user: &str,
        qualified_name: &str,
        source: &str,
    ) -> Result<Self> {
        let existing = repository.find_entities_by_exact_property(
            user,
            EntityType::SoftwareServerCapability,
            QUALIFIED_NAME,
            qualified_name,
        )?;
        let guid = match existing.into_iter().next() {
            Some(entity) => entity.guid,
            None => repository.create_entity(
                user,
                EntityType::SoftwareServerCapability,
                qualified_name,
                EntityProperties::new()
                    .display_name(Some(qualified_name))
                    .additional("source", source),
                None,
            )?,
        };
        Ok(Self::new(qualified_name, guid, source))
    }

    /// Qualified name of an asset published under this capability
    pub fn asset_qualified_name(&self, entity_type: EntityType, uid: &str) -> String {
        qualified_name::build(Some(&self.qualified_name), entity_type, uid)
    }
}

/// Resolution state for one publish operation
#[derive(Debug, Default)]
pub struct PublishSession {
    resolver: Option<IdentifierResolver>,
}

impl PublishSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver built for the asset with `uid`, if this session has one
    pub(crate) fn take_resolver_for(&mut self, uid: &str) -> Option<IdentifierResolver> {
        match self.resolver.take() {
            Some(resolver) if resolver.asset_uid() == uid => Some(resolver),
            other => {
                self.resolver = other;
                None
            }
        }
    }

    pub(crate) fn store(&mut self, resolver: IdentifierResolver) {
        self.resolver = Some(resolver);
    }

    pub fn resolver(&self) -> Option<&IdentifierResolver> {
        self.resolver.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    #[test]
    fn test_asset_qualified_name() {
        let ctx = CapabilityContext::new("Server", "guid", "src");
        assert_eq!(
            ctx.asset_qualified_name(EntityType::DeployedReport, "r1"),
            "Server::(DeployedReport)=r1"
        );
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut repo = InMemoryRepository::new();
        let first = CapabilityContext::register(&mut repo, "u", "Server", "src").unwrap();
        let second = CapabilityContext::register(&mut repo, "u", "Server", "src").unwrap();
        assert_eq!(first.guid, second.guid);
        assert_eq!(repo.entity_count(), 1);
    }

    #[test]
    fn test_session_keeps_resolver_for_other_asset() {
        let mut session = PublishSession::new();
        session.store(IdentifierResolver::detached("a1"));

        assert!(session.take_resolver_for("a2").is_none());
        assert!(session.resolver().is_some());
        assert!(session.take_resolver_for("a1").is_some());
        assert!(session.resolver().is_none());
    }
}
