//! Analytics Sync
//!
//! Publishes analytics artifacts (information views and reports) into a
//! metadata repository as a graph of entities and relationships.
//!
//! ## Features
//!
//! - **Two-pass build**: sibling items are all created before any of their
//!   metadata links, so an item may be computed from a later sibling
//! - **Cross-asset references**: sources of the form `alias.chain` are bound
//!   to the schema attributes of an already-published asset
//! - **Observable edges**: every reference and metadata link is reported as
//!   created, skipped or failed
//!
//! ## Architecture
//!
//! ```text
//! AnalyticsAsset ──▶ GraphBuilder ──▶ MetadataRepository
//!                        │  ▲
//!                        ▼  │
//!                 IdentifierResolver
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod qualified_name;
pub mod report;
pub mod repository;
pub mod resolver;

pub use builder::{verify_order, BuildOptions, GraphBuilder};
pub use config::SyncConfig;
pub use context::{CapabilityContext, PublishSession};
pub use error::{Result, SyncError};
pub use model::{AnalyticsAsset, AssetReference, MetadataContainer, MetadataElement, MetadataItem, SchemaElement};
pub use report::{BuildReport, Diagnostic, DiagnosticCode, EdgeOutcome, EdgeRecord, SkipReason};
pub use repository::{EntityDetail, EntityType, InMemoryRepository, MetadataRepository, RelationshipType};
pub use resolver::IdentifierResolver;
