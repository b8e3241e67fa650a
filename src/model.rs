//! Analytics asset model
//!
//! In-memory tree supplied by the caller: an asset owns containers and items
//! (or, for reports, a visualization tree of either), and may reference other
//! already-published assets under a local alias.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::qualified_name::{IDENTIFIER_SEPARATOR, SEGMENT_SEPARATOR};

/// Top-level analytics artifact being synchronized
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsAsset {
    /// Stable external identifier
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared asset type, e.g. "module" or "report"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container: Vec<MetadataContainer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<MetadataItem>,
    /// Report-like assets describe their layout here instead of container/item
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visualization: Vec<MetadataElement>,
    /// Other assets this one is computed from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<AssetReference>,
}

/// Pointer to another published asset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReference {
    pub uid: String,
    pub alias: String,
    /// Filled in once the referenced asset is found in the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

impl AssetReference {
    pub fn new(uid: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            alias: alias.into(),
            guid: None,
        }
    }
}

/// Grouping node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataContainer {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default)]
    pub element_position: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_guid: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container: Vec<MetadataContainer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<MetadataItem>,
}

impl MetadataContainer {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }
}

/// Element that participates in metadata links
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataItem {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default)]
    pub element_position: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_guid: Vec<String>,
    /// Calculation text for computed items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<MetadataItem>,
}

impl MetadataItem {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Builder-style helper for declaring symbolic sources
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_id = sources.into_iter().map(Into::into).collect();
        self
    }
}

/// Node of a visualization tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MetadataElement {
    Container(MetadataContainer),
    Item(MetadataItem),
}

/// Fields shared by containers and items
pub trait SchemaElement {
    fn identifier(&self) -> &str;
    fn element_type(&self) -> Option<&str>;
    fn display_name(&self) -> Option<&str>;
    fn description(&self) -> Option<&str>;
    fn source_ids(&self) -> &[String];
    fn source_guids(&self) -> &[String];
    fn element_position(&self) -> u32;
    fn set_element_position(&mut self, position: u32);

    /// Extra string properties stored alongside the common ones
    fn payload(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

macro_rules! impl_schema_element_common {
    () => {
        fn identifier(&self) -> &str {
            &self.identifier
        }
        fn element_type(&self) -> Option<&str> {
            self.element_type.as_deref()
        }
        fn display_name(&self) -> Option<&str> {
            self.display_name.as_deref()
        }
        fn description(&self) -> Option<&str> {
            self.description.as_deref()
        }
        fn source_ids(&self) -> &[String] {
            &self.source_id
        }
        fn source_guids(&self) -> &[String] {
            &self.source_guid
        }
        fn element_position(&self) -> u32 {
            self.element_position
        }
        fn set_element_position(&mut self, position: u32) {
            self.element_position = position;
        }
    };
}

impl SchemaElement for MetadataContainer {
    impl_schema_element_common!();
}

impl SchemaElement for MetadataItem {
    impl_schema_element_common!();

    fn payload(&self) -> Vec<(&'static str, String)> {
        let mut payload = Vec::new();
        if let Some(expression) = &self.expression {
            payload.push(("expression", expression.clone()));
        }
        if let Some(data_type) = &self.data_type {
            payload.push(("dataType", data_type.clone()));
        }
        payload
    }
}

impl MetadataElement {
    fn inner(&self) -> &dyn SchemaElement {
        match self {
            MetadataElement::Container(c) => c,
            MetadataElement::Item(i) => i,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SchemaElement {
        match self {
            MetadataElement::Container(c) => c,
            MetadataElement::Item(i) => i,
        }
    }
}

impl SchemaElement for MetadataElement {
    fn identifier(&self) -> &str {
        self.inner().identifier()
    }
    fn element_type(&self) -> Option<&str> {
        self.inner().element_type()
    }
    fn display_name(&self) -> Option<&str> {
        self.inner().display_name()
    }
    fn description(&self) -> Option<&str> {
        self.inner().description()
    }
    fn source_ids(&self) -> &[String] {
        self.inner().source_ids()
    }
    fn source_guids(&self) -> &[String] {
        self.inner().source_guids()
    }
    fn element_position(&self) -> u32 {
        self.inner().element_position()
    }
    fn set_element_position(&mut self, position: u32) {
        self.inner_mut().set_element_position(position)
    }
    fn payload(&self) -> Vec<(&'static str, String)> {
        self.inner().payload()
    }
}

impl AnalyticsAsset {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    /// Check the shape of the tree before anything is written
    pub fn validate(&self) -> Result<()> {
        if self.uid.trim().is_empty() {
            return Err(SyncError::invalid_parameter("uid", "asset uid must not be empty"));
        }
        if self.uid.contains(SEGMENT_SEPARATOR) {
            return Err(SyncError::invalid_parameter(
                "uid",
                format!("'{}' contains the reserved separator '{}'", self.uid, SEGMENT_SEPARATOR),
            ));
        }
        for reference in &self.reference {
            if reference.uid.trim().is_empty() {
                return Err(SyncError::invalid_parameter(
                    "reference.uid",
                    "referenced asset uid must not be empty",
                ));
            }
            if reference.alias.trim().is_empty() || reference.alias.contains('.') {
                return Err(SyncError::invalid_parameter(
                    "reference.alias",
                    format!("alias '{}' must be non-empty and contain no '.'", reference.alias),
                ));
            }
        }
        let top_level = self
            .container
            .iter()
            .map(|c| c.identifier.as_str())
            .chain(self.item.iter().map(|i| i.identifier.as_str()))
            .chain(self.visualization.iter().map(|e| e.identifier()));
        for identifier in top_level {
            if let Some(reference) = self.reference.iter().find(|r| r.alias == identifier) {
                return Err(SyncError::invalid_parameter(
                    "reference.alias",
                    format!("alias '{}' shadows a top-level identifier", reference.alias),
                ));
            }
        }

        validate_siblings(
            self.container
                .iter()
                .map(|c| c.identifier.as_str())
                .chain(self.item.iter().map(|i| i.identifier.as_str())),
        )?;
        for container in &self.container {
            validate_container(container)?;
        }
        for item in &self.item {
            validate_item(item)?;
        }

        validate_siblings(self.visualization.iter().map(|e| e.identifier()))?;
        for element in &self.visualization {
            match element {
                MetadataElement::Container(c) => validate_container(c)?,
                MetadataElement::Item(i) => validate_item(i)?,
            }
        }
        Ok(())
    }
}

fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        return Err(SyncError::invalid_parameter(
            "identifier",
            "container and item identifiers must not be empty",
        ));
    }
    if identifier.contains(SEGMENT_SEPARATOR) {
        return Err(SyncError::invalid_parameter(
            "identifier",
            format!("'{}' contains the reserved separator '{}'", identifier, SEGMENT_SEPARATOR),
        ));
    }
    if identifier.contains(IDENTIFIER_SEPARATOR) {
        return Err(SyncError::invalid_parameter(
            "identifier",
            format!("'{}' contains the compound separator '{}'", identifier, IDENTIFIER_SEPARATOR),
        ));
    }
    Ok(())
}

/// Identifiers must be unique among the children of one parent, since
/// compound identifiers and qualified names are built from them
fn validate_siblings<'a>(identifiers: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for identifier in identifiers {
        if !seen.insert(identifier) {
            return Err(SyncError::invalid_parameter(
                "identifier",
                format!("duplicate identifier '{}' in the same scope", identifier),
            ));
        }
    }
    Ok(())
}

fn validate_container(container: &MetadataContainer) -> Result<()> {
    validate_identifier(&container.identifier)?;
    validate_siblings(
        container
            .container
            .iter()
            .map(|c| c.identifier.as_str())
            .chain(container.item.iter().map(|i| i.identifier.as_str())),
    )?;
    for nested in &container.container {
        validate_container(nested)?;
    }
    for item in &container.item {
        validate_item(item)?;
    }
    Ok(())
}

fn validate_item(item: &MetadataItem) -> Result<()> {
    validate_identifier(&item.identifier)?;
    validate_siblings(item.item.iter().map(|i| i.identifier.as_str()))?;
    for nested in &item.item {
        validate_item(nested)?;
    }
    Ok(())
}
