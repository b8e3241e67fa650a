//! Qualified names
//!
//! Every entity created by the builder gets a qualified name of the form
//! `<parent>::(<TypeName>)=<local-name>`. The compound identifier of a
//! container or item is recovered from its qualified name by joining the
//! local names of all schema attribute segments with `.`; cross-asset
//! resolution depends on this being the exact inverse of [`build`].

use crate::repository::EntityType;

/// Separator between qualified name segments
pub const SEGMENT_SEPARATOR: &str = "::";

/// Separator between the identifiers of a compound identifier
pub const IDENTIFIER_SEPARATOR: char = '.';

/// Delimiter used to store a source id list in a single property
pub const SOURCE_ID_DELIMITER: char = '\t';

/// Append a typed segment to a parent qualified name
pub fn build(parent: Option<&str>, entity_type: EntityType, local_name: &str) -> String {
    let segment = format!("({})={}", entity_type.type_name(), local_name);
    match parent {
        Some(parent) if !parent.is_empty() => {
            format!("{}{}{}", parent, SEGMENT_SEPARATOR, segment)
        }
        _ => segment,
    }
}

/// Prefix shared by every element created underneath `parent`
pub fn child_prefix(parent: &str) -> String {
    format!("{}{}", parent, SEGMENT_SEPARATOR)
}

/// Extract the compound identifier from a schema attribute qualified name,
/// prefixed with `alias` when one is given.
pub fn id_from_qualified_name(qualified_name: &str, alias: Option<&str>) -> String {
    let marker = format!("({})=", EntityType::SchemaAttribute.type_name());

    let mut parts: Vec<&str> = Vec::new();
    if let Some(alias) = alias.filter(|a| !a.is_empty()) {
        parts.push(alias);
    }
    parts.extend(
        qualified_name
            .split(SEGMENT_SEPARATOR)
            .filter_map(|segment| segment.strip_prefix(marker.as_str())),
    );

    parts.join(&IDENTIFIER_SEPARATOR.to_string())
}

/// Serialize declared source ids into one property value
pub fn join_source_ids(source_ids: &[String]) -> String {
    source_ids.join(&SOURCE_ID_DELIMITER.to_string())
}

/// Split a stored source id property back into its entries
pub fn split_source_ids(value: &str) -> Vec<String> {
    value
        .split(SOURCE_ID_DELIMITER)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_name(chain: &[&str]) -> String {
        let asset = build(Some("Server"), EntityType::InformationView, "a1");
        chain.iter().fold(asset, |parent, id| {
            build(Some(&parent), EntityType::SchemaAttribute, id)
        })
    }

    #[test]
    fn test_build_without_parent() {
        assert_eq!(build(None, EntityType::InformationView, "a1"), "(InformationView)=a1");
    }

    #[test]
    fn test_build_nested() {
        let qn = nested_name(&["orders", "amount"]);
        assert_eq!(
            qn,
            "Server::(InformationView)=a1::(SchemaAttribute)=orders::(SchemaAttribute)=amount"
        );
    }

    #[test]
    fn test_identifier_round_trip() {
        for chain in [&["x"][..], &["orders", "amount"][..], &["a", "b", "c", "d"][..]] {
            let qn = nested_name(chain);
            assert_eq!(id_from_qualified_name(&qn, None), chain.join("."));
        }
    }

    #[test]
    fn test_identifier_with_alias() {
        let qn = nested_name(&["orders", "amount"]);
        assert_eq!(id_from_qualified_name(&qn, Some("ref")), "ref.orders.amount");
        assert_eq!(id_from_qualified_name(&qn, Some("")), "orders.amount");
    }

    #[test]
    fn test_identifier_ignores_other_segments() {
        let qn = build(Some("Server"), EntityType::ComplexSchemaType, "a1");
        assert_eq!(id_from_qualified_name(&qn, None), "");
    }

    #[test]
    fn test_source_id_delimiter() {
        let ids = vec!["x".to_string(), "ref.y".to_string()];
        let joined = join_source_ids(&ids);
        assert_eq!(joined, "x\tref.y");
        assert_eq!(split_source_ids(&joined), ids);
        assert!(split_source_ids("").is_empty());
    }
}
