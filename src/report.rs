//! Build reports
//!
//! Collects the outcome of every auxiliary edge (asset references and
//! metadata links) plus the resolver's diagnostics, so a build that finishes
//! with missing edges says so instead of only logging it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::repository::RelationshipType;

// =============================================================================
// Diagnostics
// =============================================================================

/// Diagnostic code for resolver findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// No asset matches a reference's qualified name
    ReferenceNotFound,
    /// More than one asset shares a reference's qualified name
    DuplicateQualifiedName,
    /// Repository search failed while resolving a reference
    LookupFailed,
    /// Some identifiers under an alias matched no remote element
    UnboundSources,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReferenceNotFound => "W001",
            Self::DuplicateQualifiedName => "E001",
            Self::LookupFailed => "E002",
            Self::UnboundSources => "W002",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DuplicateQualifiedName | Self::LookupFailed => Severity::Error,
            Self::ReferenceNotFound | Self::UnboundSources => Severity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

// =============================================================================
// Edge outcomes
// =============================================================================

/// Why an edge was not attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Referenced asset was not found, or found more than once
    UnresolvedReference { alias: String, uid: String },
    /// Declared source identifier never received a GUID
    UnresolvedSource {
        identifier: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        suggestion: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EdgeOutcome {
    Created,
    Skipped(SkipReason),
    Failed { error: String },
}

/// One auxiliary edge the builder tried to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub relationship_type: RelationshipType,
    pub source_guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_guid: Option<String>,
    pub outcome: EdgeOutcome,
}

impl EdgeRecord {
    pub fn is_created(&self) -> bool {
        matches!(self.outcome, EdgeOutcome::Created)
    }
}

// =============================================================================
// Report
// =============================================================================

/// Result of publishing one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub asset_guid: String,
    pub qualified_name: String,
    pub entities_created: usize,
    pub edges: Vec<EdgeRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    /// Edges of one relationship type
    pub fn edges_of(&self, relationship_type: RelationshipType) -> impl Iterator<Item = &EdgeRecord> {
        self.edges
            .iter()
            .filter(move |e| e.relationship_type == relationship_type)
    }

    pub fn created(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges.iter().filter(|e| e.is_created())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges
            .iter()
            .filter(|e| matches!(e.outcome, EdgeOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges
            .iter()
            .filter(|e| matches!(e.outcome, EdgeOutcome::Failed { .. }))
    }

    /// True when every edge was created and the resolver reported nothing
    pub fn is_complete(&self) -> bool {
        self.edges.iter().all(EdgeRecord::is_created) && self.diagnostics.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} entities, {} edges created, {} skipped, {} failed, {} diagnostics",
            self.qualified_name,
            self.entities_created,
            self.created().count(),
            self.skipped().count(),
            self.failed().count(),
            self.diagnostics.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(outcome: EdgeOutcome) -> EdgeRecord {
        EdgeRecord {
            relationship_type: RelationshipType::SchemaQueryImplementation,
            source_guid: "s".into(),
            target_guid: Some("t".into()),
            outcome,
        }
    }

    #[test]
    fn test_report_counts() {
        let now = Utc::now();
        let report = BuildReport {
            asset_guid: "g".into(),
            qualified_name: "qn".into(),
            entities_created: 3,
            edges: vec![
                edge(EdgeOutcome::Created),
                edge(EdgeOutcome::Skipped(SkipReason::UnresolvedSource {
                    identifier: "x".into(),
                    suggestion: None,
                })),
                edge(EdgeOutcome::Failed { error: "boom".into() }),
            ],
            diagnostics: vec![],
            started_at: now,
            finished_at: now,
        };
        assert_eq!(report.created().count(), 1);
        assert_eq!(report.skipped().count(), 1);
        assert_eq!(report.failed().count(), 1);
        assert!(!report.is_complete());
        assert_eq!(
            report.summary(),
            "qn: 3 entities, 1 edges created, 1 skipped, 1 failed, 0 diagnostics"
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(EdgeOutcome::Skipped(SkipReason::UnresolvedReference {
            alias: "ref".into(),
            uid: "a1".into(),
        }))
        .unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "unresolved_reference");
        assert_eq!(json["alias"], "ref");
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(DiagnosticCode::DuplicateQualifiedName, "two assets named x");
        assert_eq!(d.to_string(), "[E001] two assets named x");
        assert_eq!(d.severity(), Severity::Error);
    }
}
