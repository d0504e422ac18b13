//! Integrity report models.
//!
//! Every issue is scoped to one table and carries a human-readable
//! description. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// A table without a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyIssue {
    /// Table the issue belongs to.
    pub table_name: String,
    /// Human-readable summary of the problem.
    pub issue_description: String,
}

/// A column that accepts NULL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NullableColumnIssue {
    /// Table the issue belongs to.
    pub table_name: String,
    /// Column that accepts NULL.
    pub column_name: String,
    /// Human-readable summary of the problem.
    pub issue_description: String,
}

/// A column flagged unique that no index on its table covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueIndexIssue {
    /// Table the issue belongs to.
    pub table_name: String,
    /// Unique column with no covering index.
    pub column_name: String,
    /// Human-readable summary of the problem.
    pub issue_description: String,
}

/// A foreign key whose target is missing or unindexed.
///
/// For a missing target, `table_name` is the referencing table. For a missing
/// index, `table_name` is the referenced table, since that is where the index
/// belongs. `column_name` holds the relationship's constraint name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyIssue {
    /// Table the issue belongs to.
    pub table_name: String,
    /// Constraint name of the foreign key.
    pub column_name: String,
    /// Table the foreign key points at.
    pub related_table_name: String,
    /// Human-readable summary of the problem.
    pub issue_description: String,
}

/// An index whose columns are already covered by another index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedundantIndexIssue {
    /// Table the issue belongs to.
    pub table_name: String,
    /// The covered index.
    pub index_name: String,
    /// The index that covers it.
    pub redundant_with: String,
    /// Human-readable summary of the problem.
    pub issue_description: String,
}

/// The independent checks that make up one verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CheckKind {
    /// Tables without a primary key.
    #[serde(rename = "missingPrimaryKeys")]
    PrimaryKeys,
    /// Nullable columns.
    #[serde(rename = "nullableColumns")]
    NullableColumns,
    /// Unique columns without an index.
    #[serde(rename = "missingUniqueIndexes")]
    UniqueIndexes,
    /// Dangling or unindexed foreign keys.
    #[serde(rename = "foreignKeyIssues")]
    ForeignKeys,
    /// Indexes covered by another index.
    #[serde(rename = "redundantIndexes")]
    RedundantIndexes,
    /// Strongly connected components and cycles.
    #[serde(rename = "sccs")]
    StronglyConnectedComponents,
}

impl CheckKind {
    /// Every check, in report order.
    pub const ALL: [CheckKind; 6] = [
        CheckKind::PrimaryKeys,
        CheckKind::NullableColumns,
        CheckKind::UniqueIndexes,
        CheckKind::ForeignKeys,
        CheckKind::RedundantIndexes,
        CheckKind::StronglyConnectedComponents,
    ];

    /// Name of the report field this check fills.
    pub fn field_name(self) -> &'static str {
        match self {
            CheckKind::PrimaryKeys => "missingPrimaryKeys",
            CheckKind::NullableColumns => "nullableColumns",
            CheckKind::UniqueIndexes => "missingUniqueIndexes",
            CheckKind::ForeignKeys => "foreignKeyIssues",
            CheckKind::RedundantIndexes => "redundantIndexes",
            CheckKind::StronglyConnectedComponents => "sccs",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Marker for a check that faulted instead of finishing. Its report section
/// is left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteCheck {
    /// The check that did not finish.
    pub check: CheckKind,
    /// Panic message or join failure.
    pub reason: String,
}

/// Merged output of one verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaVerificationResults {
    /// Tables without a primary key.
    #[serde(default)]
    pub missing_primary_keys: Vec<PrimaryKeyIssue>,
    /// Nullable columns outside the auto-increment exemption.
    #[serde(default)]
    pub nullable_columns: Vec<NullableColumnIssue>,
    /// Unique columns no index covers.
    #[serde(default)]
    pub missing_unique_indexes: Vec<UniqueIndexIssue>,
    /// Dangling or unindexed foreign keys.
    #[serde(default)]
    pub foreign_key_issues: Vec<ForeignKeyIssue>,
    /// Indexes covered by another index on the same table.
    #[serde(default)]
    pub redundant_indexes: Vec<RedundantIndexIssue>,
    /// Every strongly connected component, singletons included.
    #[serde(default)]
    pub sccs: Vec<Vec<String>>,
    /// The components of `sccs` that are actual dependency cycles.
    #[serde(default)]
    pub circular_dependencies: Vec<Vec<String>>,
    /// Checks that faulted; omitted from the JSON when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incomplete_checks: Vec<IncompleteCheck>,
}

impl SchemaVerificationResults {
    /// Total number of reported problems, counting each cycle once.
    pub fn issue_count(&self) -> usize {
        self.missing_primary_keys.len()
            + self.nullable_columns.len()
            + self.missing_unique_indexes.len()
            + self.foreign_key_issues.len()
            + self.redundant_indexes.len()
            + self.circular_dependencies.len()
    }

    /// No issues and every check finished.
    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0 && self.incomplete_checks.is_empty()
    }

    /// Every check finished, whatever it found.
    pub fn is_complete(&self) -> bool {
        self.incomplete_checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_wire_names() {
        let report = SchemaVerificationResults {
            foreign_key_issues: vec![ForeignKeyIssue {
                table_name: "orders".to_string(),
                column_name: "orders_customer_fk".to_string(),
                related_table_name: "customers".to_string(),
                issue_description: "Missing index for foreign key".to_string(),
            }],
            redundant_indexes: vec![RedundantIndexIssue {
                table_name: "orders".to_string(),
                index_name: "idx_a".to_string(),
                redundant_with: "idx_ab".to_string(),
                issue_description: "Redundant index".to_string(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();

        for field in CheckKind::ALL.map(CheckKind::field_name) {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
        assert!(json.get("circularDependencies").is_some());
        assert!(json.get("incompleteChecks").is_none());
        assert_eq!(json["foreignKeyIssues"][0]["relatedTableName"], "customers");
        assert_eq!(json["redundantIndexes"][0]["redundantWith"], "idx_ab");
        assert_eq!(json["redundantIndexes"][0]["issueDescription"], "Redundant index");
    }

    #[test]
    fn test_check_kind_serializes_as_field_name() {
        for kind in CheckKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.field_name());
        }
    }

    #[test]
    fn test_empty_report_is_clean() {
        let report = SchemaVerificationResults::default();
        assert_eq!(report.issue_count(), 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_incomplete_report_is_not_clean() {
        let report = SchemaVerificationResults {
            incomplete_checks: vec![IncompleteCheck {
                check: CheckKind::RedundantIndexes,
                reason: "check panicked".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(report.issue_count(), 0);
        assert!(!report.is_clean());
        assert!(!report.is_complete());
    }
}
