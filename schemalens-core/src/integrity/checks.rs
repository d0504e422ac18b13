//! The individual integrity checks.
//!
//! Each check is a pure function over the snapshot's tables (or graph) and
//! returns its own issue list in table order.

use super::config::{RedundancyRule, VerifierConfig};
use super::models::{
    ForeignKeyIssue, NullableColumnIssue, PrimaryKeyIssue, RedundantIndexIssue, UniqueIndexIssue,
};
use crate::graph::{Graph, circular_dependencies, find_sccs};
use crate::models::{Index, TableMetadata};
use std::collections::HashMap;

/// Tables whose primary-key column set is empty.
pub fn check_primary_keys(tables: &[TableMetadata]) -> Vec<PrimaryKeyIssue> {
    tables
        .iter()
        .filter(|table| !table.has_primary_key())
        .map(|table| PrimaryKeyIssue {
            table_name: table.name.clone(),
            issue_description: "Missing primary key".to_string(),
        })
        .collect()
}

/// Nullable columns, except those declared with an auto-increment type.
pub fn check_nullable_columns(
    tables: &[TableMetadata],
    config: &VerifierConfig,
) -> Vec<NullableColumnIssue> {
    let mut issues = Vec::new();
    for table in tables {
        for column in &table.columns {
            if !column.not_null && !config.is_auto_increment(&column.data_type) {
                issues.push(NullableColumnIssue {
                    table_name: table.name.clone(),
                    column_name: column.name.clone(),
                    issue_description: "Column should be NOT NULL".to_string(),
                });
            }
        }
    }
    issues
}

/// Unique columns that appear in no index of their table.
pub fn check_unique_indexes(tables: &[TableMetadata]) -> Vec<UniqueIndexIssue> {
    let mut issues = Vec::new();
    for table in tables {
        for column in table.columns.iter().filter(|c| c.unique) {
            if !table.column_has_index(&column.name) {
                issues.push(UniqueIndexIssue {
                    table_name: table.name.clone(),
                    column_name: column.name.clone(),
                    issue_description: "Missing unique index".to_string(),
                });
            }
        }
    }
    issues
}

/// Foreign keys pointing at missing tables, or at tables with no index on
/// the key.
///
/// The referenced table is searched for an index covering the relationship's
/// constraint name. Engines that name foreign keys after their column (SQLite)
/// make this the referencing column.
pub fn check_foreign_keys(tables: &[TableMetadata]) -> Vec<ForeignKeyIssue> {
    let by_name: HashMap<&str, &TableMetadata> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut issues = Vec::new();
    for table in tables {
        for relationship in &table.relationships {
            match by_name.get(relationship.related_table.as_str()) {
                None => issues.push(ForeignKeyIssue {
                    table_name: table.name.clone(),
                    column_name: relationship.conname.clone(),
                    related_table_name: relationship.related_table.clone(),
                    issue_description: format!(
                        "Related table not found: {}",
                        relationship.related_table
                    ),
                }),
                Some(related) if !related.column_has_index(&relationship.conname) => {
                    issues.push(ForeignKeyIssue {
                        table_name: related.name.clone(),
                        column_name: relationship.conname.clone(),
                        related_table_name: relationship.related_table.clone(),
                        issue_description: "Missing index for foreign key".to_string(),
                    });
                }
                Some(_) => {}
            }
        }
    }
    issues
}

/// Index pairs on one table where the first is covered by the second.
///
/// An index with no columns is covered by every other index on its table
/// unless `skip_expression_indexes` is set. Two entries with the same name
/// are treated as one index.
pub fn check_redundant_indexes(
    tables: &[TableMetadata],
    config: &VerifierConfig,
) -> Vec<RedundantIndexIssue> {
    let mut issues = Vec::new();
    for table in tables {
        let indexes: Vec<&Index> = table
            .indexes
            .iter()
            .filter(|index| !(config.skip_expression_indexes && index.columns.is_empty()))
            .collect();

        for (i, index) in indexes.iter().enumerate() {
            for (j, other) in indexes.iter().enumerate() {
                if i == j || index.name == other.name {
                    continue;
                }
                if !is_covered_by(index, other, config.redundancy_rule) {
                    continue;
                }
                // equal column sets: keep only "later redundant with earlier"
                if config.dedupe_redundant_indexes
                    && i < j
                    && is_covered_by(other, index, config.redundancy_rule)
                {
                    continue;
                }
                issues.push(RedundantIndexIssue {
                    table_name: table.name.clone(),
                    index_name: index.name.clone(),
                    redundant_with: other.name.clone(),
                    issue_description: "Redundant index".to_string(),
                });
            }
        }
    }
    issues
}

fn is_covered_by(index: &Index, other: &Index, rule: RedundancyRule) -> bool {
    match rule {
        RedundancyRule::Subset => index.columns.iter().all(|c| other.covers(c)),
        RedundancyRule::LeadingPrefix => other.columns.starts_with(&index.columns),
    }
}

/// All strongly connected components plus the subset that are cycles.
pub fn check_components(
    graph: &Graph,
    config: &VerifierConfig,
) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    let components = find_sccs(graph);
    let cycles = circular_dependencies(graph, &components, config.report_self_references);
    (components, cycles)
}
