//! Property tests over generated schemas: graph shape, component partitioning
//! and verifier determinism.

use proptest::prelude::*;
use schemalens_core::{
    IntegrityVerifier, SchemaVerificationResults, Snapshot, TableMetadata, build_graph,
    find_sccs, models::Index,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Table names `t0..t{n}` with foreign keys to random targets; targets past
/// `n` are dangling.
fn schema_strategy() -> impl Strategy<Value = Vec<TableMetadata>> {
    (1usize..12).prop_flat_map(|n| {
        prop::collection::vec(
            (
                any::<bool>(),
                prop::collection::vec(0..n + 3, 0..4),
                prop::collection::vec(prop::collection::vec(0usize..3, 0..3), 0..3),
            ),
            n,
        )
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (has_pk, targets, indexes))| {
                    let mut table = TableMetadata::new(format!("t{}", i));
                    if has_pk {
                        table = table.with_primary_key(["id"]);
                    }
                    for (k, target) in targets.into_iter().enumerate() {
                        table = table.with_relationship(format!("fk_{}_{}", i, k), format!("t{}", target));
                    }
                    for (k, columns) in indexes.into_iter().enumerate() {
                        table = table.with_index(Index::new(
                            format!("t{}_idx{}", i, k),
                            columns.into_iter().map(|c| format!("c{}", c)),
                        ));
                    }
                    table
                })
                .collect()
        })
    })
}

/// Order-free fingerprint of a report.
fn fingerprint(report: &SchemaVerificationResults) -> BTreeSet<String> {
    let value = serde_json::to_value(report).unwrap();
    let mut out = BTreeSet::new();
    if let serde_json::Value::Object(fields) = value {
        for (field, entries) in fields {
            if let serde_json::Value::Array(entries) = entries {
                for entry in entries {
                    let entry = match entry {
                        // component membership, not member order
                        serde_json::Value::Array(members) => {
                            let set: BTreeSet<String> =
                                members.iter().map(|m| m.to_string()).collect();
                            format!("{:?}", set)
                        }
                        other => other.to_string(),
                    };
                    out.insert(format!("{}:{}", field, entry));
                }
            }
        }
    }
    out
}

proptest! {
    #[test]
    fn prop_edges_match_relationships(tables in schema_strategy()) {
        let graph = build_graph(&tables);
        let relationships: usize = tables.iter().map(|t| t.relationships.len()).sum();

        prop_assert_eq!(graph.node_count(), tables.len());
        prop_assert_eq!(graph.edge_count(), relationships);
        prop_assert_eq!(&graph.transpose().transpose(), &graph);
    }

    #[test]
    fn prop_components_partition_nodes(tables in schema_strategy()) {
        let graph = build_graph(&tables);
        let components = find_sccs(&graph);

        let mut seen = HashSet::new();
        for member in components.iter().flatten() {
            prop_assert!(seen.insert(member.clone()), "{} in two components", member);
        }
        let names: HashSet<String> = tables.iter().map(|t| t.name.clone()).collect();
        prop_assert_eq!(seen, names);
    }

    #[test]
    fn prop_verifier_is_deterministic(tables in schema_strategy()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let snapshot = Arc::new(Snapshot::new(1, None, tables));
        let verifier = IntegrityVerifier::default();

        let first = runtime.block_on(verifier.verify(Arc::clone(&snapshot))).unwrap();
        for _ in 0..3 {
            let again = runtime.block_on(verifier.verify(Arc::clone(&snapshot))).unwrap();
            prop_assert_eq!(fingerprint(&again), fingerprint(&first));
        }
        prop_assert!(first.is_complete());

        let missing: BTreeSet<&str> = first
            .missing_primary_keys
            .iter()
            .map(|i| i.table_name.as_str())
            .collect();
        let expected: BTreeSet<&str> = snapshot
            .tables
            .iter()
            .filter(|t| t.primary_key.is_empty())
            .map(|t| t.name.as_str())
            .collect();
        prop_assert_eq!(missing, expected);
    }
}
