//! Foreign-key dependency graph.
//!
//! One node per table, one directed edge per foreign key (referencing table to
//! referenced table). The serialized form is the element list understood by
//! graph front ends: `{edges: [{data: {...}}], nodes: [{data: {...}}]}`.
//!
//! # Module Structure
//! - `scc`: strongly connected components (Kosaraju) over a [`Graph`]

use crate::models::{Column, Index, TableMetadata};
use serde::{Deserialize, Serialize};

pub mod scc;

pub use scc::{circular_dependencies, find_sccs};

/// Payload of a node element: a read-only projection of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    /// Position of the table in the snapshot, stringified.
    pub id: String,
    /// Table name; edges refer to nodes by this name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<Column>,
    /// Primary-key column names in key order.
    pub primary_key: Vec<String>,
    /// Indexes declared on the table.
    pub indexes: Vec<Index>,
}

/// One table in the serialized graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeElement {
    /// Node payload.
    pub data: NodeData,
}

/// Payload of an edge element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    /// Constraint name of the foreign key.
    pub id: String,
    /// Referencing table.
    pub source: String,
    /// Referenced table.
    pub target: String,
}

/// One foreign key in the serialized graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeElement {
    /// Edge payload.
    pub data: EdgeData,
}

/// Directed graph of one snapshot's tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    /// Foreign keys, grouped by referencing table in snapshot order.
    pub edges: Vec<EdgeElement>,
    /// Tables in snapshot order.
    pub nodes: Vec<NodeElement>,
}

impl Graph {
    /// Returns a graph with the same nodes and every edge reversed.
    /// Edge order is preserved.
    pub fn transpose(&self) -> Self {
        let edges = self
            .edges
            .iter()
            .map(|edge| EdgeElement {
                data: EdgeData {
                    id: edge.data.id.clone(),
                    source: edge.data.target.clone(),
                    target: edge.data.source.clone(),
                },
            })
            .collect();

        Self {
            edges,
            nodes: self.nodes.clone(),
        }
    }

    /// Number of tables.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of foreign keys.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges whose target is not a node of this graph.
    pub fn dangling_edges(&self) -> impl Iterator<Item = &EdgeData> {
        self.edges
            .iter()
            .map(|edge| &edge.data)
            .filter(|edge| !self.nodes.iter().any(|node| node.data.name == edge.target))
    }
}

/// Builds the dependency graph for a table list.
///
/// Node ids are assigned densely from 0 in list order. Edges are collected
/// across every table in list order, then relationship order within a table.
/// Edges pointing at tables missing from `tables` are kept; traversal code
/// skips them and the integrity checks report them.
pub fn build_graph(tables: &[TableMetadata]) -> Graph {
    let mut nodes = Vec::with_capacity(tables.len());
    let mut edges = Vec::new();

    for (position, table) in tables.iter().enumerate() {
        nodes.push(NodeElement {
            data: NodeData {
                id: position.to_string(),
                name: table.name.clone(),
                columns: table.columns.clone(),
                primary_key: table.primary_key.clone(),
                indexes: table.indexes.clone(),
            },
        });

        for relationship in &table.relationships {
            edges.push(EdgeElement {
                data: EdgeData {
                    id: relationship.conname.clone(),
                    source: table.name.clone(),
                    target: relationship.related_table.clone(),
                },
            });
        }
    }

    tracing::debug!(
        "Built dependency graph with {} nodes and {} edges",
        nodes.len(),
        edges.len()
    );

    Graph { edges, nodes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Index};
    use proptest::prelude::*;

    fn sample_tables() -> Vec<TableMetadata> {
        vec![
            TableMetadata::new("customers")
                .with_column(Column::new("id", "integer").with_not_null(true))
                .with_primary_key(["id"]),
            TableMetadata::new("orders")
                .with_column(Column::new("id", "integer").with_not_null(true))
                .with_column(Column::new("customer_id", "integer"))
                .with_primary_key(["id"])
                .with_index(Index::new("orders_customer_idx", ["customer_id"]))
                .with_relationship("orders_customer_fk", "customers"),
            TableMetadata::new("order_items")
                .with_relationship("items_order_fk", "orders")
                .with_relationship("items_product_fk", "products"),
        ]
    }

    #[test]
    fn test_node_ids_follow_table_order() {
        let graph = build_graph(&sample_tables());
        let ids: Vec<_> = graph.nodes.iter().map(|n| n.data.id.as_str()).collect();
        let names: Vec<_> = graph.nodes.iter().map(|n| n.data.name.as_str()).collect();

        assert_eq!(ids, ["0", "1", "2"]);
        assert_eq!(names, ["customers", "orders", "order_items"]);
        assert_eq!(graph.nodes[1].data.indexes[0].name, "orders_customer_idx");
    }

    #[test]
    fn test_edges_accumulate_across_all_tables() {
        let graph = build_graph(&sample_tables());

        assert_eq!(graph.edge_count(), 3);
        let ids: Vec<_> = graph.edges.iter().map(|e| e.data.id.as_str()).collect();
        assert_eq!(
            ids,
            ["orders_customer_fk", "items_order_fk", "items_product_fk"]
        );
        assert_eq!(graph.edges[0].data.source, "orders");
        assert_eq!(graph.edges[0].data.target, "customers");
    }

    #[test]
    fn test_dangling_edges_are_kept() {
        let graph = build_graph(&sample_tables());
        let dangling: Vec<_> = graph.dangling_edges().map(|e| e.target.as_str()).collect();
        assert_eq!(dangling, ["products"]);
    }

    #[test]
    fn test_empty_input_gives_empty_graph() {
        let graph = build_graph(&[]);
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(
            serde_json::to_string(&graph).unwrap(),
            r#"{"edges":[],"nodes":[]}"#
        );
    }

    #[test]
    fn test_graph_wire_shape() {
        let json = serde_json::to_value(build_graph(&sample_tables())).unwrap();

        assert_eq!(json["nodes"][0]["data"]["id"], "0");
        assert_eq!(json["nodes"][0]["data"]["name"], "customers");
        assert_eq!(json["nodes"][0]["data"]["columns"][0]["columnName"], "id");
        assert_eq!(json["nodes"][0]["data"]["primary_key"][0], "id");
        assert_eq!(json["edges"][0]["data"]["id"], "orders_customer_fk");
        assert_eq!(json["edges"][0]["data"]["source"], "orders");
        assert_eq!(json["edges"][0]["data"]["target"], "customers");
    }

    #[test]
    fn test_transpose_reverses_edges() {
        let graph = build_graph(&sample_tables());
        let transposed = graph.transpose();

        assert_eq!(transposed.nodes, graph.nodes);
        assert_eq!(transposed.edges[0].data.source, "customers");
        assert_eq!(transposed.edges[0].data.target, "orders");
    }

    fn arb_tables() -> impl Strategy<Value = Vec<TableMetadata>> {
        (1usize..12).prop_flat_map(|count| {
            prop::collection::vec(prop::collection::vec(0..count + 2, 0..4), count).prop_map(
                move |targets| {
                    targets
                        .into_iter()
                        .enumerate()
                        .map(|(i, refs)| {
                            refs.into_iter().enumerate().fold(
                                TableMetadata::new(format!("t{}", i)),
                                |table, (k, target)| {
                                    table.with_relationship(
                                        format!("t{}_fk{}", i, k),
                                        format!("t{}", target),
                                    )
                                },
                            )
                        })
                        .collect()
                },
            )
        })
    }

    proptest! {
        #[test]
        fn prop_build_graph_is_idempotent(tables in arb_tables()) {
            let first = build_graph(&tables);
            let second = build_graph(&tables);
            prop_assert_eq!(
                serde_json::to_vec(&first).unwrap(),
                serde_json::to_vec(&second).unwrap()
            );
        }

        #[test]
        fn prop_edge_count_matches_relationship_count(tables in arb_tables()) {
            let expected: usize = tables.iter().map(|t| t.relationships.len()).sum();
            prop_assert_eq!(build_graph(&tables).edge_count(), expected);
        }

        #[test]
        fn prop_transpose_is_an_involution(tables in arb_tables()) {
            let graph = build_graph(&tables);
            prop_assert_eq!(graph.transpose().transpose(), graph);
        }
    }
}
