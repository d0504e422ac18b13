//! Strongly connected components via Kosaraju's two-pass search.
//!
//! Both passes use an explicit stack, so a schema that is one long chain of
//! foreign keys costs heap, not call-stack depth.

use super::Graph;
use std::collections::HashMap;

/// Partitions the graph's tables into strongly connected components.
///
/// Every node lands in exactly one component, singletons included. The first
/// pass runs over nodes in node-list order and edges in insertion order; the
/// second pass pops the finish stack and walks the transposed edges. Output is
/// therefore deterministic for a given graph.
///
/// Edges whose source or target is not a node are skipped.
pub fn find_sccs(graph: &Graph) -> Vec<Vec<String>> {
    let node_count = graph.nodes.len();
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(node_count);
    for (position, node) in graph.nodes.iter().enumerate() {
        positions.entry(node.data.name.as_str()).or_insert(position);
    }

    let mut forward = vec![Vec::new(); node_count];
    let mut reverse = vec![Vec::new(); node_count];
    for edge in &graph.edges {
        let edge = &edge.data;
        match (
            positions.get(edge.source.as_str()),
            positions.get(edge.target.as_str()),
        ) {
            (Some(&source), Some(&target)) => {
                forward[source].push(target);
                reverse[target].push(source);
            }
            _ => tracing::debug!(
                "Skipping edge '{}' ({} -> {}): endpoint is not a table in this snapshot",
                edge.id,
                edge.source,
                edge.target
            ),
        }
    }

    let finish_order = post_order(&forward);

    let mut assigned = vec![false; node_count];
    let mut components = Vec::new();
    let mut stack = Vec::new();
    for &start in finish_order.iter().rev() {
        if assigned[start] {
            continue;
        }
        assigned[start] = true;
        stack.push(start);

        let mut component = Vec::new();
        while let Some(node) = stack.pop() {
            component.push(graph.nodes[node].data.name.clone());
            for &next in reverse[node].iter().rev() {
                if !assigned[next] {
                    assigned[next] = true;
                    stack.push(next);
                }
            }
        }
        components.push(component);
    }

    components
}

/// Depth-first post-order over every node, roots taken in index order.
fn post_order(adjacency: &[Vec<usize>]) -> Vec<usize> {
    let mut visited = vec![false; adjacency.len()];
    let mut order = Vec::with_capacity(adjacency.len());
    // (node, index of the next outgoing edge to follow)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..adjacency.len() {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        stack.push((root, 0));

        while let Some(top) = stack.len().checked_sub(1) {
            let (node, cursor) = stack[top];
            match adjacency[node].get(cursor) {
                Some(&next) => {
                    stack[top].1 = cursor + 1;
                    if !visited[next] {
                        visited[next] = true;
                        stack.push((next, 0));
                    }
                }
                None => {
                    order.push(node);
                    stack.pop();
                }
            }
        }
    }

    order
}

/// Keeps the components that are real dependency cycles: two or more tables,
/// or a single table with a foreign key to itself when `include_self_loops`
/// is set.
pub fn circular_dependencies(
    graph: &Graph,
    components: &[Vec<String>],
    include_self_loops: bool,
) -> Vec<Vec<String>> {
    components
        .iter()
        .filter(|component| match component.as_slice() {
            [] => false,
            [table] => {
                include_self_loops
                    && graph
                        .edges
                        .iter()
                        .any(|e| e.data.source == *table && e.data.target == *table)
            }
            _ => true,
        })
        .cloned()
        .collect()
}
