use crate::types::{DependencyGraph, EntityId};
use serde::Serialize;
use std::collections::HashMap;

/// Node/arc description of a dependency graph for an external renderer.
///
/// Nodes follow entity insertion order; arcs point from producer to consumer
/// and follow entity order, then edge declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphDescription {
    pub nodes: Vec<String>,
    pub arcs: Vec<(usize, usize)>,
}

impl GraphDescription {
    /// Graphviz DOT text. Rendering it is left to the caller.
    #[must_use]
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("digraph {} {{\n", dot_quote(name)));
        for (idx, label) in self.nodes.iter().enumerate() {
            out.push_str(&format!("    {idx} [label={}];\n", dot_quote(label)));
        }
        for (from, to) in &self.arcs {
            out.push_str(&format!("    {from} -> {to};\n"));
        }
        out.push_str("}\n");
        out
    }
}

impl DependencyGraph {
    #[must_use]
    pub fn describe_graph(&self) -> GraphDescription {
        let mut positions: HashMap<EntityId, usize> = HashMap::with_capacity(self.len());
        let mut nodes = Vec::with_capacity(self.len());
        for (idx, (id, entity)) in self.entities().enumerate() {
            positions.insert(id, idx);
            nodes.push(entity.label());
        }

        let mut arcs = Vec::with_capacity(self.edge_count());
        for (id, entity) in self.entities() {
            for &edge in entity.out_edges() {
                let Some(edge) = self.edge(edge) else {
                    continue;
                };
                if let (Some(&from), Some(&to)) = (positions.get(&id), positions.get(&edge.to)) {
                    arcs.push((from, to));
                }
            }
        }

        GraphDescription { nodes, arcs }
    }
}

fn dot_quote(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
