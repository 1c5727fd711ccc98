use crate::error::{GraphError, Result};
use crate::source::{load_plan_steps, load_usage_edges};
use crate::step::parse_steps;
use crate::types::{qualify, DependencyGraph, EntityId, ParentScope};
use crate::usage::UsageEdges;
use std::collections::HashMap;
use std::path::Path;

/// Edge endpoint resolved before the graph is touched
#[derive(Debug, Clone, Copy)]
enum Endpoint {
    /// Index into the batch being added
    New(usize),
    Existing(EntityId),
}

/// Build or extend a dependency graph from one planning pass.
///
/// A pass is a step list plus a usage-edge declaration. Nested passes run
/// under a parent entity: their entities become the parent's sub-entities,
/// and every name in the declaration is resolved relative to the parent's
/// qualifier name.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder {
    parent: Option<EntityId>,
}

impl GraphBuilder {
    /// Builder for a top-level pass
    #[must_use]
    pub const fn new() -> Self {
        Self { parent: None }
    }

    /// Builder for a pass nested in `parent`
    #[must_use]
    pub const fn under(parent: EntityId) -> Self {
        Self {
            parent: Some(parent),
        }
    }

    #[must_use]
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Build a fresh graph
    pub fn build<S: AsRef<str>>(&self, steps: &[S], usage: &UsageEdges) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        self.extend(&mut graph, steps, usage)?;
        Ok(graph)
    }

    /// Fold one pass into an existing graph, returning the new entity ids.
    ///
    /// Every step is parsed and every name is resolved before the graph is
    /// modified, so on error `graph` is left unchanged.
    pub fn extend<S: AsRef<str>>(
        &self,
        graph: &mut DependencyGraph,
        steps: &[S],
        usage: &UsageEdges,
    ) -> Result<Vec<EntityId>> {
        let parent_name = match self.parent {
            Some(parent) => Some(
                graph
                    .entity(parent)
                    .ok_or(GraphError::EntityNotFound(parent))?
                    .qualifier_name()
                    .to_string(),
            ),
            None => None,
        };
        let scope = self.parent.zip(parent_name.as_deref()).map(|(id, name)| ParentScope {
            id,
            qualifier_name: name,
        });

        let entities = parse_steps(steps, scope)?;

        // Merge qualifier names of the batch with the existing index.
        let mut batch_index: HashMap<String, usize> = HashMap::with_capacity(entities.len());
        for (idx, entity) in entities.iter().enumerate() {
            let name = entity.qualifier_name().to_string();
            if graph.find(&name).is_some() || batch_index.contains_key(&name) {
                return Err(GraphError::DuplicateQualifierName(name));
            }
            batch_index.insert(name, idx);
        }

        let resolve = |suffix: &str| -> Result<Endpoint> {
            let name = qualify(parent_name.as_deref(), suffix);
            if let Some(&idx) = batch_index.get(&name) {
                return Ok(Endpoint::New(idx));
            }
            graph
                .find(&name)
                .map(Endpoint::Existing)
                .ok_or(GraphError::UnknownEntity(name))
        };

        let mut planned_edges = Vec::with_capacity(usage.usage_count());
        for consumer in usage.consumers() {
            let to = resolve(&consumer.consumer)?;
            for descriptor in &consumer.usages {
                let from = resolve(&descriptor.producer)?;
                planned_edges.push((from, to, descriptor.explanation.as_str()));
            }
        }

        // Checks passed: apply.
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            ids.push(graph.insert_entity(entity)?);
        }
        let lookup = |endpoint: Endpoint| match endpoint {
            Endpoint::New(idx) => ids[idx],
            Endpoint::Existing(id) => id,
        };
        let linked = planned_edges.len();
        for (from, to, explanation) in planned_edges {
            let (from, to) = (lookup(from), lookup(to));
            graph.add_edge(from, to, explanation)?;
            log::debug!("Linked {from} -> {to}: {explanation}");
        }

        log::info!(
            "Extended dependency graph: {} new entities, {} new edges ({} entities, {} edges total)",
            ids.len(),
            linked,
            graph.len(),
            graph.edge_count()
        );

        Ok(ids)
    }

    /// Build a fresh graph from a YAML step list and a JSON usage declaration.
    pub fn build_from_files(
        &self,
        steps_path: impl AsRef<Path>,
        usage_path: impl AsRef<Path>,
    ) -> Result<DependencyGraph> {
        let steps = load_plan_steps(steps_path)?;
        let usage = load_usage_edges(usage_path)?;
        self.build(&steps, &usage)
    }

    /// Extend `graph` from a YAML step list and a JSON usage declaration.
    pub fn extend_from_files(
        &self,
        graph: &mut DependencyGraph,
        steps_path: impl AsRef<Path>,
        usage_path: impl AsRef<Path>,
    ) -> Result<Vec<EntityId>> {
        let steps = load_plan_steps(steps_path)?;
        let usage = load_usage_edges(usage_path)?;
        self.extend(graph, &steps, &usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityKind;

    const FOO: &str = "Step 1:Create a class called Foo.This class will be responsible for math.";
    const BAR: &str = "Step 2:Create a class called Bar.This class will be responsible for I/O.";

    #[test]
    fn build_links_consumer_to_producer() {
        let usage = UsageEdges::from_json_str(
            r#"{"Bar": [{"explanation": "uses Foo for math", "used_class": "Foo"}]}"#,
        )
        .unwrap();
        let graph = GraphBuilder::new().build(&[FOO, BAR], &usage).unwrap();

        let foo = graph.find("Foo").unwrap();
        let bar = graph.find("Bar").unwrap();
        assert_eq!(graph.dependencies(bar), vec![foo]);

        let edge_id = graph.entity(foo).unwrap().out_edges()[0];
        let edge = graph.edge(edge_id).unwrap();
        assert_eq!((edge.from, edge.to), (foo, bar));
        assert_eq!(edge.description, "uses Foo for math");
    }

    #[test]
    fn nested_pass_resolves_relative_to_parent() {
        let mut graph = GraphBuilder::new()
            .build(&[FOO], &UsageEdges::new())
            .unwrap();
        let foo = graph.find("Foo").unwrap();

        let steps = [
            "Step 1: Create a function called add. This function will be responsible for addition.",
            "Step 2: Create a function called sum. This function will be responsible for folding lists.",
        ];
        let usage = UsageEdges::from_json_str(
            r#"{"sum": [{"explanation": "adds pairwise", "used_function": "add"}]}"#,
        )
        .unwrap();
        let ids = GraphBuilder::under(foo).extend(&mut graph, &steps, &usage).unwrap();

        assert_eq!(ids.len(), 2);
        let parent = graph.entity(foo).unwrap();
        assert_eq!(parent.sub_entities(), ids.as_slice());
        assert_eq!(parent.sub_entity("add"), Some(ids[0]));
        assert_eq!(graph.find("Foo.add"), Some(ids[0]));
        assert_eq!(graph.entity(ids[1]).unwrap().kind, EntityKind::Function);
        assert_eq!(graph.dependencies(ids[1]), vec![ids[0]]);
    }

    #[test]
    fn unknown_producer_leaves_graph_untouched() {
        let mut graph = GraphBuilder::new()
            .build(&[FOO], &UsageEdges::new())
            .unwrap();

        let usage = UsageEdges::from_json_str(
            r#"{"Bar": [{"explanation": "needs a ghost", "used_class": "Ghost"}]}"#,
        )
        .unwrap();
        let err = GraphBuilder::new().extend(&mut graph, &[BAR], &usage).unwrap_err();

        assert!(matches!(err, GraphError::UnknownEntity(name) if name == "Ghost"));
        assert_eq!(graph.len(), 1);
        assert!(graph.find("Bar").is_none());
    }

    #[test]
    fn missing_parent_is_reported() {
        let mut graph = GraphBuilder::new()
            .build(&[FOO], &UsageEdges::new())
            .unwrap();
        let foo = graph.find("Foo").unwrap();
        graph.remove_entity(foo).unwrap();

        let err = GraphBuilder::under(foo)
            .extend(&mut graph, &[BAR], &UsageEdges::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::EntityNotFound(id) if id == foo));
    }
}
