use crate::error::{GraphError, Result};
use crate::step::is_identifier;
use crate::types::{qualify, CodeEntity, DependencyGraph, Edge, EdgeId, EntityId, ParentScope};
use std::collections::{HashMap, HashSet};

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph from an initial batch of entities, in order.
    pub fn from_entities(entities: impl IntoIterator<Item = CodeEntity>) -> Result<Self> {
        let mut graph = Self::new();
        for entity in entities {
            graph.insert_entity(entity)?;
        }
        Ok(graph)
    }

    /// Insert an entity and attach it to its parent, if any.
    ///
    /// The qualifier name is recomputed from the parent stored in the graph.
    pub fn insert_entity(&mut self, mut entity: CodeEntity) -> Result<EntityId> {
        if !is_identifier(entity.name()) {
            return Err(GraphError::InvalidName(entity.name().to_string()));
        }
        let parent_name = match entity.parent() {
            Some(parent) => Some(self.node(parent)?.qualifier_name().to_string()),
            None => None,
        };
        let qualifier_name = qualify(parent_name.as_deref(), entity.name());
        if self.by_qualifier_name.contains_key(&qualifier_name) {
            return Err(GraphError::DuplicateQualifierName(qualifier_name));
        }
        entity.set_qualifier_name(qualifier_name.clone());

        let parent = entity.parent();
        let name = entity.name().to_string();
        let serial = self.next_serial;
        self.next_serial += 1;
        entity.set_serial(serial);
        let id = EntityId::new(self.graph.add_node(entity), serial);
        self.order.push(id);
        self.by_qualifier_name.insert(qualifier_name, id);

        if let Some(parent) = parent {
            self.node_mut(parent)?.attach_child(&name, id);
        }

        Ok(id)
    }

    /// Register a usage edge: `to` uses `from`.
    pub fn add_edge(
        &mut self,
        from: EntityId,
        to: EntityId,
        description: impl Into<String>,
    ) -> Result<EdgeId> {
        self.node(from)?;
        self.node(to)?;

        let edge = Edge {
            from,
            to,
            description: description.into(),
        };
        let id = EdgeId(self.graph.add_edge(from.index, to.index, edge));
        self.node_mut(from)?.push_out_edge(id);
        self.node_mut(to)?.push_in_edge(id);
        Ok(id)
    }

    /// Remove a usage edge from the graph and from both endpoints.
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.graph.remove_edge(id.0)?;
        for endpoint in [edge.from, edge.to] {
            if let Some(node) = self.entity_mut(endpoint) {
                node.forget_edge(id);
            }
        }
        Some(edge)
    }

    /// Remove an entity together with its sub-entities.
    ///
    /// Usage edges touching a removed entity are purged from both endpoints.
    /// Dependents stay in the graph; re-planning them is the caller's job.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<CodeEntity> {
        let parent = self.node(id)?.parent();
        if let Some(parent) = parent {
            if let Some(node) = self.entity_mut(parent) {
                node.detach_child(id);
            }
        }

        let subtree = self.subtree(id);
        let mut removed = None;
        for &member in subtree.iter().rev() {
            let edges: Vec<EdgeId> = {
                let node = self.node(member)?;
                node.in_edges()
                    .iter()
                    .chain(node.out_edges())
                    .copied()
                    .collect()
            };
            for edge in edges {
                self.remove_edge(edge);
            }

            let node = self
                .graph
                .remove_node(member.index)
                .ok_or(GraphError::EntityNotFound(member))?;
            self.by_qualifier_name.remove(node.qualifier_name());
            if member == id {
                removed = Some(node);
            }
        }

        let gone: HashSet<EntityId> = subtree.into_iter().collect();
        self.order.retain(|entity| !gone.contains(entity));

        log::debug!("Removed {} entities rooted at {id}", gone.len());
        removed.ok_or(GraphError::EntityNotFound(id))
    }

    /// Rename an entity, re-qualifying it and all of its sub-entities.
    pub fn rename_entity(&mut self, id: EntityId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(GraphError::InvalidName(name));
        }
        let (old_name, parent) = {
            let node = self.node(id)?;
            (node.name().to_string(), node.parent())
        };
        let parent_name = match parent {
            Some(parent) => Some(self.node(parent)?.qualifier_name().to_string()),
            None => None,
        };

        self.requalify_subtree(id, qualify(parent_name.as_deref(), &name))?;
        self.node_mut(id)?.set_name(name.clone());
        if let Some(parent) = parent {
            self.node_mut(parent)?.rename_child(&old_name, &name, id);
        }
        Ok(())
    }

    /// Move an entity (and its sub-entities) under a new parent, or to the top level.
    pub fn reparent_entity(&mut self, id: EntityId, parent: Option<EntityId>) -> Result<()> {
        let (name, old_parent) = {
            let node = self.node(id)?;
            (node.name().to_string(), node.parent())
        };
        if let Some(new_parent) = parent {
            self.node(new_parent)?;
        }
        if parent == old_parent {
            return Ok(());
        }

        let parent_name = match parent {
            Some(new_parent) => {
                if self.subtree(id).contains(&new_parent) {
                    return Err(GraphError::InvalidNesting {
                        entity: self.node(id)?.qualifier_name().to_string(),
                        parent: self.node(new_parent)?.qualifier_name().to_string(),
                    });
                }
                Some(self.node(new_parent)?.qualifier_name().to_string())
            }
            None => None,
        };

        self.requalify_subtree(id, qualify(parent_name.as_deref(), &name))?;

        if let Some(old_parent) = old_parent {
            self.node_mut(old_parent)?.detach_child(id);
        }
        if let Some(new_parent) = parent {
            self.node_mut(new_parent)?.attach_child(&name, id);
        }
        self.node_mut(id)?.set_parent(parent);
        Ok(())
    }

    /// Give the subtree rooted at `id` a new qualifier prefix.
    ///
    /// All collisions are checked before anything is changed.
    fn requalify_subtree(&mut self, id: EntityId, root_name: String) -> Result<()> {
        let subtree = self.subtree(id);
        let old_root = self.node(id)?.qualifier_name().to_string();

        let mut renames = Vec::with_capacity(subtree.len());
        for &member in &subtree {
            let old = self.node(member)?.qualifier_name().to_string();
            let new = format!("{root_name}{}", &old[old_root.len()..]);
            if let Some(&holder) = self.by_qualifier_name.get(&new) {
                if !subtree.contains(&holder) {
                    return Err(GraphError::DuplicateQualifierName(new));
                }
            }
            renames.push((member, old, new));
        }

        for (_, old, _) in &renames {
            self.by_qualifier_name.remove(old);
        }
        for (member, _, new) in renames {
            self.by_qualifier_name.insert(new.clone(), member);
            self.node_mut(member)?.set_qualifier_name(new);
        }
        Ok(())
    }

    /// Entity and all of its transitive sub-entities, parent first.
    fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.push(current);
            if let Some(node) = self.entity(current) {
                stack.extend(node.sub_entities().iter().rev().copied());
            }
        }
        result
    }

    pub(crate) fn node(&self, id: EntityId) -> Result<&CodeEntity> {
        self.entity(id).ok_or(GraphError::EntityNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: EntityId) -> Result<&mut CodeEntity> {
        self.entity_mut(id).ok_or(GraphError::EntityNotFound(id))
    }

    /// `None` for ids of removed entities, even if their slot was reused.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&CodeEntity> {
        self.graph
            .node_weight(id.index)
            .filter(|node| node.serial() == id.serial)
    }

    /// Mutable access for the free-form text payloads and kind.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut CodeEntity> {
        self.graph
            .node_weight_mut(id.index)
            .filter(|node| node.serial() == id.serial)
    }

    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.graph.edge_weight(id.0)
    }

    /// Find an entity by qualifier name
    #[must_use]
    pub fn find(&self, qualifier_name: &str) -> Option<EntityId> {
        self.by_qualifier_name.get(qualifier_name).copied()
    }

    #[must_use]
    pub fn get(&self, qualifier_name: &str) -> Option<&CodeEntity> {
        self.find(qualifier_name).and_then(|id| self.entity(id))
    }

    /// Scope handle for parsing entities nested in `id`.
    pub fn scope(&self, id: EntityId) -> Result<ParentScope<'_>> {
        Ok(ParentScope {
            id,
            qualifier_name: self.node(id)?.qualifier_name(),
        })
    }

    /// All entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &CodeEntity)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.entity(id).map(|node| (id, node)))
    }

    #[must_use]
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Top-level entities in insertion order.
    #[must_use]
    pub fn roots(&self) -> Vec<EntityId> {
        self.entities()
            .filter(|(_, node)| node.parent().is_none())
            .map(|(id, _)| id)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// (entities, edges)
    #[must_use]
    pub fn stats(&self) -> (usize, usize) {
        (self.len(), self.edge_count())
    }

    /// Entities that `id` uses, in declaration order.
    #[must_use]
    pub fn dependencies(&self, id: EntityId) -> Vec<EntityId> {
        self.entity(id)
            .map(|node| {
                node.in_edges()
                    .iter()
                    .filter_map(|&edge| self.edge(edge).map(|e| e.from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entities that use `id`, in declaration order.
    #[must_use]
    pub fn dependents(&self, id: EntityId) -> Vec<EntityId> {
        self.entity(id)
            .map(|node| {
                node.out_edges()
                    .iter()
                    .filter_map(|&edge| self.edge(edge).map(|e| e.to))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Order in which entities can be generated: every entity comes after
    /// the entities it uses.
    ///
    /// Kahn's algorithm over a read-cursor queue seeded in insertion order,
    /// so ties resolve deterministically by insertion order.
    pub fn topological_ids(&self) -> Result<Vec<EntityId>> {
        let mut in_degrees: HashMap<EntityId, usize> = HashMap::with_capacity(self.order.len());
        for (id, node) in self.entities() {
            in_degrees.insert(id, node.in_degree());
        }

        let mut queue: Vec<EntityId> = self
            .order
            .iter()
            .copied()
            .filter(|id| in_degrees.get(id) == Some(&0))
            .collect();
        let mut head = 0;

        while head < queue.len() {
            let from = queue[head];
            head += 1;
            for &edge in self.node(from)?.out_edges() {
                let Some(edge) = self.edge(edge) else {
                    continue;
                };
                if let Some(degree) = in_degrees.get_mut(&edge.to) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push(edge.to);
                    }
                }
            }
        }

        if queue.len() < self.order.len() {
            return Err(self.cycle_error(&queue));
        }
        Ok(queue)
    }

    /// Entities in generation order; see [`DependencyGraph::topological_ids`].
    pub fn topological_order(&self) -> Result<Vec<&CodeEntity>> {
        self.topological_ids()?
            .into_iter()
            .map(|id| self.node(id))
            .collect()
    }

    fn cycle_error(&self, ordered: &[EntityId]) -> GraphError {
        let ordered: HashSet<EntityId> = ordered.iter().copied().collect();
        let unresolved: Vec<EntityId> = self
            .order
            .iter()
            .copied()
            .filter(|id| !ordered.contains(id))
            .collect();

        // Every unresolved entity has an unresolved dependency, so walking
        // dependencies backwards from any of them must revisit an entity.
        let mut cycle = Vec::new();
        if let Some(&start) = unresolved.first() {
            let mut seen: HashMap<EntityId, usize> = HashMap::new();
            let mut path = Vec::new();
            let mut current = start;
            let cycle_start = loop {
                if let Some(&begin) = seen.get(&current) {
                    break Some(begin);
                }
                seen.insert(current, path.len());
                path.push(current);
                match self
                    .dependencies(current)
                    .into_iter()
                    .find(|dep| !ordered.contains(dep))
                {
                    Some(next) => current = next,
                    None => break None,
                }
            };
            if let Some(begin) = cycle_start {
                cycle = path[begin..].to_vec();
                cycle.push(path[begin]);
            }
        }

        let name_of = |id: &EntityId| {
            self.entity(*id)
                .map(|node| node.qualifier_name().to_string())
                .unwrap_or_else(|| id.to_string())
        };
        GraphError::CyclicDependency {
            unresolved: unresolved.iter().map(name_of).collect(),
            cycle: cycle.iter().map(name_of).collect(),
        }
    }
}
