use crate::error::GraphError;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Handle of an entity tracked by a [`DependencyGraph`].
///
/// Handles stay valid while other entities are added or removed. A handle
/// of a removed entity never resolves again, even after its arena slot is
/// reused: every insertion gets a fresh serial that the handle must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub(crate) index: NodeIndex,
    pub(crate) serial: u64,
}

impl EntityId {
    pub(crate) const fn new(index: NodeIndex, serial: u64) -> Self {
        Self { index, serial }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index.index())
    }
}

/// Handle of a usage edge tracked by a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(pub(crate) EdgeIndex);

/// Kind of planned code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Package,
    Class,
    Function,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Class => "class",
            Self::Function => "function",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "package" => Ok(Self::Package),
            "class" => Ok(Self::Class),
            "function" => Ok(Self::Function),
            _ => Err(GraphError::UnsupportedKind(s.to_string())),
        }
    }
}

/// Join a scope prefix and a local name into a qualifier name.
#[must_use]
pub fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}.{name}"),
        _ => name.to_string(),
    }
}

/// Enclosing scope of an entity that is being created.
#[derive(Debug, Clone, Copy)]
pub struct ParentScope<'a> {
    pub id: EntityId,
    pub qualifier_name: &'a str,
}

/// One planned unit of code (package, class or function).
///
/// `name`, `qualifier_name` and `parent` can only change through
/// [`DependencyGraph::rename_entity`] and [`DependencyGraph::reparent_entity`],
/// which keep qualifier names and the graph index consistent.
#[derive(Debug, Clone)]
pub struct CodeEntity {
    name: String,
    qualifier_name: String,
    pub kind: EntityKind,
    pub description: Option<String>,
    pub definition: Option<String>,
    pub body: Option<String>,
    serial: u64,
    parent: Option<EntityId>,
    sub_entities: Vec<EntityId>,
    sub_entity_index: HashMap<String, EntityId>,
    in_edges: Vec<EdgeId>,
    out_edges: Vec<EdgeId>,
}

impl CodeEntity {
    /// Create a top-level entity.
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        let name = name.into();
        Self {
            qualifier_name: name.clone(),
            name,
            kind,
            description: None,
            definition: None,
            body: None,
            serial: 0,
            parent: None,
            sub_entities: Vec::new(),
            sub_entity_index: HashMap::new(),
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        }
    }

    /// Create an entity nested in `parent`.
    ///
    /// The parent's child list is not touched until the entity is inserted
    /// into the graph.
    pub fn nested(name: impl Into<String>, kind: EntityKind, parent: ParentScope<'_>) -> Self {
        let mut entity = Self::new(name, kind);
        entity.qualifier_name = qualify(Some(parent.qualifier_name), &entity.name);
        entity.parent = Some(parent.id);
        entity
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn qualifier_name(&self) -> &str {
        &self.qualifier_name
    }

    #[must_use]
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    #[must_use]
    pub fn sub_entities(&self) -> &[EntityId] {
        &self.sub_entities
    }

    /// Look up a direct child by its local name.
    #[must_use]
    pub fn sub_entity(&self, name: &str) -> Option<EntityId> {
        self.sub_entity_index.get(name).copied()
    }

    #[must_use]
    pub fn in_edges(&self) -> &[EdgeId] {
        &self.in_edges
    }

    #[must_use]
    pub fn out_edges(&self) -> &[EdgeId] {
        &self.out_edges
    }

    #[must_use]
    pub fn in_degree(&self) -> usize {
        self.in_edges.len()
    }

    /// Display label used by graph exports.
    #[must_use]
    pub fn label(&self) -> String {
        self.definition
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.kind, self.qualifier_name))
    }

    pub(crate) const fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn set_serial(&mut self, serial: u64) {
        self.serial = serial;
    }

    pub(crate) fn set_qualifier_name(&mut self, qualifier_name: String) {
        self.qualifier_name = qualifier_name;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }

    pub(crate) fn attach_child(&mut self, name: &str, child: EntityId) {
        self.sub_entities.push(child);
        self.sub_entity_index.insert(name.to_string(), child);
    }

    pub(crate) fn detach_child(&mut self, child: EntityId) {
        self.sub_entities.retain(|&id| id != child);
        self.sub_entity_index.retain(|_, id| *id != child);
    }

    pub(crate) fn rename_child(&mut self, old_name: &str, new_name: &str, child: EntityId) {
        if self.sub_entity_index.get(old_name) == Some(&child) {
            self.sub_entity_index.remove(old_name);
        }
        self.sub_entity_index.insert(new_name.to_string(), child);
    }

    pub(crate) fn push_in_edge(&mut self, edge: EdgeId) {
        self.in_edges.push(edge);
    }

    pub(crate) fn push_out_edge(&mut self, edge: EdgeId) {
        self.out_edges.push(edge);
    }

    pub(crate) fn forget_edge(&mut self, edge: EdgeId) {
        self.in_edges.retain(|&e| e != edge);
        self.out_edges.retain(|&e| e != edge);
    }
}

/// Directed "uses" relationship: `to` (the consumer) uses `from` (the producer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: EntityId,
    pub to: EntityId,
    pub description: String,
}

/// Aggregate of all planned entities and their usage edges.
///
/// Entities live in a stable petgraph arena; insertion order is tracked
/// separately because it drives tie-breaking in the generation order and
/// display order in exports.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub(crate) graph: StableDiGraph<CodeEntity, Edge>,
    pub(crate) order: Vec<EntityId>,
    pub(crate) by_qualifier_name: HashMap<String, EntityId>,
    pub(crate) next_serial: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Class".parse::<EntityKind>().unwrap(), EntityKind::Class);
        assert_eq!("FUNCTION".parse::<EntityKind>().unwrap(), EntityKind::Function);
        assert_eq!("package".parse::<EntityKind>().unwrap(), EntityKind::Package);
        assert!(matches!(
            "module".parse::<EntityKind>(),
            Err(GraphError::UnsupportedKind(kind)) if kind == "module"
        ));
    }

    #[test]
    fn nested_entity_is_qualified_by_parent() {
        let parent = ParentScope {
            id: EntityId::new(NodeIndex::new(0), 0),
            qualifier_name: "app.Engine",
        };
        let entity = CodeEntity::nested("start", EntityKind::Function, parent);
        assert_eq!(entity.name(), "start");
        assert_eq!(entity.qualifier_name(), "app.Engine.start");
        assert_eq!(entity.parent(), Some(parent.id));
        assert!(entity.sub_entities().is_empty());
        assert_eq!(entity.in_degree(), 0);
    }

    #[test]
    fn label_prefers_definition() {
        let entity = CodeEntity::new("Foo", EntityKind::Class);
        assert_eq!(entity.label(), "class Foo");
        let entity = entity.with_definition("class Foo(Base)");
        assert_eq!(entity.label(), "class Foo(Base)");
    }
}
