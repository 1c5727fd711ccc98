//! # Codeplan Graph
//!
//! Turns a natural-language build plan into a dependency graph of code
//! entities and a generation order that is safe for dependency resolution.
//!
//! ## Pipeline
//!
//! ```text
//! plan steps (YAML list)          usage edges (JSON)
//!     │                                │
//!     ├──> Step Parser                 │
//!     │      └─ unlinked CodeEntity    │
//!     │                                │
//!     ├──> Graph Builder <─────────────┘
//!     │      ├─ index by qualifier name (collisions are errors)
//!     │      ├─ attach to parent entity (nested passes)
//!     │      └─ link producer -> consumer edges
//!     │
//!     ├──> Dependency Graph (stable petgraph arena)
//!     │      └─ topological order (Kahn, insertion-order ties)
//!     │
//!     └──> Render
//!            └─ node/arc description, DOT text
//! ```
//!
//! ## Example
//!
//! ```
//! use codeplan_graph::{GraphBuilder, UsageEdges};
//!
//! let steps = [
//!     "Step 1:Create a class called Foo.This class will be responsible for math.",
//!     "Step 2:Create a class called Bar.This class will be responsible for I/O.",
//! ];
//! let usage = UsageEdges::from_json_str(
//!     r#"{"Bar": [{"explanation": "uses Foo for math", "used_class": "Foo"}]}"#,
//! )?;
//!
//! let graph = GraphBuilder::new().build(&steps, &usage)?;
//! let order: Vec<&str> = graph
//!     .topological_order()?
//!     .into_iter()
//!     .map(|entity| entity.qualifier_name())
//!     .collect();
//! assert_eq!(order, ["Foo", "Bar"]);
//! # Ok::<(), codeplan_graph::GraphError>(())
//! ```

mod builder;
mod error;
mod graph;
mod render;
mod source;
mod step;
mod types;
mod usage;

pub use builder::GraphBuilder;
pub use error::{GraphError, Result};
pub use render::GraphDescription;
pub use source::{load_plan_steps, load_usage_edges, plan_steps_from_yaml};
pub use step::{capture_step, is_identifier, parse_step, parse_steps, StepCapture};
pub use types::{
    qualify, CodeEntity, DependencyGraph, Edge, EdgeId, EntityId, EntityKind, ParentScope,
};
pub use usage::{ConsumerUsages, UsageDescriptor, UsageEdges};
