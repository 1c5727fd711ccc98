//! # Codeplan Agents
//!
//! LLM agents around the dependency graph:
//!
//! - [`CodePlanner`] asks for plan steps and usage edges and folds them into
//!   a [`codeplan_graph::DependencyGraph`], top level or nested under an
//!   entity.
//! - [`PlanFormatChecker`] validates step lines with the step parser and has
//!   the model rewrite the ones that fail.
//! - [`PromptBook`] holds an agent's system message, templates and worked
//!   examples, loaded from YAML.
//! - [`ChatHistory`] and [`Console`] keep the transcript of an interactive
//!   session.
//! - [`testing::ScriptedLlm`] answers from a fixed script, for tests and
//!   offline runs.

mod agent;
mod chat;
mod checker;
mod error;
mod message;
mod planner;
mod prompt;
pub mod testing;

pub use agent::{send, Agent};
pub use chat::{ChatHistory, ChatItem, Console, Speaker};
pub use checker::{plan_lines, Issue, IssueReport, PlanFormatChecker, REVISE_TEMPLATE};
pub use error::{AgentError, Result};
pub use message::{Message, MessageQueue};
pub use planner::{describe_order, CodePlanner, STEPS_TEMPLATE, USAGE_TEMPLATE};
pub use prompt::{PromptBook, QaExample};
