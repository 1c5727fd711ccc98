use crate::agent::Agent;
use crate::checker::{plan_lines, PlanFormatChecker, REVISE_TEMPLATE};
use crate::error::{AgentError, Result};
use crate::message::{Message, MessageQueue};
use crate::prompt::PromptBook;
use async_trait::async_trait;
use codeplan_graph::{DependencyGraph, EntityId, GraphBuilder, GraphError, UsageEdges};
use codeplan_llm::{ChatCompletion, CompletionOptions, ResponseFormat};

/// Template asking for the step list.
pub const STEPS_TEMPLATE: &str = "steps";
/// Template asking for the usage-edge declaration.
pub const USAGE_TEMPLATE: &str = "usage_edges";

/// Turns a requirement into plan steps and usage edges, and folds them into
/// a dependency graph.
///
/// Templates receive `requirement`, `parent` (qualifier name of the entity
/// being detailed, empty at top level) and `examples`; the usage-edge
/// template also receives `steps`.
pub struct CodePlanner {
    name: String,
    prompts: PromptBook,
    checker: PlanFormatChecker,
    options: CompletionOptions,
    inbox: MessageQueue,
}

impl CodePlanner {
    #[must_use]
    pub fn new(prompts: PromptBook) -> Self {
        Self {
            name: "code_planner".to_string(),
            prompts,
            checker: PlanFormatChecker::default(),
            options: CompletionOptions::default(),
            inbox: MessageQueue::new(),
        }
    }

    #[must_use]
    pub fn with_checker(mut self, checker: PlanFormatChecker) -> Self {
        self.checker = checker;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn prompts(&self) -> &PromptBook {
        &self.prompts
    }

    /// Ask for a step list and return its lines once they all parse.
    pub async fn plan_steps(
        &self,
        llm: &dyn ChatCompletion,
        requirement: &str,
        parent: Option<&str>,
    ) -> Result<Vec<String>> {
        self.plan_steps_streaming(llm, requirement, parent, &mut |_: &str| {})
            .await
    }

    /// [`CodePlanner::plan_steps`], handing the step list to `on_delta` as
    /// the model writes it. Revision requests are not streamed.
    pub async fn plan_steps_streaming(
        &self,
        llm: &dyn ChatCompletion,
        requirement: &str,
        parent: Option<&str>,
        on_delta: &mut (dyn FnMut(&str) + Send),
    ) -> Result<Vec<String>> {
        let examples = self.prompts.examples_text();
        let messages = self.prompts.conversation(
            STEPS_TEMPLATE,
            &[
                ("requirement", requirement),
                ("parent", parent.unwrap_or_default()),
                ("examples", examples.as_str()),
            ],
        )?;
        let reply = llm
            .chat_completion_stream(&messages, &self.options, on_delta)
            .await?;

        if self.prompts.prompt_templates.contains_key(REVISE_TEMPLATE) {
            return self.checker.revise(llm, &self.prompts, &reply.content).await;
        }
        let report = self.checker.check(&reply.content);
        if report.is_empty() {
            Ok(plan_lines(&reply.content))
        } else {
            Err(AgentError::UnresolvedIssues { rounds: 0, report })
        }
    }

    /// Ask which planned entities use which, as a JSON usage declaration.
    pub async fn plan_usage_edges<S: AsRef<str>>(
        &self,
        llm: &dyn ChatCompletion,
        requirement: &str,
        steps: &[S],
        parent: Option<&str>,
    ) -> Result<UsageEdges> {
        let steps = steps
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\n");
        let examples = self.prompts.examples_text();
        let messages = self.prompts.conversation(
            USAGE_TEMPLATE,
            &[
                ("requirement", requirement),
                ("parent", parent.unwrap_or_default()),
                ("steps", steps.as_str()),
                ("examples", examples.as_str()),
            ],
        )?;
        let options = CompletionOptions {
            response_format: Some(ResponseFormat::JsonObject),
            ..self.options.clone()
        };
        let reply = llm.chat_completion(&messages, &options).await?;

        let json = json_object_slice(&reply.content).ok_or_else(|| {
            AgentError::InvalidResponse(format!(
                "usage edges are not a JSON object: {}",
                reply.content
            ))
        })?;
        Ok(UsageEdges::from_json_str(json)?)
    }

    /// Run one planning pass into `graph`, nested under `parent` if given.
    /// Returns the ids of the new entities.
    pub async fn plan_into(
        &self,
        llm: &dyn ChatCompletion,
        graph: &mut DependencyGraph,
        requirement: &str,
        parent: Option<EntityId>,
    ) -> Result<Vec<EntityId>> {
        self.plan_into_streaming(llm, graph, requirement, parent, &mut |_: &str| {})
            .await
    }

    /// [`CodePlanner::plan_into`] with the step list streamed to `on_delta`.
    pub async fn plan_into_streaming(
        &self,
        llm: &dyn ChatCompletion,
        graph: &mut DependencyGraph,
        requirement: &str,
        parent: Option<EntityId>,
        on_delta: &mut (dyn FnMut(&str) + Send),
    ) -> Result<Vec<EntityId>> {
        let parent_name = match parent {
            Some(id) => Some(
                graph
                    .entity(id)
                    .ok_or(GraphError::EntityNotFound(id))?
                    .qualifier_name()
                    .to_string(),
            ),
            None => None,
        };

        let steps = self
            .plan_steps_streaming(llm, requirement, parent_name.as_deref(), on_delta)
            .await?;
        let usage = self
            .plan_usage_edges(llm, requirement, &steps, parent_name.as_deref())
            .await?;

        let builder = parent.map_or_else(GraphBuilder::new, GraphBuilder::under);
        let ids = builder.extend(graph, &steps, &usage)?;
        log::info!(
            "Planned {} entities for {}",
            ids.len(),
            parent_name.as_deref().unwrap_or("the top level")
        );
        Ok(ids)
    }

    /// Plan a fresh graph.
    pub async fn plan(&self, llm: &dyn ChatCompletion, requirement: &str) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        self.plan_into(llm, &mut graph, requirement, None).await?;
        Ok(graph)
    }
}

/// Numbered generation order, one entity label per line.
pub fn describe_order(graph: &DependencyGraph) -> Result<String> {
    let lines: Vec<String> = graph
        .topological_order()?
        .into_iter()
        .enumerate()
        .map(|(i, entity)| format!("{}. {}", i + 1, entity.label()))
        .collect();
    Ok(lines.join("\n"))
}

/// The outermost `{ ... }` of a reply that may wrap JSON in prose or fences.
fn json_object_slice(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

#[async_trait]
impl Agent for CodePlanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn inbox(&mut self) -> &mut MessageQueue {
        &mut self.inbox
    }

    /// Each message is a requirement; each reply is the generation order of
    /// its plan.
    async fn process_messages(&mut self, llm: &dyn ChatCompletion) -> Result<Vec<Message>> {
        let mut replies = Vec::with_capacity(self.inbox.len());
        while let Some(message) = self.inbox.pop() {
            let graph = self.plan(llm, &message.content).await?;
            replies.push(message.reply(describe_order(&graph)?));
        }
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::send;
    use crate::testing::ScriptedLlm;
    use codeplan_llm::ChatRole;
    use pretty_assertions::assert_eq;

    const BOOK: &str = r#"
system_msg: You are a software architect.
prompt_templates:
  steps: "Plan {requirement} {parent}"
  usage_edges: "Which of these use each other?\n{steps}"
"#;

    const STEPS: &str = "Step 1:Create a class called Foo.This class will be responsible for math.\n\
                         Step 2:Create a class called Bar.This class will be responsible for I/O.";
    const EDGES: &str = r#"```json
{"Bar": [{"explanation": "uses Foo for math", "used_class": "Foo"}]}
```"#;

    fn planner() -> CodePlanner {
        CodePlanner::new(PromptBook::from_yaml_str(BOOK).unwrap())
    }

    #[tokio::test]
    async fn plan_builds_ordered_graph() {
        let llm = ScriptedLlm::new([STEPS, EDGES]);
        let graph = planner().plan(&llm, "a calculator").await.unwrap();

        assert_eq!(describe_order(&graph).unwrap(), "1. class Foo\n2. class Bar");
        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0][0].role, ChatRole::System);
        assert_eq!(requests[0][1].content, "Plan a calculator ");
        assert!(requests[1][1].content.ends_with(STEPS.lines().last().unwrap().trim()));
    }

    #[tokio::test]
    async fn nested_pass_extends_parent() {
        let llm = ScriptedLlm::new([
            STEPS,
            EDGES,
            "Step 1: Create a function called add. This function will be responsible for adding.",
            "{}",
        ]);
        let planner = planner();
        let mut graph = planner.plan(&llm, "a calculator").await.unwrap();
        let foo = graph.find("Foo").unwrap();

        let ids = planner
            .plan_into(&llm, &mut graph, "Foo's arithmetic", Some(foo))
            .await
            .unwrap();
        assert_eq!(graph.find("Foo.add"), Some(ids[0]));
        assert_eq!(llm.requests()[2][1].content, "Plan Foo's arithmetic Foo");
    }

    #[tokio::test]
    async fn streamed_steps_reach_the_caller() {
        let llm = ScriptedLlm::new([STEPS, EDGES]);
        let mut graph = DependencyGraph::new();
        let mut streamed = String::new();

        planner()
            .plan_into_streaming(&llm, &mut graph, "a calculator", None, &mut |delta: &str| {
                streamed.push_str(delta)
            })
            .await
            .unwrap();

        assert_eq!(streamed, STEPS);
        assert_eq!(graph.len(), 2);
    }

    #[tokio::test]
    async fn malformed_steps_without_revise_template() {
        let llm = ScriptedLlm::new(["Here is your plan!"]);
        let err = planner().plan(&llm, "anything").await.unwrap_err();
        assert!(matches!(err, AgentError::UnresolvedIssues { rounds: 0, .. }));
    }

    #[tokio::test]
    async fn usage_edges_must_be_json() {
        let llm = ScriptedLlm::new([STEPS, "no edges needed"]);
        let err = planner().plan(&llm, "anything").await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn inbox_messages_get_order_replies() {
        let llm = ScriptedLlm::new([STEPS, EDGES]);
        let mut planner = planner();
        send("human", &mut planner, Message::new("a calculator"));

        let replies = planner.process_messages(&llm).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].receiver.as_deref(), Some("human"));
        assert_eq!(replies[0].content, "1. class Foo\n2. class Bar");
        assert!(planner.inbox().is_empty());
    }

    #[test]
    fn json_slice_strips_fences() {
        assert_eq!(json_object_slice(EDGES).unwrap().chars().next(), Some('{'));
        assert_eq!(json_object_slice("}{"), None);
    }
}
