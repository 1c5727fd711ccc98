use crate::DescribeFormat;
use anyhow::{bail, Context, Result};
use codeplan_agents::{
    describe_order, CodePlanner, Console, Issue, IssueReport, PlanFormatChecker, PromptBook,
    Speaker,
};
use codeplan_graph::{load_plan_steps, DependencyGraph, EntityKind, GraphBuilder};
use codeplan_llm::{LlmClient, LlmConfig};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct OrderEntry<'a> {
    position: usize,
    qualifier_name: &'a str,
    kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

fn build_graph(steps: &Path, edges: &Path) -> Result<DependencyGraph> {
    GraphBuilder::new()
        .build_from_files(steps, edges)
        .with_context(|| format!("failed to build graph from {}", steps.display()))
}

fn print_order(graph: &DependencyGraph, json: bool) -> Result<()> {
    if !json {
        println!("{}", describe_order(graph)?);
        return Ok(());
    }

    let entries: Vec<OrderEntry<'_>> = graph
        .topological_order()?
        .into_iter()
        .enumerate()
        .map(|(position, entity)| OrderEntry {
            position: position + 1,
            qualifier_name: entity.qualifier_name(),
            kind: entity.kind,
            description: entity.description.as_deref(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

pub fn order(steps: &Path, edges: &Path, json: bool) -> Result<()> {
    let graph = build_graph(steps, edges)?;
    print_order(&graph, json)
}

pub fn describe(steps: &Path, edges: &Path, format: DescribeFormat) -> Result<()> {
    let description = build_graph(steps, edges)?.describe_graph();
    match format {
        DescribeFormat::Json => println!("{}", serde_json::to_string_pretty(&description)?),
        DescribeFormat::Dot => print!("{}", description.to_dot("plan")),
        DescribeFormat::Text => {
            println!("nodes:");
            for (idx, label) in description.nodes.iter().enumerate() {
                println!("  {idx}: {label}");
            }
            println!("arcs:");
            for (from, to) in &description.arcs {
                println!("  {from} -> {to}");
            }
        }
    }
    Ok(())
}

pub fn check(steps: &Path) -> Result<()> {
    let lines = load_plan_steps(steps)
        .with_context(|| format!("failed to read steps from {}", steps.display()))?;
    let mut report = IssueReport::default();
    for (line_index, line) in lines.iter().enumerate() {
        if let Err(reason) = PlanFormatChecker::check_line(line) {
            report.push(Issue {
                line_index,
                line: line.clone(),
                reason,
            });
        }
    }
    if report.is_empty() {
        println!("ok: {} steps", lines.len());
        return Ok(());
    }
    println!("{report}");
    bail!("{} of {} steps are malformed", report.len(), lines.len())
}

fn planner_parts(config: &Path, prompts: &Path) -> Result<(LlmClient, CodePlanner)> {
    let config = LlmConfig::load(config)
        .with_context(|| format!("failed to load LLM config from {}", config.display()))?;
    let client = LlmClient::new(config)?;
    let prompts = PromptBook::load(prompts)
        .with_context(|| format!("failed to load prompts from {}", prompts.display()))?;
    Ok((client, CodePlanner::new(prompts)))
}

pub async fn plan(config: &Path, prompts: &Path, requirement: &str, json: bool) -> Result<()> {
    let (client, planner) = planner_parts(config, prompts)?;
    let graph = planner.plan(&client, requirement).await?;
    print_order(&graph, json)
}

pub async fn chat(config: &Path, prompts: &Path) -> Result<()> {
    let (client, planner) = planner_parts(config, prompts)?;
    let mut graph = DependencyGraph::new();
    let mut console = Console::stdio(Speaker::CodePlanner);

    console.prompt(
        "Describe what to build. Start a line with @Entity to detail an existing entity; \
         an empty line ends the session.",
    )?;

    while let Some(line) = console.read_input()? {
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        let (parent, requirement) = match line.strip_prefix('@') {
            Some(rest) => {
                let (name, requirement) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                match graph.find(name) {
                    Some(id) => (Some(id), requirement.trim()),
                    None => {
                        console.prompt(&format!("No entity called {name} has been planned."))?;
                        continue;
                    }
                }
            }
            None => (None, line),
        };

        console.begin_stream()?;
        let outcome = planner
            .plan_into_streaming(&client, &mut graph, requirement, parent, &mut |delta: &str| {
                if let Err(err) = console.stream_delta(delta) {
                    log::warn!("Failed to echo streamed reply: {err}");
                }
            })
            .await;
        console.end_stream()?;

        let reply = match outcome {
            Ok(_) => describe_order(&graph).unwrap_or_else(|err| err.to_string()),
            Err(err) => {
                log::warn!("Planning pass failed: {err}");
                format!("Planning failed: {err}")
            }
        };
        console.prompt(&reply)?;
    }

    let (history, _) = console.into_parts();
    println!("{history}");
    Ok(())
}
