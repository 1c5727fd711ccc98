use crate::checker::IssueReport;
use codeplan_graph::GraphError;
use codeplan_llm::LlmError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("prompt template {0} does not exist")]
    MissingTemplate(String),

    #[error("prompt template {template} needs variable {variable}")]
    MissingVariable { template: String, variable: String },

    #[error("plan still has {} format issues after {rounds} revision rounds:\n{report}", .report.len())]
    UnresolvedIssues { rounds: usize, report: IssueReport },

    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
