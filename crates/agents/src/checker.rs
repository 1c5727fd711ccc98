use crate::error::{AgentError, Result};
use crate::prompt::PromptBook;
use codeplan_graph::parse_step;
use codeplan_llm::{ChatCompletion, ChatMessage, CompletionOptions};
use std::fmt;

/// Template used to ask for a corrected step line.
pub const REVISE_TEMPLATE: &str = "revise_step";

/// One step line that failed the format check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Index among the non-blank lines of the plan.
    pub line_index: usize,
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueReport {
    issues: Vec<Issue>,
}

impl IssueReport {
    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn clear(&mut self) {
        self.issues.clear();
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Issue> {
        self.issues.get(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<Issue> {
        (index < self.issues.len()).then(|| self.issues.remove(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }
}

impl fmt::Display for IssueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "issue ({i}): line {}: {} ({})",
                issue.line_index, issue.line, issue.reason
            )?;
        }
        Ok(())
    }
}

/// Non-blank, trimmed lines of a plan response, without markdown fences.
pub fn plan_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(ToString::to_string)
        .collect()
}

/// Checks that every line of a step-list response follows the step grammar
/// and, when asked, has the model rewrite the lines that do not.
#[derive(Debug, Clone)]
pub struct PlanFormatChecker {
    max_rounds: usize,
    options: CompletionOptions,
}

impl Default for PlanFormatChecker {
    fn default() -> Self {
        Self::new(3)
    }
}

impl PlanFormatChecker {
    #[must_use]
    pub fn new(max_rounds: usize) -> Self {
        Self {
            max_rounds,
            options: CompletionOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn check_line(line: &str) -> std::result::Result<(), String> {
        parse_step(line, None).map(|_| ()).map_err(|err| err.to_string())
    }

    #[must_use]
    pub fn check(&self, response: &str) -> IssueReport {
        let mut report = IssueReport::default();
        for (line_index, line) in plan_lines(response).into_iter().enumerate() {
            if let Err(reason) = Self::check_line(&line) {
                report.push(Issue {
                    line_index,
                    line,
                    reason,
                });
            }
        }
        report
    }

    /// Ask the model to rewrite failing lines, one request per line, until the
    /// plan passes or `max_rounds` rounds have run.
    ///
    /// `prompts` must hold a `revise_step` template; it receives `line`,
    /// `reason` and `plan`. The first non-blank line of each answer replaces
    /// the failing line.
    pub async fn revise(
        &self,
        llm: &dyn ChatCompletion,
        prompts: &PromptBook,
        response: &str,
    ) -> Result<Vec<String>> {
        let mut lines = plan_lines(response);
        let mut report = self.check(&lines.join("\n"));

        for round in 0..self.max_rounds {
            if report.is_empty() {
                break;
            }
            log::info!(
                "Plan revision round {}: {} malformed step lines",
                round + 1,
                report.len()
            );

            let plan = lines.join("\n");
            for issue in report.iter() {
                let prompt = prompts.render(
                    REVISE_TEMPLATE,
                    &[
                        ("line", issue.line.as_str()),
                        ("reason", issue.reason.as_str()),
                        ("plan", plan.as_str()),
                    ],
                )?;
                let messages = [
                    ChatMessage::system(&prompts.system_msg),
                    ChatMessage::user(prompt),
                ];
                let reply = llm.chat_completion(&messages, &self.options).await?;
                match plan_lines(&reply.content).into_iter().next() {
                    Some(fixed) => lines[issue.line_index] = fixed,
                    None => log::warn!("Empty revision for step line {}", issue.line_index),
                }
            }
            report = self.check(&lines.join("\n"));
        }

        if report.is_empty() {
            Ok(lines)
        } else {
            Err(AgentError::UnresolvedIssues {
                rounds: self.max_rounds,
                report,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;
    use pretty_assertions::assert_eq;

    const GOOD: &str = "Step 1:Create a class called Foo.This class will be responsible for math.";
    const BAD: &str = "Step 2: make a class Bar";

    fn prompts() -> PromptBook {
        PromptBook::from_yaml_str(
            "system_msg: fix steps\nprompt_templates:\n  revise_step: \"Rewrite {line} because {reason}\"\n",
        )
        .unwrap()
    }

    #[test]
    fn check_reports_each_bad_line() {
        let checker = PlanFormatChecker::default();
        let response = format!("{GOOD}\n\n{BAD}\nStep 3: Create a module called m. This module will be responsible for x.\n");
        let report = checker.check(&response);

        assert_eq!(report.len(), 2);
        assert_eq!(report.get(0).unwrap().line_index, 1);
        assert_eq!(report.get(0).unwrap().line, BAD);
        assert!(report.get(1).unwrap().reason.contains("unsupported code entity kind"));
        assert!(report.to_string().starts_with("issue (0): line 1: Step 2: make a class Bar"));
    }

    #[test]
    fn clean_plan_has_empty_report() {
        assert!(PlanFormatChecker::default().check(GOOD).is_empty());
    }

    #[tokio::test]
    async fn revise_replaces_failing_lines() {
        let llm = ScriptedLlm::new([
            "Step 2:Create a class called Bar.This class will be responsible for I/O.",
        ]);
        let lines = PlanFormatChecker::new(2)
            .revise(&llm, &prompts(), &format!("{GOOD}\n{BAD}"))
            .await
            .unwrap();

        assert_eq!(lines[0], GOOD);
        assert!(lines[1].contains("called Bar"));
        let seen = llm.requests();
        assert_eq!(seen.len(), 1);
        assert!(seen[0][1].content.starts_with("Rewrite Step 2: make a class Bar because"));
    }

    #[tokio::test]
    async fn revise_gives_up_after_max_rounds() {
        let llm = ScriptedLlm::new(["still wrong", "also wrong"]);
        let err = PlanFormatChecker::new(2)
            .revise(&llm, &prompts(), BAD)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::UnresolvedIssues { rounds: 2, ref report } if report.len() == 1));
        assert_eq!(llm.requests().len(), 2);
    }

    #[tokio::test]
    async fn valid_plan_needs_no_requests() {
        let llm = ScriptedLlm::new(Vec::<String>::new());
        let lines = PlanFormatChecker::default()
            .revise(&llm, &prompts(), GOOD)
            .await
            .unwrap();
        assert_eq!(lines, vec![GOOD.to_string()]);
        assert!(llm.requests().is_empty());
    }
}
