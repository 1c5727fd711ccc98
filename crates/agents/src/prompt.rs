use crate::error::{AgentError, Result};
use codeplan_llm::ChatMessage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// `{name}` placeholders; `{{` and `}}` are literal braces.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Worked question/answer pair shown to the model before the real prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaExample {
    #[serde(rename = "Q")]
    pub question: String,
    #[serde(rename = "A")]
    pub answer: String,
}

impl fmt::Display for QaExample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q:{}\nA:{}", self.question, self.answer)
    }
}

/// Prompts of one agent, read from YAML:
///
/// ```yaml
/// system_msg: You are a software architect.
/// prompt_templates:
///   steps: "Plan the classes for: {requirement}"
/// examples:
///   - Q: a calculator
///     A: "Step 1: ..."
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBook {
    pub system_msg: String,
    #[serde(default)]
    pub prompt_templates: BTreeMap<String, String>,
    #[serde(default)]
    pub examples: Vec<QaExample>,
}

impl PromptBook {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let book = Self::from_yaml_str(&fs::read_to_string(path)?)?;
        log::debug!(
            "Loaded {} prompt templates and {} examples from {}",
            book.prompt_templates.len(),
            book.examples.len(),
            path.display()
        );
        Ok(book)
    }

    pub fn template(&self, name: &str) -> Result<&str> {
        self.prompt_templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AgentError::MissingTemplate(name.to_string()))
    }

    /// Fill the placeholders of template `name`. Unused variables are ignored.
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String> {
        let template = self.template(name)?;
        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            match caps.get(1) {
                Some(var) => {
                    let value = vars
                        .iter()
                        .find(|(key, _)| *key == var.as_str())
                        .map(|(_, value)| *value)
                        .ok_or_else(|| AgentError::MissingVariable {
                            template: name.to_string(),
                            variable: var.as_str().to_string(),
                        })?;
                    out.push_str(value);
                }
                None => out.push_str(&whole.as_str()[..1]),
            }
            last = whole.end();
        }
        out.push_str(&template[last..]);

        Ok(out)
    }

    /// Examples as `Q:..\nA:..` blocks separated by blank lines.
    #[must_use]
    pub fn examples_text(&self) -> String {
        self.examples
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// System message, the examples as earlier turns, then the rendered
    /// template as the final user turn.
    pub fn conversation(&self, name: &str, vars: &[(&str, &str)]) -> Result<Vec<ChatMessage>> {
        let prompt = self.render(name, vars)?;
        let mut messages = Vec::with_capacity(self.examples.len() * 2 + 2);
        messages.push(ChatMessage::system(&self.system_msg));
        for example in &self.examples {
            messages.push(ChatMessage::user(&example.question));
            messages.push(ChatMessage::assistant(&example.answer));
        }
        messages.push(ChatMessage::user(prompt));
        Ok(messages)
    }
}
