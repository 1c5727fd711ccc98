use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

const RULE: &str = "====================";

/// Participants of a planning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    CodeExecutor,
    CodeGenerator,
    CodeIntegrator,
    CodePlanner,
    CodeReviewer,
    TestCaseGenerator,
    FormatChecker,
    Human,
}

impl Speaker {
    pub const ALL: [Self; 8] = [
        Self::CodeExecutor,
        Self::CodeGenerator,
        Self::CodeIntegrator,
        Self::CodePlanner,
        Self::CodeReviewer,
        Self::TestCaseGenerator,
        Self::FormatChecker,
        Self::Human,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CodeExecutor => "code_executor",
            Self::CodeGenerator => "code_generator",
            Self::CodeIntegrator => "code_integrator",
            Self::CodePlanner => "code_planner",
            Self::CodeReviewer => "code_reviewer",
            Self::TestCaseGenerator => "test_case_generator",
            Self::FormatChecker => "format_checker",
            Self::Human => "human",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Speaker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|speaker| speaker.as_str() == s)
            .ok_or_else(|| format!("unknown speaker: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatItem {
    pub speaker: Speaker,
    pub content: String,
}

impl ChatItem {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            speaker,
            content: content.into(),
        }
    }
}

impl fmt::Display for ChatItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} >>> {}", self.speaker, self.content)
    }
}

/// Transcript of a session, printed between `=` rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    items: Vec<ChatItem>,
}

impl ChatHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: ChatItem) {
        self.items.push(item);
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ChatItem> {
        self.items.get(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<ChatItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatItem> {
        self.items.iter()
    }
}

impl fmt::Display for ChatHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        for item in &self.items {
            writeln!(f, "{item}")?;
        }
        write!(f, "{RULE}")
    }
}

/// Line-oriented console for one speaker. Everything shown or read is
/// recorded in the history.
pub struct Console<R, W> {
    speaker: Speaker,
    history: ChatHistory,
    input: R,
    output: W,
    streamed: Option<String>,
}

impl Console<io::BufReader<io::Stdin>, io::Stdout> {
    #[must_use]
    pub fn stdio(speaker: Speaker) -> Self {
        Self::new(speaker, io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(speaker: Speaker, input: R, output: W) -> Self {
        Self {
            speaker,
            history: ChatHistory::new(),
            input,
            output,
            streamed: None,
        }
    }

    /// Print `speaker > message`.
    pub fn prompt(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{} > {message}", self.speaker)?;
        self.output.flush()?;
        self.history.push(ChatItem::new(self.speaker, message));
        Ok(())
    }

    /// Start a `speaker > ` line whose text arrives in pieces through
    /// [`Console::stream_delta`]; [`Console::end_stream`] records it.
    pub fn begin_stream(&mut self) -> io::Result<()> {
        write!(self.output, "{} > ", self.speaker)?;
        self.output.flush()?;
        self.streamed = Some(String::new());
        Ok(())
    }

    pub fn stream_delta(&mut self, delta: &str) -> io::Result<()> {
        self.streamed.get_or_insert_with(String::new).push_str(delta);
        write!(self.output, "{delta}")?;
        self.output.flush()
    }

    pub fn end_stream(&mut self) -> io::Result<()> {
        let Some(content) = self.streamed.take() else {
            return Ok(());
        };
        writeln!(self.output)?;
        self.output.flush()?;
        self.history.push(ChatItem::new(self.speaker, content));
        Ok(())
    }

    /// Read one line after a `human > ` prompt; `None` at end of input.
    pub fn read_input(&mut self) -> io::Result<Option<String>> {
        write!(self.output, "{} > ", Speaker::Human)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        self.history.push(ChatItem::new(Speaker::Human, line.clone()));
        Ok(Some(line))
    }

    #[must_use]
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn into_parts(self) -> (ChatHistory, W) {
        (self.history, self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn history_display_is_framed() {
        let mut history = ChatHistory::new();
        history.push(ChatItem::new(Speaker::Human, "plan a calculator"));
        history.push(ChatItem::new(Speaker::CodePlanner, "Step 1: ..."));

        assert_eq!(
            history.to_string(),
            "====================\nhuman >>> plan a calculator\ncode_planner >>> Step 1: ...\n===================="
        );
    }

    #[test]
    fn speaker_names_parse_back() {
        for speaker in Speaker::ALL {
            assert_eq!(speaker.as_str().parse::<Speaker>(), Ok(speaker));
        }
        assert!("planner".parse::<Speaker>().is_err());
    }

    #[test]
    fn console_records_both_directions() {
        let input = Cursor::new("a calculator\n");
        let mut console = Console::new(Speaker::CodePlanner, input, Vec::new());

        console.prompt("What should I plan?").unwrap();
        assert_eq!(console.read_input().unwrap().as_deref(), Some("a calculator"));
        assert_eq!(console.read_input().unwrap(), None);

        let (history, output) = console.into_parts();
        assert_eq!(history.len(), 2);
        assert_eq!(history.get(1).unwrap().speaker, Speaker::Human);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "code_planner > What should I plan?\nhuman > human > "
        );
    }

    #[test]
    fn streamed_reply_is_recorded_once_complete() {
        let mut console = Console::new(Speaker::CodePlanner, Cursor::new(""), Vec::new());

        console.begin_stream().unwrap();
        console.stream_delta("Step 1:").unwrap();
        console.stream_delta("Create a class").unwrap();
        assert!(console.history().is_empty());
        console.end_stream().unwrap();
        console.end_stream().unwrap();

        let (history, output) = console.into_parts();
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(0).unwrap().content, "Step 1:Create a class");
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "code_planner > Step 1:Create a class\n"
        );
    }
}
