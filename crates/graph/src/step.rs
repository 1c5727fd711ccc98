use crate::error::{GraphError, Result};
use crate::types::{CodeEntity, EntityKind, ParentScope};
use once_cell::sync::Lazy;
use regex::Regex;

/// `Step <n>: Create a <kind> called <identifier>. This <noun> will be responsible for <description>.`
static STEP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^step\s+(\d+)\s*:\s*create\s+an?\s+(\w+)\s+called\s+([A-Za-z_][A-Za-z0-9_]*)\s*\.\s*this\s+(\w+)\s+will\s+be\s+responsible\s+for\s+(.+?)\s*\.?$",
    )
    .expect("step pattern is valid")
});

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Whether `name` can be used as an entity name (and so as one segment of a
/// qualifier name).
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Fields captured from one plan step line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCapture<'a> {
    pub number: u32,
    pub kind_word: &'a str,
    pub identifier: &'a str,
    pub kind_noun: &'a str,
    pub description: &'a str,
}

/// Match a step line against the grammar without building an entity.
pub fn capture_step(step: &str) -> Result<StepCapture<'_>> {
    let step = step.trim();
    let format_error = || GraphError::FormatError {
        step: step.to_string(),
    };

    let caps = STEP_PATTERN.captures(step).ok_or_else(format_error)?;
    let number = caps[1].parse::<u32>().map_err(|_| format_error())?;
    let description = caps.get(5).map_or("", |m| m.as_str());
    if description.is_empty() {
        return Err(format_error());
    }

    Ok(StepCapture {
        number,
        kind_word: caps.get(2).map_or("", |m| m.as_str()),
        identifier: caps.get(3).map_or("", |m| m.as_str()),
        kind_noun: caps.get(4).map_or("", |m| m.as_str()),
        description,
    })
}

/// Parse one plan step into an unlinked entity.
///
/// The entity is qualified by `parent` but not added to its children; the
/// graph builder does that when the entity is inserted.
pub fn parse_step(step: &str, parent: Option<ParentScope<'_>>) -> Result<CodeEntity> {
    let capture = capture_step(step)?;
    let kind: EntityKind = capture.kind_word.parse()?;

    if !capture.kind_noun.eq_ignore_ascii_case(capture.kind_word) {
        log::warn!(
            "Step {} declares a {} but describes it as a {}",
            capture.number,
            kind,
            capture.kind_noun
        );
    }

    let entity = match parent {
        Some(scope) => CodeEntity::nested(capture.identifier, kind, scope),
        None => CodeEntity::new(capture.identifier, kind),
    }
    .with_description(capture.description);

    log::debug!(
        "Parsed step {}: {} {}",
        capture.number,
        entity.kind,
        entity.qualifier_name()
    );

    Ok(entity)
}

/// Parse a step list in source order, failing on the first malformed line.
pub fn parse_steps<S: AsRef<str>>(
    steps: &[S],
    parent: Option<ParentScope<'_>>,
) -> Result<Vec<CodeEntity>> {
    steps
        .iter()
        .map(|step| parse_step(step.as_ref(), parent))
        .collect()
}
