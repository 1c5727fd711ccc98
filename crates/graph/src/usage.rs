use crate::error::{GraphError, Result};
use serde_json::{Map, Value};

const EXPLANATION_KEY: &str = "explanation";
const USED_PREFIX: &str = "used_";

/// One declared usage: the consumer uses `producer` because of `explanation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageDescriptor {
    pub explanation: String,
    /// Noun of the `used_<noun>` key, e.g. `class` for `used_class`.
    pub noun: String,
    /// Producer name, relative to the current nesting scope.
    pub producer: String,
}

/// All usages declared by one consumer, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerUsages {
    /// Consumer name, relative to the current nesting scope.
    pub consumer: String,
    pub usages: Vec<UsageDescriptor>,
}

/// Usage-edge declaration for one build pass:
///
/// ```json
/// { "Bar": [ { "explanation": "uses Foo for math", "used_class": "Foo" } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageEdges {
    consumers: Vec<ConsumerUsages>,
}

impl UsageEdges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| GraphError::MalformedEdge {
            consumer: String::new(),
            reason: "usage declaration must be a JSON object".to_string(),
        })?;

        let consumers = object
            .iter()
            .map(|(consumer, descriptors)| parse_consumer(consumer, descriptors))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { consumers })
    }

    /// Declare one usage programmatically.
    pub fn declare(
        &mut self,
        consumer: impl Into<String>,
        producer: impl Into<String>,
        noun: impl Into<String>,
        explanation: impl Into<String>,
    ) {
        let consumer = consumer.into();
        let descriptor = UsageDescriptor {
            explanation: explanation.into(),
            noun: noun.into(),
            producer: producer.into(),
        };
        match self.consumers.iter_mut().find(|c| c.consumer == consumer) {
            Some(existing) => existing.usages.push(descriptor),
            None => self.consumers.push(ConsumerUsages {
                consumer,
                usages: vec![descriptor],
            }),
        }
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerUsages> {
        self.consumers.iter()
    }

    #[must_use]
    pub fn usage_count(&self) -> usize {
        self.consumers.iter().map(|c| c.usages.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.usage_count() == 0
    }
}

fn parse_consumer(consumer: &str, descriptors: &Value) -> Result<ConsumerUsages> {
    let malformed = |reason: String| GraphError::MalformedEdge {
        consumer: consumer.to_string(),
        reason,
    };

    let list = descriptors
        .as_array()
        .ok_or_else(|| malformed("usages must be a list".to_string()))?;

    let usages = list
        .iter()
        .enumerate()
        .map(|(idx, descriptor)| {
            let object = descriptor
                .as_object()
                .ok_or_else(|| malformed(format!("usage #{idx} is not an object")))?;
            parse_descriptor(object).map_err(|reason| malformed(format!("usage #{idx}: {reason}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ConsumerUsages {
        consumer: consumer.to_string(),
        usages,
    })
}

fn parse_descriptor(object: &Map<String, Value>) -> std::result::Result<UsageDescriptor, String> {
    let explanation = match object.get(EXPLANATION_KEY) {
        Some(Value::String(text)) => text.clone(),
        Some(_) => return Err(format!("`{EXPLANATION_KEY}` must be a string")),
        None => return Err(format!("missing `{EXPLANATION_KEY}`")),
    };

    let used: Vec<(&String, &Value)> = object
        .iter()
        .filter(|(key, _)| key.starts_with(USED_PREFIX))
        .collect();

    let (key, value) = match used.as_slice() {
        [single] => *single,
        [] => return Err(format!("no `{USED_PREFIX}<noun>` key")),
        many => {
            let keys: Vec<&str> = many.iter().map(|(k, _)| k.as_str()).collect();
            return Err(format!("ambiguous producer keys: {}", keys.join(", ")));
        }
    };

    let producer = value
        .as_str()
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| format!("`{key}` must name an entity"))?;

    Ok(UsageDescriptor {
        explanation,
        noun: key[USED_PREFIX.len()..].to_string(),
        producer: producer.trim().to_string(),
    })
}
