//! Layered configuration.
//!
//! A key such as `llm.api_base` resolves, first hit wins:
//!
//! 1. in-memory values set by the application,
//! 2. the environment (`LLM_API_BASE`); `null`, `none` and `nil` mark the key
//!    unset, which skips the config file,
//! 3. the config file (a JSON or YAML object keyed by the dotted name),
//! 4. the caller's default.
//!
//! Every lookup is recorded as a [`ConfigItem`] so callers can report where
//! a value came from.

use crate::error::ConfigError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, ConfigError>;

const APP_BASE_DIR: &str = "${AppBaseDir}";
const NULL_VALUES: [&str; 3] = ["null", "none", "nil"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSourceKind {
    App,
    Env,
    File,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigValueType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Enum,
    Path,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSourceValue {
    pub source: ConfigSourceKind,
    pub value: Value,
}

/// Resolution record for one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigItem {
    pub name: String,
    /// Value that won, before typed conversion.
    pub value: Value,
    pub value_type: ConfigValueType,
    /// Every source that offered a value, most recent last.
    pub sources: Vec<ConfigSourceValue>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    in_memory: Map<String, Value>,
    env: HashMap<String, String>,
    file: Map<String, Value>,
    file_path: Option<PathBuf>,
    base_path: PathBuf,
    home_dir: Option<PathBuf>,
    items: BTreeMap<String, ConfigItem>,
}

impl ConfigSource {
    /// Source over an injected environment.
    #[must_use]
    pub fn with_env(env: HashMap<String, String>) -> Self {
        Self {
            env,
            base_path: PathBuf::from("."),
            ..Self::default()
        }
    }

    /// Source over the process environment, rooted at the current directory.
    #[must_use]
    pub fn from_env() -> Self {
        let base_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut source = Self::with_env(std::env::vars().collect()).with_base_path(base_path);
        source.home_dir = dirs::home_dir();
        source
    }

    /// Directory a leading `~` in path values expands to.
    #[must_use]
    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Set an in-memory value; it shadows every other source.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.in_memory.insert(key.into(), value.into());
    }

    /// Load a `.json`, `.yaml` or `.yml` config file.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        let value: Value = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        match value {
            Value::Object(map) => {
                log::debug!("Loaded {} config keys from {}", map.len(), path.display());
                self.file = map;
                self.file_path = Some(path.to_path_buf());
                Ok(self)
            }
            // An empty YAML document
            Value::Null => {
                self.file_path = Some(path.to_path_buf());
                Ok(self)
            }
            _ => Err(ConfigError::InvalidFile {
                path: path.display().to_string(),
                reason: "config file must hold an object".to_string(),
            }),
        }
    }

    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolution record of a key looked up so far.
    #[must_use]
    pub fn item(&self, key: &str) -> Option<&ConfigItem> {
        self.items.get(key)
    }

    /// All lookups so far, sorted by key.
    pub fn items(&self) -> impl Iterator<Item = &ConfigItem> {
        self.items.values()
    }

    pub fn get_str(&mut self, key: &str, default: Option<&str>) -> Result<String> {
        let value = self.resolve(key, ConfigValueType::Str, default.map(Value::from))?;
        Ok(value_to_string(&value))
    }

    pub fn get_bool(&mut self, key: &str, default: Option<bool>) -> Result<bool> {
        let value = self.resolve(key, ConfigValueType::Bool, default.map(Value::from))?;
        if let Value::Bool(flag) = value {
            return Ok(flag);
        }
        match value_to_string(&value).to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(invalid(key, "boolean", &value)),
        }
    }

    pub fn get_int(&mut self, key: &str, default: Option<i64>) -> Result<i64> {
        let value = self.resolve(key, ConfigValueType::Int, default.map(Value::from))?;
        if let Some(number) = value.as_i64() {
            return Ok(number);
        }
        if let Some(number) = value.as_f64() {
            return Ok(number as i64);
        }
        let text = value_to_string(&value);
        let text = text.trim();
        text.parse::<i64>()
            .ok()
            .or_else(|| text.parse::<f64>().ok().map(|n| n as i64))
            .ok_or_else(|| invalid(key, "integer", &value))
    }

    pub fn get_float(&mut self, key: &str, default: Option<f64>) -> Result<f64> {
        let value = self.resolve(key, ConfigValueType::Float, default.map(Value::from))?;
        if let Some(number) = value.as_f64() {
            return Ok(number);
        }
        value_to_string(&value)
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(key, "float", &value))
    }

    pub fn get_enum(&mut self, key: &str, options: &[&str], default: Option<&str>) -> Result<String> {
        let value = self.resolve(key, ConfigValueType::Enum, default.map(Value::from))?;
        let text = value_to_string(&value);
        if options.contains(&text.as_str()) {
            Ok(text)
        } else {
            Err(ConfigError::InvalidOption {
                key: key.to_string(),
                value: text,
                options: options.iter().map(ToString::to_string).collect(),
            })
        }
    }

    /// A JSON/YAML array, or a comma-separated string.
    pub fn get_list(&mut self, key: &str, default: Option<&[&str]>) -> Result<Vec<String>> {
        let default = default.map(|items| Value::from(items.to_vec()));
        let value = self.resolve(key, ConfigValueType::List, default)?;
        match &value {
            Value::Array(items) => Ok(items.iter().map(value_to_string).collect()),
            Value::String(text) if text.trim().is_empty() => Ok(Vec::new()),
            Value::String(text) => Ok(text.split(',').map(|item| item.trim().to_string()).collect()),
            Value::Null => Ok(Vec::new()),
            _ => Err(invalid(key, "list", &value)),
        }
    }

    /// A path; a leading `${AppBaseDir}` expands to the base path and a
    /// leading `~` to the home directory.
    pub fn get_path(&mut self, key: &str, default: Option<&str>) -> Result<PathBuf> {
        let value = self.resolve(key, ConfigValueType::Path, default.map(Value::from))?;
        Ok(self.expand_path(&value_to_string(&value)))
    }

    fn expand_path(&self, raw: &str) -> PathBuf {
        if let Some(rest) = raw.strip_prefix(APP_BASE_DIR) {
            return self.base_path.join(rest.trim_start_matches(['/', '\\']));
        }
        if let Some(rest) = raw.strip_prefix('~') {
            if rest.is_empty() || rest.starts_with(['/', '\\']) {
                if let Some(home) = &self.home_dir {
                    return home.join(rest.trim_start_matches(['/', '\\']));
                }
            }
        }
        PathBuf::from(raw)
    }

    fn resolve(&mut self, key: &str, value_type: ConfigValueType, default: Option<Value>) -> Result<Value> {
        if let Some(default) = &default {
            self.record(key, value_type, ConfigSourceKind::Default, default.clone());
        }

        let found = if let Some(value) = self.in_memory.get(key).filter(|v| !v.is_null()) {
            Some((ConfigSourceKind::App, value.clone()))
        } else if let Some(raw) = self.env.get(&env_key(key)) {
            if NULL_VALUES.contains(&raw.to_ascii_lowercase().as_str()) {
                None
            } else {
                Some((ConfigSourceKind::Env, Value::String(raw.clone())))
            }
        } else {
            self.file
                .get(key)
                .filter(|v| !v.is_null())
                .map(|value| (ConfigSourceKind::File, value.clone()))
        };

        match (found, default) {
            (Some((source, value)), _) => {
                log::trace!("Config {key} resolved from {source:?}");
                self.record(key, value_type, source, value.clone());
                Ok(value)
            }
            (None, Some(default)) => Ok(default),
            (None, None) => Err(ConfigError::MissingKey(key.to_string())),
        }
    }

    fn record(&mut self, key: &str, value_type: ConfigValueType, source: ConfigSourceKind, value: Value) {
        let item = self
            .items
            .entry(key.to_string())
            .or_insert_with(|| ConfigItem {
                name: key.to_string(),
                value: Value::Null,
                value_type,
                sources: Vec::new(),
            });
        item.value = value.clone();
        item.value_type = value_type;
        item.sources.retain(|entry| entry.source != source);
        item.sources.push(ConfigSourceValue { source, value });
    }
}

/// `llm.api_base` -> `LLM_API_BASE`
#[must_use]
pub fn env_key(key: &str) -> String {
    key.to_ascii_uppercase().replace('.', "_")
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn invalid(key: &str, expected: &'static str, value: &Value) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        expected,
        value: value_to_string(value),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    OpenAi,
    Azure,
}

impl ApiType {
    pub const OPTIONS: [&'static str; 2] = ["openai", "azure"];

    fn from_option(option: &str) -> Self {
        match option {
            "azure" => Self::Azure,
            _ => Self::OpenAi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

impl ResponseFormat {
    pub const OPTIONS: [&'static str; 2] = ["text", "json_object"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::JsonObject => "json_object",
        }
    }

    fn from_option(option: &str) -> Self {
        match option {
            "json_object" => Self::JsonObject,
            _ => Self::Text,
        }
    }
}

/// Settings of the `llm` namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub api_type: ApiType,
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub backup_model: String,
    pub api_version: String,
    pub response_format: ResponseFormat,
    pub timeout_secs: u64,
}

impl LlmConfig {
    const NAMESPACE: &'static str = "llm";

    pub fn from_source(source: &mut ConfigSource) -> Result<Self> {
        let key = |name: &str| format!("{}.{name}", Self::NAMESPACE);

        let api_type = ApiType::from_option(&source.get_enum(
            &key("api_type"),
            &ApiType::OPTIONS,
            Some("openai"),
        )?);
        let api_base = source.get_str(&key("api_base"), Some("https://api.openai.com/v1"))?;
        let api_key = source.get_str(&key("api_key"), None)?;
        let model = source.get_str(&key("model"), Some("gpt-4"))?;
        let backup_model = source.get_str(&key("backup_model"), Some(model.as_str()))?;
        let api_version = source.get_str(&key("api_version"), Some("2023-07-01-preview"))?;
        let response_format = ResponseFormat::from_option(&source.get_enum(
            &key("response_format"),
            &ResponseFormat::OPTIONS,
            Some("text"),
        )?);
        let timeout_secs = source.get_int(&key("timeout_secs"), Some(120))?;
        let timeout_secs = u64::try_from(timeout_secs).map_err(|_| ConfigError::InvalidValue {
            key: key("timeout_secs"),
            expected: "non-negative integer",
            value: timeout_secs.to_string(),
        })?;

        Ok(Self {
            api_type,
            api_base,
            api_key,
            model,
            backup_model,
            api_version,
            response_format,
            timeout_secs,
        })
    }

    /// Read the config file at `path`, layered under the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut source = ConfigSource::from_env().with_file(path)?;
        Self::from_source(&mut source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn with_json_file(dir: &TempDir, source: ConfigSource, json: &str) -> ConfigSource {
        let path = dir.path().join("config.json");
        fs::write(&path, json).unwrap();
        source.with_file(path).unwrap()
    }

    #[test]
    fn precedence_memory_env_file_default() {
        let dir = TempDir::new().unwrap();
        let mut source = with_json_file(
            &dir,
            ConfigSource::with_env(env(&[("LLM_MODEL", "env-model"), ("LLM_API_BASE", "http://env")])),
            r#"{"llm.model": "file-model", "llm.api_base": "http://file", "llm.api_version": "v-file"}"#,
        )
        .with_value("llm.model", "memory-model");

        assert_eq!(source.get_str("llm.model", Some("d")).unwrap(), "memory-model");
        assert_eq!(source.get_str("llm.api_base", Some("d")).unwrap(), "http://env");
        assert_eq!(source.get_str("llm.api_version", Some("d")).unwrap(), "v-file");
        assert_eq!(source.get_str("llm.other", Some("d")).unwrap(), "d");
    }

    #[test]
    fn null_env_value_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let mut source = with_json_file(
            &dir,
            ConfigSource::with_env(env(&[("LLM_MODEL", "None")])),
            r#"{"llm.model": "file-model"}"#,
        );

        assert_eq!(source.get_str("llm.model", Some("gpt-4")).unwrap(), "gpt-4");
        assert!(matches!(
            source.get_str("llm.model", None),
            Err(ConfigError::MissingKey(key)) if key == "llm.model"
        ));
    }

    #[test]
    fn typed_getters() {
        let mut source = ConfigSource::with_env(env(&[
            ("APP_FLAG", "Yes"),
            ("APP_COUNT", "42"),
            ("APP_RATIO", "0.5"),
            ("APP_TAGS", "a, b ,c"),
        ]))
        .with_value("app.items", serde_json::json!(["x", "y"]))
        .with_value("app.rounded", 3.9);

        assert!(source.get_bool("app.flag", None).unwrap());
        assert_eq!(source.get_int("app.count", None).unwrap(), 42);
        assert_eq!(source.get_int("app.rounded", None).unwrap(), 3);
        assert!((source.get_float("app.ratio", None).unwrap() - 0.5).abs() < f64::EPSILON);
        assert_eq!(source.get_list("app.tags", None).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(source.get_list("app.items", None).unwrap(), vec!["x", "y"]);
        assert_eq!(source.get_list("app.none", Some(&[] as &[&str])).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut source = ConfigSource::with_env(env(&[("APP_FLAG", "maybe"), ("APP_KIND", "c")]));

        assert!(matches!(
            source.get_bool("app.flag", None),
            Err(ConfigError::InvalidValue { expected: "boolean", .. })
        ));
        assert!(matches!(
            source.get_enum("app.kind", &["a", "b"], Some("a")),
            Err(ConfigError::InvalidOption { value, .. }) if value == "c"
        ));
    }

    #[test]
    fn path_expansion() {
        let mut source = ConfigSource::with_env(env(&[("HOME", "/elsewhere")]))
            .with_base_path("/srv/app")
            .with_home_dir("/home/dev")
            .with_value("app.cache", "${AppBaseDir}/cache/tokens.bin")
            .with_value("app.notes", "~/notes");

        assert_eq!(
            source.get_path("app.cache", None).unwrap(),
            PathBuf::from("/srv/app/cache/tokens.bin")
        );
        assert_eq!(
            source.get_path("app.notes", None).unwrap(),
            PathBuf::from("/home/dev/notes")
        );
        assert_eq!(
            source.get_path("app.plain", Some("relative/dir")).unwrap(),
            PathBuf::from("relative/dir")
        );
    }

    #[test]
    fn tilde_stays_literal_without_home_dir() {
        let mut source = ConfigSource::with_env(env(&[("HOME", "/home/dev")]))
            .with_value("app.notes", "~/notes")
            .with_value("app.user", "~bob/notes");

        assert_eq!(source.get_path("app.notes", None).unwrap(), PathBuf::from("~/notes"));
        assert_eq!(source.get_path("app.user", None).unwrap(), PathBuf::from("~bob/notes"));
    }

    #[test]
    fn process_source_uses_home_dir() {
        let mut source = ConfigSource::from_env().with_value("app.notes", "~/notes");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(source.get_path("app.notes", None).unwrap(), home.join("notes"));
        }
    }

    #[test]
    fn lookups_record_their_sources() {
        let mut source = ConfigSource::with_env(env(&[("LLM_MODEL", "gpt-4o")]));
        source.get_str("llm.model", Some("gpt-4")).unwrap();

        let item = source.item("llm.model").unwrap();
        assert_eq!(item.value, Value::from("gpt-4o"));
        assert_eq!(item.value_type, ConfigValueType::Str);
        let sources: Vec<ConfigSourceKind> = item.sources.iter().map(|s| s.source).collect();
        assert_eq!(sources, vec![ConfigSourceKind::Default, ConfigSourceKind::Env]);
    }

    #[test]
    fn llm_config_defaults() {
        let mut source = ConfigSource::with_env(HashMap::new()).with_value("llm.api_key", "sk-test");
        let config = LlmConfig::from_source(&mut source).unwrap();

        assert_eq!(
            config,
            LlmConfig {
                api_type: ApiType::OpenAi,
                api_base: "https://api.openai.com/v1".to_string(),
                api_key: "sk-test".to_string(),
                model: "gpt-4".to_string(),
                backup_model: "gpt-4".to_string(),
                api_version: "2023-07-01-preview".to_string(),
                response_format: ResponseFormat::Text,
                timeout_secs: 120,
            }
        );
    }

    #[test]
    fn llm_config_requires_api_key() {
        let mut source = ConfigSource::with_env(HashMap::new());
        assert!(matches!(
            LlmConfig::from_source(&mut source),
            Err(ConfigError::MissingKey(key)) if key == "llm.api_key"
        ));
    }

    #[test]
    fn llm_config_from_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("llm.yaml");
        fs::write(
            &path,
            "llm.api_type: azure\n\
             llm.api_base: https://example.openai.azure.com\n\
             llm.api_key: azure-key\n\
             llm.model: gpt-35-turbo\n\
             llm.response_format: json_object\n\
             llm.timeout_secs: 30\n",
        )
        .unwrap();

        let mut source = ConfigSource::with_env(HashMap::new()).with_file(&path).unwrap();
        let config = LlmConfig::from_source(&mut source).unwrap();
        assert_eq!(config.api_type, ApiType::Azure);
        assert_eq!(config.backup_model, "gpt-35-turbo");
        assert_eq!(config.response_format, ResponseFormat::JsonObject);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(source.file_path(), Some(path.as_path()));
    }

    #[test]
    fn config_file_must_be_an_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "[1, 2]").unwrap();

        assert!(matches!(
            ConfigSource::with_env(HashMap::new()).with_file(&path),
            Err(ConfigError::InvalidFile { .. })
        ));
    }
}
