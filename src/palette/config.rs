//! Team configuration: the flat key/value [`ConfigMap`], explicit per-slot [`WorkerSpec`]s, and
//! their resolution into an ordered roster description.
//!
//! Worker slots are numbered from 1. Each slot `i` reads the keys
//!
//! | key                 | required for slots 1 and 2 | notes                                  |
//! |---------------------|----------------------------|----------------------------------------|
//! | `provider_i`        | yes                        | `ollama`, `openai`, `azure_openai`, ... |
//! | `agent_i`           | yes                        | model / deployment name                |
//! | `system_message_i`  | yes                        |                                        |
//! | `description_i`     | yes                        |                                        |
//! | `api_key_i`         |                            |                                        |
//! | `behaviour_i`       |                            | worker name; defaults per slot         |
//! | `max_tokens_i`      |                            | forwarded to the model                 |
//! | `endpoint_i`        |                            | base URL override                      |
//!
//! Every field resolves with the precedence **explicit [`WorkerSpec`] value > [`ConfigMap`]
//! entry > none**; empty strings count as none. Slots 3 and up are optional and join the roster
//! only when both `agent_i` and `provider_i` resolve.
//!
//! # Example
//!
//! ```
//! use palette::config::{resolve_slots, ConfigMap, WorkerSpec};
//! use std::collections::BTreeMap;
//!
//! let config = ConfigMap::new()
//!     .with("provider_1", "ollama").with("agent_1", "llama3")
//!     .with("system_message_1", "You write code.").with("description_1", "coder")
//!     .with("provider_2", "ollama").with("agent_2", "llama3")
//!     .with("description_2", "reviewer");
//!
//! let mut explicit = BTreeMap::new();
//! explicit.insert(2, WorkerSpec::new().with_system_message("Review it. Say Approve when done."));
//!
//! let slots = resolve_slots(&explicit, &config).unwrap();
//! assert_eq!(slots.len(), 2);
//! assert_eq!(slots[0].name, "primary");
//! assert_eq!(slots[1].name, "critic");
//! ```

use crate::palette::clients::provider::{ClientSpec, ModelProvider};
use crate::palette::error::ConfigurationError;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([^}{]+)\}").expect("valid env var pattern");
    static ref SLOT_KEY: Regex =
        Regex::new(r"^(?:provider|agent)_(\d+)$").expect("valid slot key pattern");
}

/// Worker names used when `behaviour_i` is not given, by slot.
pub const DEFAULT_BEHAVIOURS: &[&str] = &["primary", "critic", "advisor", "executor"];
/// Termination phrase used when `termination_text` is not given.
pub const DEFAULT_TERMINATION_TEXT: &str = "Approve";
/// Run threshold used when `token_threshold` is not given.
pub const DEFAULT_TOKEN_THRESHOLD: usize = 10;

/// Flat configuration object, typically loaded from a JSON or YAML file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMap {
    values: Map<String, Value>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON object. `${VAR}` references are expanded.
    pub fn from_value(value: Value) -> Result<Self, ConfigurationError> {
        match expand_env_vars(value) {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::default()),
            other => Err(ConfigurationError::File(format!(
                "top level must be a mapping, found {}",
                json_type(&other)
            ))),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ConfigurationError::File(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| ConfigurationError::File(format!("invalid YAML: {}", e)))?;
        Self::from_value(value)
    }

    /// Load a `.json`, `.yaml` or `.yml` file. Other extensions are rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let read = || {
            std::fs::read_to_string(path).map_err(|e| {
                ConfigurationError::File(format!("cannot read {}: {}", path.display(), e))
            })
        };

        let config = match ext.as_str() {
            "json" => Self::from_json_str(&read()?)?,
            "yaml" | "yml" => Self::from_yaml_str(&read()?)?,
            _ => {
                return Err(ConfigurationError::File(format!(
                    "Unsupported config file format: .{}",
                    ext
                )))
            }
        };
        log::info!(
            "loaded {} config keys from {}",
            config.values.len(),
            path.display()
        );
        Ok(config)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// String view of a scalar entry. Null, empty strings, arrays and objects read as `None`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Non-negative integer entry; numeric strings are accepted.
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidValue {
            field: key.to_string(),
            reason,
        };
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|v| Some(v as usize))
                .ok_or_else(|| invalid(format!("expected a non-negative integer, got {}", n))),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|e| invalid(format!("'{}': {}", s, e))),
            Some(other) => Err(invalid(format!(
                "expected a number, found {}",
                json_type(other)
            ))),
        }
    }

    /// Slot indices (≥ 1) mentioned by a `provider_i` or `agent_i` key.
    pub fn slot_indices(&self) -> BTreeSet<usize> {
        self.keys()
            .filter_map(|key| SLOT_KEY.captures(key))
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .filter(|i| *i >= 1)
            .collect()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

/// Replace every `${VAR}` in `text` with the environment value (unset → empty).
pub fn expand_env_str(text: &str) -> String {
    ENV_VAR
        .replace_all(text, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Recursively expand `${VAR}` references in every string of a JSON value.
pub fn expand_env_vars(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(expand_env_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(expand_env_vars).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, expand_env_vars(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Explicit settings for one worker slot. Unset fields fall back to the [`ConfigMap`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerSpec {
    pub provider: Option<String>,
    pub agent: Option<String>,
    pub system_message: Option<String>,
    pub description: Option<String>,
    pub api_key: Option<String>,
    pub behaviour: Option<String>,
    pub max_tokens: Option<usize>,
    pub endpoint: Option<String>,
}

impl WorkerSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_behaviour(mut self, behaviour: impl Into<String>) -> Self {
        self.behaviour = Some(behaviour.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// A slot after precedence resolution, ready to become a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSlot {
    pub index: usize,
    /// Worker name (the resolved `behaviour_i`).
    pub name: String,
    pub description: String,
    pub system_message: String,
    pub client: ClientSpec,
}

/// Explicit value if it is non-empty, otherwise the config entry.
fn resolve_field(explicit: Option<&String>, config: &ConfigMap, key: &str) -> Option<String> {
    explicit
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .or_else(|| config.get_str(key))
}

/// Resolve every slot against the config.
///
/// Missing required fields of slots 1 and 2 are all reported together, in slot order, before
/// anything else is validated.
pub fn resolve_slots(
    explicit: &BTreeMap<usize, WorkerSpec>,
    config: &ConfigMap,
) -> Result<Vec<ResolvedSlot>, ConfigurationError> {
    let indices: BTreeSet<usize> = [1, 2]
        .into_iter()
        .chain(explicit.keys().copied())
        .chain(config.slot_indices())
        .filter(|index| *index > 0)
        .collect();

    struct Draft {
        index: usize,
        provider: Option<String>,
        agent: Option<String>,
        system_message: Option<String>,
        description: Option<String>,
        spec: Option<WorkerSpec>,
    }

    let mut missing = Vec::new();
    let mut drafts = Vec::new();

    for index in indices {
        let spec = explicit.get(&index);
        let key = |name: &str| format!("{}_{}", name, index);

        let draft = Draft {
            index,
            provider: resolve_field(spec.and_then(|s| s.provider.as_ref()), config, &key("provider")),
            agent: resolve_field(spec.and_then(|s| s.agent.as_ref()), config, &key("agent")),
            system_message: resolve_field(
                spec.and_then(|s| s.system_message.as_ref()),
                config,
                &key("system_message"),
            ),
            description: resolve_field(
                spec.and_then(|s| s.description.as_ref()),
                config,
                &key("description"),
            ),
            spec: spec.cloned(),
        };

        if index <= 2 {
            for (name, value) in [
                ("provider", &draft.provider),
                ("agent", &draft.agent),
                ("system_message", &draft.system_message),
                ("description", &draft.description),
            ] {
                if value.is_none() {
                    missing.push(format!("{}_{}", name, index));
                }
            }
            drafts.push(draft);
        } else if draft.provider.is_some() && draft.agent.is_some() {
            drafts.push(draft);
        } else {
            log::debug!("slot {} skipped: no provider/agent", index);
        }
    }

    if !missing.is_empty() {
        return Err(ConfigurationError::MissingFields(missing));
    }

    let mut names = HashSet::new();
    let mut slots = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let index = draft.index;
        let spec = draft.spec.as_ref();
        let key = |name: &str| format!("{}_{}", name, index);

        let provider_name = draft.provider.unwrap_or_default();
        let provider: ModelProvider =
            provider_name
                .parse()
                .map_err(|reason| ConfigurationError::InvalidValue {
                    field: key("provider"),
                    reason,
                })?;

        let name = resolve_field(spec.and_then(|s| s.behaviour.as_ref()), config, &key("behaviour"))
            .unwrap_or_else(|| match DEFAULT_BEHAVIOURS.get(index - 1) {
                Some(default) => default.to_string(),
                None => format!("worker_{}", index),
            });
        if !names.insert(name.clone()) {
            return Err(ConfigurationError::InvalidValue {
                field: key("behaviour"),
                reason: format!("duplicate worker name '{}'", name),
            });
        }

        let max_tokens = match spec.and_then(|s| s.max_tokens) {
            Some(n) => Some(n),
            None => config.get_usize(&key("max_tokens"))?,
        };

        slots.push(ResolvedSlot {
            index,
            name,
            description: draft.description.unwrap_or_default(),
            system_message: draft.system_message.unwrap_or_default(),
            client: ClientSpec {
                provider,
                model: draft.agent.unwrap_or_default(),
                api_key: resolve_field(spec.and_then(|s| s.api_key.as_ref()), config, &key("api_key")),
                endpoint: resolve_field(
                    spec.and_then(|s| s.endpoint.as_ref()),
                    config,
                    &key("endpoint"),
                ),
                max_tokens,
            },
        });
    }

    Ok(slots)
}
