use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl EffortLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffortLevel::Minimal => "minimal",
            EffortLevel::Low => "low",
            EffortLevel::Medium => "medium",
            EffortLevel::High => "high",
        }
    }
}

/// Static per-backend request shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shaping {
    #[default]
    Default,
    ReasoningEffort(EffortLevel),
    ReasoningBudget(u32),
}

impl Shaping {
    /// Request keys this shaping adds on top of the base chat request.
    pub fn request_overrides(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut out = serde_json::Map::new();
        match self {
            Shaping::Default => {}
            Shaping::ReasoningEffort(level) => {
                out.insert("reasoning_effort".into(), level.as_str().into());
            }
            Shaping::ReasoningBudget(tokens) => {
                out.insert(
                    "reasoning".into(),
                    serde_json::json!({ "max_tokens": tokens }),
                );
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSpec {
    /// Display name, also the key results are grouped under.
    pub name: String,
    /// Provider-side model identifier.
    pub model: String,
    #[serde(default)]
    pub shaping: Shaping,
}

impl BackendSpec {
    pub fn new(name: &str, model: &str, shaping: Shaping) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            shaping,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub backends: Vec<BackendSpec>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            backends: vec![
                BackendSpec::new(
                    "Claude Sonnet 4.5",
                    "anthropic/claude-sonnet-4.5",
                    Shaping::Default,
                ),
                BackendSpec::new(
                    "Gemini 2.5 Flash",
                    "google/gemini-2.5-flash",
                    Shaping::ReasoningBudget(0),
                ),
                BackendSpec::new("Gemini 2.5 Pro", "google/gemini-2.5-pro", Shaping::Default),
                BackendSpec::new(
                    "DeepSeek v3",
                    "deepseek/deepseek-chat-v3-0324",
                    Shaping::Default,
                ),
                BackendSpec::new(
                    "GPT-5",
                    "openai/gpt-5",
                    Shaping::ReasoningEffort(EffortLevel::Low),
                ),
                BackendSpec::new("Grok 4 Fast", "x-ai/grok-4-fast", Shaping::Default),
            ],
        }
    }
}

impl Roster {
    pub fn new(backends: Vec<BackendSpec>) -> anyhow::Result<Self> {
        let roster = Self { backends };
        roster.validate()?;
        Ok(roster)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&BackendSpec> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backends.is_empty() {
            anyhow::bail!("roster has no backends");
        }
        let mut seen = HashSet::new();
        for b in &self.backends {
            if b.name.trim().is_empty() {
                anyhow::bail!("roster entry with empty name (model: {})", b.model);
            }
            if b.model.trim().is_empty() {
                anyhow::bail!("roster entry '{}' has no model id", b.name);
            }
            if !seen.insert(b.name.as_str()) {
                anyhow::bail!("duplicate roster entry: {}", b.name);
            }
        }
        Ok(())
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let mut ignored = Vec::new();
        let deserializer = serde_yaml::Deserializer::from_str(raw);
        let roster: Roster = serde_ignored::deserialize(deserializer, |path| {
            ignored.push(path.to_string());
        })
        .context("failed to parse roster YAML")?;

        if !ignored.is_empty() {
            tracing::warn!(event = "roster.unknown_fields", fields = ?ignored);
        }

        roster.validate()?;
        Ok(roster)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read roster {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid roster {}", path.display()))
    }
}

pub fn write_sample_roster(path: &Path) -> anyhow::Result<()> {
    std::fs::write(
        path,
        r#"backends:
  - name: Claude Sonnet 4.5
    model: anthropic/claude-sonnet-4.5
  - name: Gemini 2.5 Flash
    model: google/gemini-2.5-flash
    shaping:
      reasoning_budget: 0
  - name: DeepSeek v3
    model: deepseek/deepseek-chat-v3-0324
  - name: GPT-5
    model: openai/gpt-5
    shaping:
      reasoning_effort: low
  - name: Grok 4 Fast
    model: x-ai/grok-4-fast
"#,
    )
    .with_context(|| format!("failed to write sample roster {}", path.display()))?;
    Ok(())
}
