//! Tour steps and tour definition files.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::TourError;
use crate::selector::Selector;

/// A single tour stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Target locators; written as one string or a list. Empty means the
    /// step needs no target and is shown immediately.
    #[serde(default, with = "selector_list")]
    pub selector: Vec<String>,

    /// Display metadata handed to the overlay unchanged
    #[serde(default)]
    pub content: serde_json::Value,

    /// Wait timeout for this step (falls back to the waiter's default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Step {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: vec![selector.into()],
            content: serde_json::Value::Null,
            timeout_ms: None,
        }
    }

    /// Step targeting several elements at once
    pub fn multi<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selector: selectors.into_iter().map(Into::into).collect(),
            content: serde_json::Value::Null,
            timeout_ms: None,
        }
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check that every selector parses
    pub fn validate(&self) -> Result<(), TourError> {
        for raw in &self.selector {
            Selector::parse(raw)?;
        }
        Ok(())
    }
}

/// Accepts `selector = "#a"` as well as `selector = ["#a", "#b"]`
mod selector_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub fn serialize<S: Serializer>(value: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            [single] => single.serialize(serializer),
            many => many.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        })
    }
}

/// What the sequencer does when a step's targets never appear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTargetPolicy {
    /// Skip the step and move on to the next one
    #[default]
    Skip,
    /// End the tour at the first unresolvable step
    Finish,
}

/// Tour file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourDefinition {
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the configured policy for this tour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_target: Option<MissingTargetPolicy>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl TourDefinition {
    /// Load a tour file, choosing the format from its extension
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tour file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let tour: TourDefinition = match ext.as_str() {
            "json" => serde_json::from_str(&text).context("Failed to parse JSON tour")?,
            "yaml" | "yml" => serde_yaml::from_str(&text).context("Failed to parse YAML tour")?,
            "toml" => toml::from_str(&text).context("Failed to parse TOML tour")?,
            other => return Err(TourError::UnsupportedFormat(other.to_string()).into()),
        };

        tour.validate()
            .with_context(|| format!("Invalid tour {}", path.display()))?;
        tracing::debug!(path = %path.display(), steps = tour.steps.len(), "tour loaded");
        Ok(tour)
    }

    /// Report the first step with an unparseable selector
    pub fn validate(&self) -> Result<(), TourError> {
        for (index, step) in self.steps.iter().enumerate() {
            step.validate().map_err(|e| TourError::InvalidStep {
                index,
                source: Box::new(e),
            })?;
        }
        Ok(())
    }
}
