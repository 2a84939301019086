//! Scripted element mounts for driving a [`MemoryDocument`] from a file.
//!
//! A fixture stands in for the host application's views: each entry mounts
//! an element after a delay and optionally unmounts it later.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::document::{Element, MemoryDocument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureElement {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default)]
    pub appear_after_ms: u64,
    #[serde(default)]
    pub remove_after_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub elements: Vec<FixtureElement>,
}

impl Fixture {
    /// Load a fixture from JSON, YAML or TOML (by extension)
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match ext {
            "yaml" | "yml" => serde_yaml::from_str(&text).context("Failed to parse YAML fixture"),
            "toml" => toml::from_str(&text).context("Failed to parse TOML fixture"),
            _ => serde_json::from_str(&text).context("Failed to parse JSON fixture"),
        }
    }

    /// Schedule every mount (and unmount) against `doc`.
    ///
    /// Elements with no delay are mounted before this returns.
    pub fn apply(&self, doc: &MemoryDocument) {
        for entry in &self.elements {
            let appear = Duration::from_millis(entry.appear_after_ms);
            let remove = entry.remove_after_ms.map(Duration::from_millis);

            if appear.is_zero() {
                let node = doc.insert(entry.element.clone());
                if let Some(remove) = remove {
                    doc.unmount_after(remove, node);
                }
                continue;
            }

            let doc = doc.clone();
            let element = entry.element.clone();
            tokio::spawn(async move {
                tokio::time::sleep(appear).await;
                let node = doc.insert(element);
                if let Some(remove) = remove {
                    tokio::time::sleep(remove.saturating_sub(appear)).await;
                    doc.remove(node);
                }
            });
        }
        tracing::debug!(elements = self.elements.len(), "fixture applied");
    }
}
