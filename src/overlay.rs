//! Overlay port: the visual layer the sequencer drives.

use std::io::Write;
use std::sync::Mutex;

use anyhow::Result;

use crate::document::ElementHandle;
use crate::tour::Step;

/// Renders and removes the focus/tooltip for a step.
///
/// Both calls are fire-and-forget from the sequencer's side: errors are
/// logged at the call site and never change tour state.
pub trait OverlayPort: Send + Sync {
    /// Show `step` over its resolved targets (in selector order)
    fn show(&self, step: &Step, targets: &[ElementHandle]) -> Result<()>;

    /// Remove whatever is currently shown
    fn hide(&self) -> Result<()>;
}

/// Text overlay for terminals
pub struct ConsoleOverlay {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleOverlay {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("console overlay writer poisoned"))?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

/// One-line rendering of opaque step content
pub fn describe_content(content: &serde_json::Value) -> String {
    use serde_json::Value;

    match content {
        Value::Null => "(no content)".to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            let title = map.get("title").and_then(Value::as_str);
            let body = map.get("body").and_then(Value::as_str);
            match (title, body) {
                (Some(t), Some(b)) => format!("{t}: {b}"),
                (Some(t), None) => t.to_string(),
                (None, Some(b)) => b.to_string(),
                (None, None) => content.to_string(),
            }
        }
        other => other.to_string(),
    }
}

impl OverlayPort for ConsoleOverlay {
    fn show(&self, step: &Step, targets: &[ElementHandle]) -> Result<()> {
        let anchors = if targets.is_empty() {
            "page".to_string()
        } else {
            targets
                .iter()
                .map(|t| format!("{} (node {})", t.selector, t.node.0))
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.write_line(&format!("▶ {} [{}]", describe_content(&step.content), anchors))
    }

    fn hide(&self) -> Result<()> {
        self.write_line("■ overlay hidden")
    }
}
