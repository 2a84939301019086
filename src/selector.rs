//! Locator parsing and matching.
//!
//! Supports the subset of CSS selectors a tour needs to point at a mounted
//! element: a tag name (or `*`), any number of `#id` and `.class` parts, and
//! comma-separated groups. Combinators, attributes and pseudo-classes are
//! rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::document::Element;
use crate::error::TourError;

static COMPOUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*|[A-Za-z][A-Za-z0-9-]*)?((?:[#.][A-Za-z_-][A-Za-z0-9_-]*)*)$")
        .expect("compound selector pattern is valid")
});

static SIMPLE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([#.])([A-Za-z_-][A-Za-z0-9_-]*)").expect("part pattern is valid"));

/// One compound selector such as `button#save.primary`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl Compound {
    fn parse(raw: &str, full: &str) -> Result<Self, TourError> {
        let invalid = |reason: &str| TourError::InvalidSelector {
            selector: full.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("empty selector"));
        }
        if raw.contains(char::is_whitespace) || raw.contains(['>', '+', '~']) {
            return Err(invalid("combinators are not supported"));
        }
        if raw.contains('[') {
            return Err(invalid("attribute selectors are not supported"));
        }
        if raw.contains(':') {
            return Err(invalid("pseudo-classes are not supported"));
        }

        let caps = COMPOUND
            .captures(raw)
            .ok_or_else(|| invalid("malformed compound selector"))?;

        let mut compound = Compound {
            tag: caps
                .get(1)
                .map(|m| m.as_str())
                .filter(|t| *t != "*")
                .map(str::to_ascii_lowercase),
            ..Compound::default()
        };

        let parts = caps.get(2).map_or("", |m| m.as_str());
        for part in SIMPLE_PART.captures_iter(parts) {
            let name = part[2].to_string();
            if &part[1] == "#" {
                if compound.id.as_ref().is_some_and(|id| *id != name) {
                    return Err(invalid("conflicting id parts"));
                }
                compound.id = Some(name);
            } else {
                compound.classes.push(name);
            }
        }

        Ok(compound)
    }

    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes
            .iter()
            .all(|class| element.classes.iter().any(|c| c == class))
    }
}

/// A parsed locator: matches when any of its compounds matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    group: Vec<Compound>,
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self, TourError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TourError::InvalidSelector {
                selector: raw.to_string(),
                reason: "empty selector".to_string(),
            });
        }

        let group = trimmed
            .split(',')
            .map(|part| Compound::parse(part.trim(), raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            group,
        })
    }

    pub fn compounds(&self) -> &[Compound] {
        &self.group
    }

    pub fn matches(&self, element: &Element) -> bool {
        self.group.iter().any(|c| c.matches(element))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
