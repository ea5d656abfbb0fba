/*
 * settings.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration.
//!
//! Settings deserialize from any serde format; every field has a default so
//! a configuration file only needs to name what it changes:
//!
//! ```toml
//! start = "{{"
//! end = "}}"
//! tag = "section"
//! class = "card shadow"
//! ```

use crate::error::{TemplateError, TemplateResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a block-opening token finds its closing token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockMatching {
    /// Track nesting depth per key; close only when every inner opener with
    /// the same key has been closed.
    #[default]
    Nested,

    /// Close at the first closing token with the same key, whatever the
    /// nesting. Matches templates written for the legacy engine.
    FirstMatch,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Opening token delimiter.
    pub start: String,

    /// Closing token delimiter.
    pub end: String,

    /// Regular expression for token keys. Defaults to one or more characters
    /// other than the first character of `end`.
    pub path: Option<String>,

    /// `type` attribute identifying template elements in a page.
    #[serde(rename = "type")]
    pub template_type: String,

    /// Attribute holding a template element's name.
    pub attr: String,

    /// Default container element for mounted templates.
    pub tag: String,

    /// Space-separated classes added to mounted containers.
    pub class: String,

    /// Attribute carrying the local-context id of an iteration block.
    pub marker: String,

    pub block_matching: BlockMatching,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start: "[".to_string(),
            end: "]".to_string(),
            path: None,
            template_type: "template/potion".to_string(),
            attr: "data-name".to_string(),
            tag: "div".to_string(),
            class: String::new(),
            marker: "data-potion-key".to_string(),
            block_matching: BlockMatching::Nested,
        }
    }
}

/// Per-mount overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    pub tag: Option<String>,
    pub class: Option<String>,
}

impl Settings {
    /// The key pattern in effect.
    pub fn key_pattern(&self) -> String {
        match &self.path {
            Some(path) => path.clone(),
            None => {
                let stop = self.end.chars().next().map(String::from).unwrap_or_default();
                format!("[^{}]+", regex::escape(&stop))
            }
        }
    }

    /// Compile the token grammar: `START [flag] KEY END`.
    pub fn token_regex(&self) -> TemplateResult<Regex> {
        if self.start.is_empty() || self.end.is_empty() {
            return Err(TemplateError::invalid_argument(
                "token delimiters must not be empty",
            ));
        }
        let pattern = format!(
            r"(?i){}\s*([!/]?)\s*({})\s*{}",
            regex::escape(&self.start),
            self.key_pattern(),
            regex::escape(&self.end)
        );
        Regex::new(&pattern).map_err(|e| {
            TemplateError::invalid_argument(format!("invalid key pattern '{}': {}", pattern, e))
        })
    }

    /// Settings with the per-mount overrides applied.
    pub fn merged(&self, options: &MountOptions) -> Settings {
        let mut merged = self.clone();
        if let Some(tag) = &options.tag {
            merged.tag = tag.clone();
        }
        if let Some(class) = &options.class {
            merged.class = class.clone();
        }
        merged
    }

    /// Classes from [`Settings::class`], split on whitespace.
    pub fn classes(&self) -> Vec<&str> {
        self.class.split_whitespace().collect()
    }
}
