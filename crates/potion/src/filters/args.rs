/*
 * filters/args.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Filter chain parsing.
//!
//! A token key carries its filter chain after the lookup key:
//! `title | truncate: 20, "..." | uppercase`. Each spec is a name,
//! optionally followed by `:` and a comma-separated argument list whose
//! entries may be double-quoted, single-quoted or bare.

use once_cell::sync::Lazy;
use regex::Regex;

static ARGUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:"([^"]*)"|'([^']*)'|([^,]+))\s*(?:,\s*)?"#)
        .expect("filter argument pattern is valid")
});

/// A parsed `name:args` filter spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub name: String,
    pub args: Vec<String>,
}

impl FilterSpec {
    /// Parse a single spec such as `truncate: 10, "..."`.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        match spec.split_once(':') {
            Some((name, args)) => FilterSpec {
                name: name.trim().to_string(),
                args: parse_arguments(args),
            },
            None => FilterSpec {
                name: spec.to_string(),
                args: Vec::new(),
            },
        }
    }
}

/// Split a token key into its lookup key and filter specs.
pub fn split_key(key: &str) -> (&str, Vec<FilterSpec>) {
    let mut parts = key.split('|');
    let lookup = parts.next().unwrap_or_default().trim();
    let filters = parts
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(FilterSpec::parse)
        .collect();
    (lookup, filters)
}

/// Parse a filter argument list. Quoted arguments are taken verbatim (and
/// may contain commas); bare arguments are trimmed.
pub fn parse_arguments(text: &str) -> Vec<String> {
    ARGUMENT
        .captures_iter(text.trim())
        .filter_map(|caps| {
            if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                Some(m.as_str().to_string())
            } else {
                caps.get(3).map(|m| m.as_str().trim().to_string())
            }
        })
        .collect()
}
