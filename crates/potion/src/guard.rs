/*
 * guard.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Protection of nested templates.
//!
//! A template may embed `<template>` definitions of its own, meant to be
//! rendered later by a separate call. Before the outer pass runs, each
//! embedded block is swapped for a placeholder; after substitution the
//! placeholders are swapped back, so the nested definitions are never
//! tokenized or substituted by the outer pass.

use once_cell::sync::Lazy;
use regex::Regex;

static NESTED_TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<template\b[^>]*>.*?</template>").expect("nested template pattern is valid")
});

/// A template string with its nested templates swapped out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    /// The template text with placeholders in place of nested templates.
    pub text: String,
    /// `(placeholder, original block)` pairs, in source order.
    pub nested: Vec<(String, String)>,
}

fn placeholder(index: usize) -> String {
    format!("__NESTED_TEMPLATE_{}__", index)
}

/// Replace every embedded `<template>...</template>` block with a unique
/// placeholder.
pub fn protect(template: &str) -> Protected {
    let mut nested = Vec::new();
    let text = NESTED_TEMPLATE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let marker = placeholder(nested.len());
            nested.push((marker.clone(), caps[0].to_string()));
            marker
        })
        .into_owned();
    Protected { text, nested }
}

/// Put the original blocks back in place of every occurrence of their
/// placeholders. An iteration block can repeat a placeholder, and each copy
/// gets the block.
pub fn restore(rendered: &str, nested: &[(String, String)]) -> String {
    let mut out = rendered.to_string();
    for (marker, block) in nested {
        out = out.replace(marker.as_str(), block);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_protect_and_restore() {
        let source = "<p>[a]</p><template data-name=\"row\"><li>[b]</li></template><TEMPLATE>[c]</TEMPLATE>";
        let protected = protect(source);

        assert_eq!(
            protected.text,
            "<p>[a]</p>__NESTED_TEMPLATE_0____NESTED_TEMPLATE_1__"
        );
        assert_eq!(protected.nested.len(), 2);
        assert_eq!(restore(&protected.text, &protected.nested), source);
    }

    #[test]
    fn test_restore_repeated_placeholder() {
        let nested = vec![(placeholder(0), "<template>x</template>".to_string())];
        assert_eq!(
            restore("__NESTED_TEMPLATE_0__|__NESTED_TEMPLATE_0__", &nested),
            "<template>x</template>|<template>x</template>"
        );
    }

    #[test]
    fn test_no_nested_templates() {
        let protected = protect("plain [x]");
        assert_eq!(protected.text, "plain [x]");
        assert!(protected.nested.is_empty());
    }
}
