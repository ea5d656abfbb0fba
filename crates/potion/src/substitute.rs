/*
 * substitute.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The substitution engine.
//!
//! Walks a token sequence with a single cursor. Static text is copied
//! through. A token resolves its lookup key through the `token` filter and
//! then runs its filter chain. When a matching closing token follows, the
//! tokens in between form a block:
//!
//! - a boolean value renders the block (true) or drops it (false);
//! - an array or object renders the block once per entry, against a
//!   derived context holding the entry's own fields plus `_key` and
//!   `_value`, and tags the first element of each rendering with a marker
//!   pointing at that context;
//! - any other value replaces the whole block with its string form.
//!
//! Rendering never fails. A lookup or filter error is logged and the token
//! renders as the empty string.

use crate::contexts::LocalContexts;
use crate::error::TemplateResult;
use crate::filters::{FilterCall, FilterRegistry, FilterSpec, builtin, split_key};
use crate::guard;
use crate::settings::{BlockMatching, Settings};
use crate::tokenizer::{Token, TokenCache};
use crate::value::{Map, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{trace, warn};

static FIRST_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z][A-Za-z0-9-]*)").expect("opening tag pattern is valid"));

/// Everything one substitution pass reads from and writes to.
pub struct Substitution<'a> {
    filters: &'a FilterRegistry,
    settings: &'a Settings,
    pattern: &'a Regex,
    cache: &'a TokenCache,
    contexts: &'a mut LocalContexts,
}

impl<'a> Substitution<'a> {
    /// `pattern` must be the token grammar compiled from `settings`, and
    /// `cache` must only ever have been filled with that grammar.
    pub fn new(
        filters: &'a FilterRegistry,
        settings: &'a Settings,
        pattern: &'a Regex,
        cache: &'a TokenCache,
        contexts: &'a mut LocalContexts,
    ) -> Self {
        Self {
            filters,
            settings,
            pattern,
            cache,
            contexts,
        }
    }

    /// Render `template` against `data`, leaving nested `<template>` blocks
    /// untouched.
    pub fn render(&mut self, template: &str, data: &Value) -> String {
        let protected = guard::protect(template);
        let tokens = self.cache.get_or_tokenize(&protected.text, self.pattern);
        let rendered = self.render_tokens(&tokens, data, &protected.text);
        guard::restore(&rendered, &protected.nested)
    }

    /// Render an already tokenized sequence. `template` is the source text
    /// handed to filters.
    pub fn render_tokens(&mut self, tokens: &[Token], data: &Value, template: &str) -> String {
        let mut out = String::new();
        let mut index = 0;

        while index < tokens.len() {
            match &tokens[index] {
                Token::Static { text } => {
                    out.push_str(text);
                    index += 1;
                }
                token if token.is_close() => {
                    trace!(token = token.source(), "skipping unmatched closing token");
                    index += 1;
                }
                Token::Token { key, .. } => {
                    let (lookup, specs) = split_key(key);
                    let value = self.resolve(lookup, &specs, data, template);

                    match self.find_close(tokens, index, lookup) {
                        Some(close) => {
                            self.render_block(value, &tokens[index + 1..close], data, &mut out);
                            index = close + 1;
                        }
                        None => {
                            out.push_str(&value.to_display_string());
                            index += 1;
                        }
                    }
                }
            }
        }
        out
    }

    fn resolve(&self, lookup: &str, specs: &[FilterSpec], data: &Value, template: &str) -> Value {
        self.try_resolve(lookup, specs, data, template)
            .unwrap_or_else(|err| {
                warn!(key = lookup, "{}", err);
                Value::String(String::new())
            })
    }

    fn try_resolve(
        &self,
        lookup: &str,
        specs: &[FilterSpec],
        data: &Value,
        template: &str,
    ) -> TemplateResult<Value> {
        let call = FilterCall::new(data, template, &[]);
        let mut value = self
            .filters
            .apply(builtin::TOKEN, Value::from(lookup), &call)?;
        for spec in specs {
            let call = FilterCall::new(data, template, &spec.args);
            value = self.filters.apply(&spec.name, value, &call)?;
        }
        Ok(value)
    }

    /// Index of the closing token for the opener at `open`, if any.
    ///
    /// In nested mode, same-key openers deepen the search. When the closers
    /// run out before the depth returns to zero, the inner "openers" were
    /// plain references and the first closer is used.
    fn find_close(&self, tokens: &[Token], open: usize, key: &str) -> Option<usize> {
        let nested = self.settings.block_matching == BlockMatching::Nested;
        let mut depth = 0usize;
        let mut first_close = None;
        for (index, token) in tokens.iter().enumerate().skip(open + 1) {
            if token.lookup_key() != Some(key) {
                continue;
            }
            if token.is_close() {
                if depth == 0 {
                    return Some(index);
                }
                first_close.get_or_insert(index);
                depth -= 1;
            } else if nested {
                depth += 1;
            }
        }
        first_close
    }

    fn render_block(&mut self, value: Value, inner: &[Token], data: &Value, out: &mut String) {
        let inner_template: String = inner.iter().map(Token::source).collect();
        match &value {
            Value::Bool(true) => {
                let rendered = self.render_tokens(inner, data, &inner_template);
                out.push_str(&rendered);
            }
            Value::Bool(false) => {}
            Value::Array(_) | Value::Object(_) => {
                for (key, entry) in value.entries() {
                    let context = loop_context(key, entry);
                    let rendered = self.render_tokens(inner, &context, &inner_template);
                    let id = self.contexts.register(context);
                    out.push_str(&mark_first_tag(rendered.trim(), &self.settings.marker, &id));
                }
            }
            other => out.push_str(&other.to_display_string()),
        }
    }
}

/// The context an iteration entry renders against: the entry's own fields,
/// then `_key` and `_value`.
fn loop_context(key: String, entry: Value) -> Value {
    let mut map = Map::new();
    if entry.is_collection() {
        for (k, v) in entry.entries() {
            map.insert(k, v);
        }
    }
    map.insert("_key".to_string(), Value::String(key));
    map.insert("_value".to_string(), entry);
    Value::object(map)
}

/// Add `marker="id"` to the first opening tag in `rendered`, wherever it
/// occurs. Markup without an element is returned unchanged.
pub fn mark_first_tag(rendered: &str, marker: &str, id: &str) -> String {
    FIRST_TAG
        .replace(rendered, |caps: &regex::Captures<'_>| {
            format!("<{} {}=\"{}\"", &caps[1], marker, id)
        })
        .into_owned()
}
