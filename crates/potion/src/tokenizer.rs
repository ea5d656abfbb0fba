/*
 * tokenizer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template tokenization and the token cache.
//!
//! A template is split in one linear scan into static text and delimited
//! tokens. Tokenization never fails: anything that does not match the token
//! grammar stays in the static segments.

use regex::Regex;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// The optional flag between the opening delimiter and the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    /// No flag: a simple substitution or a block opener.
    Open,
    /// `!`: reserved; rendered like [`Flag::Open`].
    Reserved,
    /// `/`: a block closer.
    Close,
}

impl Flag {
    fn parse(text: &str) -> Self {
        match text {
            "!" => Flag::Reserved,
            "/" => Flag::Close,
            _ => Flag::Open,
        }
    }
}

/// A segment of a tokenized template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Token {
    /// Literal text, copied to the output verbatim.
    Static { text: String },

    /// A delimited token. `key` is the lookup key with its filter chain;
    /// `raw` is the exact matched source text.
    Token {
        flag: Flag,
        key: String,
        raw: String,
    },
}

impl Token {
    pub fn is_close(&self) -> bool {
        matches!(self, Token::Token { flag: Flag::Close, .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Token::Token {
                flag: Flag::Open | Flag::Reserved,
                ..
            }
        )
    }

    /// The lookup key without filters, trimmed. `None` for static segments.
    pub fn lookup_key(&self) -> Option<&str> {
        match self {
            Token::Token { key, .. } => Some(key.split('|').next().unwrap_or_default().trim()),
            Token::Static { .. } => None,
        }
    }

    /// The source text this segment was produced from.
    pub fn source(&self) -> &str {
        match self {
            Token::Static { text } => text,
            Token::Token { raw, .. } => raw,
        }
    }
}

/// Split `template` into static and token segments.
///
/// `pattern` must capture the flag in group 1 and the key in group 2, as
/// produced by [`Settings::token_regex`](crate::Settings::token_regex).
pub fn tokenize(template: &str, pattern: &Regex) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for caps in pattern.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            tokens.push(Token::Static {
                text: template[last..whole.start()].to_string(),
            });
        }
        tokens.push(Token::Token {
            flag: Flag::parse(caps.get(1).map_or("", |m| m.as_str())),
            key: caps.get(2).map_or("", |m| m.as_str()).to_string(),
            raw: whole.as_str().to_string(),
        });
        last = whole.end();
    }

    if last < template.len() {
        tokens.push(Token::Static {
            text: template[last..].to_string(),
        });
    }
    tokens
}

/// Memoized tokenization keyed by the exact template string.
///
/// Entries are never evicted. The cache does not know which delimiters
/// produced an entry, so it must be cleared whenever the token grammar
/// changes; [`Engine::configure`](crate::Engine::configure) does this.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: RefCell<HashMap<String, Rc<[Token]>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens for `template`, tokenizing and caching on first use.
    pub fn get_or_tokenize(&self, template: &str, pattern: &Regex) -> Rc<[Token]> {
        if let Some(tokens) = self.entries.borrow().get(template) {
            return Rc::clone(tokens);
        }
        let tokens: Rc<[Token]> = tokenize(template, pattern).into();
        debug!(
            segments = tokens.len(),
            bytes = template.len(),
            "tokenized template"
        );
        self.entries
            .borrow_mut()
            .insert(template.to_string(), Rc::clone(&tokens));
        tokens
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}
