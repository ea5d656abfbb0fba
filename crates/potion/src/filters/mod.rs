/*
 * filters/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named, prioritized value transformations.
//!
//! Every name maps to a list of entries kept sorted by ascending priority;
//! entries with equal priority run in registration order. Applying a name
//! folds all of its entries over the input value. A name nobody registered
//! is the identity.

pub mod args;
pub mod builtin;

use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub use args::{FilterSpec, parse_arguments, split_key};

/// What a filter returns. `Ok(None)` means "no value" and is rendered as the
/// empty string.
pub type FilterResult = TemplateResult<Option<Value>>;

/// A registered filter function.
pub type FilterFn = Rc<dyn Fn(Value, &FilterCall<'_>) -> FilterResult>;

/// The context a filter runs in: the render data, the template text being
/// rendered, and the string arguments from the filter chain.
#[derive(Debug, Clone, Copy)]
pub struct FilterCall<'a> {
    pub data: &'a Value,
    pub template: &'a str,
    pub args: &'a [String],
}

impl<'a> FilterCall<'a> {
    pub fn new(data: &'a Value, template: &'a str, args: &'a [String]) -> Self {
        Self {
            data,
            template,
            args,
        }
    }

    /// Argument `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).map(String::as_str)
    }

    /// Argument `index` parsed as a number. `None` when absent or not numeric.
    pub fn number_arg(&self, index: usize) -> Option<f64> {
        self.arg(index).and_then(crate::value::parse_number)
    }
}

#[derive(Clone)]
struct FilterEntry {
    func: FilterFn,
    priority: i32,
}

/// The filter registry.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Vec<FilterEntry>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry")
            .field("names", &names)
            .finish()
    }
}

impl FilterRegistry {
    /// An empty registry. Without the `token` filter nothing resolves; use
    /// [`FilterRegistry::with_builtins`] for a working engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the `token` lookup filter and the built-in
    /// catalogue.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::install(&mut registry);
        registry
    }

    /// Register `func` under `name` at `priority`.
    ///
    /// Names must be non-empty and free of `|`, `:` and whitespace, since
    /// those characters delimit filter chains in token keys.
    pub fn register<F>(&mut self, name: &str, func: F, priority: i32) -> TemplateResult<()>
    where
        F: Fn(Value, &FilterCall<'_>) -> FilterResult + 'static,
    {
        validate_name(name)?;
        self.insert(name, Rc::new(func), priority);
        Ok(())
    }

    pub(crate) fn insert(&mut self, name: &str, func: FilterFn, priority: i32) {
        let entries = self.filters.entry(name.to_string()).or_default();
        entries.push(FilterEntry { func, priority });
        // Stable: equal priorities keep registration order.
        entries.sort_by_key(|entry| entry.priority);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Number of entries registered under `name`.
    pub fn entry_count(&self, name: &str) -> usize {
        self.filters.get(name).map_or(0, Vec::len)
    }

    /// Drop every entry registered under `name`.
    pub fn remove(&mut self, name: &str) -> bool {
        self.filters.remove(name).is_some()
    }

    /// Fold every entry registered under `name` over `value`.
    ///
    /// An entry that yields no value hands the empty string to the next one.
    /// The first failing entry aborts the fold.
    pub fn apply(&self, name: &str, value: Value, call: &FilterCall<'_>) -> TemplateResult<Value> {
        let Some(entries) = self.filters.get(name) else {
            return Ok(value);
        };
        entries.iter().try_fold(value, |acc, entry| {
            let next = (entry.func)(acc, call)?;
            Ok(next.unwrap_or_else(|| Value::String(String::new())))
        })
    }
}

fn validate_name(name: &str) -> TemplateResult<()> {
    if name.is_empty() {
        return Err(TemplateError::invalid_argument(
            "filter name must not be empty",
        ));
    }
    if name
        .chars()
        .any(|c| c == '|' || c == ':' || c.is_whitespace())
    {
        return Err(TemplateError::invalid_argument(format!(
            "filter name '{}' must not contain '|', ':' or whitespace",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call<'a>(data: &'a Value, args: &'a [String]) -> FilterCall<'a> {
        FilterCall::new(data, "", args)
    }

    #[test]
    fn test_priority_order_is_ascending() {
        let mut registry = FilterRegistry::new();
        for priority in [5, 1, 3] {
            registry
                .register(
                    "trace",
                    move |value: Value, _: &FilterCall<'_>| {
                        Ok(Some(Value::from(format!(
                            "{}{}",
                            value.to_display_string(),
                            priority
                        ))))
                    },
                    priority,
                )
                .unwrap();
        }

        let data = Value::Null;
        let result = registry.apply("trace", Value::from(""), &call(&data, &[])).unwrap();
        assert_eq!(result, Value::from("135"));
    }

    #[test]
    fn test_equal_priorities_keep_registration_order() {
        let mut registry = FilterRegistry::new();
        for tag in ["a", "b", "c"] {
            registry
                .register(
                    "tags",
                    move |value: Value, _: &FilterCall<'_>| {
                        Ok(Some(Value::from(value.to_display_string() + tag)))
                    },
                    0,
                )
                .unwrap();
        }
        let data = Value::Null;
        let result = registry.apply("tags", Value::from(">"), &call(&data, &[])).unwrap();
        assert_eq!(result, Value::from(">abc"));
    }

    #[test]
    fn test_no_value_becomes_empty_string() {
        let mut registry = FilterRegistry::new();
        registry
            .register("nothing", |_: Value, _: &FilterCall<'_>| Ok(None), 0)
            .unwrap();
        let data = Value::Null;
        let result = registry.apply("nothing", Value::from(42), &call(&data, &[])).unwrap();
        assert_eq!(result, Value::from(""));
    }

    #[test]
    fn test_unregistered_name_is_identity() {
        let registry = FilterRegistry::new();
        let data = Value::Null;
        let result = registry.apply("missing", Value::from(7), &call(&data, &[])).unwrap();
        assert_eq!(result, Value::from(7));
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let mut registry = FilterRegistry::new();
        for name in ["", "a|b", "a:b", "a b"] {
            let err = registry
                .register(name, |v: Value, _: &FilterCall<'_>| Ok(Some(v)), 0)
                .unwrap_err();
            assert!(matches!(err, TemplateError::InvalidArgument { .. }), "{}", name);
        }
        assert!(!registry.contains(""));
    }

    #[test]
    fn test_failure_aborts_fold() {
        let mut registry = FilterRegistry::new();
        registry
            .register(
                "boom",
                |_: Value, _: &FilterCall<'_>| Err(TemplateError::filter("boom", "exploded")),
                0,
            )
            .unwrap();
        let data = Value::Null;
        let err = registry.apply("boom", Value::Null, &call(&data, &[])).unwrap_err();
        assert_eq!(err.to_string(), "Filter 'boom' failed: exploded");
    }

    #[test]
    fn test_number_arg() {
        let data = Value::Null;
        let args = vec!["2".to_string(), "x".to_string()];
        let c = call(&data, &args);
        assert_eq!(c.number_arg(0), Some(2.0));
        assert_eq!(c.number_arg(1), None);
        assert_eq!(c.number_arg(2), None);
    }
}
