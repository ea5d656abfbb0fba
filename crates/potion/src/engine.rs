/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The template engine.
//!
//! An [`Engine`] owns everything rendering depends on: settings and the
//! token grammar compiled from them, the filter registry, the token cache,
//! named templates, the registry of iteration contexts and the store. It is
//! a cheap handle; clones share the same state.
//!
//! A render runs the lifecycle hooks around substitution:
//!
//! 1. `init`, on the first render of the engine only;
//! 2. `templateBefore`;
//! 3. name resolution: text without the start delimiter that names a
//!    registered template is replaced by that template;
//! 4. `template`;
//! 5. substitution, with nested `<template>` blocks protected;
//! 6. `templateAfter`.
//!
//! Hooks are ordinary filters registered under those names. Each receives
//! the template text as its value and returns the text to continue with.

use crate::contexts::LocalContexts;
use crate::error::TemplateResult;
use crate::filters::{FilterCall, FilterRegistry, FilterResult};
use crate::settings::Settings;
use crate::substitute::Substitution;
use crate::templates::TemplateRegistry;
use crate::tokenizer::TokenCache;
use crate::value::{Map, Value};
use potion_dom::{Document, NodeId};
use regex::Regex;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use tracing::debug;

/// Name of the hook run on an engine's first render.
pub const HOOK_INIT: &str = "init";
/// Name of the hook run on the raw template text.
pub const HOOK_TEMPLATE_BEFORE: &str = "templateBefore";
/// Name of the hook run on the resolved template text.
pub const HOOK_TEMPLATE: &str = "template";
/// Name of the hook run on the rendered output.
pub const HOOK_TEMPLATE_AFTER: &str = "templateAfter";

/// Key under which every render sees the engine's store.
pub const STORE_KEY: &str = "$store";

/// A template engine handle.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

struct EngineInner {
    settings: RefCell<Settings>,
    pattern: RefCell<Regex>,
    filters: RefCell<FilterRegistry>,
    templates: RefCell<TemplateRegistry>,
    cache: TokenCache,
    contexts: RefCell<LocalContexts>,
    store: RefCell<Value>,
    initialized: Cell<bool>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &*self.inner.settings.borrow())
            .field("templates", &self.inner.templates.borrow().len())
            .field("cached_templates", &self.inner.cache.len())
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with default settings and the built-in filters.
    pub fn new() -> Self {
        let settings = Settings::default();
        let pattern = settings
            .token_regex()
            .expect("default token grammar compiles");
        Self::build(settings, pattern, FilterRegistry::with_builtins())
    }

    /// An engine with `settings` and the built-in filters.
    pub fn with_settings(settings: Settings) -> TemplateResult<Self> {
        Self::with_registry(settings, FilterRegistry::with_builtins())
    }

    /// An engine with `settings` rendering through `filters`.
    pub fn with_registry(settings: Settings, filters: FilterRegistry) -> TemplateResult<Self> {
        let pattern = settings.token_regex()?;
        Ok(Self::build(settings, pattern, filters))
    }

    fn build(settings: Settings, pattern: Regex, filters: FilterRegistry) -> Self {
        Self {
            inner: Rc::new(EngineInner {
                settings: RefCell::new(settings),
                pattern: RefCell::new(pattern),
                filters: RefCell::new(filters),
                templates: RefCell::new(TemplateRegistry::new()),
                cache: TokenCache::new(),
                contexts: RefCell::new(LocalContexts::new()),
                store: RefCell::new(Value::object(Map::new())),
                initialized: Cell::new(false),
            }),
        }
    }

    pub fn settings(&self) -> Settings {
        self.inner.settings.borrow().clone()
    }

    /// Replace the settings. The token cache is cleared, since its entries
    /// were produced by the previous grammar.
    pub fn configure(&self, settings: Settings) -> TemplateResult<()> {
        let pattern = settings.token_regex()?;
        *self.inner.pattern.borrow_mut() = pattern;
        *self.inner.settings.borrow_mut() = settings;
        self.inner.cache.clear();
        debug!("engine reconfigured; token cache cleared");
        Ok(())
    }

    /// Register a filter or hook. See [`FilterRegistry::register`].
    pub fn register_filter<F>(&self, name: &str, func: F, priority: i32) -> TemplateResult<()>
    where
        F: Fn(Value, &FilterCall<'_>) -> FilterResult + 'static,
    {
        self.inner.filters.borrow_mut().register(name, func, priority)
    }

    /// Apply the filters registered under `name` outside of a render.
    pub fn apply_filter(
        &self,
        name: &str,
        value: Value,
        data: &Value,
        args: &[String],
    ) -> TemplateResult<Value> {
        self.inner
            .filters
            .borrow()
            .apply(name, value, &FilterCall::new(data, "", args))
    }

    pub fn filters(&self) -> Ref<'_, FilterRegistry> {
        self.inner.filters.borrow()
    }

    pub fn register_template(&self, name: impl Into<String>, text: impl Into<String>) {
        self.inner.templates.borrow_mut().insert(name, text);
    }

    pub fn template(&self, name: &str) -> Option<String> {
        self.inner.templates.borrow().get(name).map(str::to_string)
    }

    pub fn templates(&self) -> Ref<'_, TemplateRegistry> {
        self.inner.templates.borrow()
    }

    /// Register the template definitions found in `document` under `root`.
    pub fn discover_templates(&self, document: &Document, root: NodeId) -> usize {
        let settings = self.inner.settings.borrow();
        self.inner
            .templates
            .borrow_mut()
            .discover(document, root, &settings)
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.inner.cache
    }

    /// The iteration contexts registered by the most recent
    /// [`Engine::render`]. Each render replaces the previous set; mounts keep
    /// their own registries.
    pub fn contexts(&self) -> Ref<'_, LocalContexts> {
        self.inner.contexts.borrow()
    }

    pub(crate) fn fork_contexts(&self) -> LocalContexts {
        self.inner.contexts.borrow().fork()
    }

    pub fn store(&self) -> Value {
        self.inner.store.borrow().clone()
    }

    pub fn set_store(&self, store: Value) {
        *self.inner.store.borrow_mut() = store;
    }

    /// Render `template` (or the registered template it names) against
    /// `data`. Only hook failures are errors; lookup and filter failures
    /// inside the template render as the empty string.
    pub fn render(&self, template: &str, data: &Value) -> TemplateResult<String> {
        let mut contexts = self.fork_contexts();
        let result = self.render_with(template, data, &mut contexts);
        let mut kept = self.inner.contexts.borrow_mut();
        kept.clear();
        kept.extend(contexts);
        result
    }

    /// [`Engine::render`], registering iteration contexts in `contexts`.
    pub fn render_with(
        &self,
        template: &str,
        data: &Value,
        contexts: &mut LocalContexts,
    ) -> TemplateResult<String> {
        let data = self.with_store(data);
        let settings = self.settings();
        let pattern = self.inner.pattern.borrow().clone();
        let filters = self.inner.filters.borrow();

        let hook = |name: &str, text: String| -> TemplateResult<String> {
            let call = FilterCall::new(&data, &text, &[]);
            let result = filters.apply(name, Value::from(text.as_str()), &call)?;
            Ok(result.to_display_string())
        };

        if !self.inner.initialized.replace(true) {
            hook(HOOK_INIT, template.to_string())?;
        }

        let mut text = hook(HOOK_TEMPLATE_BEFORE, template.to_string())?;
        if !text.contains(settings.start.as_str()) {
            if let Some(named) = self.template(&text) {
                text = named;
            }
        }
        text = hook(HOOK_TEMPLATE, text)?;

        if !text.is_empty() {
            text = Substitution::new(&filters, &settings, &pattern, &self.inner.cache, contexts)
                .render(&text, &data);
        }

        hook(HOOK_TEMPLATE_AFTER, text)
    }

    /// A shallow copy of `data` with the store under `$store`. A `$store`
    /// key in `data` itself takes precedence.
    fn with_store(&self, data: &Value) -> Value {
        let mut map = Map::new();
        map.insert(STORE_KEY.to_string(), self.store());
        for (key, value) in data.entries() {
            map.insert(key, value);
        }
        Value::object(map)
    }
}

thread_local! {
    static DEFAULT_ENGINE: Engine = Engine::new();
}

/// This thread's default engine.
pub fn default_engine() -> Engine {
    DEFAULT_ENGINE.with(Engine::clone)
}

/// Render with this thread's default engine.
pub fn render(template: &str, data: &Value) -> TemplateResult<String> {
    default_engine().render(template, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_render_resolves_registered_names() {
        let engine = Engine::new();
        engine.register_template("greeting", "Hello [name]");
        assert_eq!(
            engine.render("greeting", &data(json!({"name": "Ann"}))).unwrap(),
            "Hello Ann"
        );
        // Text containing the start delimiter is never treated as a name.
        assert_eq!(engine.render("[name]", &data(json!({"name": "x"}))).unwrap(), "x");
        // Unknown names render as themselves.
        assert_eq!(engine.render("plain text", &Value::Null).unwrap(), "plain text");
    }

    #[test]
    fn test_store_is_visible_to_every_render() {
        let engine = Engine::new();
        engine.set_store(data(json!({"user": {"name": "admin"}})));
        assert_eq!(
            engine.render("[$store.user.name]/[x]", &data(json!({"x": 1}))).unwrap(),
            "admin/1"
        );
        // The caller's data is not modified.
        let own = data(json!({"x": 1}));
        engine.render("[x]", &own).unwrap();
        assert_eq!(own.get(STORE_KEY), None);
    }

    #[test]
    fn test_hooks_run_in_order() {
        let engine = Engine::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for hook in [HOOK_INIT, HOOK_TEMPLATE_BEFORE, HOOK_TEMPLATE, HOOK_TEMPLATE_AFTER] {
            let log = Rc::clone(&log);
            engine
                .register_filter(
                    hook,
                    move |value: Value, _: &FilterCall<'_>| {
                        log.borrow_mut().push(hook);
                        Ok(Some(value))
                    },
                    0,
                )
                .unwrap();
        }

        engine.render("[a]", &Value::Null).unwrap();
        engine.render("[a]", &Value::Null).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                HOOK_INIT,
                HOOK_TEMPLATE_BEFORE,
                HOOK_TEMPLATE,
                HOOK_TEMPLATE_AFTER,
                HOOK_TEMPLATE_BEFORE,
                HOOK_TEMPLATE,
                HOOK_TEMPLATE_AFTER,
            ]
        );
    }

    #[test]
    fn test_hooks_transform_text() {
        let engine = Engine::new();
        engine
            .register_filter(
                HOOK_TEMPLATE,
                |value: Value, _: &FilterCall<'_>| {
                    Ok(Some(Value::from(format!("<b>{}</b>", value.to_display_string()))))
                },
                0,
            )
            .unwrap();
        engine
            .register_filter(
                HOOK_TEMPLATE_AFTER,
                |value: Value, _: &FilterCall<'_>| {
                    Ok(Some(Value::from(value.to_display_string().to_uppercase())))
                },
                0,
            )
            .unwrap();
        assert_eq!(
            engine.render("[n]", &data(json!({"n": "x"}))).unwrap(),
            "<B>X</B>"
        );
    }

    #[test]
    fn test_hook_failure_is_an_error() {
        let engine = Engine::new();
        engine
            .register_filter(
                HOOK_TEMPLATE_BEFORE,
                |_: Value, _: &FilterCall<'_>| Err(TemplateError::filter("templateBefore", "no")),
                0,
            )
            .unwrap();
        assert!(matches!(
            engine.render("[a]", &Value::Null),
            Err(TemplateError::Filter { .. })
        ));
    }

    #[test]
    fn test_configure_switches_grammar_and_clears_cache() {
        let engine = Engine::new();
        let d = data(json!({"a": "A"}));
        assert_eq!(engine.render("[a] {{a}}", &d).unwrap(), "A {{a}}");
        assert_eq!(engine.token_cache().len(), 1);

        engine
            .configure(Settings {
                start: "{{".to_string(),
                end: "}}".to_string(),
                ..Settings::default()
            })
            .unwrap();
        assert!(engine.token_cache().is_empty());
        assert_eq!(engine.render("[a] {{a}}", &d).unwrap(), "[a] A");
    }

    #[test]
    fn test_configure_rejects_empty_delimiters() {
        let engine = Engine::new();
        let result = engine.configure(Settings {
            end: String::new(),
            ..Settings::default()
        });
        assert!(matches!(result, Err(TemplateError::InvalidArgument { .. })));
        assert_eq!(engine.settings().end, "]");
    }

    #[test]
    fn test_render_registers_iteration_contexts() {
        let engine = Engine::new();
        engine
            .render("[xs]<i>[_value]</i>[/xs]", &data(json!({"xs": [1, 2, 3]})))
            .unwrap();
        assert_eq!(engine.contexts().len(), 3);
    }

    #[test]
    fn test_repeated_renders_do_not_accumulate_contexts() {
        let engine = Engine::new();
        let data = data(json!({"xs": [1, 2, 3]}));
        for _ in 0..1000 {
            engine.render("[xs]<i>[_value]</i>[/xs]", &data).unwrap();
        }
        assert_eq!(engine.contexts().len(), 3);
        assert!(engine.contexts().get("potion_2999").is_some());

        engine.render("plain", &data).unwrap();
        assert!(engine.contexts().is_empty());
    }

    #[test]
    fn test_filters_may_render_recursively() {
        let engine = Engine::new();
        engine.register_template("badge", "<b>[label]</b>");
        let inner = engine.clone();
        engine
            .register_filter(
                "badge",
                move |value: Value, _: &FilterCall<'_>| {
                    let data = Value::from_pairs([("label", value)]);
                    Ok(Some(Value::from(inner.render("badge", &data)?)))
                },
                0,
            )
            .unwrap();
        assert_eq!(
            engine.render("[tags|first|badge]", &data(json!({"tags": ["new"]}))).unwrap(),
            "<b>new</b>"
        );
    }

    #[test]
    fn test_default_engine_render() {
        assert_eq!(render("[a]", &data(json!({"a": 1}))).unwrap(), "1");
    }
}
