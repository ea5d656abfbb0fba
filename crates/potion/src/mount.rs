/*
 * mount.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Attaching rendered templates to a page.
//!
//! Mounting finds a `<template>` element in a page by name, renders its
//! markup, and swaps the element for a container holding the result. The
//! container takes the template element's attributes (except `type`) and the
//! configured classes. Before the swap, `#ref` elements are collected into
//! the data's `$refs`, the container is exposed as `$root`, and the event
//! binding pass runs over the new subtree.
//!
//! A reactive mount wraps the data first and only then renders. Once the
//! container is in place, the wrapper's callback is switched over to
//! [`Mount::refresh`], so every changing write re-renders the original
//! template text, reconciles the result into the container, prunes stale
//! iteration contexts and binds again.

use crate::bindings::{Binding, BindingTable, Event, parse_argument, resolve_handler, take_refs};
use crate::contexts::LocalContexts;
use crate::engine::Engine;
use crate::error::{TemplateError, TemplateResult};
use crate::reactive::{ChangeCallback, Reactive, WrapperCache};
use crate::settings::MountOptions;
use crate::templates::find_template;
use crate::value::{ElementRef, Map, SharedDocument, Value};
use potion_dom::{
    Attribute, Document, NodeId, inner_html, is_known_element, outer_html, parse_fragment,
    reconcile,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Data key holding the mounted container.
pub const ROOT_KEY: &str = "$root";

/// Data key holding the elements named with `#ref`.
pub const REFS_KEY: &str = "$refs";

/// A template rendered into a page.
#[derive(Clone)]
pub struct Mount {
    state: Rc<MountState>,
}

struct MountState {
    engine: Engine,
    page: SharedDocument,
    container: NodeId,
    template: String,
    data: Value,
    marker: String,
    bindings: RefCell<BindingTable>,
    contexts: RefCell<LocalContexts>,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("container", &self.state.container)
            .field("bindings", &self.state.bindings.borrow().len())
            .field("contexts", &self.state.contexts.borrow().len())
            .finish()
    }
}

impl Engine {
    /// Render the page's template `name` against `data` and put the result
    /// in its place.
    pub fn mount(
        &self,
        page: &SharedDocument,
        name: &str,
        data: &Value,
        options: &MountOptions,
    ) -> TemplateResult<Mount> {
        self.attach(page, name, data.clone(), options, &|key: &str, value: Value| {
            data.set(key, value);
        })
    }

    /// Like [`Engine::mount`], but keeps the container in sync with writes
    /// made through the returned handle's [`ReactiveMount::data`].
    pub fn mount_reactive(
        &self,
        page: &SharedDocument,
        name: &str,
        data: Value,
        options: &MountOptions,
    ) -> TemplateResult<ReactiveMount> {
        if !data.is_collection() {
            return Err(TemplateError::invalid_argument(format!(
                "reactive data must be an array or object, not {}",
                data.type_name()
            )));
        }

        // Writes made while mounting must not re-render a container that
        // does not exist yet, so the wrapper starts with a no-op callback.
        let slot: Rc<RefCell<ChangeCallback>> = Rc::new(RefCell::new(Rc::new(|| {})));
        let forward: ChangeCallback = {
            let slot = Rc::clone(&slot);
            Rc::new(move || {
                let callback = Rc::clone(&*slot.borrow());
                callback();
            })
        };
        let reactive = WrapperCache::new()
            .wrap(data, forward, None)
            .into_reactive()
            .ok_or_else(|| TemplateError::invalid_argument("reactive data could not be wrapped"))?;

        let write = |key: &str, value: Value| reactive.set(key, value);
        let mount = self.attach(page, name, reactive.target().clone(), options, &write)?;

        let target = mount.clone();
        *slot.borrow_mut() = Rc::new(move || {
            if let Err(err) = target.refresh() {
                warn!("re-render failed: {}", err);
            }
        });

        Ok(ReactiveMount {
            mount,
            data: reactive,
        })
    }

    fn attach(
        &self,
        page: &SharedDocument,
        name: &str,
        data: Value,
        options: &MountOptions,
        write: &dyn Fn(&str, Value),
    ) -> TemplateResult<Mount> {
        let settings = self.settings();
        let merged = settings.merged(options);

        let (template_node, template) = {
            let doc = page.borrow();
            let node = find_template(&doc, doc.root(), &settings.attr, name).ok_or_else(|| {
                TemplateError::NotFound {
                    name: name.to_string(),
                }
            })?;
            (node, inner_html(&doc, node))
        };

        let mut contexts = self.fork_contexts();
        let rendered = self.render_with(&template, &data, &mut contexts)?;

        let tag = if is_known_element(&merged.tag) {
            merged.tag.as_str()
        } else {
            settings.tag.as_str()
        };
        let fresh = parse_fragment(&rendered, tag)?;

        let mut bindings = BindingTable::new();
        let (container, refs) = {
            let mut doc = page.borrow_mut();
            let container = doc.import(&fresh, fresh.root());
            let inherited: Vec<Attribute> = doc
                .attributes(template_node)
                .iter()
                .filter(|a| a.name != "type")
                .cloned()
                .collect();
            for attr in inherited {
                doc.set_attribute(container, &attr.name, attr.value);
            }
            add_classes(&mut doc, container, &merged.classes());

            let refs = take_refs(&mut doc, container);
            bindings.bind_tree(&mut doc, container);
            doc.replace(template_node, container);
            doc.remove(template_node);
            (container, refs)
        };

        write(ROOT_KEY, Value::Element(ElementRef::new(page, container)));
        let mut all_refs = Map::new();
        if let Some(existing) = data.get(REFS_KEY) {
            all_refs.extend(existing.entries());
        }
        for (ref_name, node) in refs {
            all_refs.insert(ref_name, Value::Element(ElementRef::new(page, node)));
        }
        write(REFS_KEY, Value::object(all_refs));

        debug!(
            template = name,
            container = %container,
            bindings = bindings.len(),
            contexts = contexts.len(),
            "mounted template"
        );

        Ok(Mount {
            state: Rc::new(MountState {
                engine: self.clone(),
                page: Rc::clone(page),
                container,
                template,
                data,
                marker: settings.marker,
                bindings: RefCell::new(bindings),
                contexts: RefCell::new(contexts),
            }),
        })
    }
}

/// Add each of `classes` to the `class` attribute of `node` unless present.
fn add_classes(doc: &mut Document, node: NodeId, classes: &[&str]) {
    if classes.is_empty() {
        return;
    }
    let mut current: Vec<String> = doc
        .get_attribute(node, "class")
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    for class in classes {
        if !current.iter().any(|c| c == class) {
            current.push(class.to_string());
        }
    }
    doc.set_attribute(node, "class", current.join(" "));
}

/// `base` overlaid with the entries of `top`.
fn overlay(base: &Value, top: &Value) -> Value {
    let mut map = Map::new();
    map.extend(base.entries());
    map.extend(top.entries());
    Value::object(map)
}

impl Mount {
    pub fn container(&self) -> NodeId {
        self.state.container
    }

    pub fn page(&self) -> &SharedDocument {
        &self.state.page
    }

    /// The data the mount renders from.
    pub fn data(&self) -> &Value {
        &self.state.data
    }

    /// The template text as it was found in the page.
    pub fn template(&self) -> &str {
        &self.state.template
    }

    pub fn outer_html(&self) -> String {
        outer_html(&self.state.page.borrow(), self.state.container)
    }

    pub fn inner_html(&self) -> String {
        inner_html(&self.state.page.borrow(), self.state.container)
    }

    pub fn binding(&self, node: NodeId, event: &str) -> Option<Binding> {
        self.state.bindings.borrow().get(node, event).cloned()
    }

    pub fn binding_count(&self) -> usize {
        self.state.bindings.borrow().len()
    }

    /// Number of iteration contexts the mount currently tracks.
    pub fn context_count(&self) -> usize {
        self.state.contexts.borrow().len()
    }

    /// The iteration context `node` was rendered in, or the mount's data.
    pub fn local_context(&self, node: NodeId) -> Value {
        let page = self.state.page.borrow();
        self.state
            .contexts
            .borrow()
            .local_context(&page, node, &self.state.marker, &self.state.data)
    }

    /// Re-render the template against the current data and patch the
    /// container in place. Returns the number of patches applied.
    pub fn refresh(&self) -> TemplateResult<usize> {
        let state = &self.state;
        let mut contexts = state.contexts.borrow().fork();
        let rendered = state
            .engine
            .render_with(&state.template, &state.data, &mut contexts)?;

        let mut page = state.page.borrow_mut();
        let tag = page.tag_name(state.container).unwrap_or("div").to_string();
        let mut fresh = parse_fragment(&rendered, &tag)?;
        let fresh_root = fresh.root();
        for attr in page.attributes(state.container) {
            fresh.set_attribute(fresh_root, &attr.name, attr.value.clone());
        }

        let patches = reconcile(&mut page, state.container, &fresh, fresh_root);

        let pruned = {
            let mut all = state.contexts.borrow_mut();
            all.extend(contexts);
            all.prune(&page, state.container, &state.marker)
        };

        let mut bindings = state.bindings.borrow_mut();
        bindings.retain_attached(&page);
        bindings.bind_tree(&mut page, state.container);

        debug!(
            patches = patches.len(),
            pruned,
            bindings = bindings.len(),
            "re-rendered mount"
        );
        Ok(patches.len())
    }

    /// Dispatch an event of `kind` at `target`, running bindings from the
    /// target up to the container. Returns the event in its final state.
    ///
    /// No borrow of the page or the mount is held while a handler runs, so
    /// handlers may write to reactive data and trigger a re-render.
    pub fn dispatch(&self, kind: &str, target: NodeId) -> Event {
        let state = &self.state;
        let mut event = Event::new(kind, target);

        let path: Vec<NodeId> = {
            let page = state.page.borrow();
            if !page.contains(target) {
                debug!(target = %target, "event target was removed");
                return event;
            }
            let ancestors = page.ancestors_inclusive(target);
            match ancestors.iter().position(|&n| n == state.container) {
                Some(pos) => ancestors[..=pos].to_vec(),
                None => {
                    debug!(target = %target, "event target is outside the mount");
                    return event;
                }
            }
        };

        for node in path {
            let Some(binding) = state.bindings.borrow().get(node, kind).cloned() else {
                continue;
            };
            event.set_current_target(node);

            let modifiers = binding.modifiers;
            if modifiers.once {
                state.bindings.borrow_mut().remove(node, kind);
            }
            if modifiers.self_only && node != target {
                continue;
            }
            if modifiers.prevent {
                event.prevent_default();
            }
            if modifiers.stop {
                event.stop_propagation();
            }
            if modifiers.stop_immediate {
                event.stop_immediate_propagation();
            }

            let local = self.local_context(node);
            let args: Vec<Value> = binding
                .args
                .iter()
                .map(|arg| parse_argument(arg, &local))
                .collect();
            match resolve_handler(&binding.handler, &local, &state.data) {
                Some(handler) => {
                    let context = overlay(&state.data, &local);
                    handler.call(&mut event, &context, &args);
                }
                None => warn!(
                    handler = binding.handler.as_str(),
                    event = kind,
                    "handler not found in local context or data"
                ),
            }

            if event.propagation_stopped() {
                break;
            }
        }
        event
    }
}

/// A mount whose data is observed.
#[derive(Debug, Clone)]
pub struct ReactiveMount {
    mount: Mount,
    data: Reactive,
}

impl ReactiveMount {
    /// The observed data. Writes through it re-render the mount.
    pub fn data(&self) -> &Reactive {
        &self.data
    }

    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    pub fn container(&self) -> NodeId {
        self.mount.container()
    }

    pub fn inner_html(&self) -> String {
        self.mount.inner_html()
    }

    pub fn dispatch(&self, kind: &str, target: NodeId) -> Event {
        self.mount.dispatch(kind, target)
    }
}
