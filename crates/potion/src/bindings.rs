/*
 * bindings.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Declarative event bindings.
//!
//! Markup declares handlers with `@event.modifier...="name(arg, ...)"`. The
//! binding pass moves every such declaration off its element and into a
//! [`BindingTable`], keyed by node and event. Nothing is resolved at that
//! point: the handler and its arguments are looked up when an event is
//! dispatched, so a binding always sees the data as it is at that moment.
//!
//! `#ref="name"` attributes name elements for the data's `$refs` map.

use crate::value::Value;
use once_cell::sync::Lazy;
use potion_dom::{Document, NodeId};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{trace, warn};

static EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+)(?:\((.*)\))?$").expect("binding expression pattern is valid")
});

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^["'](.*)["']$"#).expect("quoted argument pattern is valid"));

/// Prefix of event binding attributes.
pub const EVENT_PREFIX: char = '@';

/// Attribute naming an element for `$refs`.
pub const REF_ATTRIBUTE: &str = "#ref";

/// An event handler.
///
/// Called with the event, the context the binding resolved in (the root data
/// overlaid with the element's local context) and the parsed arguments.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&mut Event, &Value, &[Value])>);

impl Handler {
    pub fn new(f: impl Fn(&mut Event, &Value, &[Value]) + 'static) -> Self {
        Handler(Rc::new(f))
    }

    pub fn call(&self, event: &mut Event, context: &Value, args: &[Value]) {
        (self.0)(event, context, args)
    }

    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// An event travelling from its target up through the mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: String,
    target: NodeId,
    current_target: NodeId,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
}

impl Event {
    pub fn new(kind: impl Into<String>, target: NodeId) -> Self {
        Self {
            kind: kind.into(),
            target,
            current_target: target,
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    /// The node whose binding is currently running.
    pub fn current_target(&self) -> NodeId {
        self.current_target
    }

    pub(crate) fn set_current_target(&mut self, node: NodeId) {
        self.current_target = node;
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.immediate_propagation_stopped = true;
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn immediate_propagation_stopped(&self) -> bool {
        self.immediate_propagation_stopped
    }
}

/// Modifiers from the `.`-separated suffix of a binding attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Run only when the event targets the bound element itself.
    pub self_only: bool,
    pub prevent: bool,
    pub stop: bool,
    pub stop_immediate: bool,
    /// Remove the binding the first time it fires.
    pub once: bool,
    pub capture: bool,
    pub passive: bool,
}

impl Modifiers {
    fn parse<'a>(names: impl Iterator<Item = &'a str>) -> Self {
        let mut modifiers = Modifiers::default();
        for name in names {
            match name {
                "self" => modifiers.self_only = true,
                "prevent" => modifiers.prevent = true,
                "stop" => modifiers.stop = true,
                "stopImmediate" => modifiers.stop_immediate = true,
                "once" => modifiers.once = true,
                "capture" => modifiers.capture = true,
                "passive" => modifiers.passive = true,
                other => trace!(modifier = other, "ignoring unknown event modifier"),
            }
        }
        modifiers
    }
}

/// One parsed `@event="handler(args)"` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub event: String,
    pub handler: String,
    /// Raw argument texts, trimmed.
    pub args: Vec<String>,
    pub modifiers: Modifiers,
}

impl Binding {
    /// Parse the attribute `name` (with its `@`) and its `expression`.
    /// `None` when the expression is not `name` or `name(args)`.
    pub fn parse(name: &str, expression: &str) -> Option<Self> {
        let mut parts = name.strip_prefix(EVENT_PREFIX)?.split('.');
        let event = parts.next().filter(|e| !e.is_empty())?.to_string();
        let modifiers = Modifiers::parse(parts);

        let caps = EXPRESSION.captures(expression.trim())?;
        let handler = caps[1].to_string();
        let args = match caps.get(2).map(|m| m.as_str()) {
            Some(args) if !args.trim().is_empty() => {
                args.split(',').map(|a| a.trim().to_string()).collect()
            }
            _ => Vec::new(),
        };
        Some(Binding {
            event,
            handler,
            args,
            modifiers,
        })
    }
}

/// Bindings of a mounted tree, one per node and event.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: HashMap<(NodeId, String), Binding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move every event declaration in the subtree at `root` into the table.
    ///
    /// A declaration replaces any earlier binding of the same node and event.
    /// Declarations that do not parse are logged and left in place. Returns
    /// the number of bindings recorded.
    pub fn bind_tree(&mut self, document: &mut Document, root: NodeId) -> usize {
        let mut bound = 0;
        for node in document.descendants(root) {
            let declarations: Vec<(String, String)> = document
                .attributes(node)
                .iter()
                .filter(|a| a.name.starts_with(EVENT_PREFIX))
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect();

            for (name, expression) in declarations {
                let Some(binding) = Binding::parse(&name, &expression) else {
                    warn!(
                        attribute = name.as_str(),
                        expression = expression.as_str(),
                        "cannot parse event binding"
                    );
                    continue;
                };
                self.bindings
                    .insert((node, binding.event.clone()), binding);
                document.remove_attribute(node, &name);
                bound += 1;
            }
        }
        bound
    }

    pub fn get(&self, node: NodeId, event: &str) -> Option<&Binding> {
        self.bindings.get(&(node, event.to_string()))
    }

    pub fn remove(&mut self, node: NodeId, event: &str) -> Option<Binding> {
        self.bindings.remove(&(node, event.to_string()))
    }

    /// Forget bindings of nodes no longer attached to `document`.
    pub fn retain_attached(&mut self, document: &Document) {
        self.bindings
            .retain(|(node, _), _| document.is_attached(*node));
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Remove every non-empty `#ref` attribute in the subtree at `root`,
/// returning `(name, node)` pairs in document order.
pub fn take_refs(document: &mut Document, root: NodeId) -> Vec<(String, NodeId)> {
    let mut refs = Vec::new();
    for node in document.descendants(root) {
        let name = match document.get_attribute(node, REF_ATTRIBUTE) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        document.remove_attribute(node, REF_ATTRIBUTE);
        refs.push((name, node));
    }
    refs
}

/// Turn a binding argument into a value: `true`/`false`, a number, a quoted
/// string, or a name looked up in `context`. Unknown names stay literal text.
pub fn parse_argument(arg: &str, context: &Value) -> Value {
    match arg {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Some(n) = crate::value::parse_number(arg) {
        return Value::Number(n);
    }
    if let Some(caps) = QUOTED.captures(arg) {
        return Value::from(&caps[1]);
    }
    context.get(arg).unwrap_or_else(|| Value::from(arg))
}

/// The handler named `name`: from the local context first, then the root
/// data.
pub fn resolve_handler(name: &str, local: &Value, data: &Value) -> Option<Handler> {
    [local, data].into_iter().find_map(|scope| match scope.get(name) {
        Some(Value::Function(handler)) => Some(handler),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use potion_dom::parse_fragment;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_binding() {
        let binding = Binding::parse("@click.prevent.once", "remove(_key, 'x', 2)").unwrap();
        assert_eq!(binding.event, "click");
        assert_eq!(binding.handler, "remove");
        assert_eq!(binding.args, vec!["_key", "'x'", "2"]);
        assert!(binding.modifiers.prevent);
        assert!(binding.modifiers.once);
        assert!(!binding.modifiers.stop);

        let bare = Binding::parse("@input", "update").unwrap();
        assert!(bare.args.is_empty());
        assert_eq!(Binding::parse("@click", "() => go()"), None);
        assert_eq!(Binding::parse("@", "go"), None);
    }

    #[test]
    fn test_bind_tree_moves_declarations_into_table() {
        let mut doc = parse_fragment(
            "<button @click=\"save\" class=\"b\">x</button><a @click=\"bad expression!\">y</a>",
            "div",
        )
        .unwrap();
        let root = doc.root();
        let mut table = BindingTable::new();

        assert_eq!(table.bind_tree(&mut doc, root), 1);
        let button = doc.children(root)[0];
        let link = doc.children(root)[1];
        assert_eq!(table.get(button, "click").unwrap().handler, "save");
        assert!(!doc.has_attribute(button, "@click"));
        assert!(doc.has_attribute(button, "class"));
        // Unparseable declarations stay visible on the element.
        assert!(doc.has_attribute(link, "@click"));
    }

    #[test]
    fn test_rebinding_replaces_and_detached_nodes_are_forgotten() {
        let mut doc = parse_fragment("<b @click=\"one\"></b>", "div").unwrap();
        let root = doc.root();
        let b = doc.children(root)[0];
        let mut table = BindingTable::new();
        table.bind_tree(&mut doc, root);

        doc.set_attribute(b, "@click", "two");
        table.bind_tree(&mut doc, root);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(b, "click").unwrap().handler, "two");

        doc.detach(b);
        table.retain_attached(&doc);
        assert!(table.is_empty());
    }

    #[test]
    fn test_take_refs() {
        let mut doc = parse_fragment("<input #ref=\"name\"><p #ref=\"\">x</p>", "div").unwrap();
        let root = doc.root();
        let input = doc.children(root)[0];
        let refs = take_refs(&mut doc, root);
        assert_eq!(refs, vec![("name".to_string(), input)]);
        assert!(!doc.has_attribute(input, "#ref"));
    }

    #[test]
    fn test_parse_argument() {
        let context = Value::from_pairs([("_key", "a"), ("n", "7")]);
        assert_eq!(parse_argument("true", &context), Value::Bool(true));
        assert_eq!(parse_argument("2.5", &context), Value::from(2.5));
        assert_eq!(parse_argument("'quoted'", &context), Value::from("quoted"));
        assert_eq!(parse_argument("\"dq\"", &context), Value::from("dq"));
        assert_eq!(parse_argument("_key", &context), Value::from("a"));
        assert_eq!(parse_argument("other", &context), Value::from("other"));
    }

    #[test]
    fn test_resolve_handler_prefers_local_context() {
        let local_handler = Handler::new(|_, _, _| {});
        let root_handler = Handler::new(|_, _, _| {});
        let local = Value::from_pairs([("go", Value::from(local_handler.clone()))]);
        let data = Value::from_pairs([
            ("go", Value::from(root_handler.clone())),
            ("stop", Value::from(root_handler.clone())),
            ("name", Value::from("not a function")),
        ]);

        assert!(resolve_handler("go", &local, &data).unwrap().ptr_eq(&local_handler));
        assert!(resolve_handler("stop", &local, &data).unwrap().ptr_eq(&root_handler));
        assert!(resolve_handler("name", &local, &data).is_none());
        assert!(resolve_handler("missing", &local, &data).is_none());
    }

    #[test]
    fn test_event_flags() {
        let doc = Document::new("div");
        let mut event = Event::new("click", doc.root());
        event.stop_immediate_propagation();
        assert!(event.propagation_stopped());
        assert!(event.immediate_propagation_stopped());
        assert!(!event.default_prevented());
    }
}
