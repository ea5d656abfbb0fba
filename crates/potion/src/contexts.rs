/*
 * contexts.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Per-iteration data contexts.
//!
//! Every entry of an iteration block renders against its own derived
//! context. The context is registered here under a generated id, and the
//! id is written into the block's first element as a marker attribute, so
//! code that later holds an element of the rendered tree (an event binding,
//! for instance) can recover the data the element was rendered from.

use crate::value::Value;
use potion_dom::{Document, NodeId};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::debug;

/// Registry of iteration contexts keyed by marker id.
#[derive(Debug, Default)]
pub struct LocalContexts {
    contexts: HashMap<String, Value>,
    next_id: Rc<Cell<u64>>,
}

impl LocalContexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry that draws ids from the same sequence as `self`,
    /// so markers stay unique across registries rendered into one page.
    pub fn fork(&self) -> Self {
        Self {
            contexts: HashMap::new(),
            next_id: Rc::clone(&self.next_id),
        }
    }

    /// Store `context` under a fresh `potion_<n>` id and return the id.
    pub fn register(&mut self, context: Value) -> String {
        let n = self.next_id.get();
        self.next_id.set(n + 1);
        let id = format!("potion_{}", n);
        self.contexts.insert(id.clone(), context);
        id
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.contexts.get(id)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    /// Move every context of `other` into `self`.
    pub fn extend(&mut self, other: LocalContexts) {
        self.contexts.extend(other.contexts);
    }

    /// Drop every context whose marker no longer appears on an element of
    /// the subtree at `root`. Returns the number of contexts dropped.
    pub fn prune(&mut self, document: &Document, root: NodeId, marker: &str) -> usize {
        let live: HashSet<&str> = document
            .descendants(root)
            .into_iter()
            .filter_map(|node| document.get_attribute(node, marker))
            .collect();
        let before = self.contexts.len();
        self.contexts.retain(|id, _| live.contains(id.as_str()));
        let dropped = before - self.contexts.len();
        if dropped > 0 {
            debug!(dropped, kept = self.contexts.len(), "pruned local contexts");
        }
        dropped
    }

    /// The context of the nearest marked ancestor of `node` (itself
    /// included), or `default` when no ancestor carries a known marker.
    pub fn local_context(
        &self,
        document: &Document,
        node: NodeId,
        marker: &str,
        default: &Value,
    ) -> Value {
        document
            .ancestors_inclusive(node)
            .into_iter()
            .filter_map(|n| document.get_attribute(n, marker))
            .find_map(|id| self.contexts.get(id))
            .cloned()
            .unwrap_or_else(|| default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potion_dom::parse_fragment;

    const MARKER: &str = "data-potion-key";

    #[test]
    fn test_ids_are_sequential_and_shared_with_forks() {
        let mut contexts = LocalContexts::new();
        assert_eq!(contexts.register(Value::Null), "potion_0");
        let mut fork = contexts.fork();
        assert_eq!(fork.register(Value::Null), "potion_1");
        assert_eq!(contexts.register(Value::Null), "potion_2");
        assert_eq!(contexts.len(), 2);
        assert_eq!(fork.len(), 1);
    }

    #[test]
    fn test_local_context_walks_ancestors() {
        let mut contexts = LocalContexts::new();
        let row = Value::from_pairs([("name", "row")]);
        let id = contexts.register(row.clone());
        let markup = format!("<ul><li {}=\"{}\"><b>x</b></li><li>y</li></ul>", MARKER, id);
        let doc = parse_fragment(&markup, "div").unwrap();

        let ul = doc.children(doc.root())[0];
        let first = doc.children(ul)[0];
        let bold = doc.children(first)[0];
        let second = doc.children(ul)[1];
        let root_data = Value::from_pairs([("name", "root")]);

        let found = contexts.local_context(&doc, bold, MARKER, &root_data);
        assert!(found.ptr_eq(&row));
        let fallback = contexts.local_context(&doc, second, MARKER, &root_data);
        assert!(fallback.ptr_eq(&root_data));
    }

    #[test]
    fn test_unknown_marker_falls_through_to_outer_context() {
        let mut contexts = LocalContexts::new();
        let outer = Value::from_pairs([("level", "outer")]);
        let id = contexts.register(outer.clone());
        let markup = format!(
            "<div {m}=\"{id}\"><p {m}=\"stale\">x</p></div>",
            m = MARKER,
            id = id
        );
        let doc = parse_fragment(&markup, "div").unwrap();
        let p = doc.children(doc.children(doc.root())[0])[0];
        assert!(contexts.local_context(&doc, p, MARKER, &Value::Null).ptr_eq(&outer));
    }

    #[test]
    fn test_prune_drops_detached_contexts() {
        let mut contexts = LocalContexts::new();
        let kept = contexts.register(Value::from(1));
        let gone = contexts.register(Value::from(2));
        let markup = format!("<p {}=\"{}\">a</p>", MARKER, kept);
        let doc = parse_fragment(&markup, "div").unwrap();

        assert_eq!(contexts.prune(&doc, doc.root(), MARKER), 1);
        assert!(contexts.get(&kept).is_some());
        assert!(contexts.get(&gone).is_none());
    }
}
