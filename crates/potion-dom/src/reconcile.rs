//! In-place tree reconciliation.
//!
//! [`reconcile`] walks a live subtree and a freshly rendered one in lockstep
//! and mutates the live side until it matches. Node identity is positional:
//! the i-th child of a live element is always compared against the i-th child
//! of its fresh counterpart, so reordered children show up as per-position
//! content changes rather than moves.
//!
//! Attributes owned by the binding layer (names starting with `@` or `#`) are
//! neither copied onto nor removed from live nodes.

use crate::{Document, NodeId, NodeKind};
use tracing::trace;

/// A single mutation applied to the live tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// `old` was swapped out for `new`, a deep copy of the fresh node. The
    /// subtree at `old` is released, so `old` is stale afterwards.
    Replace { old: NodeId, new: NodeId },
    /// Text content of `node` was overwritten.
    SetText { node: NodeId },
    /// Attribute `name` on `node` was added or changed.
    SetAttribute { node: NodeId, name: String },
    /// Attribute `name` on `node` was removed.
    RemoveAttribute { node: NodeId, name: String },
    /// A deep copy of a fresh child was appended to `parent`.
    AppendChild { parent: NodeId, node: NodeId },
    /// A surplus child was removed from `parent` and its slots released.
    RemoveChild { parent: NodeId, node: NodeId },
}

/// Whether an attribute belongs to the binding layer and is skipped by the
/// reconciler.
pub fn is_binding_attribute(name: &str) -> bool {
    name.starts_with('@') || name.starts_with('#')
}

/// Mutate `live_node` of `live` so that it matches `fresh_node` of `fresh`.
///
/// Returns the patches that were applied, in application order. Reconciling
/// the same pair a second time returns no patches.
pub fn reconcile(
    live: &mut Document,
    live_node: NodeId,
    fresh: &Document,
    fresh_node: NodeId,
) -> Vec<Patch> {
    let mut patches = Vec::new();
    reconcile_node(live, live_node, fresh, fresh_node, &mut patches);
    patches
}

fn reconcile_node(
    live: &mut Document,
    live_node: NodeId,
    fresh: &Document,
    fresh_node: NodeId,
    patches: &mut Vec<Patch>,
) {
    if live.kind(live_node) != fresh.kind(fresh_node)
        || live.tag_name(live_node) != fresh.tag_name(fresh_node)
    {
        let copy = live.import(fresh, fresh_node);
        live.replace(live_node, copy);
        live.remove(live_node);
        trace!(old = %live_node, new = %copy, "replaced node");
        patches.push(Patch::Replace {
            old: live_node,
            new: copy,
        });
        return;
    }

    match live.kind(live_node) {
        NodeKind::Text => {
            let fresh_text = fresh.text(fresh_node).unwrap_or_default();
            if live.text(live_node) != Some(fresh_text) {
                live.set_text(live_node, fresh_text);
                patches.push(Patch::SetText { node: live_node });
            }
        }
        NodeKind::Element => {
            reconcile_attributes(live, live_node, fresh, fresh_node, patches);
            reconcile_children(live, live_node, fresh, fresh_node, patches);
        }
    }
}

fn reconcile_attributes(
    live: &mut Document,
    live_node: NodeId,
    fresh: &Document,
    fresh_node: NodeId,
    patches: &mut Vec<Patch>,
) {
    for attr in fresh.attributes(fresh_node) {
        if is_binding_attribute(&attr.name) {
            continue;
        }
        if live.get_attribute(live_node, &attr.name) != Some(attr.value.as_str()) {
            live.set_attribute(live_node, &attr.name, attr.value.clone());
            patches.push(Patch::SetAttribute {
                node: live_node,
                name: attr.name.clone(),
            });
        }
    }

    let stale: Vec<String> = live
        .attributes(live_node)
        .iter()
        .filter(|a| !is_binding_attribute(&a.name) && !fresh.has_attribute(fresh_node, &a.name))
        .map(|a| a.name.clone())
        .collect();
    for name in stale {
        live.remove_attribute(live_node, &name);
        patches.push(Patch::RemoveAttribute {
            node: live_node,
            name,
        });
    }
}

fn reconcile_children(
    live: &mut Document,
    live_node: NodeId,
    fresh: &Document,
    fresh_node: NodeId,
    patches: &mut Vec<Patch>,
) {
    let live_children = live.children(live_node).to_vec();
    let fresh_children = fresh.children(fresh_node);
    let max = live_children.len().max(fresh_children.len());

    for i in 0..max {
        if i >= live_children.len() {
            let copy = live.import(fresh, fresh_children[i]);
            live.append_child(live_node, copy);
            patches.push(Patch::AppendChild {
                parent: live_node,
                node: copy,
            });
        } else if i >= fresh_children.len() {
            live.remove(live_children[i]);
            patches.push(Patch::RemoveChild {
                parent: live_node,
                node: live_children[i],
            });
        } else {
            reconcile_node(live, live_children[i], fresh, fresh_children[i], patches);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_fragment;
    use crate::serialize::inner_html;
    use pretty_assertions::assert_eq;

    fn patch(live: &str, fresh: &str) -> (Document, Vec<Patch>) {
        let mut live = parse_fragment(live, "div").unwrap();
        let fresh = parse_fragment(fresh, "div").unwrap();
        let live_root = live.root();
        let patches = reconcile(&mut live, live_root, &fresh, fresh.root());
        (live, patches)
    }

    #[test]
    fn test_identical_trees_produce_no_patches() {
        let (_, patches) = patch("<p class=\"a\">x</p>", "<p class=\"a\">x</p>");
        assert!(patches.is_empty());
    }

    #[test]
    fn test_text_change_keeps_element_identity() {
        let mut live = parse_fragment("<p>old</p>", "div").unwrap();
        let fresh = parse_fragment("<p>new</p>", "div").unwrap();
        let root = live.root();
        let p = live.children(root)[0];

        let patches = reconcile(&mut live, root, &fresh, fresh.root());

        assert_eq!(live.children(root)[0], p);
        assert_eq!(live.text_content(p), "new");
        assert_eq!(patches.len(), 1);
        assert!(matches!(patches[0], Patch::SetText { .. }));
    }

    #[test]
    fn test_tag_change_replaces_node() {
        let (live, patches) = patch("<p>x</p>", "<span>x</span>");
        assert_eq!(inner_html(&live, live.root()), "<span>x</span>");
        assert!(matches!(patches[0], Patch::Replace { .. }));
    }

    #[test]
    fn test_kind_change_replaces_node() {
        let (live, _) = patch("<b>x</b>", "plain");
        assert_eq!(inner_html(&live, live.root()), "plain");
    }

    #[test]
    fn test_attribute_divergence() {
        let (live, patches) = patch(
            "<a href=\"/old\" title=\"t\">x</a>",
            "<a href=\"/new\" rel=\"next\">x</a>",
        );
        assert_eq!(
            inner_html(&live, live.root()),
            "<a href=\"/new\" rel=\"next\">x</a>"
        );
        assert_eq!(patches.len(), 3);
    }

    #[test]
    fn test_binding_attributes_are_left_alone() {
        let (live, patches) = patch(
            "<button #ref=\"btn\">x</button>",
            "<button @click=\"go\">x</button>",
        );
        let button = live.children(live.root())[0];
        assert!(live.has_attribute(button, "#ref"));
        assert!(!live.has_attribute(button, "@click"));
        assert!(patches.is_empty());
    }

    #[test]
    fn test_children_grow_and_shrink() {
        let (live, _) = patch("<ul><li>a</li></ul>", "<ul><li>a</li><li>b</li><li>c</li></ul>");
        assert_eq!(
            inner_html(&live, live.root()),
            "<ul><li>a</li><li>b</li><li>c</li></ul>"
        );

        let (live, patches) = patch("<ul><li>a</li><li>b</li><li>c</li></ul>", "<ul><li>a</li></ul>");
        assert_eq!(inner_html(&live, live.root()), "<ul><li>a</li></ul>");
        assert_eq!(
            patches
                .iter()
                .filter(|p| matches!(p, Patch::RemoveChild { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_reorder_is_positional() {
        let (live, patches) = patch("<i>a</i><i>b</i>", "<i>b</i><i>a</i>");
        assert_eq!(inner_html(&live, live.root()), "<i>b</i><i>a</i>");
        // Two text overwrites, no moves.
        assert_eq!(patches.len(), 2);
        assert!(patches.iter().all(|p| matches!(p, Patch::SetText { .. })));
    }

    #[test]
    fn test_repeated_toggles_reuse_slots() {
        let mut live = parse_fragment("<ul></ul>", "div").unwrap();
        let full = parse_fragment("<ul><li>a</li><li>b</li><li>c</li></ul>", "div").unwrap();
        let empty = parse_fragment("<ul></ul>", "div").unwrap();
        let swapped = parse_fragment("<ol><li>a</li></ol>", "div").unwrap();
        let root = live.root();

        reconcile(&mut live, root, &full, full.root());
        reconcile(&mut live, root, &empty, empty.root());
        let settled = live.slot_count();

        for _ in 0..1000 {
            reconcile(&mut live, root, &full, full.root());
            reconcile(&mut live, root, &swapped, swapped.root());
            reconcile(&mut live, root, &empty, empty.root());
        }

        assert!(live.slot_count() <= settled + 3, "{} slots", live.slot_count());
        assert_eq!(live.node_count(), 2);
        assert_eq!(inner_html(&live, root), "<ul></ul>");
    }

    #[test]
    fn test_replaced_node_goes_stale() {
        let mut live = parse_fragment("<p>x</p>", "div").unwrap();
        let fresh = parse_fragment("<span>x</span>", "div").unwrap();
        let root = live.root();
        let p = live.children(root)[0];

        reconcile(&mut live, root, &fresh, fresh.root());

        assert!(!live.contains(p));
        assert_eq!(live.node_count(), 3);
    }
}
