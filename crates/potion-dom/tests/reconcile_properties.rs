/*
 * reconcile_properties.rs
 *
 * Property-based tests for tree reconciliation.
 *
 * For any pair of generated trees A and B:
 * 1. reconciling A against B makes A structurally equal to B
 * 2. reconciling the result against B again applies no patches
 */

use potion_dom::{inner_html, parse_fragment, reconcile};
use proptest::prelude::*;

fn gen_text() -> impl Strategy<Value = String> {
    "[a-z ]{1,6}"
}

fn gen_attrs() -> impl Strategy<Value = String> {
    prop::collection::vec(
        (prop::sample::select(vec!["id", "class", "title", "data-x"]), "[a-z0-9]{0,4}"),
        0..3,
    )
    .prop_map(|attrs| {
        let mut seen = Vec::new();
        let mut out = String::new();
        for (name, value) in attrs {
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            out.push_str(&format!(" {}=\"{}\"", name, value));
        }
        out
    })
}

/// Markup for a forest of nodes. Adjacent text is separated by elements so
/// the parser never merges text runs differently between the two sides.
fn gen_markup() -> impl Strategy<Value = String> {
    let leaf = gen_text().prop_map(|t| format!("<span>{}</span>", t));
    leaf.prop_recursive(4, 32, 4, |inner| {
        (
            prop::sample::select(vec!["div", "p", "ul", "li", "em"]),
            gen_attrs(),
            prop::collection::vec(inner, 0..4),
            prop::option::of(gen_text()),
        )
            .prop_map(|(tag, attrs, children, text)| {
                format!(
                    "<{tag}{attrs}>{}{}</{tag}>",
                    text.unwrap_or_default(),
                    children.join("")
                )
            })
    })
}

fn gen_forest() -> impl Strategy<Value = String> {
    prop::collection::vec(gen_markup(), 0..4).prop_map(|nodes| nodes.join(""))
}

proptest! {
    #[test]
    fn proptest_reconcile_converges(a in gen_forest(), b in gen_forest()) {
        let mut live = parse_fragment(&a, "div").unwrap();
        let fresh = parse_fragment(&b, "div").unwrap();
        let root = live.root();

        reconcile(&mut live, root, &fresh, fresh.root());
        let root = live.root();

        prop_assert!(live.same_subtree(root, &fresh, fresh.root()));
        prop_assert_eq!(inner_html(&live, root), inner_html(&fresh, fresh.root()));

        let second = reconcile(&mut live, root, &fresh, fresh.root());
        prop_assert!(second.is_empty(), "unexpected patches: {:?}", second);
    }

    #[test]
    fn proptest_reconcile_identity_is_noop(a in gen_forest()) {
        let mut live = parse_fragment(&a, "div").unwrap();
        let fresh = parse_fragment(&a, "div").unwrap();
        let root = live.root();
        prop_assert!(reconcile(&mut live, root, &fresh, fresh.root()).is_empty());
    }
}
