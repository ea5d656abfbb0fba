/*
 * templates.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named templates.
//!
//! Pages carry template definitions as `<template>` elements whose `type`
//! attribute marks them for this engine and whose name attribute (by default
//! `data-name`) gives the name they are rendered by.

use crate::settings::Settings;
use potion_dom::{Document, NodeId, inner_html};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Template text by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `text` under `name`, returning the text it replaced.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) -> Option<String> {
        self.templates.insert(name.into(), text.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Register every template definition found under `root`. A later
    /// definition with the same name wins. Returns how many were found.
    pub fn discover(&mut self, document: &Document, root: NodeId, settings: &Settings) -> usize {
        let mut found = 0;
        for node in document.descendants(root) {
            if document.tag_name(node) != Some("template")
                || document.get_attribute(node, "type") != Some(settings.template_type.as_str())
            {
                continue;
            }
            let Some(name) = document.get_attribute(node, &settings.attr) else {
                warn!(
                    node = %node,
                    attr = settings.attr.as_str(),
                    "template element has no name attribute"
                );
                continue;
            };
            self.insert(name, inner_html(document, node));
            found += 1;
        }
        debug!(found, "discovered templates");
        found
    }
}

/// The `<template>` element under `root` whose `attr` attribute is `name`,
/// whatever its `type`.
pub fn find_template(document: &Document, root: NodeId, attr: &str, name: &str) -> Option<NodeId> {
    document.find_element(root, |doc, node| {
        doc.tag_name(node) == Some("template") && doc.get_attribute(node, attr) == Some(name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use potion_dom::parse_fragment;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"<main>
<template type="template/potion" data-name="card"><div class="card">[title]</div></template>
<template type="text/other" data-name="skipped">x</template>
<template type="template/potion">unnamed</template>
<section><template type="template/potion" data-name="row"><li>[_value]</li></template></section>
</main>"#;

    #[test]
    fn test_discover() {
        let doc = parse_fragment(PAGE, "body").unwrap();
        let mut registry = TemplateRegistry::new();
        assert_eq!(registry.discover(&doc, doc.root(), &Settings::default()), 2);
        assert_eq!(registry.names(), vec!["card", "row"]);
        assert_eq!(
            registry.get("card"),
            Some("<div class=\"card\">[title]</div>")
        );
        assert!(!registry.contains("skipped"));
    }

    #[test]
    fn test_discover_with_custom_type_and_attr() {
        let doc = parse_fragment(
            r#"<template type="x-tpl" id="a">A</template><template type="x-tpl" data-name="b">B</template>"#,
            "body",
        )
        .unwrap();
        let settings = Settings {
            template_type: "x-tpl".to_string(),
            attr: "id".to_string(),
            ..Settings::default()
        };
        let mut registry = TemplateRegistry::new();
        assert_eq!(registry.discover(&doc, doc.root(), &settings), 1);
        assert_eq!(registry.get("a"), Some("A"));
    }

    #[test]
    fn test_find_template_ignores_type() {
        let doc = parse_fragment(PAGE, "body").unwrap();
        let node = find_template(&doc, doc.root(), "data-name", "skipped").unwrap();
        assert_eq!(doc.text_content(node), "x");
        assert!(find_template(&doc, doc.root(), "data-name", "nope").is_none());
    }
}
