//! Markup serialization.
//!
//! Text is escaped, except inside `script` and `style`, whose content is
//! written back exactly as it was parsed.

use crate::parser::{is_raw_text_element, is_void_element};
use crate::{Document, NodeData, NodeId};

/// Serialize a node including its own tag.
pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

/// Serialize the children of a node.
pub fn inner_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    for &child in doc.children(id) {
        write_node(doc, child, &mut out);
    }
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    match doc.data(id) {
        NodeData::Text(text) => escape_into(text, false, out),
        NodeData::Element { name, attributes } => {
            out.push('<');
            out.push_str(name);
            for attr in attributes {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                escape_into(&attr.value, true, out);
                out.push('"');
            }
            out.push('>');
            if is_void_element(name) {
                return;
            }
            let raw = is_raw_text_element(name);
            for &child in doc.children(id) {
                match doc.text(child) {
                    Some(text) if raw => out.push_str(text),
                    _ => write_node(doc, child, out),
                }
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_fragment;
    use insta::assert_snapshot;

    #[test]
    fn test_outer_html() {
        let mut doc = Document::new("section");
        let root = doc.root();
        doc.set_attribute(root, "class", "a \"b\"");
        let br = doc.create_element("br");
        let text = doc.create_text("1 < 2 & 3");
        doc.append_child(root, text);
        doc.append_child(root, br);

        assert_snapshot!(outer_html(&doc, root), @r#"<section class="a &quot;b&quot;">1 &lt; 2 &amp; 3<br></section>"#);
    }

    #[test]
    fn test_inner_html_round_trip() {
        let markup = r#"<ul id="list"><li data-potion-key="potion_0">a:1</li><li>b:2</li></ul>"#;
        let doc = parse_fragment(markup, "div").unwrap();
        assert_eq!(inner_html(&doc, doc.root()), markup);
    }

    #[test]
    fn test_raw_text_round_trips() {
        let markup = "<script>if (a < b && c) { x = \"</p>\"; }</script><style>p > a { }</style>";
        let doc = parse_fragment(markup, "div").unwrap();
        let script = doc.children(doc.root())[0];
        assert_eq!(doc.children(script).len(), 1);
        assert_eq!(
            doc.text_content(script),
            "if (a < b && c) { x = \"</p>\"; }"
        );
        assert_eq!(inner_html(&doc, doc.root()), markup);
    }
}
