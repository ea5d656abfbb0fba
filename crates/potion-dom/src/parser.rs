//! Lenient HTML fragment parser built on quick-xml.
//!
//! Rendered templates are HTML, not XML, so the reader is configured to
//! tolerate stray and mismatched end tags, valueless and unquoted attributes,
//! and void elements written without a closing slash. Elements left open at
//! the end of the input are closed implicitly.
//!
//! Two HTML rules the XML tokenizer does not know are applied around it.
//! Before reading, `prepare` escapes every `<` that cannot open a tag and
//! the content of raw text elements (`script`, `style`, `textarea`,
//! `title`), so that content reaches the tree as text. While reading, text
//! and attribute values go through `decode_entities`, which resolves the
//! full HTML5 named reference table and numeric references and leaves
//! anything else, such as a bare `&`, as written.

use crate::{Document, Error, NodeId, Result};
use quick_xml::Reader;
use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;

/// Elements that never have content and never take an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const KNOWN_ELEMENTS: &[&str] = &[
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "base", "bdi", "bdo",
    "blockquote", "body", "br", "button", "canvas", "caption", "cite", "code", "col", "colgroup",
    "data", "datalist", "dd", "del", "details", "dfn", "dialog", "div", "dl", "dt", "em", "embed",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "head", "header", "hgroup", "hr", "html", "i", "iframe", "img", "input", "ins", "kbd",
    "label", "legend", "li", "link", "main", "map", "mark", "menu", "meta", "meter", "nav",
    "noscript", "object", "ol", "optgroup", "option", "output", "p", "param", "picture", "pre",
    "progress", "q", "rp", "rt", "ruby", "s", "samp", "script", "search", "section", "select",
    "slot", "small", "source", "span", "strong", "style", "sub", "summary", "sup", "table",
    "tbody", "td", "template", "textarea", "tfoot", "th", "thead", "time", "title", "tr",
    "track", "u", "ul", "var", "video", "wbr",
];

/// Elements whose content is taken literally, up to the matching end tag.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Elements whose content holds no tags but does resolve character
/// references.
const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["textarea", "title"];

/// Longest reference name looked up, `&` and `;` excluded.
const MAX_REFERENCE_LEN: usize = 32;

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Whether the text content of `name` is serialized without escaping.
pub fn is_raw_text_element(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&name)
}

/// Whether `name` names a standard HTML element or a valid custom element.
pub fn is_known_element(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if KNOWN_ELEMENTS.contains(&name.as_str()) {
        return true;
    }
    // Custom elements: lowercase ASCII start, at least one hyphen.
    name.contains('-')
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

/// Parse `markup` as the content of a `<container>` element.
///
/// The returned document's root is the container; the parsed nodes are its
/// children.
///
/// # Example
///
/// ```rust
/// use potion_dom::parse_fragment;
///
/// let doc = parse_fragment("<p class=\"x\">hi<br></p>", "div").unwrap();
/// let p = doc.children(doc.root())[0];
/// assert_eq!(doc.tag_name(p), Some("p"));
/// assert_eq!(doc.get_attribute(p, "class"), Some("x"));
/// assert_eq!(doc.children(p).len(), 2);
/// ```
pub fn parse_fragment(markup: &str, container: &str) -> Result<Document> {
    let prepared = prepare(markup);
    let mut parser = FragmentParser::new(&prepared, container);
    parser.parse()?;
    Ok(parser.doc)
}

/// Internal parser state.
struct FragmentParser<'a> {
    reader: Reader<&'a [u8]>,
    doc: Document,
    /// Open elements; the container is always at the bottom.
    stack: Vec<NodeId>,
}

impl<'a> FragmentParser<'a> {
    fn new(markup: &'a str, container: &str) -> Self {
        let mut reader = Reader::from_str(markup);
        let config = reader.config_mut();
        config.trim_text_start = false;
        config.trim_text_end = false;
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let doc = Document::new(container);
        let root = doc.root();
        Self {
            reader,
            doc,
            stack: vec![root],
        }
    }

    fn current(&self) -> NodeId {
        // The container is never popped.
        self.stack[self.stack.len() - 1]
    }

    fn parse(&mut self) -> Result<()> {
        loop {
            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = self.handle_start(&e)?;
                    let name = self.doc.tag_name(element).unwrap_or_default();
                    if !is_void_element(name) {
                        self.stack.push(element);
                    }
                }
                Ok(Event::Empty(e)) => {
                    self.handle_start(&e)?;
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                    self.handle_end(&name);
                }
                Ok(Event::Text(e)) => {
                    let raw = String::from_utf8_lossy(&e);
                    let text = decode_entities(&raw);
                    self.push_text(&text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    self.push_text(&text);
                }
                Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Syntax {
                        message: e.to_string(),
                        position: self.reader.error_position(),
                    });
                }
            }
        }
        Ok(())
    }

    fn handle_start(&mut self, e: &BytesStart<'_>) -> Result<NodeId> {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
        let element = self.doc.create_element(&name);

        let mut attributes = e.html_attributes();
        attributes.with_checks(false);
        for attr in attributes {
            let attr = attr.map_err(|err| Error::Syntax {
                message: format!("invalid attribute on <{}>: {}", name, err),
                position: self.reader.buffer_position(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value);
            let value = decode_entities(&raw).into_owned();
            // The first occurrence of a repeated attribute wins.
            if !self.doc.has_attribute(element, &key) {
                self.doc.set_attribute(element, &key, value);
            }
        }

        let parent = self.current();
        self.doc.append_child(parent, element);
        Ok(element)
    }

    fn handle_end(&mut self, name: &str) {
        if is_void_element(name) {
            return;
        }
        // Close the nearest open element with this name, implicitly closing
        // anything opened inside it. Stray end tags are dropped.
        let open = self.stack[1..]
            .iter()
            .rposition(|&id| self.doc.tag_name(id) == Some(name));
        if let Some(pos) = open {
            self.stack.truncate(pos + 1);
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let parent = self.current();
        // Adjacent character data collapses into one text node.
        if let Some(&last) = self.doc.children(parent).last() {
            if let Some(existing) = self.doc.text(last) {
                let merged = format!("{}{}", existing, text);
                self.doc.set_text(last, merged);
                return;
            }
        }
        let node = self.doc.create_text(text);
        self.doc.append_child(parent, node);
    }
}

/// Rewrite `markup` so the XML tokenizer splits it the way an HTML parser
/// would.
///
/// A `<` that does not begin a tag, an end tag, a comment or a declaration
/// becomes `&lt;`. The content of raw text elements has its `<` (and, for
/// `script` and `style`, its `&`) escaped up to the element's end tag.
/// Markup without any `<` is returned as is.
fn prepare(markup: &str) -> Cow<'_, str> {
    if !markup.contains('<') {
        return Cow::Borrowed(markup);
    }
    let mut out = String::with_capacity(markup.len() + 16);
    let mut rest = markup;
    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        rest = &rest[lt..];
        let after = &rest[1..];

        if after.starts_with("!--") {
            // An unterminated comment runs to the end of the input.
            let Some(end) = after.find("-->") else {
                return Cow::Owned(out);
            };
            let end = 1 + end + 3;
            out.push_str(&rest[..end]);
            rest = &rest[end..];
        } else if after.starts_with("![CDATA[") {
            let end = after.find("]]>").map_or(rest.len(), |end| 1 + end + 3);
            out.push_str(&rest[..end]);
            rest = &rest[end..];
        } else if opens_markup(after) {
            let Some(end) = tag_end(rest) else {
                out.push_str("&lt;");
                rest = after;
                continue;
            };
            let tag = &rest[..end];
            out.push_str(tag);
            rest = &rest[end..];
            if let Some(name) = raw_text_start(tag) {
                let close = find_end_tag(rest, name);
                escape_raw_text(&rest[..close], is_raw_text_element(name), &mut out);
                rest = &rest[close..];
            }
        } else {
            out.push_str("&lt;");
            rest = after;
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Whether the text after a `<` starts a tag, an end tag, or a `<!`/`<?`
/// construct.
fn opens_markup(after: &str) -> bool {
    let starts_name = |s: &str| s.starts_with(|c: char| c.is_ascii_alphabetic());
    starts_name(after)
        || after.strip_prefix('/').is_some_and(starts_name)
        || after.starts_with(['!', '?'])
}

/// Length of the tag at the start of `rest` through its `>`, skipping `>`
/// inside quoted attribute values. `None` when the tag never closes.
fn tag_end(rest: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in rest.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i + 1),
            (None, _) => {}
        }
    }
    None
}

/// The raw text element opened by `tag`, if it is one and is not
/// self-closing.
fn raw_text_start(tag: &str) -> Option<&'static str> {
    let body = tag.strip_prefix('<')?;
    let name_len = body
        .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
        .unwrap_or(body.len());
    let name = &body[..name_len];
    if tag.ends_with("/>") {
        return None;
    }
    RAW_TEXT_ELEMENTS
        .iter()
        .chain(ESCAPABLE_RAW_TEXT_ELEMENTS)
        .find(|known| known.eq_ignore_ascii_case(name))
        .copied()
}

/// Offset of the first `</name` in `rest` (ASCII case-insensitive) that is
/// followed by whitespace, `/`, `>` or the end of input.
fn find_end_tag(rest: &str, name: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut from = 0;
    while let Some(offset) = rest[from..].find("</") {
        let at = from + offset;
        let name_end = at + 2 + name.len();
        let matches_name = bytes
            .get(at + 2..name_end)
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()));
        let boundary = bytes
            .get(name_end)
            .is_none_or(|&b| b.is_ascii_whitespace() || b == b'/' || b == b'>');
        if matches_name && boundary {
            return at;
        }
        from = at + 2;
    }
    rest.len()
}

fn escape_raw_text(text: &str, literal_ampersand: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '&' if literal_ampersand => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
}

/// Resolve character references in text or an attribute value.
///
/// Named references use the HTML5 table, numeric ones may be decimal or
/// hexadecimal. A reference that does not resolve, and any `&` that does not
/// start one, is kept as written.
fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match resolve_reference(rest) {
            Some((text, len)) => {
                out.push_str(&text);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Resolve the reference at the start of `rest`, which begins with `&`.
/// Returns the replacement text and the length of the reference.
fn resolve_reference(rest: &str) -> Option<(Cow<'static, str>, usize)> {
    let semicolon = rest[1..]
        .char_indices()
        .take(MAX_REFERENCE_LEN + 1)
        .find(|&(_, c)| c == ';')?
        .0
        + 1;
    let name = &rest[1..semicolon];
    let text = match name.strip_prefix('#') {
        Some(number) => {
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None if number.starts_with(|c: char| c.is_ascii_digit()) => number.parse().ok()?,
                None => return None,
            };
            let c = char::from_u32(code).filter(|&c| c != '\0')?;
            Cow::Owned(c.to_string())
        }
        None => Cow::Borrowed(resolve_html5_entity(name)?),
    };
    Some((text, semicolon + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::inner_html;

    #[test]
    fn test_void_elements_do_not_nest() {
        let doc = parse_fragment("<p>a<br>b<img src=\"x.png\">c</p>", "div").unwrap();
        let p = doc.children(doc.root())[0];
        assert_eq!(doc.children(p).len(), 5);
        assert_eq!(doc.text_content(p), "abc");
    }

    #[test]
    fn test_unclosed_elements_close_at_end() {
        let doc = parse_fragment("<ul><li>one<li>two", "div").unwrap();
        let ul = doc.children(doc.root())[0];
        assert_eq!(doc.tag_name(ul), Some("ul"));
        assert_eq!(doc.text_content(ul), "onetwo");
    }

    #[test]
    fn test_stray_end_tag_is_ignored() {
        let doc = parse_fragment("a</span>b", "div").unwrap();
        assert_eq!(doc.text_content(doc.root()), "ab");
        assert_eq!(doc.children(doc.root()).len(), 1);
    }

    #[test]
    fn test_valueless_attribute() {
        let doc = parse_fragment("<input disabled type=checkbox>", "div").unwrap();
        let input = doc.children(doc.root())[0];
        assert!(doc.has_attribute(input, "disabled"));
        assert_eq!(doc.get_attribute(input, "type"), Some("checkbox"));
    }

    #[test]
    fn test_repeated_attribute_keeps_first() {
        let doc = parse_fragment("<td data-k=\"outer\" data-k=\"inner\"></td>", "tr").unwrap();
        let td = doc.children(doc.root())[0];
        assert_eq!(doc.get_attribute(td, "data-k"), Some("outer"));
        assert_eq!(doc.attributes(td).len(), 1);
    }

    #[test]
    fn test_entities_round_trip() {
        let doc = parse_fragment("<b title=\"a &amp; b\">&lt;x&gt;</b>", "div").unwrap();
        assert_eq!(
            inner_html(&doc, doc.root()),
            "<b title=\"a &amp; b\">&lt;x&gt;</b>"
        );
    }

    #[test]
    fn test_html_entities_resolve() {
        let doc = parse_fragment(
            "<p title=\"&copy;&nbsp;x\">a&nbsp;b &copy; &#169; &#xA9; &hellip;</p>",
            "div",
        )
        .unwrap();
        let p = doc.children(doc.root())[0];
        assert_eq!(doc.get_attribute(p, "title"), Some("\u{a9}\u{a0}x"));
        assert_eq!(
            doc.text_content(p),
            "a\u{a0}b \u{a9} \u{a9} \u{a9} \u{2026}"
        );
        assert_eq!(
            inner_html(&doc, doc.root()),
            "<p title=\"\u{a9}\u{a0}x\">a\u{a0}b \u{a9} \u{a9} \u{a9} \u{2026}</p>"
        );
    }

    #[test]
    fn test_unresolved_references_stay_literal() {
        let doc = parse_fragment("<p>AT&T &bogus; &#xZZ; &amp;lt; &</p>", "div").unwrap();
        assert_eq!(doc.text_content(doc.root()), "AT&T &bogus; &#xZZ; &lt; &");
        assert_eq!(
            inner_html(&doc, doc.root()),
            "<p>AT&amp;T &amp;bogus; &amp;#xZZ; &amp;lt; &amp;</p>"
        );
    }

    #[test]
    fn test_bare_less_than_is_text() {
        let doc = parse_fragment("a < b", "div").unwrap();
        assert_eq!(doc.text_content(doc.root()), "a < b");
        assert_eq!(inner_html(&doc, doc.root()), "a &lt; b");

        let doc = parse_fragment("<p>1 <2 and x<=y</p><b>ok</b>", "div").unwrap();
        let children = doc.element_children(doc.root());
        assert_eq!(children.len(), 2);
        assert_eq!(doc.text_content(children[0]), "1 <2 and x<=y");
        assert_eq!(doc.text_content(children[1]), "ok");
    }

    #[test]
    fn test_raw_text_elements_keep_their_content() {
        let doc = parse_fragment(
            "<script>if (a<b) { el.innerHTML = '<i>x</i>'; }</script><p>after</p>",
            "div",
        )
        .unwrap();
        let children = doc.element_children(doc.root());
        assert_eq!(children.len(), 2);
        assert_eq!(
            doc.text_content(children[0]),
            "if (a<b) { el.innerHTML = '<i>x</i>'; }"
        );
        assert_eq!(doc.tag_name(children[1]), Some("p"));

        let doc = parse_fragment("<textarea>a <b> &amp; c</TEXTAREA>", "div").unwrap();
        let textarea = doc.children(doc.root())[0];
        assert_eq!(doc.children(textarea).len(), 1);
        assert_eq!(doc.text_content(textarea), "a <b> & c");
    }

    #[test]
    fn test_comments_are_dropped() {
        let doc = parse_fragment("a<!-- <p>x</p> -->b<!-- open", "div").unwrap();
        assert_eq!(inner_html(&doc, doc.root()), "ab");
    }

    #[test]
    fn test_tag_names_are_lowercased() {
        let doc = parse_fragment("<DIV><Span>x</SPAN></DIV>", "div").unwrap();
        let outer = doc.children(doc.root())[0];
        let inner = doc.children(outer)[0];
        assert_eq!(doc.tag_name(inner), Some("span"));
        assert_eq!(doc.text(doc.children(inner)[0]), Some("x"));
    }

    #[test]
    fn test_known_elements() {
        assert!(is_known_element("div"));
        assert!(is_known_element("SECTION"));
        assert!(is_known_element("my-widget"));
        assert!(!is_known_element("blink"));
        assert!(!is_known_element("-bad"));
    }
}
