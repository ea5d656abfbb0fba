/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Dynamically typed template data.
//!
//! Templates are written against loosely typed data objects, so [`Value`]
//! mirrors that object model: scalars are plain values, while arrays and
//! objects are shared, mutable allocations. Cloning a `Value` clones the
//! reference, not the collection. Identity of the allocation is what the
//! reactive wrapper and the `unique` filter compare.

use crate::bindings::Handler;
use hashlink::LinkedHashMap;
use potion_dom::{Document, NodeId, outer_html};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

/// Insertion-ordered property map backing [`Value::Object`].
pub type Map = LinkedHashMap<String, Value>;

/// A shared, mutable array.
pub type Array = Rc<RefCell<Vec<Value>>>;

/// A shared, mutable object.
pub type Object = Rc<RefCell<Map>>;

/// A value that can flow through templates, filters and reactive wrappers.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent or null.
    #[default]
    Null,

    Bool(bool),

    Number(f64),

    String(String),

    Array(Array),

    Object(Object),

    /// A reference to an element of an attached document.
    Element(ElementRef),

    /// An event handler callable from markup bindings.
    Function(Handler),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: Map) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    /// Build an object from `(key, value)` pairs, keeping their order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut map = Map::new();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        Value::object(map)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Element(_) => "element",
            Value::Function(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Arrays and objects: the values that can be iterated by a block and
    /// wrapped by the reactive layer.
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Own property `key` of an object, index of an array or string, or the
    /// `length` of either. `None` when the property does not exist.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.borrow().get(key).cloned(),
            Value::Array(items) => {
                let items = items.borrow();
                if key == "length" {
                    return Some(Value::Number(items.len() as f64));
                }
                key.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
            }
            Value::String(s) => {
                if key == "length" {
                    return Some(Value::Number(s.chars().count() as f64));
                }
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
            }
            _ => None,
        }
    }

    /// Write property `key`, returning the previous value.
    ///
    /// See [`Value::try_set`] for which writes are stored; the others are
    /// ignored.
    pub fn set(&self, key: &str, value: Value) -> Option<Value> {
        self.try_set(key, value).ok().flatten()
    }

    /// Write property `key`, returning the previous value, or the rejected
    /// value when nothing was stored.
    ///
    /// Objects take any key. Arrays take an existing index or the index one
    /// past the end, which appends. Every other write is rejected.
    pub fn try_set(&self, key: &str, value: Value) -> Result<Option<Value>, Value> {
        match self {
            Value::Object(map) => Ok(map.borrow_mut().insert(key.to_string(), value)),
            Value::Array(items) => {
                let Ok(index) = key.parse::<usize>() else {
                    return Err(value);
                };
                let mut items = items.borrow_mut();
                match index.cmp(&items.len()) {
                    Ordering::Less => Ok(Some(std::mem::replace(&mut items[index], value))),
                    Ordering::Equal => {
                        items.push(value);
                        Ok(None)
                    }
                    Ordering::Greater => Err(value),
                }
            }
            _ => Err(value),
        }
    }

    /// `(key, value)` entries of a collection, in iteration order. Array keys
    /// are their indices.
    pub fn entries(&self) -> Vec<(String, Value)> {
        match self {
            Value::Object(map) => map
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Identity comparison for shared values.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Element(a), Value::Element(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Strict equality: identity for shared values, value equality for
    /// scalars. `NaN` is not equal to itself.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.ptr_eq(other),
        }
    }

    /// Recursively copy arrays and objects into fresh allocations.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Array(items) => {
                Value::array(items.borrow().iter().map(Value::deep_clone).collect())
            }
            Value::Object(map) => {
                let copy = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect();
                Value::object(copy)
            }
            other => other.clone(),
        }
    }

    /// The string a value contributes to rendered output.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null | Value::Function(_) => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Element(element) => element.outer_html().unwrap_or_default(),
        }
    }

    /// Convert to JSON. Elements and functions have no JSON form and become
    /// `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Element(_) | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.borrow().iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Format a number the way templates expect to see it: integers without a
/// fractional part, everything else in shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{}Infinity", sign)
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Parse a filter or binding argument as a number. Surrounding whitespace is
/// ignored; anything else that is not a plain decimal number is rejected.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text {
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ if text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => None,
        _ => text.parse::<f64>().ok(),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.borrow().iter()).finish(),
            Value::Element(element) => write!(f, "Element({})", element.node),
            Value::Function(_) => write!(f, "Function"),
        }
    }
}

/// Structural equality, recursing into collections. Use
/// [`Value::strict_eq`] for identity semantics.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            _ => self.strict_eq(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Handler> for Value {
    fn from(handler: Handler) -> Self {
        Value::Function(handler)
    }
}

impl From<ElementRef> for Value {
    fn from(element: ElementRef) -> Self {
        Value::Element(element)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// A document shared between a mount and the data that refers into it.
pub type SharedDocument = Rc<RefCell<Document>>;

/// Reference to a node of a shared document.
///
/// The reference does not keep the document alive; once the document is
/// dropped the element serializes to nothing.
#[derive(Clone)]
pub struct ElementRef {
    document: Weak<RefCell<Document>>,
    pub node: NodeId,
}

impl ElementRef {
    pub fn new(document: &SharedDocument, node: NodeId) -> Self {
        Self {
            document: Rc::downgrade(document),
            node,
        }
    }

    pub fn document(&self) -> Option<SharedDocument> {
        self.document.upgrade()
    }

    /// Serialized markup of the element, if its document is still alive and
    /// the element has not been removed from it.
    pub fn outer_html(&self) -> Option<String> {
        let document = self.document.upgrade()?;
        let document = document.try_borrow().ok()?;
        document
            .contains(self.node)
            .then(|| outer_html(&document, self.node))
    }
}

impl PartialEq for ElementRef {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && Weak::ptr_eq(&self.document, &other.document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clone_shares_collections() {
        let a = Value::from_pairs([("x", 1)]);
        let b = a.clone();
        b.set("x", Value::from(2));
        assert_eq!(a.get("x"), Some(Value::Number(2.0)));
        assert!(a.ptr_eq(&b));

        let c = a.deep_clone();
        assert!(!a.ptr_eq(&c));
        assert_eq!(a, c);
    }

    #[test]
    fn test_strict_eq() {
        let obj = Value::from_pairs([("x", 1)]);
        assert!(obj.strict_eq(&obj.clone()));
        assert!(!obj.strict_eq(&obj.deep_clone()));
        assert!(Value::from("a").strict_eq(&Value::from("a")));
        assert!(!Value::Number(f64::NAN).strict_eq(&Value::Number(f64::NAN)));
        assert!(!Value::from(1).strict_eq(&Value::from("1")));
    }

    #[test]
    fn test_get_array_and_string_properties() {
        let arr = Value::array(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(arr.get("1"), Some(Value::from("b")));
        assert_eq!(arr.get("length"), Some(Value::Number(2.0)));
        assert_eq!(arr.get("2"), None);
        assert_eq!(Value::from("héllo").get("length"), Some(Value::Number(5.0)));
        assert_eq!(Value::from(3).get("x"), None);
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::Number(6.0).to_display_string(), "6");
        assert_eq!(Value::Number(6.01).to_display_string(), "6.01");
        assert_eq!(Value::Number(-0.0).to_display_string(), "0");
        assert_eq!(Value::Number(f64::INFINITY).to_display_string(), "Infinity");
        assert_eq!(Value::Null.to_display_string(), "");
        assert_eq!(
            Value::array(vec![Value::from(1), Value::from("b")]).to_display_string(),
            "1,b"
        );
        assert_eq!(Value::from_pairs([("a", 1)]).to_display_string(), "[object Object]");
    }

    #[test]
    fn test_json_round_trip() {
        let json = json!({"name": "Bob", "tags": ["a", "b"], "n": 1.5, "ok": true, "z": null});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
        let keys: Vec<_> = value.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "tags", "n", "ok", "z"]);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 5 "), Some(5.0));
        assert_eq!(parse_number("-2.5"), Some(-2.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("nan"), None);
    }

    #[test]
    fn test_array_set_appends_only_at_the_end() {
        let arr = Value::array(vec![Value::from("a")]);
        assert_eq!(arr.try_set("0", Value::from("b")), Ok(Some(Value::from("a"))));
        assert_eq!(arr.try_set("1", Value::from("c")), Ok(None));
        assert_eq!(arr.try_set("5", Value::from("d")), Err(Value::from("d")));
        assert_eq!(
            arr.try_set("18446744073709551615", Value::from("e")),
            Err(Value::from("e"))
        );
        assert_eq!(arr.try_set("x", Value::from("f")), Err(Value::from("f")));
        assert_eq!(arr.get("length"), Some(Value::Number(2.0)));
        assert_eq!(arr.set("9", Value::from("g")), None);
        assert_eq!(arr.get("length"), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_scalar_set_is_rejected() {
        assert_eq!(Value::from(1).try_set("x", Value::Null), Err(Value::Null));
    }
}
