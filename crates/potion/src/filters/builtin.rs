/*
 * filters/builtin.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The `token` lookup filter and the built-in filter catalogue.
//!
//! Every built-in checks the shape of its input and hands anything it does
//! not apply to back unchanged. Arguments that fail to parse as numbers make
//! numeric filters a no-op.

use super::{FilterCall, FilterRegistry, FilterResult};
use crate::error::TemplateError;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::rc::Rc;

type Builtin = fn(Value, &FilterCall<'_>) -> FilterResult;

/// Name of the filter that resolves a token's lookup key against the data.
pub const TOKEN: &str = "token";

const CATALOGUE: &[(&str, Builtin)] = &[
    (TOKEN, token),
    // strings
    ("uppercase", uppercase),
    ("lowercase", lowercase),
    ("capitalize", capitalize),
    ("truncate", truncate),
    ("trim", trim),
    ("lstrip", lstrip),
    ("rstrip", rstrip),
    ("append", append),
    ("default", default),
    ("prepend", prepend),
    ("remove", remove),
    ("remove_first", remove_first),
    ("replace", replace),
    ("replace_first", replace_first),
    ("split", split),
    ("strip_html", strip_html),
    ("url_decode", url_decode),
    ("url_encode", url_encode),
    ("escape", escape),
    // numbers
    ("abs", abs),
    ("at_least", at_least),
    ("at_most", at_most),
    ("ceil", ceil),
    ("floor", floor),
    ("divided_by", divided_by),
    ("minus", minus),
    ("modulo", modulo),
    ("plus", plus),
    ("round", round),
    ("times", times),
    // collections
    ("size", size),
    ("compact", compact),
    ("first", first),
    ("last", last),
    ("join", join),
    ("map", map),
    ("reverse", reverse),
    ("slice", slice),
    ("sort", sort),
    ("unique", unique),
];

/// Register the lookup filter and every built-in at priority 0.
pub fn install(registry: &mut FilterRegistry) {
    for &(name, func) in CATALOGUE {
        registry.insert(name, Rc::new(func), 0);
    }
}

/// Names of the built-in filters, lookup filter included.
pub fn names() -> impl Iterator<Item = &'static str> {
    CATALOGUE.iter().map(|&(name, _)| name)
}

fn keep(value: Value) -> FilterResult {
    Ok(Some(value))
}

fn map_str(value: Value, f: impl FnOnce(&str) -> Value) -> FilterResult {
    match &value {
        Value::String(s) => Ok(Some(f(s))),
        _ => keep(value),
    }
}

fn map_number(value: Value, f: impl FnOnce(f64) -> f64) -> FilterResult {
    match value.as_number() {
        Some(n) => Ok(Some(Value::Number(f(n)))),
        None => keep(value),
    }
}

fn with_number_arg(
    value: Value,
    call: &FilterCall<'_>,
    f: impl FnOnce(f64, f64) -> Option<f64>,
) -> FilterResult {
    let result = match (value.as_number(), call.number_arg(0)) {
        (Some(n), Some(arg)) => f(n, arg),
        _ => None,
    };
    match result {
        Some(n) => Ok(Some(Value::Number(n))),
        None => keep(value),
    }
}

// Lookup

/// Walk the dotted path in `value` through the render data. Any missing
/// segment resolves to the empty string; elements resolve to their markup.
fn token(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Value::String(path) = &value else {
        return keep(value);
    };
    let mut current = call.data.clone();
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Ok(Some(Value::String(String::new()))),
        }
    }
    if let Value::Element(element) = &current {
        return Ok(Some(Value::String(
            element.outer_html().unwrap_or_default(),
        )));
    }
    Ok(Some(current))
}

// Strings

fn uppercase(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| Value::from(s.to_uppercase()))
}

fn lowercase(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| Value::from(s.to_lowercase()))
}

fn capitalize(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => Value::from(first.to_uppercase().chain(chars).collect::<String>()),
            None => Value::from(""),
        }
    })
}

fn truncate(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let length = match call.arg(0) {
        None => 50.0,
        Some(_) => match call.number_arg(0) {
            Some(n) => n,
            None => return keep(value),
        },
    };
    let ellipsis = call.arg(1).unwrap_or_default();
    map_str(value, |s| {
        let limit = length.max(0.0).floor() as usize;
        if s.chars().count() > limit {
            let mut out: String = s.chars().take(limit).collect();
            out.push_str(ellipsis);
            Value::from(out)
        } else {
            Value::from(s)
        }
    })
}

fn trim(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| Value::from(s.trim()))
}

fn lstrip(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| Value::from(s.trim_start()))
}

fn rstrip(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| Value::from(s.trim_end()))
}

fn append(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Some(suffix) = call.arg(0) else {
        return keep(value);
    };
    map_str(value, |s| Value::from(format!("{}{}", s, suffix)))
}

fn prepend(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Some(prefix) = call.arg(0) else {
        return keep(value);
    };
    map_str(value, |s| Value::from(format!("{}{}", prefix, s)))
}

fn default(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let empty = match &value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        Ok(Some(Value::from(call.arg(0).unwrap_or_default())))
    } else {
        keep(value)
    }
}

/// Replace every occurrence of `search`. An empty `search` matches between
/// characters, not at the ends.
fn replace_all(s: &str, search: &str, replacement: &str) -> String {
    if search.is_empty() {
        s.chars()
            .map(String::from)
            .collect::<Vec<_>>()
            .join(replacement)
    } else {
        s.replace(search, replacement)
    }
}

fn remove(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Some(search) = call.arg(0) else {
        return keep(value);
    };
    map_str(value, |s| Value::from(replace_all(s, search, "")))
}

fn remove_first(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Some(search) = call.arg(0) else {
        return keep(value);
    };
    map_str(value, |s| Value::from(s.replacen(search, "", 1)))
}

fn replace(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Some(search) = call.arg(0) else {
        return keep(value);
    };
    let replacement = call.arg(1).unwrap_or_default();
    map_str(value, |s| Value::from(replace_all(s, search, replacement)))
}

fn replace_first(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Some(search) = call.arg(0) else {
        return keep(value);
    };
    let replacement = call.arg(1).unwrap_or_default();
    map_str(value, |s| Value::from(s.replacen(search, replacement, 1)))
}

fn split(value: Value, call: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| {
        let parts: Vec<Value> = match call.arg(0) {
            None => vec![Value::from(s)],
            Some("") => s.chars().map(|c| Value::from(c.to_string())).collect(),
            Some(delimiter) => s.split(delimiter).map(Value::from).collect(),
        };
        Value::array(parts)
    })
}

static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("html tag pattern is valid"));

fn strip_html(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| Value::from(HTML_TAG.replace_all(s, "").into_owned()))
}

fn is_uri_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&byte)
}

fn url_encode(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| {
        let mut out = String::with_capacity(s.len());
        for &byte in s.as_bytes() {
            if is_uri_unreserved(byte) {
                out.push(byte as char);
            } else {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
        Value::from(out)
    })
}

fn url_decode(value: Value, _: &FilterCall<'_>) -> FilterResult {
    let Value::String(s) = &value else {
        return keep(value);
    };
    let malformed = || TemplateError::filter("url_decode", "malformed percent-encoding");
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or_else(malformed)?;
            let hex = std::str::from_utf8(hex).map_err(|_| malformed())?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| malformed())?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    let decoded = String::from_utf8(out).map_err(|_| malformed())?;
    Ok(Some(Value::from(decoded)))
}

fn escape(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_str(value, |s| {
        // `&` first so the entities introduced below are not escaped again.
        Value::from(
            s.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace('"', "&quot;")
                .replace('\'', "&#39;"),
        )
    })
}

// Numbers

fn abs(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_number(value, f64::abs)
}

fn at_least(value: Value, call: &FilterCall<'_>) -> FilterResult {
    with_number_arg(value, call, |n, min| Some(n.max(min)))
}

fn at_most(value: Value, call: &FilterCall<'_>) -> FilterResult {
    with_number_arg(value, call, |n, max| Some(n.min(max)))
}

fn ceil(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_number(value, f64::ceil)
}

fn floor(value: Value, _: &FilterCall<'_>) -> FilterResult {
    map_number(value, f64::floor)
}

fn divided_by(value: Value, call: &FilterCall<'_>) -> FilterResult {
    with_number_arg(value, call, |n, divisor| {
        (divisor != 0.0).then(|| n / divisor)
    })
}

fn minus(value: Value, call: &FilterCall<'_>) -> FilterResult {
    with_number_arg(value, call, |n, m| Some(n - m))
}

fn modulo(value: Value, call: &FilterCall<'_>) -> FilterResult {
    with_number_arg(value, call, |n, divisor| {
        (divisor != 0.0).then(|| n % divisor)
    })
}

fn plus(value: Value, call: &FilterCall<'_>) -> FilterResult {
    with_number_arg(value, call, |n, m| Some(n + m))
}

fn times(value: Value, call: &FilterCall<'_>) -> FilterResult {
    with_number_arg(value, call, |n, m| Some(n * m))
}

/// Round half toward positive infinity.
fn round_half_up(x: f64) -> f64 {
    let floor = x.floor();
    if x - floor >= 0.5 { floor + 1.0 } else { floor }
}

fn round(value: Value, call: &FilterCall<'_>) -> FilterResult {
    // An absent or non-numeric precision rounds to an integer.
    let precision = call
        .number_arg(0)
        .filter(|p| p.is_finite())
        .unwrap_or(0.0);
    map_number(value, |n| {
        let factor = 10f64.powf(precision);
        round_half_up(n * factor) / factor
    })
}

// Collections

fn size(value: Value, _: &FilterCall<'_>) -> FilterResult {
    let n = match &value {
        Value::Array(items) => items.borrow().len(),
        Value::Object(map) => map.borrow().len(),
        Value::String(s) => s.chars().count(),
        _ => return keep(value),
    };
    Ok(Some(Value::from(n)))
}

fn compact(value: Value, _: &FilterCall<'_>) -> FilterResult {
    match &value {
        Value::Array(items) => Ok(Some(Value::array(
            items.borrow().iter().filter(|v| !v.is_null()).cloned().collect(),
        ))),
        _ => keep(value),
    }
}

fn first(value: Value, _: &FilterCall<'_>) -> FilterResult {
    match &value {
        Value::Array(items) => Ok(items.borrow().first().cloned()),
        Value::String(s) => Ok(Some(Value::from(
            s.chars().next().map(String::from).unwrap_or_default(),
        ))),
        _ => keep(value),
    }
}

fn last(value: Value, _: &FilterCall<'_>) -> FilterResult {
    match &value {
        Value::Array(items) => Ok(items.borrow().last().cloned()),
        Value::String(s) => Ok(Some(Value::from(
            s.chars().last().map(String::from).unwrap_or_default(),
        ))),
        _ => keep(value),
    }
}

fn join(value: Value, call: &FilterCall<'_>) -> FilterResult {
    match &value {
        Value::Array(items) => {
            let separator = call.arg(0).unwrap_or_default();
            Ok(Some(Value::from(
                items
                    .borrow()
                    .iter()
                    .map(Value::to_display_string)
                    .collect::<Vec<_>>()
                    .join(separator),
            )))
        }
        _ => keep(value),
    }
}

fn map(value: Value, call: &FilterCall<'_>) -> FilterResult {
    match &value {
        Value::Array(items) => {
            let property = call.arg(0).unwrap_or_default();
            Ok(Some(Value::array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.get(property).unwrap_or_default())
                    .collect(),
            )))
        }
        _ => keep(value),
    }
}

fn reverse(value: Value, _: &FilterCall<'_>) -> FilterResult {
    match &value {
        Value::Array(items) => {
            let mut copy = items.borrow().clone();
            copy.reverse();
            Ok(Some(Value::array(copy)))
        }
        Value::String(s) => Ok(Some(Value::from(s.chars().rev().collect::<String>()))),
        _ => keep(value),
    }
}

/// Resolve `start`/`len` against a sequence of `count` items. A negative
/// start counts from the end; a missing length runs to the end.
fn slice_range(count: usize, start: f64, len: Option<f64>) -> (usize, usize) {
    let start = if start < 0.0 {
        (count as f64 + start).max(0.0)
    } else {
        start.min(count as f64)
    };
    let start = start as usize;
    let end = match len {
        Some(len) => (start as f64 + len.max(0.0)).min(count as f64) as usize,
        None => count,
    };
    (start, end.max(start))
}

fn slice(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Some(start) = call.number_arg(0) else {
        return keep(value);
    };
    let len = call.number_arg(1);
    match &value {
        Value::Array(items) => {
            let items = items.borrow();
            let (from, to) = slice_range(items.len(), start, len);
            Ok(Some(Value::array(items[from..to].to_vec())))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (from, to) = slice_range(chars.len(), start, len);
            Ok(Some(Value::from(chars[from..to].iter().collect::<String>())))
        }
        _ => keep(value),
    }
}

/// Numbers compare numerically with each other; anything else compares by
/// its string form.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        _ => a.to_display_string().cmp(&b.to_display_string()),
    }
}

fn sort(value: Value, call: &FilterCall<'_>) -> FilterResult {
    let Value::Array(items) = &value else {
        return keep(value);
    };
    let mut copy = items.borrow().clone();
    match call.arg(0).filter(|p| !p.is_empty()) {
        Some(property) => copy.sort_by(|a, b| {
            compare_values(
                &a.get(property).unwrap_or_default(),
                &b.get(property).unwrap_or_default(),
            )
        }),
        None if copy.iter().all(|v| matches!(v, Value::Number(_))) => {
            copy.sort_by(compare_values)
        }
        None => copy.sort_by_key(Value::to_display_string),
    }
    Ok(Some(Value::array(copy)))
}

/// Equality for `unique`: like strict equality, except `NaN` equals itself.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => a.strict_eq(b),
    }
}

fn unique(value: Value, _: &FilterCall<'_>) -> FilterResult {
    let Value::Array(items) = &value else {
        return keep(value);
    };
    let mut seen: Vec<Value> = Vec::new();
    for item in items.borrow().iter() {
        if !seen.iter().any(|s| same_value_zero(s, item)) {
            seen.push(item.clone());
        }
    }
    Ok(Some(Value::array(seen)))
}
