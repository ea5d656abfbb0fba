/*
 * reactive.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Change observation for template data.
//!
//! A [`Reactive`] wraps an array or object. Reads through the wrapper hand
//! back nested collections wrapped in turn; writes go to the underlying
//! value and call the change callback, synchronously, whenever the stored
//! value actually changed (strict inequality). The callback is told nothing
//! about what changed.
//!
//! Wrappers are cached per collection identity, so reading the same nested
//! object twice yields the same wrapper for as long as somebody holds it.
//! The cache holds weak references only and never keeps a collection or a
//! wrapper alive.

use crate::value::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::trace;

/// The callback invoked after a changing write.
pub type ChangeCallback = Rc<dyn Fn()>;

/// The result of wrapping or reading: a wrapper for collections within the
/// depth limit, the plain value otherwise.
#[derive(Debug, Clone)]
pub enum Observed {
    Plain(Value),
    Reactive(Reactive),
}

impl Observed {
    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Observed::Reactive(r) => Some(r),
            Observed::Plain(_) => None,
        }
    }

    pub fn into_reactive(self) -> Option<Reactive> {
        match self {
            Observed::Reactive(r) => Some(r),
            Observed::Plain(_) => None,
        }
    }

    /// The underlying value, unwrapped.
    pub fn into_value(self) -> Value {
        match self {
            Observed::Plain(v) => v,
            Observed::Reactive(r) => r.target().clone(),
        }
    }
}

impl From<Observed> for Value {
    fn from(observed: Observed) -> Self {
        observed.into_value()
    }
}

/// An observing wrapper around an array or object.
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ReactiveInner>,
}

struct ReactiveInner {
    target: Value,
    on_change: ChangeCallback,
    max_depth: Option<usize>,
    depth: usize,
    cache: WrapperCache,
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.inner.target)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

impl Reactive {
    /// The wrapped value. Writes made directly to it are not observed.
    pub fn target(&self) -> &Value {
        &self.inner.target
    }

    /// Nesting depth of this wrapper below the one originally requested.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Whether both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read property `key`, wrapping collections one level deeper.
    pub fn get(&self, key: &str) -> Option<Observed> {
        let value = self.inner.target.get(key)?;
        Some(self.inner.cache.wrap_at(
            value,
            Rc::clone(&self.inner.on_change),
            self.inner.max_depth,
            self.inner.depth + 1,
        ))
    }

    /// Write property `key`. The change callback runs before this returns
    /// when the value was stored and is not strictly equal to the old one.
    /// Writes the target rejects (see [`Value::try_set`]) never notify.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let changed = match self.inner.target.try_set(key, value.clone()) {
            Ok(previous) => previous.is_none_or(|old| !old.strict_eq(&value)),
            Err(_) => {
                trace!(key, "ignored write to reactive target");
                false
            }
        };
        if changed {
            (self.inner.on_change)();
        }
    }

    /// Append to a wrapped array. A no-op on objects.
    pub fn push(&self, value: impl Into<Value>) {
        if let Value::Array(items) = &self.inner.target {
            let index = items.borrow().len();
            self.set(&index.to_string(), value);
        }
    }

    /// `(key, value)` entries, with collections wrapped.
    pub fn entries(&self) -> Vec<(String, Observed)> {
        self.inner
            .target
            .entries()
            .into_iter()
            .map(|(k, v)| {
                let observed = self.inner.cache.wrap_at(
                    v,
                    Rc::clone(&self.inner.on_change),
                    self.inner.max_depth,
                    self.inner.depth + 1,
                );
                (k, observed)
            })
            .collect()
    }
}

impl From<Reactive> for Value {
    fn from(reactive: Reactive) -> Self {
        reactive.target().clone()
    }
}

/// Weak handle to the allocation behind a collection.
enum WeakTarget {
    Array(Weak<RefCell<Vec<Value>>>),
    Object(Weak<RefCell<Map>>),
}

impl WeakTarget {
    fn is(&self, value: &Value) -> bool {
        match (self, value) {
            (WeakTarget::Array(w), Value::Array(rc)) => std::ptr::eq(w.as_ptr(), Rc::as_ptr(rc)),
            (WeakTarget::Object(w), Value::Object(rc)) => std::ptr::eq(w.as_ptr(), Rc::as_ptr(rc)),
            _ => false,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            WeakTarget::Array(w) => w.strong_count() > 0,
            WeakTarget::Object(w) => w.strong_count() > 0,
        }
    }
}

struct CacheEntry {
    target: WeakTarget,
    wrapper: Weak<ReactiveInner>,
}

/// Identity-keyed cache of wrappers.
///
/// Cloning shares the cache. A wrapper found in the cache is returned as is,
/// whatever callback the caller passed.
#[derive(Clone, Default)]
pub struct WrapperCache {
    entries: Rc<RefCell<HashMap<usize, CacheEntry>>>,
}

impl fmt::Debug for WrapperCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperCache")
            .field("live", &self.len())
            .finish()
    }
}

fn identity(value: &Value) -> Option<(usize, WeakTarget)> {
    match value {
        Value::Array(rc) => Some((
            Rc::as_ptr(rc) as *const () as usize,
            WeakTarget::Array(Rc::downgrade(rc)),
        )),
        Value::Object(rc) => Some((
            Rc::as_ptr(rc) as *const () as usize,
            WeakTarget::Object(Rc::downgrade(rc)),
        )),
        _ => None,
    }
}

impl WrapperCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `target`, reusing the cached wrapper for its identity if one is
    /// still alive. `max_depth` of `None` observes at any depth; `Some(0)`
    /// returns the value unwrapped.
    pub fn wrap(
        &self,
        target: Value,
        on_change: ChangeCallback,
        max_depth: Option<usize>,
    ) -> Observed {
        self.wrap_at(target, on_change, max_depth, 0)
    }

    fn wrap_at(
        &self,
        target: Value,
        on_change: ChangeCallback,
        max_depth: Option<usize>,
        depth: usize,
    ) -> Observed {
        if max_depth.is_some_and(|max| depth >= max) {
            return Observed::Plain(target);
        }
        let Some((key, weak_target)) = identity(&target) else {
            return Observed::Plain(target);
        };

        if let Some(existing) = self.lookup(key, &target) {
            return Observed::Reactive(existing);
        }

        let inner = Rc::new(ReactiveInner {
            target,
            on_change,
            max_depth,
            depth,
            cache: self.clone(),
        });
        let mut entries = self.entries.borrow_mut();
        entries.retain(|_, entry| entry.wrapper.strong_count() > 0);
        entries.insert(
            key,
            CacheEntry {
                target: weak_target,
                wrapper: Rc::downgrade(&inner),
            },
        );
        Observed::Reactive(Reactive { inner })
    }

    fn lookup(&self, key: usize, target: &Value) -> Option<Reactive> {
        let entries = self.entries.borrow();
        let entry = entries.get(&key)?;
        if !entry.target.is_alive() || !entry.target.is(target) {
            return None;
        }
        entry.wrapper.upgrade().map(|inner| Reactive { inner })
    }

    /// Number of cached wrappers still alive.
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|entry| entry.wrapper.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

thread_local! {
    static DEFAULT_CACHE: WrapperCache = WrapperCache::new();
}

/// Wrap `target` using this thread's default wrapper cache.
pub fn wrap(target: Value, on_change: ChangeCallback, max_depth: Option<usize>) -> Observed {
    DEFAULT_CACHE.with(|cache| cache.wrap(target, on_change, max_depth))
}
