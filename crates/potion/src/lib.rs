/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! A small markup template engine.
//!
//! Templates are markup with bracketed tokens:
//!
//! - `[name]` substitutes a value, `[user.name]` walks a dotted path;
//! - `[items]...[/items]` is a block: rendered once per entry of a
//!   collection, kept or dropped for a boolean, replaced by the value
//!   otherwise;
//! - `[price | round:2 | prepend:$]` pipes the value through filters.
//!
//! Rendered output can be mounted into a [`potion_dom::Document`] page,
//! where `@event` attributes become bindings resolved against the data the
//! element was rendered from. A reactive mount re-renders and reconciles the
//! page in place whenever its data changes.
//!
//! # Example
//!
//! ```rust
//! use potion::{Value, render};
//!
//! let data = Value::from(serde_json::json!({
//!     "title": "Menu",
//!     "open": true,
//!     "price": 2.456
//! }));
//! let html = render(
//!     "<h1>[title | uppercase]</h1>[open]<p>Open</p>[/open]<p>[price | round:2]</p>",
//!     &data,
//! )
//! .unwrap();
//! assert_eq!(html, "<h1>MENU</h1><p>Open</p><p>2.46</p>");
//! ```

pub mod bindings;
pub mod contexts;
pub mod engine;
pub mod error;
pub mod filters;
pub mod guard;
pub mod mount;
pub mod reactive;
pub mod settings;
pub mod substitute;
pub mod templates;
pub mod tokenizer;
pub mod value;

pub use bindings::{Binding, BindingTable, Event, Handler, Modifiers};
pub use contexts::LocalContexts;
pub use engine::{Engine, default_engine, render};
pub use error::{TemplateError, TemplateResult};
pub use filters::{FilterCall, FilterRegistry, FilterResult};
pub use mount::{Mount, ReactiveMount};
pub use reactive::{ChangeCallback, Observed, Reactive, WrapperCache, wrap};
pub use settings::{BlockMatching, MountOptions, Settings};
pub use templates::TemplateRegistry;
pub use tokenizer::{Flag, Token, TokenCache, tokenize};
pub use value::{ElementRef, Map, SharedDocument, Value};
