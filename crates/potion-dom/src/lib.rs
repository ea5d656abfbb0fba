//! Markup trees for the potion template engine.
//!
//! This crate provides the tree side of the rendering pipeline:
//!
//! - [`Document`]: an arena-backed element/text tree with stable [`NodeId`]s
//! - [`parse_fragment`]: a lenient HTML fragment parser built on [`quick-xml`]
//! - [`outer_html`] / [`inner_html`]: serialization back to markup
//! - [`reconcile`]: in-place patching of a live tree against a fresh one
//!
//! # Example
//!
//! ```rust
//! use potion_dom::{inner_html, parse_fragment, reconcile};
//!
//! let mut live = parse_fragment("<p>Hello</p>", "div").unwrap();
//! let fresh = parse_fragment("<p>Hello, world</p><hr>", "div").unwrap();
//!
//! let root = live.root();
//! let patches = reconcile(&mut live, root, &fresh, fresh.root());
//!
//! assert_eq!(patches.len(), 2);
//! assert_eq!(inner_html(&live, root), "<p>Hello, world</p><hr>");
//! ```
//!
//! [`quick-xml`]: https://docs.rs/quick-xml

pub mod error;
pub mod node;
pub mod parser;
pub mod reconcile;
pub mod serialize;

pub use error::{Error, Result};
pub use node::{Attribute, Document, NodeData, NodeId, NodeKind};
pub use parser::{is_known_element, is_raw_text_element, is_void_element, parse_fragment};
pub use reconcile::{Patch, is_binding_attribute, reconcile};
pub use serialize::{inner_html, outer_html};
