//! Arena-backed markup tree.
//!
//! A [`Document`] owns its nodes in a slot arena. Nodes are addressed by
//! [`NodeId`] and linked through parent/child indices, so a live tree can be
//! patched in place while outside code keeps stable handles to the nodes that
//! survive the patch. Detached nodes stay allocated until
//! [`Document::remove`] releases them; released slots are reused, and the
//! generation carried by each id keeps old handles from resolving to the new
//! occupant.

use std::fmt;

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl NodeId {
    /// Position of the node in its document's arena.
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            0 => write!(f, "#{}", self.index),
            g => write!(f, "#{}.{}", self.index, g),
        }
    }
}

/// A single `name="value"` pair on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// An element with a lowercase tag name and attributes in source order.
    Element {
        name: String,
        attributes: Vec<Attribute>,
    },

    /// A run of character data.
    Text(String),
}

/// Discriminant of [`NodeData`], used when comparing node pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    generation: u32,
}

/// A markup tree rooted at a single element.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: NodeId,
}

impl Document {
    /// Create a document whose root is an empty `<root_tag>` element.
    pub fn new(root_tag: &str) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        doc.root = doc.create_element(root_tag);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Make `id` the document root. The previous root is left detached.
    pub fn set_root(&mut self, id: NodeId) {
        self.detach(id);
        self.root = id;
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Element {
            name: name.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.nodes[index];
                slot.data = data;
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.nodes.len();
                self.nodes.push(Node {
                    data,
                    parent: None,
                    children: Vec::new(),
                    generation: 0,
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Detach `id` and release its whole subtree.
    ///
    /// The released slots are handed out again by later `create_*` and
    /// `import` calls. Ids into the subtree go stale: [`Document::contains`]
    /// and [`Document::is_attached`] report false for them. The root cannot
    /// be removed.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root || !self.contains(id) {
            return;
        }
        self.detach(id);
        for node in self.descendants(id) {
            let slot = &mut self.nodes[node.index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.data = NodeData::Text(String::new());
            slot.parent = None;
            slot.children.clear();
            self.free.push(node.index);
        }
    }

    /// Whether `id` names a node that has not been removed.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.index)
            .is_some_and(|node| node.generation == id.generation)
    }

    /// Number of live nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Number of arena slots, including released ones awaiting reuse.
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index].data
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        match self.data(id) {
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.kind(id) == NodeKind::Element
    }

    /// Tag name of an element, `None` for text nodes.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            NodeData::Element { name, .. } => Some(name),
            NodeData::Text(_) => None,
        }
    }

    /// Content of a text node, `None` for elements.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    /// Replace the content of a text node. Elements are left untouched.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let NodeData::Text(current) = &mut self.nodes[id.index].data {
            *current = text.into();
        }
    }

    /// Concatenated text of the node and all of its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(text) = self.text(node) {
                out.push_str(text);
            }
        }
        out
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match self.data(id) {
            NodeData::Element { attributes, .. } => attributes,
            NodeData::Text(_) => &[],
        }
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    /// Set an attribute, keeping its position when it already exists.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let NodeData::Element { attributes, .. } = &mut self.nodes[id.index].data {
            let value = value.into();
            match attributes.iter_mut().find(|a| a.name == name) {
                Some(existing) => existing.value = value,
                None => attributes.push(Attribute::new(name, value)),
            }
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let NodeData::Element { attributes, .. } = &mut self.nodes[id.index].data {
            let pos = attributes.iter().position(|a| a.name == name)?;
            return Some(attributes.remove(pos).value);
        }
        None
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index].children
    }

    /// Child elements only, skipping text.
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.index].parent = Some(parent);
        self.nodes[parent.index].children.push(child);
    }

    /// Insert `child` before `reference`, which must be a child of `parent`.
    /// Falls back to appending when `reference` is not found.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        self.nodes[child.index].parent = Some(parent);
        let siblings = &mut self.nodes[parent.index].children;
        match siblings.iter().position(|&c| c == reference) {
            Some(pos) => siblings.insert(pos, child),
            None => siblings.push(child),
        }
    }

    /// Unlink `id` from its parent. The node and its subtree stay allocated.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.index].parent.take() {
            self.nodes[parent.index].children.retain(|&c| c != id);
        }
    }

    /// Put `new` in the position currently held by `old`.
    ///
    /// When `old` is the document root, `new` becomes the root.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        self.detach(new);
        match self.nodes[old.index].parent {
            Some(parent) => {
                let siblings = &mut self.nodes[parent.index].children;
                if let Some(pos) = siblings.iter().position(|&c| c == old) {
                    siblings[pos] = new;
                }
                self.nodes[new.index].parent = Some(parent);
                self.nodes[old.index].parent = None;
            }
            None if old == self.root => self.root = new,
            None => {}
        }
    }

    /// Deep-copy the subtree at `id` of `other` into this document.
    ///
    /// The copy is returned detached; attach it with [`Document::append_child`]
    /// or [`Document::replace`].
    pub fn import(&mut self, other: &Document, id: NodeId) -> NodeId {
        let copy = self.push(other.data(id).clone());
        for &child in other.children(id) {
            let child_copy = self.import(other, child);
            self.nodes[child_copy.index].parent = Some(copy);
            self.nodes[copy.index].children.push(child_copy);
        }
        copy
    }

    /// Whether `id` is live and reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(id) && self.ancestors_inclusive(id).last().copied() == Some(self.root)
    }

    /// `id` followed by its parent, grandparent, and so on.
    pub fn ancestors_inclusive(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Pre-order traversal of the subtree at `id`, including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    /// First element in the subtree at `id` (pre-order) matching `predicate`.
    pub fn find_element(
        &self,
        id: NodeId,
        mut predicate: impl FnMut(&Document, NodeId) -> bool,
    ) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&n| self.is_element(n) && predicate(self, n))
    }

    /// Structural equality of two subtrees, ignoring node identity.
    pub fn same_subtree(&self, id: NodeId, other: &Document, other_id: NodeId) -> bool {
        self.data(id) == other.data(other_id)
            && self.children(id).len() == other.children(other_id).len()
            && self
                .children(id)
                .iter()
                .zip(other.children(other_id))
                .all(|(&a, &b)| self.same_subtree(a, other, b))
    }
}
