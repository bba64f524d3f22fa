//! Snapshot nodes stored in an arena owned by the snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Position of a node in its snapshot's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Text content of the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    pub is_visible: bool,
    /// Back-reference into the arena, never owning.
    pub parent: Option<NodeIndex>,
}

/// An element of the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementNode {
    /// Tag name (lowercase).
    pub tag_name: String,

    /// XPath from the nearest boundary (document, frame document or shadow root).
    pub xpath: String,

    pub attributes: BTreeMap<String, String>,

    /// Owned children, in document order.
    pub children: Vec<NodeIndex>,

    /// Back-reference into the arena, never owning.
    pub parent: Option<NodeIndex>,

    pub is_visible: bool,
    pub is_top_element: bool,
    pub is_interactive: bool,
    pub is_in_viewport: bool,
    pub has_shadow_root: bool,

    /// Set when the builder kept this index under an indexed ancestor.
    #[serde(default)]
    pub is_distinct: bool,

    /// Index assigned when the element is visible, on top, interactive and in view.
    pub highlight_index: Option<u32>,
}

impl ElementNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Frames switch the document scope for their descendants.
    pub fn is_frame(&self) -> bool {
        matches!(self.tag_name.as_str(), "iframe" | "frame")
    }
}

/// A node in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomNode {
    Text(TextNode),
    Element(ElementNode),
}

impl DomNode {
    pub fn parent(&self) -> Option<NodeIndex> {
        match self {
            DomNode::Text(text) => text.parent,
            DomNode::Element(el) => el.parent,
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            DomNode::Text(text) => text.is_visible,
            DomNode::Element(el) => el.is_visible,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            DomNode::Element(el) => Some(el),
            DomNode::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            DomNode::Text(text) => Some(text),
            DomNode::Element(_) => None,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: NodeIndex) {
        match self {
            DomNode::Text(text) => text.parent = Some(parent),
            DomNode::Element(el) => el.parent = Some(parent),
        }
    }
}
