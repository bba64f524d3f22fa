//! Flat node map produced by the tree builder.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Identifier of a node inside one [`RawDomTree`].
pub type RawId = u32;

/// A text node as recorded during the walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextNode {
    pub text: String,
    pub is_visible: bool,
}

/// An element as recorded during the walk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawElementNode {
    pub tag_name: String,
    pub xpath: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<RawId>,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub is_top_element: bool,
    #[serde(default)]
    pub is_interactive: bool,
    #[serde(default)]
    pub is_in_viewport: bool,
    #[serde(default)]
    pub shadow_root: bool,
    /// Indexed under an indexed ancestor because it handles input on its own.
    #[serde(default)]
    pub is_distinct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_index: Option<u32>,
}

/// Raw node, either text or element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawNode {
    Text(RawTextNode),
    Element(RawElementNode),
}

/// Output of one tree walk: every kept node keyed by id, plus the root (the body).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDomTree {
    pub root_id: RawId,
    pub nodes: HashMap<RawId, RawNode>,
}

impl RawDomTree {
    pub fn get(&self, id: RawId) -> Option<&RawNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Highlight indices present in the map, ascending.
    pub fn highlight_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .nodes
            .values()
            .filter_map(|node| match node {
                RawNode::Element(el) => el.highlight_index,
                RawNode::Text(_) => None,
            })
            .collect();
        indices.sort_unstable();
        indices
    }
}
