//! Immutable capture of a document's interactive structure.

use std::collections::BTreeMap;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::dom_node::{DomNode, ElementNode, NodeIndex};
use super::dom_types::ViewportInfo;

/// Highlight index to element, keys ascending in traversal order.
pub type SelectorMap = BTreeMap<u32, NodeIndex>;

/// Page-level facts recorded with a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotMeta {
    pub url: String,
    pub title: String,
    pub viewport: ViewportInfo,
    pub captured_at: DateTime<Utc>,
    /// Base64-encoded screenshot, when one was requested and the host could provide it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl SnapshotMeta {
    pub fn new(url: impl Into<String>, title: impl Into<String>, viewport: ViewportInfo) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            viewport,
            captured_at: Utc::now(),
            screenshot: None,
        }
    }
}

/// A snapshot owns every node in an arena; parents are plain indices into it.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    nodes: Vec<DomNode>,
    root: NodeIndex,
    selector_map: SelectorMap,
    meta: SnapshotMeta,
}

impl Snapshot {
    pub(crate) fn from_parts(
        nodes: Vec<DomNode>,
        root: NodeIndex,
        selector_map: SelectorMap,
        meta: SnapshotMeta,
    ) -> Self {
        Self {
            nodes,
            root,
            selector_map,
            meta,
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn root_element(&self) -> Option<&ElementNode> {
        self.element(self.root)
    }

    pub fn node(&self, index: NodeIndex) -> Option<&DomNode> {
        self.nodes.get(index.0)
    }

    pub fn element(&self, index: NodeIndex) -> Option<&ElementNode> {
        self.node(index).and_then(DomNode::as_element)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn selector_map(&self) -> &SelectorMap {
        &self.selector_map
    }

    /// Resolve a highlight index to its element.
    pub fn element_by_highlight(&self, highlight: u32) -> Option<(NodeIndex, &ElementNode)> {
        let index = *self.selector_map.get(&highlight)?;
        self.element(index).map(|el| (index, el))
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    pub fn url(&self) -> &str {
        &self.meta.url
    }

    pub fn title(&self) -> &str {
        &self.meta.title
    }

    pub fn viewport(&self) -> &ViewportInfo {
        &self.meta.viewport
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.meta.captured_at
    }

    pub fn screenshot(&self) -> Option<&str> {
        self.meta.screenshot.as_deref()
    }

    /// Decoded screenshot bytes.
    pub fn screenshot_bytes(&self) -> Option<Vec<u8>> {
        let data = self.meta.screenshot.as_deref()?;
        base64::engine::general_purpose::STANDARD.decode(data).ok()
    }

    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.node(index)?.parent()
    }

    pub fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        match self.node(index) {
            Some(DomNode::Element(el)) => &el.children,
            _ => &[],
        }
    }

    /// Nodes in pre-order starting at `start`.
    pub fn descendants(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            out.push(index);
            for child in self.children(index).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Indexed elements in pre-order.
    pub fn clickable_elements(&self) -> Vec<NodeIndex> {
        self.descendants(self.root)
            .into_iter()
            .filter(|index| {
                self.element(*index)
                    .is_some_and(|el| el.highlight_index.is_some())
            })
            .collect()
    }

    /// Enclosing frame elements of a node, outermost first.
    pub fn iframe_ancestors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut frames = Vec::new();
        let mut current = self.parent(index);
        while let Some(ancestor) = current {
            if self.element(ancestor).is_some_and(ElementNode::is_frame) {
                frames.push(ancestor);
            }
            current = self.parent(ancestor);
        }
        frames.reverse();
        frames
    }

    /// Tag names from just below the root down to the node itself.
    pub fn ancestor_tag_path(&self, index: NodeIndex) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = Some(index);
        while let Some(node_index) = current {
            let Some(node) = self.node(node_index) else {
                break;
            };
            let Some(parent) = node.parent() else {
                break;
            };
            if let DomNode::Element(el) = node {
                path.push(el.tag_name.as_str());
            }
            current = Some(parent);
        }
        path.reverse();
        path
    }

    /// Nearest element ancestor carrying a highlight index.
    pub fn indexed_ancestor(&self, index: NodeIndex) -> Option<NodeIndex> {
        let mut current = self.parent(index);
        while let Some(ancestor) = current {
            if self
                .element(ancestor)
                .is_some_and(|el| el.highlight_index.is_some())
            {
                return Some(ancestor);
            }
            current = self.parent(ancestor);
        }
        None
    }

    /// Whether the element, or an element at most `max_depth` levels below
    /// it, is a file input (`type=file` or an `accept` attribute).
    pub fn is_file_uploader(&self, index: NodeIndex, max_depth: usize) -> bool {
        let Some(el) = self.element(index) else {
            return false;
        };
        if el.tag_name == "input"
            && (el
                .attribute("type")
                .is_some_and(|kind| kind.eq_ignore_ascii_case("file"))
                || el.attribute("accept").is_some_and(|accept| !accept.is_empty()))
        {
            return true;
        }
        max_depth > 0
            && el
                .children
                .iter()
                .any(|child| self.is_file_uploader(*child, max_depth - 1))
    }

    /// Text below `index`, stopping at nested indexed elements.
    pub fn text_until_next_clickable(&self, index: NodeIndex) -> String {
        let mut parts = Vec::new();
        self.collect_text(index, index, &mut parts);
        parts.join(" ").trim().to_string()
    }

    fn collect_text<'a>(&'a self, start: NodeIndex, index: NodeIndex, parts: &mut Vec<&'a str>) {
        match self.node(index) {
            Some(DomNode::Text(text)) => {
                let trimmed = text.text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
            }
            Some(DomNode::Element(el)) => {
                if index != start && el.highlight_index.is_some() {
                    return;
                }
                for child in &el.children {
                    self.collect_text(start, *child, parts);
                }
            }
            None => {}
        }
    }
}
