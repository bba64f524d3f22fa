//! Turns the builder's flat node map into a parent-linked snapshot.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::dom_node::{DomNode, ElementNode, NodeIndex, TextNode};
use super::raw_tree::{RawDomTree, RawId, RawNode};
use super::snapshot::{SelectorMap, Snapshot, SnapshotMeta};
use crate::builder::classifier;
use crate::error::EngineError;

/// Build a snapshot from a raw tree.
///
/// Identical raw trees produce isomorphic snapshots: nodes are laid out in
/// pre-order from the root and children keep their recorded order.
pub fn construct(raw: &RawDomTree, meta: SnapshotMeta) -> Result<Snapshot, EngineError> {
    if !raw.nodes.contains_key(&raw.root_id) {
        return Err(EngineError::BuildFailed(format!(
            "root node {} missing from node map",
            raw.root_id
        )));
    }

    // Pass 1: instantiate reachable nodes in pre-order.
    let mut arena: Vec<DomNode> = Vec::with_capacity(raw.nodes.len());
    let mut slots: HashMap<RawId, NodeIndex> = HashMap::with_capacity(raw.nodes.len());
    let mut stack = vec![raw.root_id];
    while let Some(id) = stack.pop() {
        if slots.contains_key(&id) {
            warn!("Node {} referenced more than once, keeping first occurrence", id);
            continue;
        }
        let Some(node) = raw.nodes.get(&id) else {
            warn!("Dangling child id {} in raw tree", id);
            continue;
        };
        slots.insert(id, NodeIndex(arena.len()));
        arena.push(instantiate(node));
        if let RawNode::Element(el) = node {
            for child in el.children.iter().rev() {
                stack.push(*child);
            }
        }
    }

    // Pass 2: wire children and parent back-references.
    for (id, slot) in &slots {
        let Some(RawNode::Element(raw_el)) = raw.nodes.get(id) else {
            continue;
        };
        let children: Vec<NodeIndex> = raw_el
            .children
            .iter()
            .filter_map(|child| slots.get(child).copied())
            .collect();
        for child in &children {
            arena[child.0].set_parent(*slot);
        }
        if let DomNode::Element(el) = &mut arena[slot.0] {
            el.children = children;
        }
    }

    // Pass 3: nested indexed nodes keep their index only when distinctly interactive.
    let mut selector_map = SelectorMap::new();
    let mut dropped = 0usize;
    for position in 0..arena.len() {
        let Some(highlight) = arena[position].as_element().and_then(|el| el.highlight_index) else {
            continue;
        };
        let keep = match indexed_parent(&arena, NodeIndex(position)) {
            None => true,
            Some(_) => arena[position].as_element().is_some_and(|el| {
                el.is_distinct || classifier::is_distinct_by_attributes(&el.tag_name, &el.attributes)
            }),
        };
        if keep {
            selector_map.insert(highlight, NodeIndex(position));
        } else if let DomNode::Element(el) = &mut arena[position] {
            el.highlight_index = None;
            dropped += 1;
        }
    }

    debug!(
        nodes = arena.len(),
        indexed = selector_map.len(),
        dropped,
        "Constructed snapshot"
    );

    let root = slots
        .get(&raw.root_id)
        .copied()
        .ok_or_else(|| EngineError::BuildFailed("root node not instantiated".to_string()))?;

    Ok(Snapshot::from_parts(arena, root, selector_map, meta))
}

fn instantiate(node: &RawNode) -> DomNode {
    match node {
        RawNode::Text(text) => DomNode::Text(TextNode {
            text: text.text.clone(),
            is_visible: text.is_visible,
            parent: None,
        }),
        RawNode::Element(el) => DomNode::Element(ElementNode {
            tag_name: el.tag_name.clone(),
            xpath: el.xpath.clone(),
            attributes: el.attributes.clone(),
            children: Vec::new(),
            parent: None,
            is_visible: el.is_visible,
            is_top_element: el.is_top_element,
            is_interactive: el.is_interactive,
            is_in_viewport: el.is_in_viewport,
            has_shadow_root: el.shadow_root,
            is_distinct: el.is_distinct,
            highlight_index: el.highlight_index,
        }),
    }
}

/// Parents precede children in the arena, so a parent dropped earlier in
/// pass 3 no longer counts as indexed here.
fn indexed_parent(arena: &[DomNode], index: NodeIndex) -> Option<NodeIndex> {
    let parent = arena[index.0].parent()?;
    arena[parent.0]
        .as_element()
        .and_then(|el| el.highlight_index)
        .map(|_| parent)
}
