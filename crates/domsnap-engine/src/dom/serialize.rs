//! Deterministic text rendering of a snapshot.

use super::dom_node::{DomNode, NodeIndex};
use super::snapshot::Snapshot;

/// Render indexed elements and free-standing visible text, one per line.
///
/// Indexed elements render as `[i]<tag k="v">text />`, indented by the number
/// of indexed ancestors. Attributes follow the order of `include_attributes`
/// and are skipped when empty or equal to the element's text.
pub fn serialize(snapshot: &Snapshot, include_attributes: &[String]) -> String {
    let mut lines = Vec::new();
    render(snapshot, snapshot.root(), 0, include_attributes, &mut lines);
    lines.join("\n")
}

fn render(
    snapshot: &Snapshot,
    index: NodeIndex,
    depth: usize,
    include_attributes: &[String],
    lines: &mut Vec<String>,
) {
    let Some(node) = snapshot.node(index) else {
        return;
    };

    match node {
        DomNode::Element(element) => {
            let mut next_depth = depth;
            if let Some(highlight) = element.highlight_index {
                next_depth += 1;
                let text = snapshot.text_until_next_clickable(index);

                let mut line = format!("{}[{}]<{}", "\t".repeat(depth), highlight, element.tag_name);
                let attributes: Vec<String> = include_attributes
                    .iter()
                    .filter_map(|name| {
                        let value = element.attribute(name)?;
                        if value.is_empty() || value == text {
                            return None;
                        }
                        Some(format!("{}=\"{}\"", name, value))
                    })
                    .collect();
                if !attributes.is_empty() {
                    line.push(' ');
                    line.push_str(&attributes.join(" "));
                }
                if !text.is_empty() {
                    line.push('>');
                    line.push_str(&text);
                }
                line.push_str(" />");
                lines.push(line);
            }
            for child in &element.children {
                render(snapshot, *child, next_depth, include_attributes, lines);
            }
        }
        DomNode::Text(text) => {
            if text.is_visible && snapshot.indexed_ancestor(index).is_none() {
                lines.push(format!("{}{}", "\t".repeat(depth), text.text.trim()));
            }
        }
    }
}
