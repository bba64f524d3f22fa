//! Snapshot data model.
//!
//! The tree builder produces a flat [`RawDomTree`]; [`construct`] turns it into
//! an immutable [`Snapshot`] whose nodes live in an arena and point at their
//! parents by index. Hashing, serialization and selector generation all work
//! on snapshots.

mod constructor;
mod css_selector;
mod dom_node;
mod dom_types;
mod hash;
mod raw_tree;
mod serialize;
mod snapshot;

pub use constructor::construct;
pub use css_selector::{enhanced_css_selector, xpath_to_css};
pub use dom_node::{DomNode, ElementNode, NodeIndex, TextNode};
pub use dom_types::{BoundingBox, CaptureWindow, ViewportInfo};
pub use hash::{
    clickable_hashes, hash_element, ChangeDetector, ElementHash, SnapshotDiff,
    HASH_EXCLUDED_ATTRIBUTES,
};
pub use raw_tree::{RawDomTree, RawElementNode, RawId, RawNode, RawTextNode};
pub use serialize::serialize;
pub use snapshot::{SelectorMap, Snapshot, SnapshotMeta};

#[cfg(test)]
#[path = "dom_tests.rs"]
mod tests;
