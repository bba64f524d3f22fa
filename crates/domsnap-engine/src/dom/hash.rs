//! Element fingerprints and snapshot change detection.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::dom_node::NodeIndex;
use super::serialize::serialize;
use super::snapshot::Snapshot;

/// Attributes that churn without changing what an element is.
pub const HASH_EXCLUDED_ATTRIBUTES: &[&str] = &[
    "class",
    "style",
    "value",
    "aria-expanded",
    "aria-selected",
    "aria-checked",
    "aria-pressed",
    "aria-busy",
    "data-state",
];

/// Lowercase hex SHA-256 fingerprint of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementHash(String);

impl ElementHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Fingerprint an element from its tag path, included attributes and xpath.
///
/// Returns `None` when `index` is not an element of `snapshot`.
pub fn hash_element(snapshot: &Snapshot, index: NodeIndex) -> Option<ElementHash> {
    let element = snapshot.element(index)?;

    let path = snapshot.ancestor_tag_path(index).join("/");
    // JSON-encoded pairs keep names and values apart whatever they contain.
    let attributes: Vec<(&str, &str)> = element
        .attributes
        .iter()
        .filter(|(name, _)| !HASH_EXCLUDED_ATTRIBUTES.contains(&name.as_str()))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let attributes = serde_json::to_string(&attributes).unwrap_or_default();

    let composite = format!(
        "{}-{}-{}",
        sha256_hex(&path),
        sha256_hex(&attributes),
        sha256_hex(&element.xpath)
    );
    Some(ElementHash(sha256_hex(&composite)))
}

/// Hashes of every indexed element, keyed by highlight index.
pub fn clickable_hashes(snapshot: &Snapshot) -> Vec<(u32, ElementHash)> {
    snapshot
        .selector_map()
        .iter()
        .filter_map(|(highlight, index)| hash_element(snapshot, *index).map(|h| (*highlight, h)))
        .collect()
}

/// Result of comparing a snapshot with the previous capture of the same URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    /// The serialized form differs from the cached one (or nothing was cached).
    pub changed: bool,
    /// Indices whose hash was absent from the previous capture of this URL.
    pub new_elements: Vec<u32>,
    /// Serialized text of the compared snapshot.
    #[serde(skip)]
    pub serialized: String,
}

#[derive(Debug)]
struct CachedCapture {
    serialized: String,
    hashes: HashSet<ElementHash>,
}

/// Remembers the last capture per URL.
#[derive(Debug)]
pub struct ChangeDetector {
    include_attributes: Vec<String>,
    cache: HashMap<String, CachedCapture>,
}

impl ChangeDetector {
    pub fn new(include_attributes: Vec<String>) -> Self {
        Self {
            include_attributes,
            cache: HashMap::new(),
        }
    }

    pub fn include_attributes(&self) -> &[String] {
        &self.include_attributes
    }

    /// Compare with the cached capture of the same URL and replace the cache entry.
    pub fn diff(&mut self, snapshot: &Snapshot) -> SnapshotDiff {
        let serialized = serialize(snapshot, &self.include_attributes);
        let hashes = clickable_hashes(snapshot);

        let previous = self.cache.get(snapshot.url());
        let changed = previous.is_none_or(|cached| cached.serialized != serialized);
        let new_elements = match previous {
            Some(cached) => hashes
                .iter()
                .filter(|(_, hash)| !cached.hashes.contains(hash))
                .map(|(highlight, _)| *highlight)
                .collect(),
            None => Vec::new(),
        };

        debug!(
            url = snapshot.url(),
            changed,
            new = new_elements.len(),
            "Compared snapshot with cache"
        );

        self.cache.insert(
            snapshot.url().to_string(),
            CachedCapture {
                serialized: serialized.clone(),
                hashes: hashes.into_iter().map(|(_, hash)| hash).collect(),
            },
        );

        SnapshotDiff {
            changed,
            new_elements,
            serialized,
        }
    }

    /// Serialized text cached for a URL.
    pub fn cached_text(&self, url: &str) -> Option<&str> {
        self.cache.get(url).map(|cached| cached.serialized.as_str())
    }

    pub fn forget(&mut self, url: &str) {
        self.cache.remove(url);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
