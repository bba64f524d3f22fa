//! Re-finds live elements from snapshot nodes.
//!
//! A node's xpath is relative to the nearest document or shadow root, so the
//! locator first hops through every enclosing frame and shadow host
//! (outermost first), then resolves the node in the innermost scope with its
//! enhanced CSS selector and, failing that, its absolute xpath.

use tracing::{debug, warn};

use crate::dom::{enhanced_css_selector, ElementNode, NodeIndex, Snapshot};
use crate::error::{EngineError, HostError};
use crate::host::{DocumentHost, NodeHandle};

/// How a node's scope changes below an ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hop {
    Frame(NodeIndex),
    Shadow(NodeIndex),
}

impl Hop {
    fn element(self) -> NodeIndex {
        match self {
            Hop::Frame(index) | Hop::Shadow(index) => index,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Locator {
    include_dynamic_attributes: bool,
}

impl Locator {
    pub fn new(include_dynamic_attributes: bool) -> Self {
        Self {
            include_dynamic_attributes,
        }
    }

    /// Selector used for `element` in its own scope.
    pub fn selector_for(&self, element: &ElementNode) -> String {
        enhanced_css_selector(element, self.include_dynamic_attributes)
    }

    /// Resolve a snapshot node to a live element. Unreachable frames and
    /// misses are logged and yield `None`.
    pub async fn locate<H: DocumentHost + ?Sized>(
        &self,
        host: &H,
        snapshot: &Snapshot,
        node: NodeIndex,
    ) -> Option<NodeHandle> {
        match self.try_locate(host, snapshot, node).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(node = node.get(), error = %err, "Cannot locate element");
                None
            }
        }
    }

    /// Like [`Locator::locate`], reporting why the element was not found.
    pub async fn try_locate<H: DocumentHost + ?Sized>(
        &self,
        host: &H,
        snapshot: &Snapshot,
        node: NodeIndex,
    ) -> Result<NodeHandle, EngineError> {
        let target = snapshot
            .element(node)
            .ok_or_else(|| EngineError::LocatorMiss(format!("node {} is not an element", node.get())))?;

        let mut scope = host.document().await?;
        let mut in_shadow = false;
        for hop in scope_hops(snapshot, node) {
            let Some(element) = snapshot.element(hop.element()) else {
                continue;
            };
            let live = self
                .resolve(host, scope, in_shadow, element)
                .await
                .ok_or_else(|| EngineError::LocatorMiss(element.xpath.clone()))?;

            scope = match hop {
                Hop::Frame(_) => match host.content_document(live).await {
                    Ok(Some(document)) => document,
                    Ok(None) => {
                        return Err(EngineError::LocatorMiss(format!(
                            "{} has no document",
                            element.xpath
                        )));
                    }
                    Err(HostError::CrossOrigin(source)) => {
                        return Err(EngineError::CrossOriginFrame(source));
                    }
                    Err(err) => return Err(err.into()),
                },
                Hop::Shadow(_) => host.shadow_root(live).await?.ok_or_else(|| {
                    EngineError::LocatorMiss(format!("{} has no shadow root", element.xpath))
                })?,
            };
            in_shadow = matches!(hop, Hop::Shadow(_));
        }

        self.resolve(host, scope, in_shadow, target)
            .await
            .ok_or_else(|| EngineError::LocatorMiss(target.xpath.clone()))
    }

    /// CSS selector first, absolute xpath second.
    ///
    /// Paths inside a shadow root start at its top level, so the selector is
    /// anchored there with `:scope`.
    async fn resolve<H: DocumentHost + ?Sized>(
        &self,
        host: &H,
        scope: NodeHandle,
        in_shadow: bool,
        element: &ElementNode,
    ) -> Option<NodeHandle> {
        let mut selector = self.selector_for(element);
        if in_shadow {
            selector.insert_str(0, ":scope > ");
        }
        match host.query_selector(scope, &selector).await {
            Ok(Some(found)) => return Some(found),
            Ok(None) => debug!(selector = %selector, "Selector matched nothing"),
            Err(err) => debug!(selector = %selector, error = %err, "Selector query failed"),
        }

        let xpath = format!("/{}", element.xpath.trim_start_matches('/'));
        match host.query_xpath(scope, &xpath).await {
            Ok(found) => found,
            Err(err) => {
                debug!(xpath = %xpath, error = %err, "XPath query failed");
                None
            }
        }
    }
}

/// Frame and shadow boundaries between the root and `node`, outermost first.
///
/// Children a shadow host got from its shadow root restart their xpath at a
/// single segment, while light children always extend the host's path.
fn scope_hops(snapshot: &Snapshot, node: NodeIndex) -> Vec<Hop> {
    let mut hops = Vec::new();
    let mut child = node;
    while let Some(parent) = snapshot.parent(child) {
        if let (Some(parent_el), Some(child_el)) = (snapshot.element(parent), snapshot.element(child)) {
            if parent_el.is_frame() {
                hops.push(Hop::Frame(parent));
            } else if parent_el.has_shadow_root && !child_el.xpath.contains('/') {
                hops.push(Hop::Shadow(parent));
            }
        }
        child = parent;
    }
    hops.reverse();
    hops
}

#[cfg(test)]
#[path = "locator_tests.rs"]
mod tests;
