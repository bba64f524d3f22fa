//! Host seam: the live document the engine reads from and acts on.
//!
//! A host answers primitive questions about one page (tree shape, styles,
//! geometry, hit testing, queries) and performs element actions. All
//! geometry is reported in top-level viewport coordinates, so frame content
//! needs no further offsetting.

mod cdp_host;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::dom::{BoundingBox, ViewportInfo};
use crate::error::HostError;

pub use cdp_host::CdpDocument;
pub use memory::{ActionEffect, ClickMethod, ElementSpec, MemoryDocument};

/// Opaque reference to a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    ShadowRoot,
    Element,
    Text,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub kind: NodeKind,
    /// Lowercase tag name; empty for non-elements.
    pub tag_name: String,
    /// Character data of text nodes.
    pub text: Option<String>,
}

impl NodeInfo {
    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }
}

/// The handful of computed properties the classifier looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub cursor: String,
    pub position: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: "1".to_string(),
            cursor: "auto".to_string(),
            position: "static".to_string(),
        }
    }
}

impl ComputedStyle {
    /// Rendered at all: not `display:none`, not hidden, not fully transparent.
    pub fn is_css_visible(&self) -> bool {
        self.display != "none" && self.visibility != "hidden" && self.opacity != "0"
    }

    pub fn is_fixed_or_sticky(&self) -> bool {
        self.position == "fixed" || self.position == "sticky"
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeLayout {
    pub bounding_rect: Option<BoundingBox>,
    pub client_rects: Vec<BoundingBox>,
    pub offset_width: f64,
    pub offset_height: f64,
}

impl NodeLayout {
    pub fn has_offset_size(&self) -> bool {
        self.offset_width > 0.0 && self.offset_height > 0.0
    }

    /// Client rects with area, or the bounding rect when there are none.
    pub fn visible_rects(&self) -> Vec<BoundingBox> {
        let rects: Vec<BoundingBox> = self
            .client_rects
            .iter()
            .filter(|r| !r.is_empty())
            .copied()
            .collect();
        if !rects.is_empty() || !self.client_rects.is_empty() {
            return rects;
        }
        self.bounding_rect
            .filter(|r| !r.is_empty())
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    /// The host can enumerate event listeners registered on an element.
    pub listener_introspection: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// Read access to the live document.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    fn capabilities(&self) -> HostCapabilities;

    async fn page_info(&self) -> Result<PageInfo, HostError>;

    async fn viewport(&self) -> Result<ViewportInfo, HostError>;

    /// The top-level document node.
    async fn document(&self) -> Result<NodeHandle, HostError>;

    async fn body(&self, document: NodeHandle) -> Result<Option<NodeHandle>, HostError>;

    async fn node_info(&self, node: NodeHandle) -> Result<NodeInfo, HostError>;

    /// Child nodes of an element, document or shadow root, in tree order.
    async fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, HostError>;

    async fn attributes(&self, element: NodeHandle) -> Result<BTreeMap<String, String>, HostError>;

    /// Parent element across shadow boundaries; `None` at a document root.
    async fn parent_element(&self, node: NodeHandle) -> Result<Option<NodeHandle>, HostError>;

    async fn shadow_root(&self, element: NodeHandle) -> Result<Option<NodeHandle>, HostError>;

    /// Document of an iframe. Fails with [`HostError::CrossOrigin`] when the
    /// frame belongs to another origin.
    async fn content_document(&self, frame: NodeHandle) -> Result<Option<NodeHandle>, HostError>;

    async fn computed_style(&self, element: NodeHandle) -> Result<ComputedStyle, HostError>;

    async fn layout(&self, node: NodeHandle) -> Result<NodeLayout, HostError>;

    /// Deepest element painted at a point, searched within `scope`'s frame.
    async fn element_from_point(
        &self,
        scope: NodeHandle,
        x: f64,
        y: f64,
    ) -> Result<Option<NodeHandle>, HostError>;

    /// Whether pointer or keyboard listeners are registered on the element.
    async fn has_event_listeners(&self, element: NodeHandle) -> Result<bool, HostError> {
        let _ = element;
        Err(HostError::Unsupported("event listener introspection".to_string()))
    }

    async fn query_selector(
        &self,
        scope: NodeHandle,
        selector: &str,
    ) -> Result<Option<NodeHandle>, HostError>;

    async fn query_xpath(&self, scope: NodeHandle, xpath: &str)
        -> Result<Option<NodeHandle>, HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// One observed document mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// Tag of the mutated node, or of the text node's parent.
    pub target_tag: String,
    #[serde(default)]
    pub attribute_name: Option<String>,
    /// Tags of the target's ancestors, nearest first.
    #[serde(default)]
    pub ancestor_tags: Vec<String>,
    /// The target sits inside the engine's highlight container.
    #[serde(default)]
    pub inside_overlay: bool,
}

impl MutationRecord {
    pub fn child_list(target_tag: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target_tag: target_tag.into(),
            attribute_name: None,
            ancestor_tags: Vec::new(),
            inside_overlay: false,
        }
    }

    pub fn attribute(target_tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target_tag: target_tag.into(),
            attribute_name: Some(name.into()),
            ancestor_tags: Vec::new(),
            inside_overlay: false,
        }
    }

    pub fn with_ancestors(mut self, ancestor_tags: Vec<String>) -> Self {
        self.ancestor_tags = ancestor_tags;
        self
    }
}

/// Live mutation stream. Dropping it disconnects the observer.
pub struct MutationSubscription {
    rx: mpsc::UnboundedReceiver<MutationRecord>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl MutationSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<MutationRecord>) -> Self {
        Self { rx, teardown: None }
    }

    pub fn with_teardown(mut self, teardown: impl FnOnce() + Send + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Next record; `None` once the source has gone away.
    pub async fn recv(&mut self) -> Option<MutationRecord> {
        self.rx.recv().await
    }
}

impl Drop for MutationSubscription {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

pub trait MutationSource: Send + Sync {
    fn observe_mutations(&self) -> MutationSubscription;
}

/// Handle to a mounted overlay container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayContainer(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub index: u32,
    pub rect: BoundingBox,
    pub color: String,
    pub background: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLabel {
    pub index: u32,
    pub text: String,
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    pub color: String,
}

/// Everything drawn in the container at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayFrame {
    pub boxes: Vec<OverlayBox>,
    pub labels: Vec<OverlayLabel>,
}

#[async_trait]
pub trait OverlaySurface: Send + Sync {
    async fn mount_overlay(
        &self,
        container_id: &str,
        z_index: u32,
    ) -> Result<OverlayContainer, HostError>;

    /// Replace the container's contents with `frame`.
    async fn draw_overlay(
        &self,
        container: OverlayContainer,
        frame: &OverlayFrame,
    ) -> Result<(), HostError>;

    async fn unmount_overlay(&self, container: OverlayContainer) -> Result<(), HostError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub index: usize,
    pub text: String,
    pub value: String,
    pub selected: bool,
}

#[async_trait]
pub trait ElementActions: Send + Sync {
    /// Native activation (`element.click()`).
    async fn click(&self, element: NodeHandle) -> Result<(), HostError>;

    /// Dispatch a synthetic bubbling `click` event.
    async fn dispatch_click(&self, element: NodeHandle) -> Result<(), HostError>;

    async fn focus(&self, element: NodeHandle) -> Result<(), HostError>;

    /// Scroll the element into view unless it is already visible.
    async fn scroll_into_view(&self, element: NodeHandle) -> Result<(), HostError>;

    async fn is_content_editable(&self, element: NodeHandle) -> Result<bool, HostError>;

    /// Clear and set the value (or text of a contenteditable), then
    /// dispatch `input` and `change`.
    async fn set_value(&self, element: NodeHandle, value: &str) -> Result<(), HostError>;

    async fn select_options(&self, element: NodeHandle) -> Result<Vec<SelectOption>, HostError>;

    /// Select an option by position. Returns whether the selection changed;
    /// `change` and `input` fire only then.
    async fn choose_option(&self, element: NodeHandle, index: usize) -> Result<bool, HostError>;
}

/// Privileged requests outside the document itself.
#[async_trait]
pub trait HostChannel: Send + Sync {
    /// Base64 PNG of the visible viewport; `None` when unavailable.
    async fn capture_screenshot(&self) -> Option<String>;
}

/// Everything the capture loop and the action executor need from a page.
pub trait Host: DocumentHost + MutationSource + OverlaySurface + ElementActions + HostChannel {}

impl<T> Host for T where
    T: DocumentHost + MutationSource + OverlaySurface + ElementActions + HostChannel + ?Sized
{
}
