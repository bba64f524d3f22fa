//! In-memory document host.
//!
//! Documents are assembled explicitly: every element carries its own
//! geometry, style overrides, listeners, shadow root or frame document.
//! Elements without an explicit rect take the union of their rendered
//! children. `visibility` and `cursor` inherit along the composed tree the
//! way computed styles do in a browser.

mod query;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::trace;

use super::{
    ComputedStyle, DocumentHost, ElementActions, HostCapabilities, HostChannel, MutationKind,
    MutationRecord, MutationSource, MutationSubscription, NodeHandle, NodeInfo, NodeKind,
    NodeLayout, OverlayContainer, OverlayFrame, OverlaySurface, PageInfo, SelectOption,
};
use crate::builder::classifier::{is_content_editable_attr, INTERACTION_EVENTS};
use crate::dom::{BoundingBox, ViewportInfo};
use crate::error::HostError;

/// Description of an element to append.
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    attributes: BTreeMap<String, String>,
    rect: Option<BoundingBox>,
    client_rects: Option<Vec<BoundingBox>>,
    display: Option<String>,
    visibility: Option<String>,
    opacity: Option<String>,
    cursor: Option<String>,
    position: Option<String>,
    z_index: Option<i32>,
    listeners: Vec<String>,
    text: Option<String>,
    value: String,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Some(BoundingBox::new(x, y, width, height));
        self
    }

    /// Fragment boxes, for inline content wrapping over several lines.
    pub fn client_rects(mut self, rects: Vec<BoundingBox>) -> Self {
        self.client_rects = Some(rects);
        self
    }

    pub fn display(mut self, display: &str) -> Self {
        self.display = Some(display.to_string());
        self
    }

    pub fn visibility(mut self, visibility: &str) -> Self {
        self.visibility = Some(visibility.to_string());
        self
    }

    pub fn opacity(mut self, opacity: &str) -> Self {
        self.opacity = Some(opacity.to_string());
        self
    }

    pub fn cursor(mut self, cursor: &str) -> Self {
        self.cursor = Some(cursor.to_string());
        self
    }

    pub fn position(mut self, position: &str) -> Self {
        self.position = Some(position.to_string());
        self
    }

    /// Paint order; higher wins hit tests. Inherited by descendants.
    pub fn z_index(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    pub fn listener(mut self, event: &str) -> Self {
        self.listeners.push(event.to_string());
        self
    }

    /// Append a text child with this content.
    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMethod {
    Native,
    Synthetic,
}

/// Side effect recorded by an element action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEffect {
    Click { target: NodeHandle, method: ClickMethod },
    Focus(NodeHandle),
    Input(NodeHandle),
    Change(NodeHandle),
}

#[derive(Debug, Clone)]
struct MemNode {
    kind: NodeKind,
    tag: String,
    text: String,
    attributes: BTreeMap<String, String>,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    shadow_root: Option<NodeHandle>,
    /// Shadow root: its host element. Frame document: its iframe.
    host: Option<NodeHandle>,
    content_document: Option<NodeHandle>,
    cross_origin: bool,
    rect: Option<BoundingBox>,
    client_rects: Option<Vec<BoundingBox>>,
    display: Option<String>,
    visibility: Option<String>,
    opacity: Option<String>,
    cursor: Option<String>,
    position: Option<String>,
    z_index: Option<i32>,
    listeners: Vec<String>,
    value: String,
    selected_index: Option<usize>,
    attached: bool,
}

impl MemNode {
    fn new(kind: NodeKind, tag: &str) -> Self {
        Self {
            kind,
            tag: tag.to_string(),
            text: String::new(),
            attributes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            shadow_root: None,
            host: None,
            content_document: None,
            cross_origin: false,
            rect: None,
            client_rects: None,
            display: None,
            visibility: None,
            opacity: None,
            cursor: None,
            position: None,
            z_index: None,
            listeners: Vec::new(),
            value: String::new(),
            selected_index: None,
            attached: true,
        }
    }

    fn from_spec(spec: ElementSpec) -> Self {
        let mut node = MemNode::new(NodeKind::Element, &spec.tag);
        node.attributes = spec.attributes;
        node.rect = spec.rect;
        node.client_rects = spec.client_rects;
        node.display = spec.display;
        node.visibility = spec.visibility;
        node.opacity = spec.opacity;
        node.cursor = spec.cursor;
        node.position = spec.position;
        node.z_index = spec.z_index;
        node.listeners = spec.listeners;
        node.value = spec.value;
        node
    }

    fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }
}

#[derive(Debug, Clone)]
struct MountedOverlay {
    container_id: String,
    frame: OverlayFrame,
}

#[derive(Debug)]
struct DocState {
    nodes: Vec<MemNode>,
    document: NodeHandle,
    viewport: ViewportInfo,
    page: PageInfo,
    capabilities: HostCapabilities,
    effects: Vec<ActionEffect>,
    scrolled: Vec<NodeHandle>,
    focused: Option<NodeHandle>,
    failing_native: HashSet<NodeHandle>,
    failing_synthetic: HashSet<NodeHandle>,
    overlays: BTreeMap<u64, MountedOverlay>,
    next_overlay: u64,
    screenshot: Option<String>,
}

impl DocState {
    fn get(&self, handle: NodeHandle) -> Result<&MemNode, HostError> {
        self.nodes
            .get(handle.0 as usize)
            .filter(|node| node.attached)
            .ok_or(HostError::NodeGone(handle.0))
    }

    fn get_mut(&mut self, handle: NodeHandle) -> Result<&mut MemNode, HostError> {
        self.nodes
            .get_mut(handle.0 as usize)
            .filter(|node| node.attached)
            .ok_or(HostError::NodeGone(handle.0))
    }

    fn element(&self, handle: NodeHandle) -> Result<&MemNode, HostError> {
        let node = self.get(handle)?;
        if !node.is_element() {
            return Err(HostError::Protocol(format!("node {} is not an element", handle.0)));
        }
        Ok(node)
    }

    fn push(&mut self, parent: Option<NodeHandle>, mut node: MemNode) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len() as u64);
        node.parent = parent;
        self.nodes.push(node);
        if let Some(parent) = parent {
            self.nodes[parent.0 as usize].children.push(handle);
        }
        handle
    }

    /// Parent element across shadow boundaries.
    fn composed_parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let parent = self.get(handle).ok()?.parent?;
        let parent_node = self.get(parent).ok()?;
        match parent_node.kind {
            NodeKind::Element => Some(parent),
            NodeKind::ShadowRoot => parent_node.host,
            _ => None,
        }
    }

    /// Like [`Self::composed_parent`] but also steps out of frame documents.
    fn render_parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let parent = self.get(handle).ok()?.parent?;
        let parent_node = self.get(parent).ok()?;
        match parent_node.kind {
            NodeKind::Element => Some(parent),
            NodeKind::ShadowRoot | NodeKind::Document => parent_node.host,
            _ => None,
        }
    }

    fn ancestor_tags(&self, handle: NodeHandle) -> Vec<String> {
        let mut tags = Vec::new();
        let mut current = self.composed_parent(handle);
        while let Some(node) = current {
            if let Ok(el) = self.get(node) {
                tags.push(el.tag.clone());
            }
            current = self.composed_parent(node);
        }
        tags
    }

    /// No element on the way up to the top-level document is `display:none`.
    fn is_rendered(&self, handle: NodeHandle) -> bool {
        let mut current = Some(handle);
        while let Some(node) = current {
            match self.get(node) {
                Ok(n) if n.display.as_deref() == Some("none") => return false,
                Ok(_) => {}
                Err(_) => return false,
            }
            current = self.render_parent(node);
        }
        true
    }

    fn inherited<'a>(
        &'a self,
        handle: NodeHandle,
        field: impl Fn(&'a MemNode) -> Option<&'a String>,
    ) -> Option<&'a str> {
        let mut current = Some(handle);
        while let Some(node) = current {
            if let Some(value) = self.get(node).ok().and_then(&field) {
                return Some(value.as_str());
            }
            current = self.composed_parent(node);
        }
        None
    }

    fn effective_z(&self, handle: NodeHandle) -> i32 {
        let mut current = Some(handle);
        while let Some(node) = current {
            if let Some(z) = self.get(node).ok().and_then(|n| n.z_index) {
                return z;
            }
            current = self.render_parent(node);
        }
        0
    }

    /// Explicit rect, or the union of rendered children.
    fn own_rect(&self, handle: NodeHandle) -> Option<BoundingBox> {
        let node = self.get(handle).ok()?;
        if let Some(rect) = node.rect {
            return Some(rect);
        }
        let mut union: Option<BoundingBox> = None;
        let shadow_children = node
            .shadow_root
            .and_then(|root| self.get(root).ok())
            .map(|root| root.children.clone())
            .unwrap_or_default();
        for child in node.children.iter().chain(shadow_children.iter()) {
            let Ok(child_node) = self.get(*child) else {
                continue;
            };
            if !child_node.is_element() || child_node.display.as_deref() == Some("none") {
                continue;
            }
            let Some(rect) = self.own_rect(*child) else {
                continue;
            };
            if rect.is_empty() {
                continue;
            }
            union = Some(match union {
                None => rect,
                Some(acc) => {
                    let left = acc.left().min(rect.left());
                    let top = acc.top().min(rect.top());
                    let right = acc.right().max(rect.right());
                    let bottom = acc.bottom().max(rect.bottom());
                    BoundingBox::new(left, top, right - left, bottom - top)
                }
            });
        }
        union
    }

    fn element_layout(&self, handle: NodeHandle) -> Result<NodeLayout, HostError> {
        let node = self.get(handle)?;
        if !self.is_rendered(handle) {
            return Ok(NodeLayout {
                bounding_rect: Some(BoundingBox::default()),
                ..Default::default()
            });
        }
        let rect = self.own_rect(handle).unwrap_or_default();
        let client_rects = match &node.client_rects {
            Some(rects) => rects.clone(),
            None if rect.is_empty() => Vec::new(),
            None => vec![rect],
        };
        Ok(NodeLayout {
            bounding_rect: Some(rect),
            client_rects,
            offset_width: rect.width.max(0.0),
            offset_height: rect.height.max(0.0),
        })
    }

    fn text_content(&self, handle: NodeHandle) -> String {
        let Ok(node) = self.get(handle) else {
            return String::new();
        };
        match node.kind {
            NodeKind::Text => node.text.clone(),
            _ => node
                .children
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
        }
    }

    /// The document a node belongs to.
    fn owner_document(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let mut current = handle;
        loop {
            let node = self.get(current).ok()?;
            match node.kind {
                NodeKind::Document => return Some(current),
                NodeKind::ShadowRoot => current = node.host?,
                _ => current = node.parent?,
            }
        }
    }

    /// Elements of a document's composed tree in paint order, frames excluded.
    fn paint_order(&self, root: NodeHandle, out: &mut Vec<NodeHandle>) {
        let Ok(node) = self.get(root) else {
            return;
        };
        if node.is_element() {
            out.push(root);
        }
        if let Some(shadow) = node.shadow_root {
            self.paint_order(shadow, out);
        }
        for child in &node.children {
            self.paint_order(*child, out);
        }
    }

    fn option_handles(&self, select: NodeHandle) -> Vec<NodeHandle> {
        let mut options = Vec::new();
        let Ok(node) = self.get(select) else {
            return options;
        };
        for child in &node.children {
            let Ok(child_node) = self.get(*child) else {
                continue;
            };
            match child_node.tag.as_str() {
                "option" => options.push(*child),
                "optgroup" => options.extend(
                    child_node
                        .children
                        .iter()
                        .filter(|h| self.get(**h).is_ok_and(|n| n.tag == "option"))
                        .copied(),
                ),
                _ => {}
            }
        }
        options
    }

    fn current_option(&self, select: NodeHandle, options: &[NodeHandle]) -> usize {
        if let Some(index) = self.get(select).ok().and_then(|n| n.selected_index) {
            return index;
        }
        options
            .iter()
            .position(|h| self.get(*h).is_ok_and(|n| n.attributes.contains_key("selected")))
            .unwrap_or(0)
    }

    fn option_value(&self, option: NodeHandle) -> String {
        match self.get(option).ok().and_then(|n| n.attributes.get("value")) {
            Some(value) => value.clone(),
            None => self.text_content(option).trim().to_string(),
        }
    }

    fn record(&self, kind: MutationKind, target: NodeHandle) -> MutationRecord {
        let target_tag = match self.get(target) {
            Ok(node) if node.is_element() => node.tag.clone(),
            _ => self
                .composed_parent(target)
                .and_then(|p| self.get(p).ok())
                .map(|p| p.tag.clone())
                .unwrap_or_default(),
        };
        MutationRecord {
            kind,
            target_tag,
            attribute_name: None,
            ancestor_tags: self.ancestor_tags(target),
            inside_overlay: false,
        }
    }
}

/// A document held entirely in memory.
pub struct MemoryDocument {
    state: RwLock<DocState>,
    observers: Mutex<Vec<mpsc::UnboundedSender<MutationRecord>>>,
}

impl MemoryDocument {
    /// An empty `html > body` document with a 1280x720 viewport.
    pub fn new(url: &str, title: &str) -> Self {
        let viewport = ViewportInfo::default();
        let mut state = DocState {
            nodes: Vec::new(),
            document: NodeHandle(0),
            viewport,
            page: PageInfo {
                url: url.to_string(),
                title: title.to_string(),
            },
            capabilities: HostCapabilities {
                listener_introspection: true,
            },
            effects: Vec::new(),
            scrolled: Vec::new(),
            focused: None,
            failing_native: HashSet::new(),
            failing_synthetic: HashSet::new(),
            overlays: BTreeMap::new(),
            next_overlay: 1,
            screenshot: None,
        };
        let document = Self::create_document(&mut state, &viewport);
        state.document = document;
        Self {
            state: RwLock::new(state),
            observers: Mutex::new(Vec::new()),
        }
    }

    fn create_document(state: &mut DocState, viewport: &ViewportInfo) -> NodeHandle {
        let document = state.push(None, MemNode::new(NodeKind::Document, ""));
        let mut html = MemNode::new(NodeKind::Element, "html");
        html.rect = Some(BoundingBox::new(
            0.0,
            0.0,
            viewport.width as f64,
            viewport.height as f64,
        ));
        let html = state.push(Some(document), html);
        state.push(Some(html), MemNode::new(NodeKind::Element, "body"));
        document
    }

    pub fn with_viewport(self, width: u32, height: u32) -> Self {
        {
            let mut state = self.state.write();
            state.viewport.width = width;
            state.viewport.height = height;
            let document = state.document;
            if let Some(html) = state.get(document).ok().and_then(|d| d.children.first().copied()) {
                if let Ok(node) = state.get_mut(html) {
                    node.rect = Some(BoundingBox::new(0.0, 0.0, width as f64, height as f64));
                }
            }
        }
        self
    }

    pub fn set_listener_introspection(&self, enabled: bool) {
        self.state.write().capabilities.listener_introspection = enabled;
    }

    pub fn set_screenshot(&self, screenshot: Option<String>) {
        self.state.write().screenshot = screenshot;
    }

    pub fn set_page(&self, url: &str, title: &str) {
        let mut state = self.state.write();
        state.page = PageInfo {
            url: url.to_string(),
            title: title.to_string(),
        };
    }

    pub fn document_handle(&self) -> NodeHandle {
        self.state.read().document
    }

    pub fn body_handle(&self) -> NodeHandle {
        let state = self.state.read();
        Self::body_of(&state, state.document).unwrap_or(state.document)
    }

    fn body_of(state: &DocState, document: NodeHandle) -> Option<NodeHandle> {
        let html = state
            .get(document)
            .ok()?
            .children
            .iter()
            .copied()
            .find(|h| state.get(*h).is_ok_and(|n| n.tag == "html"))?;
        state
            .get(html)
            .ok()?
            .children
            .iter()
            .copied()
            .find(|h| state.get(*h).is_ok_and(|n| n.tag == "body"))
    }

    /// Append an element under an element, document or shadow root.
    pub fn append(&self, parent: NodeHandle, spec: ElementSpec) -> NodeHandle {
        let text = spec.text.clone();
        let handle = {
            let mut state = self.state.write();
            let handle = state.push(Some(parent), MemNode::from_spec(spec));
            if let Some(text) = text {
                let mut node = MemNode::new(NodeKind::Text, "");
                node.text = text;
                state.push(Some(handle), node);
            }
            handle
        };
        self.notify_child_list(parent);
        handle
    }

    pub fn append_text(&self, parent: NodeHandle, text: &str) -> NodeHandle {
        let handle = {
            let mut state = self.state.write();
            let mut node = MemNode::new(NodeKind::Text, "");
            node.text = text.to_string();
            state.push(Some(parent), node)
        };
        self.notify_child_list(parent);
        handle
    }

    /// Attach an open shadow root and return it.
    pub fn attach_shadow(&self, host: NodeHandle) -> NodeHandle {
        let mut state = self.state.write();
        let mut root = MemNode::new(NodeKind::ShadowRoot, "");
        root.host = Some(host);
        let root = state.push(None, root);
        if let Ok(node) = state.get_mut(host) {
            node.shadow_root = Some(root);
        }
        root
    }

    /// Append an iframe with its own `html > body` document.
    ///
    /// Returns the iframe and the frame's body. A cross-origin frame refuses
    /// access to its document.
    pub fn append_frame(
        &self,
        parent: NodeHandle,
        spec: ElementSpec,
        cross_origin: bool,
    ) -> (NodeHandle, NodeHandle) {
        let (frame, body) = {
            let mut state = self.state.write();
            let viewport = state.viewport;
            let mut node = MemNode::from_spec(spec);
            node.cross_origin = cross_origin;
            let frame = state.push(Some(parent), node);
            let document = Self::create_document(&mut state, &viewport);
            let frame_rect = state.own_rect(frame);
            if let Some(html) = state.get(document).ok().and_then(|d| d.children.first().copied()) {
                if let Ok(html_node) = state.get_mut(html) {
                    html_node.rect = frame_rect;
                }
            }
            if let Ok(doc_node) = state.get_mut(document) {
                doc_node.host = Some(frame);
            }
            if let Ok(frame_node) = state.get_mut(frame) {
                frame_node.content_document = Some(document);
            }
            let body = Self::body_of(&state, document).unwrap_or(document);
            (frame, body)
        };
        self.notify_child_list(parent);
        (frame, body)
    }

    pub fn set_attribute(&self, element: NodeHandle, name: &str, value: &str) {
        let record = {
            let mut state = self.state.write();
            let Ok(node) = state.get_mut(element) else {
                return;
            };
            node.attributes.insert(name.to_string(), value.to_string());
            let mut record = state.record(MutationKind::Attributes, element);
            record.attribute_name = Some(name.to_string());
            record
        };
        self.notify(record);
    }

    pub fn set_rect(&self, element: NodeHandle, rect: BoundingBox) {
        if let Ok(node) = self.state.write().get_mut(element) {
            node.rect = Some(rect);
        }
    }

    pub fn set_display(&self, element: NodeHandle, display: &str) {
        if let Ok(node) = self.state.write().get_mut(element) {
            node.display = Some(display.to_string());
        }
    }

    /// Detach a node and its subtree.
    pub fn remove(&self, node: NodeHandle) {
        let parent = {
            let mut state = self.state.write();
            let Ok(parent) = state.get(node).map(|n| n.parent) else {
                return;
            };
            if let Some(parent) = parent {
                if let Ok(parent_node) = state.get_mut(parent) {
                    parent_node.children.retain(|c| *c != node);
                }
            }
            let mut stack = vec![node];
            while let Some(current) = stack.pop() {
                let Some(n) = state.nodes.get_mut(current.0 as usize) else {
                    continue;
                };
                n.attached = false;
                stack.extend(n.children.iter().copied());
                stack.extend(n.shadow_root);
                stack.extend(n.content_document);
            }
            parent
        };
        if let Some(parent) = parent {
            self.notify_child_list(parent);
        }
    }

    /// Make the native `click()` of an element fail.
    pub fn fail_native_click(&self, element: NodeHandle) {
        self.state.write().failing_native.insert(element);
    }

    /// Make synthetic click dispatch on an element fail.
    pub fn fail_synthetic_click(&self, element: NodeHandle) {
        self.state.write().failing_synthetic.insert(element);
    }

    pub fn effects(&self) -> Vec<ActionEffect> {
        self.state.read().effects.clone()
    }

    /// Elements scrolled into view, in call order.
    pub fn scrolled(&self) -> Vec<NodeHandle> {
        self.state.read().scrolled.clone()
    }

    pub fn value_of(&self, element: NodeHandle) -> Option<String> {
        self.state.read().get(element).ok().map(|n| n.value.clone())
    }

    pub fn text_of(&self, node: NodeHandle) -> String {
        self.state.read().text_content(node)
    }

    pub fn focused(&self) -> Option<NodeHandle> {
        self.state.read().focused
    }

    /// First attached element anywhere (frames and shadow trees included) with this id.
    pub fn find_by_id(&self, id: &str) -> Option<NodeHandle> {
        let state = self.state.read();
        state
            .nodes
            .iter()
            .enumerate()
            .find(|(_, n)| n.attached && n.attributes.get("id").is_some_and(|v| v == id))
            .map(|(i, _)| NodeHandle(i as u64))
    }

    /// Frames currently drawn in mounted overlay containers.
    pub fn overlay_frames(&self) -> Vec<OverlayFrame> {
        self.state
            .read()
            .overlays
            .values()
            .map(|overlay| overlay.frame.clone())
            .collect()
    }

    pub fn mounted_overlays(&self) -> Vec<String> {
        self.state
            .read()
            .overlays
            .values()
            .map(|overlay| overlay.container_id.clone())
            .collect()
    }

    /// Deliver a record to every live observer.
    pub fn notify(&self, record: MutationRecord) {
        trace!(kind = ?record.kind, tag = %record.target_tag, "Memory document mutation");
        self.observers.lock().retain(|tx| tx.send(record.clone()).is_ok());
    }

    fn notify_child_list(&self, parent: NodeHandle) {
        let record = self.state.read().record(MutationKind::ChildList, parent);
        self.notify(record);
    }

    fn notify_overlay(&self) {
        let mut record = MutationRecord::child_list("div").with_ancestors(vec![
            "body".to_string(),
            "html".to_string(),
        ]);
        record.inside_overlay = true;
        self.notify(record);
    }
}

#[async_trait]
impl DocumentHost for MemoryDocument {
    fn capabilities(&self) -> HostCapabilities {
        self.state.read().capabilities
    }

    async fn page_info(&self) -> Result<PageInfo, HostError> {
        Ok(self.state.read().page.clone())
    }

    async fn viewport(&self) -> Result<ViewportInfo, HostError> {
        Ok(self.state.read().viewport)
    }

    async fn document(&self) -> Result<NodeHandle, HostError> {
        Ok(self.state.read().document)
    }

    async fn body(&self, document: NodeHandle) -> Result<Option<NodeHandle>, HostError> {
        let state = self.state.read();
        state.get(document)?;
        Ok(Self::body_of(&state, document))
    }

    async fn node_info(&self, node: NodeHandle) -> Result<NodeInfo, HostError> {
        let state = self.state.read();
        let n = state.get(node)?;
        Ok(NodeInfo {
            kind: n.kind,
            tag_name: n.tag.clone(),
            text: (n.kind == NodeKind::Text).then(|| n.text.clone()),
        })
    }

    async fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, HostError> {
        let state = self.state.read();
        Ok(state.get(node)?.children.clone())
    }

    async fn attributes(&self, element: NodeHandle) -> Result<BTreeMap<String, String>, HostError> {
        let state = self.state.read();
        Ok(state.get(element)?.attributes.clone())
    }

    async fn parent_element(&self, node: NodeHandle) -> Result<Option<NodeHandle>, HostError> {
        let state = self.state.read();
        state.get(node)?;
        Ok(state.composed_parent(node))
    }

    async fn shadow_root(&self, element: NodeHandle) -> Result<Option<NodeHandle>, HostError> {
        let state = self.state.read();
        Ok(state.get(element)?.shadow_root)
    }

    async fn content_document(&self, frame: NodeHandle) -> Result<Option<NodeHandle>, HostError> {
        let state = self.state.read();
        let node = state.element(frame)?;
        if node.cross_origin {
            let src = node
                .attributes
                .get("src")
                .cloned()
                .unwrap_or_else(|| node.tag.clone());
            return Err(HostError::CrossOrigin(src));
        }
        Ok(node.content_document)
    }

    async fn computed_style(&self, element: NodeHandle) -> Result<ComputedStyle, HostError> {
        let state = self.state.read();
        let node = state.element(element)?;
        let defaults = ComputedStyle::default();
        Ok(ComputedStyle {
            display: node.display.clone().unwrap_or(defaults.display),
            visibility: state
                .inherited(element, |n| n.visibility.as_ref())
                .map(str::to_string)
                .unwrap_or(defaults.visibility),
            opacity: node.opacity.clone().unwrap_or(defaults.opacity),
            cursor: state
                .inherited(element, |n| n.cursor.as_ref())
                .map(str::to_string)
                .unwrap_or(defaults.cursor),
            position: node.position.clone().unwrap_or(defaults.position),
        })
    }

    async fn layout(&self, node: NodeHandle) -> Result<NodeLayout, HostError> {
        let state = self.state.read();
        let n = state.get(node)?;
        match n.kind {
            NodeKind::Element => state.element_layout(node),
            NodeKind::Text => {
                let Some(parent) = state.composed_parent(node) else {
                    return Ok(NodeLayout::default());
                };
                if n.text.trim().is_empty() {
                    return Ok(NodeLayout::default());
                }
                let parent_layout = state.element_layout(parent)?;
                Ok(NodeLayout {
                    bounding_rect: parent_layout.bounding_rect,
                    client_rects: parent_layout.client_rects,
                    offset_width: 0.0,
                    offset_height: 0.0,
                })
            }
            _ => Ok(NodeLayout::default()),
        }
    }

    async fn element_from_point(
        &self,
        scope: NodeHandle,
        x: f64,
        y: f64,
    ) -> Result<Option<NodeHandle>, HostError> {
        let state = self.state.read();
        let document = state
            .owner_document(scope)
            .ok_or(HostError::NodeGone(scope.0))?;
        let mut candidates = Vec::new();
        state.paint_order(document, &mut candidates);

        let mut best: Option<(i32, usize, NodeHandle)> = None;
        for (order, handle) in candidates.into_iter().enumerate() {
            if !state.is_rendered(handle) {
                continue;
            }
            let hidden = state
                .inherited(handle, |n| n.visibility.as_ref())
                .is_some_and(|v| v == "hidden");
            if hidden {
                continue;
            }
            let layout = state.element_layout(handle)?;
            if !layout.visible_rects().iter().any(|r| r.contains(x, y)) {
                continue;
            }
            let z = state.effective_z(handle);
            if best.is_none_or(|(best_z, best_order, _)| (z, order) >= (best_z, best_order)) {
                best = Some((z, order, handle));
            }
        }
        Ok(best.map(|(_, _, handle)| handle))
    }

    async fn has_event_listeners(&self, element: NodeHandle) -> Result<bool, HostError> {
        let state = self.state.read();
        if !state.capabilities.listener_introspection {
            return Err(HostError::Unsupported(
                "event listener introspection".to_string(),
            ));
        }
        Ok(state
            .element(element)?
            .listeners
            .iter()
            .any(|event| INTERACTION_EVENTS.contains(&event.as_str())))
    }

    async fn query_selector(
        &self,
        scope: NodeHandle,
        selector: &str,
    ) -> Result<Option<NodeHandle>, HostError> {
        let state = self.state.read();
        state.get(scope)?;
        state.select(scope, selector)
    }

    async fn query_xpath(
        &self,
        scope: NodeHandle,
        xpath: &str,
    ) -> Result<Option<NodeHandle>, HostError> {
        let state = self.state.read();
        state.get(scope)?;
        state.evaluate_xpath(scope, xpath)
    }
}

impl MutationSource for MemoryDocument {
    fn observe_mutations(&self) -> MutationSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().push(tx);
        MutationSubscription::new(rx)
    }
}

#[async_trait]
impl OverlaySurface for MemoryDocument {
    async fn mount_overlay(
        &self,
        container_id: &str,
        _z_index: u32,
    ) -> Result<OverlayContainer, HostError> {
        let container = {
            let mut state = self.state.write();
            let id = state.next_overlay;
            state.next_overlay += 1;
            state.overlays.insert(
                id,
                MountedOverlay {
                    container_id: container_id.to_string(),
                    frame: OverlayFrame::default(),
                },
            );
            OverlayContainer(id)
        };
        self.notify_overlay();
        Ok(container)
    }

    async fn draw_overlay(
        &self,
        container: OverlayContainer,
        frame: &OverlayFrame,
    ) -> Result<(), HostError> {
        {
            let mut state = self.state.write();
            let overlay = state
                .overlays
                .get_mut(&container.0)
                .ok_or(HostError::NodeGone(container.0))?;
            overlay.frame = frame.clone();
        }
        self.notify_overlay();
        Ok(())
    }

    async fn unmount_overlay(&self, container: OverlayContainer) -> Result<(), HostError> {
        let removed = self.state.write().overlays.remove(&container.0).is_some();
        if removed {
            self.notify_overlay();
        }
        Ok(())
    }
}

#[async_trait]
impl ElementActions for MemoryDocument {
    async fn click(&self, element: NodeHandle) -> Result<(), HostError> {
        let mut state = self.state.write();
        state.element(element)?;
        if state.failing_native.contains(&element) {
            return Err(HostError::Script("click() threw".to_string()));
        }
        state.effects.push(ActionEffect::Click {
            target: element,
            method: ClickMethod::Native,
        });
        Ok(())
    }

    async fn dispatch_click(&self, element: NodeHandle) -> Result<(), HostError> {
        let mut state = self.state.write();
        state.element(element)?;
        if state.failing_synthetic.contains(&element) {
            return Err(HostError::Script("dispatchEvent threw".to_string()));
        }
        state.effects.push(ActionEffect::Click {
            target: element,
            method: ClickMethod::Synthetic,
        });
        Ok(())
    }

    async fn focus(&self, element: NodeHandle) -> Result<(), HostError> {
        let mut state = self.state.write();
        state.element(element)?;
        state.focused = Some(element);
        state.effects.push(ActionEffect::Focus(element));
        Ok(())
    }

    async fn scroll_into_view(&self, element: NodeHandle) -> Result<(), HostError> {
        let mut state = self.state.write();
        state.element(element)?;
        state.scrolled.push(element);
        Ok(())
    }

    async fn is_content_editable(&self, element: NodeHandle) -> Result<bool, HostError> {
        let state = self.state.read();
        state.element(element)?;
        let mut current = Some(element);
        while let Some(node) = current {
            let attributes = &state.get(node)?.attributes;
            match attributes.get("contenteditable").map(String::as_str) {
                Some("false") => return Ok(false),
                Some(_) if is_content_editable_attr(attributes) => return Ok(true),
                _ => {}
            }
            current = state.composed_parent(node);
        }
        Ok(false)
    }

    async fn set_value(&self, element: NodeHandle, value: &str) -> Result<(), HostError> {
        let editable = self.is_content_editable(element).await?;
        let record = {
            let mut state = self.state.write();
            let tag = state.element(element)?.tag.clone();
            let record = if matches!(tag.as_str(), "input" | "textarea" | "select") {
                state.get_mut(element)?.value = value.to_string();
                None
            } else if editable {
                let children = std::mem::take(&mut state.get_mut(element)?.children);
                for child in children {
                    if let Some(node) = state.nodes.get_mut(child.0 as usize) {
                        node.attached = false;
                    }
                }
                let mut text = MemNode::new(NodeKind::Text, "");
                text.text = value.to_string();
                state.push(Some(element), text);
                Some(state.record(MutationKind::CharacterData, element))
            } else {
                return Err(HostError::Script(format!("<{}> has no value", tag)));
            };
            state.effects.push(ActionEffect::Input(element));
            state.effects.push(ActionEffect::Change(element));
            record
        };
        if let Some(record) = record {
            self.notify(record);
        }
        Ok(())
    }

    async fn select_options(&self, element: NodeHandle) -> Result<Vec<SelectOption>, HostError> {
        let state = self.state.read();
        let node = state.element(element)?;
        if node.tag != "select" {
            return Err(HostError::Script(format!("<{}> has no options", node.tag)));
        }
        let options = state.option_handles(element);
        let selected = state.current_option(element, &options);
        Ok(options
            .iter()
            .enumerate()
            .map(|(index, option)| SelectOption {
                index,
                text: state.text_content(*option).trim().to_string(),
                value: state.option_value(*option),
                selected: index == selected,
            })
            .collect())
    }

    async fn choose_option(&self, element: NodeHandle, index: usize) -> Result<bool, HostError> {
        let mut state = self.state.write();
        let node = state.element(element)?;
        if node.tag != "select" {
            return Err(HostError::Script(format!("<{}> has no options", node.tag)));
        }
        let options = state.option_handles(element);
        let Some(option) = options.get(index).copied() else {
            return Err(HostError::Script(format!("option {} out of range", index)));
        };
        if state.current_option(element, &options) == index {
            return Ok(false);
        }
        let value = state.option_value(option);
        let select = state.get_mut(element)?;
        select.selected_index = Some(index);
        select.value = value;
        state.effects.push(ActionEffect::Change(element));
        state.effects.push(ActionEffect::Input(element));
        Ok(true)
    }
}

#[async_trait]
impl HostChannel for MemoryDocument {
    async fn capture_screenshot(&self) -> Option<String> {
        self.state.read().screenshot.clone()
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
