//! Chromium page host over the DevTools protocol.
//!
//! The node tree comes from one pierced `DOM.getDocument` per
//! [`DocumentHost::document`] call; handles are CDP node ids and stay valid
//! until the next refresh. Everything that needs page script (actions,
//! overlays, XPath, mutation observation) runs through `Runtime`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{
    ComputedStyle, DocumentHost, ElementActions, HostCapabilities, HostChannel, MutationRecord,
    MutationSource, MutationSubscription, NodeHandle, NodeInfo, NodeKind, NodeLayout,
    OverlayContainer, OverlayFrame, OverlaySurface, PageInfo, SelectOption,
};
use crate::builder::classifier::INTERACTION_EVENTS;
use crate::capture::CaptureEvent;
use crate::cdp::{CdpError, CdpEvent, CssProperty, DomNode, PageSession, ScreenshotFormat};
use crate::dom::{BoundingBox, ViewportInfo};
use crate::error::HostError;
use crate::highlight::HIGHLIGHT_CONTAINER_ID;

const MUTATION_BINDING: &str = "__domsnapMutation";
const PAGE_BINDING: &str = "__domsnapPage";

const OBSERVE_MUTATIONS_JS: &str = r#"(function(id, binding, container) {
  const observers = window.__domsnapObservers || (window.__domsnapObservers = {});
  const send = window[binding];
  if (observers[id] || typeof send !== 'function') return false;
  const tagOf = (node) => (node && node.nodeType === 1 ? node.tagName.toLowerCase() : '');
  const kinds = { childList: 'child_list', attributes: 'attributes', characterData: 'character_data' };
  const observer = new MutationObserver((records) => {
    for (const record of records) {
      const target = record.target.nodeType === 1 ? record.target : record.target.parentElement;
      if (!target) continue;
      const ancestors = [];
      for (let el = target.parentElement; el; el = el.parentElement) ancestors.push(tagOf(el));
      send(JSON.stringify({
        observer: id,
        kind: kinds[record.type],
        target_tag: tagOf(target),
        attribute_name: record.attributeName,
        ancestor_tags: ancestors,
        inside_overlay: !!target.closest('#' + container),
      }));
    }
  });
  observer.observe(document, { childList: true, subtree: true, attributes: true, characterData: true });
  observers[id] = observer;
  return true;
})"#;

const DISCONNECT_JS: &str = r#"(function(id) {
  const observers = window.__domsnapObservers;
  if (observers && observers[id]) {
    observers[id].disconnect();
    delete observers[id];
  }
})"#;

const PAGE_EVENTS_JS: &str = r#"(function(binding) {
  if (window.__domsnapPageEvents) return;
  window.__domsnapPageEvents = true;
  const send = (kind) => { if (typeof window[binding] === 'function') window[binding](kind); };
  window.addEventListener('scroll', () => send('scroll'), { capture: true, passive: true });
  window.addEventListener('resize', () => send('resize'), { passive: true });
})"#;

const VIEWPORT_JS: &str = "({ width: window.innerWidth, height: window.innerHeight, \
     dpr: window.devicePixelRatio, x: window.scrollX, y: window.scrollY })";

const MOUNT_OVERLAY_JS: &str = r#"(function(id, z) {
  const previous = document.getElementById(id);
  if (previous) previous.remove();
  const container = document.createElement('div');
  container.id = id;
  Object.assign(container.style, {
    position: 'fixed', top: '0', left: '0', width: '100%', height: '100%',
    pointerEvents: 'none', zIndex: String(z),
  });
  (document.body || document.documentElement).appendChild(container);
  return true;
})"#;

const DRAW_OVERLAY_JS: &str = r#"(function(id, frame) {
  const container = document.getElementById(id);
  if (!container) return false;
  container.replaceChildren();
  for (const box of frame.boxes) {
    const el = document.createElement('div');
    Object.assign(el.style, {
      position: 'fixed', boxSizing: 'border-box', pointerEvents: 'none',
      top: box.rect.y + 'px', left: box.rect.x + 'px',
      width: box.rect.width + 'px', height: box.rect.height + 'px',
      border: '2px solid ' + box.color, backgroundColor: box.background,
    });
    container.appendChild(el);
  }
  for (const label of frame.labels) {
    const el = document.createElement('div');
    el.textContent = label.text;
    Object.assign(el.style, {
      position: 'fixed', pointerEvents: 'none', whiteSpace: 'nowrap',
      top: label.top + 'px', left: label.left + 'px',
      minWidth: label.width + 'px', height: label.height + 'px',
      fontSize: label.font_size + 'px', lineHeight: label.height + 'px',
      background: label.color, color: 'white', padding: '0 4px', borderRadius: '4px',
    });
    container.appendChild(el);
  }
  return true;
})"#;

const UNMOUNT_OVERLAY_JS: &str = r#"(function(id) {
  const container = document.getElementById(id);
  if (container) container.remove();
})"#;

const XPATH_JS: &str = r#"function(xpath) {
  const fragment = this.nodeType === Node.DOCUMENT_FRAGMENT_NODE;
  const path = fragment ? xpath.replace(/^\/+/, '') : xpath;
  const doc = this.ownerDocument || this;
  return doc.evaluate(path, this, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
}"#;

const CLICK_JS: &str = "function() { this.click(); }";

const DISPATCH_CLICK_JS: &str = "function() { \
     this.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, composed: true, view: window })); }";

const FOCUS_JS: &str = "function() { this.focus(); }";

const IS_CONTENT_EDITABLE_JS: &str = "function() { return !!this.isContentEditable; }";

const SET_VALUE_JS: &str = r#"function(value) {
  if (this.isContentEditable) {
    this.textContent = value;
  } else {
    const descriptor = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(this), 'value');
    this.value = '';
    if (descriptor && descriptor.set) descriptor.set.call(this, value);
    else this.value = value;
  }
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
}"#;

const SELECT_OPTIONS_JS: &str = "function() { \
     return Array.from(this.options || [], (o, i) => \
     ({ index: i, text: o.text.trim(), value: o.value, selected: o.selected })); }";

const CHOOSE_OPTION_JS: &str = r#"function(index) {
  if (this.selectedIndex === index) return false;
  this.selectedIndex = index;
  this.dispatchEvent(new Event('change', { bubbles: true }));
  this.dispatchEvent(new Event('input', { bubbles: true }));
  return true;
}"#;

fn handle(node_id: i64) -> NodeHandle {
    NodeHandle(node_id as u64)
}

fn node_id(handle: NodeHandle) -> i64 {
    handle.0 as i64
}

/// `(expression)(arg, ...)` with JSON-encoded arguments.
fn invoke(function: &str, args: &[Value]) -> String {
    let args: Vec<String> = args.iter().map(Value::to_string).collect();
    format!("({})({})", function, args.join(", "))
}

/// Protocol failures on a node id mean the node is no longer tracked.
fn node_error(node: NodeHandle) -> impl Fn(CdpError) -> HostError {
    move |err| match err {
        CdpError::Protocol { .. } => HostError::NodeGone(node.0),
        other => HostError::Cdp(other),
    }
}

fn script_error(err: CdpError) -> HostError {
    match err {
        CdpError::JavaScript(message) => HostError::Script(message),
        CdpError::Protocol { message, .. } => HostError::Script(message),
        other => HostError::Cdp(other),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct IndexedNode {
    kind: NodeKind,
    tag: String,
    text: Option<String>,
    attributes: BTreeMap<String, String>,
    /// Tree parent; the host element for a shadow root.
    parent: Option<i64>,
    children: Vec<i64>,
    shadow_root: Option<i64>,
    content_document: Option<i64>,
    /// Frame element that owns a content document.
    owner_frame: Option<i64>,
}

impl IndexedNode {
    fn from_protocol(node: &DomNode, parent: Option<i64>) -> Self {
        let kind = match node.node_type {
            DomNode::ELEMENT => NodeKind::Element,
            DomNode::TEXT => NodeKind::Text,
            DomNode::DOCUMENT => NodeKind::Document,
            DomNode::FRAGMENT if node.shadow_root_type.is_some() => NodeKind::ShadowRoot,
            _ => NodeKind::Other,
        };
        let tag = if kind == NodeKind::Element {
            node.local_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| node.node_name.to_lowercase())
        } else {
            String::new()
        };
        Self {
            kind,
            tag,
            text: (kind == NodeKind::Text).then(|| node.node_value.clone().unwrap_or_default()),
            attributes: node
                .attribute_pairs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            parent,
            children: Vec::new(),
            shadow_root: None,
            content_document: None,
            owner_frame: None,
        }
    }

    fn info(&self) -> NodeInfo {
        NodeInfo {
            kind: self.kind,
            tag_name: self.tag.clone(),
            text: self.text.clone(),
        }
    }

    fn is_frame(&self) -> bool {
        matches!(self.tag.as_str(), "iframe" | "frame")
    }
}

/// Flattened view of the last pierced document tree.
#[derive(Debug, Default)]
struct DomIndex {
    nodes: HashMap<i64, IndexedNode>,
    root: Option<i64>,
}

impl DomIndex {
    fn from_document(root: &DomNode) -> Self {
        let mut index = Self {
            nodes: HashMap::new(),
            root: Some(root.node_id),
        };
        index.insert_subtree(root, None, None);
        index
    }

    fn insert_subtree(&mut self, root: &DomNode, parent: Option<i64>, owner_frame: Option<i64>) {
        let mut stack = vec![(root, parent, owner_frame)];
        while let Some((node, parent, owner_frame)) = stack.pop() {
            let mut entry = IndexedNode::from_protocol(node, parent);
            entry.owner_frame = owner_frame;

            for child in node.children.iter().flatten() {
                entry.children.push(child.node_id);
            }
            for child in node.children.iter().flatten().rev() {
                stack.push((child, Some(node.node_id), None));
            }

            let open_root = node
                .shadow_roots
                .iter()
                .flatten()
                .find(|root| root.shadow_root_type.as_deref() == Some("open"));
            if let Some(shadow) = open_root {
                entry.shadow_root = Some(shadow.node_id);
                stack.push((shadow, Some(node.node_id), None));
            }

            if let Some(document) = node.content_document.as_deref() {
                entry.content_document = Some(document.node_id);
                stack.push((document, None, Some(node.node_id)));
            }

            self.nodes.insert(node.node_id, entry);
        }
    }

    fn get(&self, id: i64) -> Result<&IndexedNode, HostError> {
        self.nodes.get(&id).ok_or(HostError::NodeGone(id as u64))
    }

    fn element_child(&self, parent: i64, tag: &str) -> Option<i64> {
        let parent = self.nodes.get(&parent)?;
        parent.children.iter().copied().find(|child| {
            self.nodes
                .get(child)
                .is_some_and(|n| n.kind == NodeKind::Element && n.tag == tag)
        })
    }

    fn body(&self, document: i64) -> Option<i64> {
        let html = self.element_child(document, "html")?;
        self.element_child(html, "body")
    }

    /// Parent element, stepping from a shadow root to its host.
    fn parent_element(&self, id: i64) -> Result<Option<i64>, HostError> {
        let Some(parent) = self.get(id)?.parent else {
            return Ok(None);
        };
        let node = self.get(parent)?;
        Ok(match node.kind {
            NodeKind::Element => Some(parent),
            NodeKind::ShadowRoot => node.parent,
            _ => None,
        })
    }

    fn content_document(&self, frame: i64) -> Result<Option<i64>, HostError> {
        let node = self.get(frame)?;
        match node.content_document {
            Some(document) => Ok(Some(document)),
            None if node.is_frame() => Err(HostError::CrossOrigin(
                node.attributes.get("src").cloned().unwrap_or_default(),
            )),
            None => Ok(None),
        }
    }

    fn owner_document(&self, id: i64) -> Option<i64> {
        let mut current = id;
        loop {
            let node = self.nodes.get(&current)?;
            if node.kind == NodeKind::Document {
                return Some(current);
            }
            current = node.parent?;
        }
    }

    /// Map a hit-test result into the scope's document: text resolves to its
    /// element and content inside a nested frame resolves to the frame element.
    fn hoist_hit(&self, hit: i64, scope: i64) -> i64 {
        let mut current = hit;
        if self.nodes.get(&current).is_some_and(|n| n.kind == NodeKind::Text) {
            if let Ok(Some(parent)) = self.parent_element(current) {
                current = parent;
            }
        }
        let Some(scope_document) = self.owner_document(scope) else {
            return current;
        };
        while let Some(document) = self.owner_document(current) {
            if document == scope_document {
                break;
            }
            match self.nodes.get(&document).and_then(|d| d.owner_frame) {
                Some(frame) => current = frame,
                None => break,
            }
        }
        current
    }
}

fn style_from_properties(properties: &[CssProperty]) -> ComputedStyle {
    let mut style = ComputedStyle::default();
    for property in properties {
        let slot = match property.name.as_str() {
            "display" => &mut style.display,
            "visibility" => &mut style.visibility,
            "opacity" => &mut style.opacity,
            "cursor" => &mut style.cursor,
            "position" => &mut style.position,
            _ => continue,
        };
        *slot = property.value.clone();
    }
    style
}

/// Layout from content quads plus the border-box size.
///
/// Nodes without layout get an empty rect at the origin, which is what a
/// page script sees from `getBoundingClientRect()`.
fn layout_from_quads(quads: &[Vec<f64>], border_size: Option<(f64, f64)>) -> NodeLayout {
    let client_rects: Vec<BoundingBox> = quads
        .iter()
        .filter_map(|quad| PageSession::quad_bounds(quad))
        .map(|(x, y, width, height)| BoundingBox::new(x, y, width, height))
        .collect();

    let bounding_rect = client_rects
        .iter()
        .copied()
        .reduce(|a, b| {
            let left = a.x.min(b.x);
            let top = a.y.min(b.y);
            let right = (a.x + a.width).max(b.x + b.width);
            let bottom = (a.y + a.height).max(b.y + b.height);
            BoundingBox::new(left, top, right - left, bottom - top)
        })
        .unwrap_or_default();

    let (offset_width, offset_height) = border_size.unwrap_or((0.0, 0.0));
    NodeLayout {
        bounding_rect: Some(bounding_rect),
        client_rects,
        offset_width,
        offset_height,
    }
}

#[derive(Debug, Deserialize)]
struct ObservedMutation {
    observer: u64,
    #[serde(flatten)]
    record: MutationRecord,
}

/// The record carried by a mutation binding call from observer `observer`.
fn mutation_from_event(event: &CdpEvent, observer: u64) -> Option<MutationRecord> {
    if event.method != "Runtime.bindingCalled" || event.params["name"] != MUTATION_BINDING {
        return None;
    }
    let payload = event.params["payload"].as_str()?;
    match serde_json::from_str::<ObservedMutation>(payload) {
        Ok(observed) if observed.observer == observer => Some(observed.record),
        Ok(_) => None,
        Err(err) => {
            debug!(error = %err, "Malformed mutation payload");
            None
        }
    }
}

/// Capture-loop event for a page event, if it maps to one.
fn capture_event_from(event: &CdpEvent) -> Option<CaptureEvent> {
    match event.method.as_str() {
        // Child frames carry a parentId.
        "Page.frameNavigated" if event.params["frame"]["parentId"].is_null() => {
            Some(CaptureEvent::Navigation)
        }
        "Runtime.bindingCalled" if event.params["name"] == PAGE_BINDING => {
            match event.params["payload"].as_str() {
                Some("scroll") => Some(CaptureEvent::Scroll),
                Some("resize") => Some(CaptureEvent::Resize),
                _ => None,
            }
        }
        _ => None,
    }
}

/// A live Chromium page.
pub struct CdpDocument {
    session: Arc<PageSession>,
    index: RwLock<DomIndex>,
    overlays: Mutex<HashMap<u64, String>>,
    next_overlay: AtomicU64,
    next_observer: AtomicU64,
}

impl CdpDocument {
    pub fn new(session: Arc<PageSession>) -> Self {
        Self {
            session,
            index: RwLock::new(DomIndex::default()),
            overlays: Mutex::new(HashMap::new()),
            next_overlay: AtomicU64::new(1),
            next_observer: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> &Arc<PageSession> {
        &self.session
    }

    /// Forward navigation, scroll and resize events of the page to a capture loop.
    pub async fn forward_page_events(
        &self,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<JoinHandle<()>, HostError> {
        let mut page_events = self.session.subscribe_events();
        let script = invoke(PAGE_EVENTS_JS, &[json!(PAGE_BINDING)]);

        self.session
            .call("Runtime.addBinding", Some(json!({"name": PAGE_BINDING})))
            .await?;
        self.session
            .call(
                "Page.addScriptToEvaluateOnNewDocument",
                Some(json!({"source": script})),
            )
            .await?;
        self.session.evaluate(&script).await.map_err(script_error)?;

        Ok(tokio::spawn(async move {
            loop {
                let event = match page_events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Page event stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Some(capture_event) = capture_event_from(&event) {
                    if events.send(capture_event).await.is_err() {
                        break;
                    }
                }
            }
        }))
    }

    fn lookup<T>(
        &self,
        node: NodeHandle,
        read: impl FnOnce(&IndexedNode) -> T,
    ) -> Result<T, HostError> {
        let index = self.index.read();
        index.get(node_id(node)).map(read)
    }

    /// Index a node that appeared after the last refresh.
    async fn describe(&self, node: NodeHandle) -> Result<IndexedNode, HostError> {
        let described = self
            .session
            .describe_node(node_id(node))
            .await
            .map_err(node_error(node))?;
        let entry = IndexedNode::from_protocol(&described, None);
        self.index.write().nodes.insert(node_id(node), entry.clone());
        Ok(entry)
    }

    async fn object_id(&self, node: NodeHandle) -> Result<String, HostError> {
        self.session
            .resolve_node(node_id(node))
            .await
            .map_err(node_error(node))?
            .object_id
            .ok_or(HostError::NodeGone(node.0))
    }

    async fn call_on(
        &self,
        element: NodeHandle,
        function: &str,
        args: Option<Vec<Value>>,
    ) -> Result<Value, HostError> {
        let object_id = self.object_id(element).await?;
        self.session
            .call_function_on(&object_id, function, args)
            .await
            .map_err(script_error)
    }

    async fn install_observer(session: &PageSession, observer: u64) -> Result<bool, CdpError> {
        session
            .call("Runtime.addBinding", Some(json!({"name": MUTATION_BINDING})))
            .await?;
        let installed = session
            .evaluate(&invoke(
                OBSERVE_MUTATIONS_JS,
                &[
                    json!(observer),
                    json!(MUTATION_BINDING),
                    json!(HIGHLIGHT_CONTAINER_ID),
                ],
            ))
            .await?;
        Ok(installed.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl DocumentHost for CdpDocument {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            listener_introspection: true,
        }
    }

    async fn page_info(&self) -> Result<PageInfo, HostError> {
        Ok(PageInfo {
            url: self.session.get_url().await?,
            title: self.session.get_title().await?,
        })
    }

    async fn viewport(&self) -> Result<ViewportInfo, HostError> {
        let metrics = self.session.evaluate(VIEWPORT_JS).await.map_err(script_error)?;
        let defaults = ViewportInfo::default();
        Ok(ViewportInfo {
            width: metrics["width"].as_u64().map_or(defaults.width, |w| w as u32),
            height: metrics["height"].as_u64().map_or(defaults.height, |h| h as u32),
            device_pixel_ratio: metrics["dpr"].as_f64().unwrap_or(defaults.device_pixel_ratio),
            scroll_x: metrics["x"].as_f64().unwrap_or(0.0),
            scroll_y: metrics["y"].as_f64().unwrap_or(0.0),
        })
    }

    async fn document(&self) -> Result<NodeHandle, HostError> {
        if let Err(err) = self.session.release_object_group().await {
            trace!(error = %err, "Releasing object group failed");
        }
        let root = self.session.get_document().await?;
        let index = DomIndex::from_document(&root);
        debug!(nodes = index.nodes.len(), "Indexed document");
        *self.index.write() = index;
        Ok(handle(root.node_id))
    }

    async fn body(&self, document: NodeHandle) -> Result<Option<NodeHandle>, HostError> {
        let index = self.index.read();
        index.get(node_id(document))?;
        Ok(index.body(node_id(document)).map(handle))
    }

    async fn node_info(&self, node: NodeHandle) -> Result<NodeInfo, HostError> {
        match self.lookup(node, IndexedNode::info) {
            Ok(info) => Ok(info),
            Err(_) => Ok(self.describe(node).await?.info()),
        }
    }

    async fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>, HostError> {
        self.lookup(node, |n| n.children.iter().copied().map(handle).collect())
    }

    async fn attributes(&self, element: NodeHandle) -> Result<BTreeMap<String, String>, HostError> {
        match self.lookup(element, |n| n.attributes.clone()) {
            Ok(attributes) => Ok(attributes),
            Err(_) => Ok(self.describe(element).await?.attributes),
        }
    }

    async fn parent_element(&self, node: NodeHandle) -> Result<Option<NodeHandle>, HostError> {
        Ok(self.index.read().parent_element(node_id(node))?.map(handle))
    }

    async fn shadow_root(&self, element: NodeHandle) -> Result<Option<NodeHandle>, HostError> {
        self.lookup(element, |n| n.shadow_root.map(handle))
    }

    async fn content_document(&self, frame: NodeHandle) -> Result<Option<NodeHandle>, HostError> {
        Ok(self.index.read().content_document(node_id(frame))?.map(handle))
    }

    async fn computed_style(&self, element: NodeHandle) -> Result<ComputedStyle, HostError> {
        let properties = self
            .session
            .get_computed_style(node_id(element))
            .await
            .map_err(node_error(element))?;
        Ok(style_from_properties(&properties))
    }

    async fn layout(&self, node: NodeHandle) -> Result<NodeLayout, HostError> {
        let id = node_id(node);
        let quads = self
            .session
            .get_content_quads(id)
            .await
            .map_err(node_error(node))?;
        let is_element = self.lookup(node, |n| n.kind == NodeKind::Element)?;
        let border_size = if is_element {
            self.session
                .get_box_model(id)
                .await
                .map_err(node_error(node))?
                .and_then(|model| PageSession::quad_bounds(&model.border))
                .map(|(_, _, width, height)| (width, height))
        } else {
            None
        };
        Ok(layout_from_quads(&quads, border_size))
    }

    async fn element_from_point(
        &self,
        scope: NodeHandle,
        x: f64,
        y: f64,
    ) -> Result<Option<NodeHandle>, HostError> {
        let Some(location) = self.session.get_node_for_location(x, y).await? else {
            return Ok(None);
        };
        let hit = match location.node_id.filter(|id| *id != 0) {
            Some(id) => id,
            None => {
                let pushed = self
                    .session
                    .push_backend_nodes(&[location.backend_node_id])
                    .await?;
                match pushed.first().copied().filter(|id| *id != 0) {
                    Some(id) => id,
                    None => return Ok(None),
                }
            }
        };
        Ok(Some(handle(self.index.read().hoist_hit(hit, node_id(scope)))))
    }

    async fn has_event_listeners(&self, element: NodeHandle) -> Result<bool, HostError> {
        let object_id = self.object_id(element).await?;
        let listeners = self.session.get_event_listeners(&object_id).await?;
        Ok(listeners
            .iter()
            .any(|listener| INTERACTION_EVENTS.contains(&listener.event_type.as_str())))
    }

    async fn query_selector(
        &self,
        scope: NodeHandle,
        selector: &str,
    ) -> Result<Option<NodeHandle>, HostError> {
        let found = self
            .session
            .query_selector(node_id(scope), selector)
            .await
            .map_err(script_error)?;
        Ok(found.map(handle))
    }

    async fn query_xpath(
        &self,
        scope: NodeHandle,
        xpath: &str,
    ) -> Result<Option<NodeHandle>, HostError> {
        let object_id = self.object_id(scope).await?;
        let result = self
            .session
            .call_function_on_handle(&object_id, XPATH_JS, Some(vec![json!(xpath)]))
            .await
            .map_err(script_error)?;
        if !result.is_node() {
            return Ok(None);
        }
        let Some(found) = result.object_id.as_deref() else {
            return Ok(None);
        };
        Ok(Some(handle(self.session.request_node(found).await?)))
    }
}

impl MutationSource for CdpDocument {
    fn observe_mutations(&self) -> MutationSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = self.next_observer.fetch_add(1, Ordering::Relaxed);
        let session = self.session.clone();
        // Subscribe before installing so no early record is missed.
        let mut events = session.subscribe_events();

        let task = tokio::spawn(async move {
            match Self::install_observer(&session, observer).await {
                Ok(true) => trace!(observer, "Mutation observer installed"),
                Ok(false) => {
                    warn!(observer, "Mutation observer could not be installed");
                    return;
                }
                Err(err) => {
                    warn!(observer, error = %err, "Mutation observer install failed");
                    return;
                }
            }
            loop {
                let record = match events.recv().await {
                    Ok(event) => match mutation_from_event(&event, observer) {
                        Some(record) => record,
                        None => continue,
                    },
                    // Records were dropped; report one so quiet timers restart.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Mutation stream lagged");
                        MutationRecord::child_list("body")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(record).is_err() {
                    break;
                }
            }
        });

        let session = self.session.clone();
        MutationSubscription::new(rx).with_teardown(move || {
            task.abort();
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                return;
            };
            runtime.spawn(async move {
                let script = invoke(DISCONNECT_JS, &[json!(observer)]);
                if let Err(err) = session.evaluate(&script).await {
                    debug!(observer, error = %err, "Disconnecting mutation observer failed");
                }
            });
        })
    }
}

#[async_trait]
impl OverlaySurface for CdpDocument {
    async fn mount_overlay(
        &self,
        container_id: &str,
        z_index: u32,
    ) -> Result<OverlayContainer, HostError> {
        self.session
            .evaluate(&invoke(MOUNT_OVERLAY_JS, &[json!(container_id), json!(z_index)]))
            .await
            .map_err(script_error)?;
        let container = self.next_overlay.fetch_add(1, Ordering::Relaxed);
        self.overlays.lock().insert(container, container_id.to_string());
        Ok(OverlayContainer(container))
    }

    async fn draw_overlay(
        &self,
        container: OverlayContainer,
        frame: &OverlayFrame,
    ) -> Result<(), HostError> {
        let id = self
            .overlays
            .lock()
            .get(&container.0)
            .cloned()
            .ok_or_else(|| HostError::Script("overlay container is not mounted".to_string()))?;
        let frame = serde_json::to_value(frame).map_err(CdpError::from)?;
        let drawn = self
            .session
            .evaluate(&invoke(DRAW_OVERLAY_JS, &[json!(id), frame]))
            .await
            .map_err(script_error)?;
        if drawn.as_bool() != Some(true) {
            return Err(HostError::Script(format!("overlay container #{} is gone", id)));
        }
        Ok(())
    }

    async fn unmount_overlay(&self, container: OverlayContainer) -> Result<(), HostError> {
        let Some(id) = self.overlays.lock().remove(&container.0) else {
            return Ok(());
        };
        self.session
            .evaluate(&invoke(UNMOUNT_OVERLAY_JS, &[json!(id)]))
            .await
            .map_err(script_error)?;
        Ok(())
    }
}

#[async_trait]
impl ElementActions for CdpDocument {
    async fn click(&self, element: NodeHandle) -> Result<(), HostError> {
        self.call_on(element, CLICK_JS, None).await?;
        Ok(())
    }

    async fn dispatch_click(&self, element: NodeHandle) -> Result<(), HostError> {
        self.call_on(element, DISPATCH_CLICK_JS, None).await?;
        Ok(())
    }

    async fn focus(&self, element: NodeHandle) -> Result<(), HostError> {
        self.call_on(element, FOCUS_JS, None).await?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: NodeHandle) -> Result<(), HostError> {
        self.session
            .scroll_into_view_if_needed(node_id(element))
            .await
            .map_err(node_error(element))
    }

    async fn is_content_editable(&self, element: NodeHandle) -> Result<bool, HostError> {
        let editable = self.call_on(element, IS_CONTENT_EDITABLE_JS, None).await?;
        Ok(editable.as_bool().unwrap_or(false))
    }

    async fn set_value(&self, element: NodeHandle, value: &str) -> Result<(), HostError> {
        self.call_on(element, SET_VALUE_JS, Some(vec![json!(value)]))
            .await?;
        Ok(())
    }

    async fn select_options(&self, element: NodeHandle) -> Result<Vec<SelectOption>, HostError> {
        let options = self.call_on(element, SELECT_OPTIONS_JS, None).await?;
        serde_json::from_value(options).map_err(|err| HostError::Protocol(err.to_string()))
    }

    async fn choose_option(&self, element: NodeHandle, index: usize) -> Result<bool, HostError> {
        let changed = self
            .call_on(element, CHOOSE_OPTION_JS, Some(vec![json!(index)]))
            .await?;
        Ok(changed.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl HostChannel for CdpDocument {
    async fn capture_screenshot(&self) -> Option<String> {
        match self
            .session
            .screenshot(ScreenshotFormat::Png, None, false, None)
            .await
        {
            Ok(data) => Some(data),
            Err(err) => {
                debug!(error = %err, "Screenshot unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "cdp_host_tests.rs"]
mod tests;
