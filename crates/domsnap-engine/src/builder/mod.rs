//! Tree builder.
//!
//! Walks the live document in pre-order from the body, recursing into
//! reachable iframe documents and shadow roots, and records every kept node
//! in a flat [`RawDomTree`]. Visible, unobscured, interactive elements inside
//! the capture window receive consecutive highlight indices.

pub mod classifier;
mod viewport;
mod xpath;

use std::collections::{BTreeMap, HashMap};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::dom::{CaptureWindow, RawDomTree, RawElementNode, RawId, RawNode, RawTextNode, ViewportInfo};
use crate::error::{EngineError, HostError};
use crate::highlight::{HighlightTarget, HIGHLIGHT_CONTAINER_ID};
use crate::host::{ComputedStyle, DocumentHost, NodeHandle, NodeInfo, NodeKind, NodeLayout};

use classifier::ElementFacts;

/// Leaf tags that never make it into the tree.
const DENIED_TAGS: &[&str] = &["svg", "script", "style", "link", "meta", "noscript", "template"];

/// Structural tags accepted without further checks.
const ALWAYS_ACCEPTED_TAGS: &[&str] = &[
    "body", "div", "main", "article", "section", "nav", "header", "footer",
];

/// Per-capture knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Draw overlay boxes for indexed elements.
    #[serde(default)]
    pub render_overlay: bool,
    /// Only outline this index.
    #[serde(default)]
    pub focus_index: Option<u32>,
    /// Margin in pixels around the viewport; `-1` disables the window.
    #[serde(default)]
    pub viewport_expansion: i32,
    /// Collect [`BuildMetrics`] and log per-element decisions.
    #[serde(default)]
    pub debug: bool,
    /// Attach a screenshot to the snapshot.
    #[serde(default)]
    pub vision: bool,
}

/// Counters collected during one walk.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildMetrics {
    pub total_nodes: usize,
    pub processed_nodes: usize,
    pub skipped_nodes: usize,
    pub host_calls: BTreeMap<&'static str, u64>,
    pub style_cache_hits: u64,
    pub layout_cache_hits: u64,
    pub elapsed_ms: f64,
}

#[derive(Debug)]
pub struct BuildOutput {
    pub tree: RawDomTree,
    /// Elements to outline, in index order.
    pub highlights: Vec<HighlightTarget>,
    pub viewport: ViewportInfo,
    /// Present when the capture ran in debug mode.
    pub metrics: Option<BuildMetrics>,
}

/// The document scope a node is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalScope {
    pub document: NodeHandle,
    /// The iframe element owning `document`, when it is a frame document.
    pub parent_iframe: Option<NodeHandle>,
    pub shadow_host: Option<NodeHandle>,
    pub shadow_root: Option<NodeHandle>,
}

impl TraversalScope {
    fn top(document: NodeHandle) -> Self {
        Self {
            document,
            parent_iframe: None,
            shadow_host: None,
            shadow_root: None,
        }
    }

    /// Node that hit tests and queries run against.
    pub fn root(&self) -> NodeHandle {
        self.shadow_root.unwrap_or(self.document)
    }
}

/// What a parent hands down to each of its children.
#[derive(Debug, Clone)]
struct ChildContext {
    scope: TraversalScope,
    parent_highlighted: bool,
    /// `None` for children of a document or shadow root.
    parent_element: Option<NodeHandle>,
    parent_tag: String,
    parent_is_body: bool,
    in_container: bool,
    in_editable: bool,
    xpath_prefix: String,
}

/// Walk the document and build the raw tree.
pub async fn build_tree<H: DocumentHost + ?Sized>(
    host: &H,
    options: &CaptureOptions,
) -> Result<BuildOutput, EngineError> {
    let started = Instant::now();
    let viewport = host.viewport().await?;
    let document = host.document().await?;
    let body = host
        .body(document)
        .await?
        .ok_or_else(|| EngineError::BuildFailed("document has no body".to_string()))?;

    let window = CaptureWindow::new(&viewport, options.viewport_expansion);
    let mut walker = TreeWalker::new(host, options, window);
    let root_id = walker.walk_body(body, TraversalScope::top(document)).await?;

    walker.metrics.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    debug!(
        nodes = walker.nodes.len(),
        indexed = walker.next_index,
        elapsed_ms = walker.metrics.elapsed_ms,
        "Built DOM tree"
    );
    if options.debug {
        debug!(metrics = ?walker.metrics, "Tree builder metrics");
    }

    Ok(BuildOutput {
        tree: RawDomTree {
            root_id,
            nodes: walker.nodes,
        },
        highlights: walker.highlights,
        viewport,
        metrics: options.debug.then_some(walker.metrics),
    })
}

struct TreeWalker<'h, H: ?Sized> {
    host: &'h H,
    options: &'h CaptureOptions,
    window: CaptureWindow,
    listener_introspection: bool,
    nodes: HashMap<RawId, RawNode>,
    next_id: RawId,
    next_index: u32,
    highlights: Vec<HighlightTarget>,
    style_cache: HashMap<NodeHandle, ComputedStyle>,
    layout_cache: HashMap<NodeHandle, NodeLayout>,
    metrics: BuildMetrics,
}

impl<'h, H: DocumentHost + ?Sized> TreeWalker<'h, H> {
    fn new(host: &'h H, options: &'h CaptureOptions, window: CaptureWindow) -> Self {
        Self {
            host,
            options,
            window,
            listener_introspection: host.capabilities().listener_introspection,
            nodes: HashMap::new(),
            next_id: 0,
            next_index: 0,
            highlights: Vec::new(),
            style_cache: HashMap::new(),
            layout_cache: HashMap::new(),
            metrics: BuildMetrics::default(),
        }
    }

    fn count(&mut self, call: &'static str) {
        *self.metrics.host_calls.entry(call).or_default() += 1;
    }

    fn insert(&mut self, node: RawNode) -> RawId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    async fn style(&mut self, element: NodeHandle) -> Result<ComputedStyle, HostError> {
        if let Some(style) = self.style_cache.get(&element) {
            self.metrics.style_cache_hits += 1;
            return Ok(style.clone());
        }
        self.count("computed_style");
        let style = self.host.computed_style(element).await?;
        self.style_cache.insert(element, style.clone());
        Ok(style)
    }

    async fn layout(&mut self, node: NodeHandle) -> Result<NodeLayout, HostError> {
        if let Some(layout) = self.layout_cache.get(&node) {
            self.metrics.layout_cache_hits += 1;
            return Ok(layout.clone());
        }
        self.count("layout");
        let layout = self.host.layout(node).await?;
        self.layout_cache.insert(node, layout.clone());
        Ok(layout)
    }

    async fn walk_body(
        &mut self,
        body: NodeHandle,
        scope: TraversalScope,
    ) -> Result<RawId, EngineError> {
        self.metrics.total_nodes += 1;
        self.count("attributes");
        let attributes = self.host.attributes(body).await?;
        let prefix = match xpath::element_path(self.host, body).await {
            Ok(path) => path,
            Err(err) => {
                debug!(error = %err, "Falling back to default body path");
                "html/body".to_string()
            }
        };

        let context = ChildContext {
            scope,
            parent_highlighted: false,
            parent_element: Some(body),
            parent_tag: "body".to_string(),
            parent_is_body: true,
            in_container: false,
            in_editable: classifier::is_content_editable_attr(&attributes),
            xpath_prefix: prefix,
        };
        let children = self.walk_children(body, context).await;
        self.metrics.processed_nodes += 1;

        Ok(self.insert(RawNode::Element(RawElementNode {
            tag_name: "body".to_string(),
            xpath: "/body".to_string(),
            attributes,
            children,
            ..Default::default()
        })))
    }

    /// Walk the children of an element, document or shadow root in order.
    async fn walk_children(&mut self, parent: NodeHandle, context: ChildContext) -> Vec<RawId> {
        self.count("children");
        let handles = match self.host.children(parent).await {
            Ok(handles) => handles,
            Err(err) => {
                debug!(node = parent.0, error = %err, "Cannot list children");
                return Vec::new();
            }
        };

        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            self.count("node_info");
            match self.host.node_info(handle).await {
                Ok(info) => infos.push((handle, info)),
                Err(err) => {
                    self.metrics.total_nodes += 1;
                    self.metrics.skipped_nodes += 1;
                    debug!(node = handle.0, error = %err, "Skipping unreadable node");
                }
            }
        }

        let element_tags: Vec<&str> = infos
            .iter()
            .filter(|(_, info)| info.is_element())
            .map(|(_, info)| info.tag_name.as_str())
            .collect();
        let mut segments = xpath::sibling_segments(&element_tags).into_iter();

        let mut ids = Vec::new();
        for (handle, info) in infos {
            let xpath = if info.is_element() {
                let segment = segments.next().unwrap_or_else(|| info.tag_name.clone());
                xpath::join(&context.xpath_prefix, &segment)
            } else {
                String::new()
            };
            if let Some(id) = self.walk(handle, info, &context, xpath).await {
                ids.push(id);
            }
        }
        ids
    }

    fn walk<'w>(
        &'w mut self,
        node: NodeHandle,
        info: NodeInfo,
        context: &'w ChildContext,
        xpath: String,
    ) -> BoxFuture<'w, Option<RawId>> {
        Box::pin(async move {
            self.metrics.total_nodes += 1;
            let result = match info.kind {
                NodeKind::Text => self.visit_text(node, info, context).await,
                NodeKind::Element => self.visit_element(node, info, context, xpath).await,
                _ => Ok(None),
            };
            match result {
                Ok(Some(id)) => {
                    self.metrics.processed_nodes += 1;
                    Some(id)
                }
                Ok(None) => {
                    self.metrics.skipped_nodes += 1;
                    None
                }
                Err(err) => {
                    self.metrics.skipped_nodes += 1;
                    debug!(node = node.0, error = %err, "Skipping node after host failure");
                    None
                }
            }
        })
    }

    async fn visit_text(
        &mut self,
        node: NodeHandle,
        info: NodeInfo,
        context: &ChildContext,
    ) -> Result<Option<RawId>, HostError> {
        let text = info.text.unwrap_or_default();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let Some(parent) = context.parent_element else {
            return Ok(None);
        };
        if context.parent_tag == "script" {
            return Ok(None);
        }

        let parent_style = self.style(parent).await?;
        let layout = if self.window.is_unlimited() {
            NodeLayout::default()
        } else {
            self.layout(node).await?
        };
        let is_visible = viewport::is_text_visible(&layout, &parent_style, &self.window);

        Ok(Some(self.insert(RawNode::Text(RawTextNode {
            text: trimmed.to_string(),
            is_visible,
        }))))
    }

    async fn visit_element(
        &mut self,
        node: NodeHandle,
        info: NodeInfo,
        context: &ChildContext,
        xpath: String,
    ) -> Result<Option<RawId>, HostError> {
        let tag = info.tag_name;
        if DENIED_TAGS.contains(&tag.as_str()) && !ALWAYS_ACCEPTED_TAGS.contains(&tag.as_str()) {
            return Ok(None);
        }

        self.count("attributes");
        let attributes = self.host.attributes(node).await?;
        if attributes.get("id").is_some_and(|id| id == HIGHLIGHT_CONTAINER_ID) {
            return Ok(None);
        }

        let style = self.style(node).await?;
        let layout = self.layout(node).await?;
        if !viewport::passes_prefilter(&layout, &style, &self.window) {
            return Ok(None);
        }

        let is_visible =
            layout.has_offset_size() && style.display != "none" && style.visibility != "hidden";
        let editable = classifier::is_content_editable_attr(&attributes)
            || (context.in_editable
                && attributes.get("contenteditable").is_none_or(|v| v != "false"));

        let mut raw = RawElementNode {
            tag_name: tag.clone(),
            xpath,
            is_visible,
            is_in_viewport: viewport::is_in_viewport(&layout, &self.window),
            ..Default::default()
        };

        let mut highlighted = false;
        if is_visible {
            raw.is_top_element = self.is_top_element(node, &layout, &context.scope).await;
            if raw.is_top_element {
                highlighted = self
                    .classify_and_index(node, &mut raw, &attributes, &style, editable, context)
                    .await;
            }
        }

        let in_container = context.in_container || classifier::is_known_container(&tag, &attributes);
        let mut children = Vec::new();

        if tag == "iframe" || tag == "frame" {
            self.count("content_document");
            match self.host.content_document(node).await {
                Ok(Some(document)) => {
                    let frame_context = ChildContext {
                        scope: TraversalScope {
                            document,
                            parent_iframe: Some(node),
                            shadow_host: None,
                            shadow_root: None,
                        },
                        parent_highlighted: false,
                        parent_element: None,
                        parent_tag: String::new(),
                        parent_is_body: false,
                        in_container: false,
                        in_editable: false,
                        xpath_prefix: String::new(),
                    };
                    children = self.walk_children(document, frame_context).await;
                }
                Ok(None) => {}
                Err(HostError::CrossOrigin(source)) => {
                    warn!(
                        error = %EngineError::CrossOriginFrame(source),
                        xpath = %raw.xpath,
                        "Keeping iframe as a leaf"
                    );
                }
                Err(err) => {
                    debug!(xpath = %raw.xpath, error = %err, "Cannot read iframe document");
                }
            }
        } else {
            let base = ChildContext {
                scope: context.scope,
                parent_highlighted: highlighted,
                parent_element: Some(node),
                parent_tag: tag.clone(),
                parent_is_body: false,
                in_container,
                in_editable: editable,
                xpath_prefix: raw.xpath.clone(),
            };

            if editable || classifier::is_editor_root(&tag, &attributes) {
                children = self.walk_children(node, base).await;
            } else {
                self.count("shadow_root");
                if let Ok(Some(shadow_root)) = self.host.shadow_root(node).await {
                    raw.shadow_root = true;
                    let shadow_context = ChildContext {
                        scope: TraversalScope {
                            shadow_host: Some(node),
                            shadow_root: Some(shadow_root),
                            ..context.scope
                        },
                        parent_element: None,
                        xpath_prefix: String::new(),
                        ..base.clone()
                    };
                    children = self.walk_children(shadow_root, shadow_context).await;
                }
                let light_context = ChildContext {
                    parent_highlighted: highlighted || context.parent_highlighted,
                    ..base
                };
                children.extend(self.walk_children(node, light_context).await);
            }
        }

        if tag == "a" && children.is_empty() && !attributes.contains_key("href") {
            if let Some(index) = raw.highlight_index {
                self.highlights.retain(|target| target.index != index);
                self.next_index = index;
            }
            return Ok(None);
        }

        raw.attributes = attributes;
        raw.children = children;
        Ok(Some(self.insert(RawNode::Element(raw))))
    }

    /// Classify a visible top element and assign an index when it qualifies.
    /// Returns whether the element was indexed.
    async fn classify_and_index(
        &mut self,
        node: NodeHandle,
        raw: &mut RawElementNode,
        attributes: &BTreeMap<String, String>,
        style: &ComputedStyle,
        editable: bool,
        context: &ChildContext,
    ) -> bool {
        let has_listeners = if self.listener_introspection {
            self.count("has_event_listeners");
            self.host.has_event_listeners(node).await.ok()
        } else {
            None
        };
        let facts = ElementFacts {
            tag: &raw.tag_name,
            attributes,
            cursor: &style.cursor,
            is_content_editable: editable,
            has_listeners,
        };

        let verdict = classifier::classify(&facts);
        if self.options.debug {
            trace!(xpath = %raw.xpath, reason = verdict.as_str(), "Classified element");
        }
        raw.is_interactive = verdict.is_interactive();
        if !raw.is_interactive {
            return false;
        }

        let should_index = if context.parent_highlighted {
            let composite = self.is_composite_item(node, &facts, context).await;
            raw.is_distinct = classifier::is_distinct_interaction(&facts, composite);
            raw.is_distinct
        } else {
            true
        };
        if !should_index || !(raw.is_in_viewport || self.window.is_unlimited()) {
            return false;
        }

        let index = self.next_index;
        self.next_index += 1;
        raw.highlight_index = Some(index);
        if self.options.render_overlay && self.options.focus_index.is_none_or(|focus| focus == index) {
            self.highlights.push(HighlightTarget {
                index,
                element: node,
            });
        }
        true
    }

    /// Items of menus, lists and toolbars that carry their own content.
    async fn is_composite_item(
        &mut self,
        node: NodeHandle,
        facts: &ElementFacts<'_>,
        context: &ChildContext,
    ) -> bool {
        if context.parent_is_body || !classifier::is_composite_candidate(facts, true) {
            return false;
        }
        if !(context.in_container || classifier::is_known_container(facts.tag, facts.attributes)) {
            return false;
        }
        self.has_visible_element_children(node).await
    }

    async fn has_visible_element_children(&mut self, node: NodeHandle) -> bool {
        self.count("children");
        let Ok(children) = self.host.children(node).await else {
            return false;
        };
        for child in children {
            self.count("node_info");
            let Ok(info) = self.host.node_info(child).await else {
                continue;
            };
            if !info.is_element() {
                continue;
            }
            let (Ok(layout), Ok(style)) = (self.layout(child).await, self.style(child).await) else {
                continue;
            };
            if layout.has_offset_size() && style.display != "none" && style.visibility != "hidden" {
                return true;
            }
        }
        false
    }

    /// Whether the element is what a user would hit at its centre.
    async fn is_top_element(
        &mut self,
        node: NodeHandle,
        layout: &NodeLayout,
        scope: &TraversalScope,
    ) -> bool {
        if self.window.is_unlimited() {
            return true;
        }
        if !viewport::has_rect_in_window(layout, &self.window) {
            return false;
        }
        if scope.parent_iframe.is_some() {
            return true;
        }

        let rects = if layout.client_rects.is_empty() {
            layout.visible_rects()
        } else {
            layout.client_rects.clone()
        };
        let Some(middle) = rects.get(rects.len() / 2) else {
            return false;
        };
        let (x, y) = middle.center();

        self.count("element_from_point");
        let hit = match self.host.element_from_point(scope.root(), x, y).await {
            Ok(Some(hit)) => hit,
            Ok(None) => return false,
            Err(err) => {
                trace!(error = %err, "Hit test failed, assuming top element");
                return true;
            }
        };

        let mut current = Some(hit);
        while let Some(candidate) = current {
            if candidate == node {
                return true;
            }
            self.count("parent_element");
            current = match self.host.parent_element(candidate).await {
                Ok(parent) => parent,
                Err(_) => return true,
            };
        }
        false
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
