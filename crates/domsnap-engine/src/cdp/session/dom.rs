//! DOM, CSS and DOMDebugger commands.

use serde_json::json;

use crate::cdp::error::CdpError;
use crate::cdp::protocol::{
    BoxModel, CssProperty, DomNode, EventListener, NodeForLocation, RemoteObject,
};

use super::core::PageSession;

/// `Could not compute box model` and friends.
const NO_LAYOUT: i64 = -32000;

/// Object group for handles released on every document refresh.
pub const OBJECT_GROUP: &str = "domsnap";

impl PageSession {
    /// Whole document tree, piercing frames and shadow roots.
    pub async fn get_document(&self) -> Result<DomNode, CdpError> {
        let result = self
            .call(
                "DOM.getDocument",
                Some(json!({"depth": -1, "pierce": true})),
            )
            .await?;

        let root: DomNode = serde_json::from_value(result["root"].clone())?;
        Ok(root)
    }

    /// Describe a single node by id, without children.
    pub async fn describe_node(&self, node_id: i64) -> Result<DomNode, CdpError> {
        let result = self
            .call("DOM.describeNode", Some(json!({"nodeId": node_id})))
            .await?;
        let node: DomNode = serde_json::from_value(result["node"].clone())?;
        Ok(node)
    }

    /// First match of `selector` under `scope_node_id`.
    pub async fn query_selector(
        &self,
        scope_node_id: i64,
        selector: &str,
    ) -> Result<Option<i64>, CdpError> {
        let result = self
            .call(
                "DOM.querySelector",
                Some(json!({
                    "nodeId": scope_node_id,
                    "selector": selector,
                })),
            )
            .await?;

        let node_id = result["nodeId"].as_i64().unwrap_or(0);
        Ok((node_id != 0).then_some(node_id))
    }

    /// Box model of a node; `None` when it has no layout.
    pub async fn get_box_model(&self, node_id: i64) -> Result<Option<BoxModel>, CdpError> {
        let result = self
            .call("DOM.getBoxModel", Some(json!({"nodeId": node_id})))
            .await;

        match result {
            Ok(r) => {
                let model: BoxModel = serde_json::from_value(r["model"].clone())?;
                Ok(Some(model))
            }
            Err(CdpError::Protocol { code: NO_LAYOUT, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// One quad per layout fragment, like `getClientRects()`.
    pub async fn get_content_quads(&self, node_id: i64) -> Result<Vec<Vec<f64>>, CdpError> {
        let result = self
            .call("DOM.getContentQuads", Some(json!({"nodeId": node_id})))
            .await;

        match result {
            Ok(r) => Ok(serde_json::from_value(r["quads"].clone()).unwrap_or_default()),
            Err(CdpError::Protocol { code: NO_LAYOUT, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn get_computed_style(&self, node_id: i64) -> Result<Vec<CssProperty>, CdpError> {
        let result = self
            .call(
                "CSS.getComputedStyleForNode",
                Some(json!({"nodeId": node_id})),
            )
            .await?;

        let styles: Vec<CssProperty> =
            serde_json::from_value(result["computedStyle"].clone()).unwrap_or_default();

        Ok(styles)
    }

    /// Listeners registered directly on the object.
    pub async fn get_event_listeners(
        &self,
        object_id: &str,
    ) -> Result<Vec<EventListener>, CdpError> {
        let result = self
            .call(
                "DOMDebugger.getEventListeners",
                Some(json!({"objectId": object_id, "depth": 0})),
            )
            .await?;

        let listeners: Vec<EventListener> =
            serde_json::from_value(result["listeners"].clone()).unwrap_or_default();

        Ok(listeners)
    }

    /// Resolve a node to a runtime object in the `domsnap` group.
    pub async fn resolve_node(&self, node_id: i64) -> Result<RemoteObject, CdpError> {
        let result = self
            .call(
                "DOM.resolveNode",
                Some(json!({"nodeId": node_id, "objectGroup": OBJECT_GROUP})),
            )
            .await?;

        let obj: RemoteObject = serde_json::from_value(result["object"].clone())?;
        Ok(obj)
    }

    /// Node id for a runtime node handle.
    pub async fn request_node(&self, object_id: &str) -> Result<i64, CdpError> {
        let result = self
            .call("DOM.requestNode", Some(json!({"objectId": object_id})))
            .await?;
        result["nodeId"]
            .as_i64()
            .filter(|id| *id != 0)
            .ok_or_else(|| CdpError::NodeNotFound(format!("object {}", object_id)))
    }

    /// Node ids for backend node ids, pushing them to the frontend.
    pub async fn push_backend_nodes(&self, backend_ids: &[i64]) -> Result<Vec<i64>, CdpError> {
        let result = self
            .call(
                "DOM.pushNodesByBackendIdsToFrontend",
                Some(json!({"backendNodeIds": backend_ids})),
            )
            .await?;
        Ok(serde_json::from_value(result["nodeIds"].clone()).unwrap_or_default())
    }

    /// Topmost node painted at a viewport point.
    pub async fn get_node_for_location(
        &self,
        x: f64,
        y: f64,
    ) -> Result<Option<NodeForLocation>, CdpError> {
        let result = self
            .call(
                "DOM.getNodeForLocation",
                Some(json!({
                    "x": x.round() as i64,
                    "y": y.round() as i64,
                    "includeUserAgentShadowDOM": false,
                    "ignorePointerEventsNone": true,
                })),
            )
            .await;

        match result {
            Ok(r) => Ok(Some(serde_json::from_value(r)?)),
            Err(CdpError::Protocol { code: NO_LAYOUT, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn scroll_into_view_if_needed(&self, node_id: i64) -> Result<(), CdpError> {
        self.call(
            "DOM.scrollIntoViewIfNeeded",
            Some(json!({"nodeId": node_id})),
        )
        .await?;
        Ok(())
    }

    pub async fn release_object_group(&self) -> Result<(), CdpError> {
        self.call(
            "Runtime.releaseObjectGroup",
            Some(json!({"objectGroup": OBJECT_GROUP})),
        )
        .await?;
        Ok(())
    }

    /// Axis-aligned bounds of a quad as `(x, y, width, height)`.
    pub fn quad_bounds(quad: &[f64]) -> Option<(f64, f64, f64, f64)> {
        if quad.len() < 8 {
            return None;
        }
        let xs = [quad[0], quad[2], quad[4], quad[6]];
        let ys = [quad[1], quad[3], quad[5], quad[7]];
        let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min);
        let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min_x, min_y, max_x - min_x, max_y - min_y))
    }
}
