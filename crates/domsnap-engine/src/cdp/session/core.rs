//! Core session struct and CDP command dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use crate::cdp::client::{PendingRequest, WsSink};
use crate::cdp::error::CdpError;
use crate::cdp::protocol::{CdpEvent, CdpRequest, CdpResponse, ScreenshotClip, ScreenshotFormat};

const EVENT_CAPACITY: usize = 256;

/// A session attached to a single page target.
pub struct PageSession {
    pub(super) target_id: String,
    pub(super) session_id: String,
    /// WebSocket sender (shared with client).
    pub(super) ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    /// Pending requests (shared with client).
    pub(super) pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    /// Request ID counter (shared with client).
    pub(super) request_id: Arc<AtomicU64>,
    pub(super) request_timeout: Duration,
    events: broadcast::Sender<CdpEvent>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl PageSession {
    pub(crate) fn new(
        target_id: String,
        session_id: String,
        ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
        pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
        request_id: Arc<AtomicU64>,
        request_timeout: Duration,
        event_rx: mpsc::UnboundedReceiver<CdpResponse>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let event_task = tokio::spawn(Self::pump_events(event_rx, events.clone()));
        Self {
            target_id,
            session_id,
            ws_tx,
            pending,
            request_id,
            request_timeout,
            events,
            _event_task: event_task,
        }
    }

    /// Fan session events out to every subscriber.
    async fn pump_events(
        mut event_rx: mpsc::UnboundedReceiver<CdpResponse>,
        events: broadcast::Sender<CdpEvent>,
    ) {
        while let Some(response) = event_rx.recv().await {
            if let Some(event) = CdpEvent::from_response(response) {
                trace!(method = %event.method, "CDP event");
                // No subscribers is fine.
                let _ = events.send(event);
            }
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Events pushed for this page from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Send a CDP command to this page session.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: Some(self.session_id.clone()),
        };

        let json = serde_json::to_string(&request)?;
        trace!("CDP session send: {}", json);

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { tx });

        {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(json.into())).await?;
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::SessionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(format!("Request {} timed out", method)))
            }
        }
    }

    /// Enable the domains the DOM host reads from.
    pub(crate) async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("DOM.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        self.call("CSS.enable", None).await?;

        debug!("Enabled CDP domains for session {}", self.session_id);
        Ok(())
    }

    /// Base64 screenshot of the page.
    pub async fn screenshot(
        &self,
        format: ScreenshotFormat,
        quality: Option<u8>,
        full_page: bool,
        clip: Option<ScreenshotClip>,
    ) -> Result<String, CdpError> {
        let mut params = json!({
            "format": format,
            "captureBeyondViewport": full_page,
        });

        if let Some(q) = quality {
            params["quality"] = json!(q);
        }

        if let Some(c) = clip {
            params["clip"] = serde_json::to_value(c)?;
        }

        let result = self.call("Page.captureScreenshot", Some(params)).await?;

        result["data"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CdpError::InvalidResponse("Missing screenshot data".to_string()))
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
