//! Overlay boxes and index labels for indexed elements.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::dom::{BoundingBox, ViewportInfo};
use crate::error::HostError;
use crate::host::{
    DocumentHost, NodeHandle, OverlayBox, OverlayContainer, OverlayFrame, OverlayLabel,
    OverlaySurface,
};

/// Element id of the overlay container; the tree builder never descends into it.
pub const HIGHLIGHT_CONTAINER_ID: &str = "domsnap-highlight-container";

pub const HIGHLIGHT_Z_INDEX: u32 = 2_147_483_640;

pub const HIGHLIGHT_COLORS: [&str; 12] = [
    "#FF0000", "#00FF00", "#0000FF", "#FFA500", "#800080", "#008080", "#FF69B4", "#4B0082",
    "#FF4500", "#2E8B57", "#DC143C", "#4682B4",
];

const LABEL_WIDTH: f64 = 20.0;
const LABEL_HEIGHT: f64 = 16.0;

/// An indexed element to outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightTarget {
    pub index: u32,
    pub element: NodeHandle,
}

/// Border color and a 10% alpha background for an index.
pub fn highlight_color(index: u32) -> (&'static str, String) {
    let color = HIGHLIGHT_COLORS[index as usize % HIGHLIGHT_COLORS.len()];
    (color, format!("{}1A", color))
}

/// Top-left corner of the label for an element's first rect.
///
/// Labels sit inside the top-right corner; boxes too small to hold one get
/// the label above them instead. The result is clamped to the viewport.
pub fn label_placement(rect: &BoundingBox, viewport: &ViewportInfo) -> (f64, f64) {
    let mut top = rect.top() + 2.0;
    let mut left = rect.left() + rect.width - LABEL_WIDTH - 2.0;

    if rect.width < LABEL_WIDTH + 4.0 || rect.height < LABEL_HEIGHT + 4.0 {
        top = rect.top() - LABEL_HEIGHT - 2.0;
        left = rect.left() + rect.width - LABEL_WIDTH;
        if left < 0.0 {
            left = rect.left();
        }
    }

    let max_top = (viewport.height as f64 - LABEL_HEIGHT).max(0.0);
    let max_left = (viewport.width as f64 - LABEL_WIDTH).max(0.0);
    (top.clamp(0.0, max_top), left.clamp(0.0, max_left))
}

pub fn label_font_size(rect: &BoundingBox) -> f64 {
    (rect.height / 2.0).clamp(8.0, 12.0)
}

/// Owns one overlay container for the lifetime of a capture.
pub struct Highlighter<H: ?Sized> {
    host: Arc<H>,
    throttle: Duration,
    container: Option<OverlayContainer>,
    targets: Vec<HighlightTarget>,
    last_drawn: Option<Instant>,
}

impl<H> Highlighter<H>
where
    H: DocumentHost + OverlaySurface + ?Sized,
{
    pub fn new(host: Arc<H>, throttle: Duration) -> Self {
        Self {
            host,
            throttle,
            container: None,
            targets: Vec::new(),
            last_drawn: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.container.is_some()
    }

    pub fn targets(&self) -> &[HighlightTarget] {
        &self.targets
    }

    /// Replace whatever is drawn with boxes for `targets`. Returns the number of boxes.
    pub async fn draw(&mut self, targets: Vec<HighlightTarget>) -> Result<usize, HostError> {
        self.clear().await?;
        if targets.is_empty() {
            return Ok(0);
        }

        let container = self
            .host
            .mount_overlay(HIGHLIGHT_CONTAINER_ID, HIGHLIGHT_Z_INDEX)
            .await?;
        self.container = Some(container);
        self.targets = targets;

        let frame = self.compose().await?;
        self.host.draw_overlay(container, &frame).await?;
        self.last_drawn = Some(Instant::now());
        debug!(
            targets = self.targets.len(),
            boxes = frame.boxes.len(),
            "Drew highlight overlay"
        );
        Ok(frame.boxes.len())
    }

    /// Re-measure targets after scroll or resize. Skipped within the throttle window.
    pub async fn reposition(&mut self) -> Result<bool, HostError> {
        let Some(container) = self.container else {
            return Ok(false);
        };
        if self
            .last_drawn
            .is_some_and(|drawn| drawn.elapsed() < self.throttle)
        {
            return Ok(false);
        }

        let frame = self.compose().await?;
        self.host.draw_overlay(container, &frame).await?;
        self.last_drawn = Some(Instant::now());
        Ok(true)
    }

    pub async fn clear(&mut self) -> Result<(), HostError> {
        self.targets.clear();
        self.last_drawn = None;
        if let Some(container) = self.container.take() {
            self.host.unmount_overlay(container).await?;
        }
        Ok(())
    }

    async fn compose(&self) -> Result<OverlayFrame, HostError> {
        let viewport = self.host.viewport().await?;
        let mut frame = OverlayFrame::default();

        for target in &self.targets {
            let layout = match self.host.layout(target.element).await {
                Ok(layout) => layout,
                Err(err) => {
                    debug!(index = target.index, error = %err, "Highlight target vanished");
                    continue;
                }
            };
            let rects = layout.visible_rects();
            let Some(first) = rects.first().copied() else {
                continue;
            };

            let (color, background) = highlight_color(target.index);
            for rect in &rects {
                frame.boxes.push(OverlayBox {
                    index: target.index,
                    rect: *rect,
                    color: color.to_string(),
                    background: background.clone(),
                });
            }

            let (top, left) = label_placement(&first, &viewport);
            frame.labels.push(OverlayLabel {
                index: target.index,
                text: target.index.to_string(),
                top,
                left,
                width: LABEL_WIDTH,
                height: LABEL_HEIGHT,
                font_size: label_font_size(&first),
                color: color.to_string(),
            });
        }

        Ok(frame)
    }
}

#[cfg(test)]
#[path = "highlight_tests.rs"]
mod tests;
