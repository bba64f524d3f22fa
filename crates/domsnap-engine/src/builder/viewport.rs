//! Viewport filter: whether geometry falls inside the capture window.

use crate::dom::CaptureWindow;
use crate::host::{ComputedStyle, NodeLayout};

/// Any rendered rect overlaps the window. Always true when unlimited.
pub(crate) fn is_in_viewport(layout: &NodeLayout, window: &CaptureWindow) -> bool {
    window.is_unlimited() || has_rect_in_window(layout, window)
}

pub(crate) fn has_rect_in_window(layout: &NodeLayout, window: &CaptureWindow) -> bool {
    layout
        .visible_rects()
        .iter()
        .any(|rect| window.overlaps(rect))
}

/// Geometry check run before any further host queries. Only applies to a
/// limited window.
///
/// Fixed and sticky elements pass even without size.
pub(crate) fn passes_prefilter(
    layout: &NodeLayout,
    style: &ComputedStyle,
    window: &CaptureWindow,
) -> bool {
    if window.is_unlimited() {
        return true;
    }
    let Some(rect) = layout.bounding_rect else {
        return false;
    };
    if style.is_fixed_or_sticky() || layout.has_offset_size() {
        return true;
    }
    window.overlaps(&rect)
}

/// Text counts as visible when one of its line boxes is in the window and
/// its parent is rendered.
pub(crate) fn is_text_visible(
    layout: &NodeLayout,
    parent_style: &ComputedStyle,
    window: &CaptureWindow,
) -> bool {
    if !parent_style.is_css_visible() {
        return false;
    }
    if window.is_unlimited() {
        return true;
    }
    layout
        .client_rects
        .iter()
        .any(|rect| !rect.is_empty() && window.overlaps(rect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{BoundingBox, ViewportInfo};

    fn layout(rect: BoundingBox) -> NodeLayout {
        NodeLayout {
            bounding_rect: Some(rect),
            client_rects: vec![rect],
            offset_width: rect.width,
            offset_height: rect.height,
        }
    }

    #[test]
    fn test_prefilter_drops_sizeless_offscreen_elements() {
        let window = CaptureWindow::new(&ViewportInfo::default(), 0);
        let style = ComputedStyle::default();

        let mut offscreen = layout(BoundingBox::new(0.0, 5000.0, 0.0, 0.0));
        offscreen.client_rects.clear();
        assert!(!passes_prefilter(&offscreen, &style, &window));

        let fixed = ComputedStyle {
            position: "fixed".to_string(),
            ..Default::default()
        };
        assert!(passes_prefilter(&offscreen, &fixed, &window));

        let missing = NodeLayout::default();
        assert!(!passes_prefilter(&missing, &style, &window));
        assert!(passes_prefilter(
            &missing,
            &style,
            &CaptureWindow::new(&ViewportInfo::default(), -1)
        ));
    }

    #[test]
    fn test_in_viewport_respects_expansion() {
        let below = layout(BoundingBox::new(0.0, 900.0, 100.0, 20.0));
        let tight = CaptureWindow::new(&ViewportInfo::default(), 0);
        let loose = CaptureWindow::new(&ViewportInfo::default(), 500);
        assert!(!is_in_viewport(&below, &tight));
        assert!(is_in_viewport(&below, &loose));
    }

    #[test]
    fn test_text_needs_visible_parent() {
        let window = CaptureWindow::new(&ViewportInfo::default(), 0);
        let text = layout(BoundingBox::new(0.0, 0.0, 40.0, 12.0));
        let hidden = ComputedStyle {
            visibility: "hidden".to_string(),
            ..Default::default()
        };
        assert!(is_text_visible(&text, &ComputedStyle::default(), &window));
        assert!(!is_text_visible(&text, &hidden, &window));
    }
}
