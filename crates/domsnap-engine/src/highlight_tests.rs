use super::*;
use crate::host::{ElementSpec, MemoryDocument};

#[test]
fn test_colors_cycle() {
    assert_eq!(highlight_color(0), ("#FF0000", "#FF00001A".to_string()));
    assert_eq!(highlight_color(12).0, "#FF0000");
    assert_eq!(highlight_color(11).0, "#4682B4");
}

#[test]
fn test_label_inside_large_box() {
    let viewport = ViewportInfo::default();
    let rect = BoundingBox::new(100.0, 100.0, 200.0, 50.0);
    assert_eq!(label_placement(&rect, &viewport), (102.0, 278.0));
    assert_eq!(label_font_size(&rect), 12.0);
}

#[test]
fn test_label_above_small_box() {
    let viewport = ViewportInfo::default();
    let rect = BoundingBox::new(100.0, 100.0, 16.0, 12.0);
    assert_eq!(label_placement(&rect, &viewport), (82.0, 96.0));
    assert_eq!(label_font_size(&rect), 8.0);
}

#[test]
fn test_label_clamped_to_viewport() {
    let viewport = ViewportInfo::default();
    let corner = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(label_placement(&corner, &viewport), (0.0, 0.0));

    let bottom_right = BoundingBox::new(1270.0, 715.0, 30.0, 30.0);
    let (top, left) = label_placement(&bottom_right, &viewport);
    assert_eq!(top, 704.0);
    assert_eq!(left, 1260.0);
}

#[tokio::test]
async fn test_draw_and_clear() {
    let doc = Arc::new(MemoryDocument::new("https://a.test", "A"));
    let button = doc.append(
        doc.body_handle(),
        ElementSpec::new("button").rect(10.0, 10.0, 80.0, 30.0),
    );
    let wrapped = doc.append(
        doc.body_handle(),
        ElementSpec::new("a").client_rects(vec![
            BoundingBox::new(0.0, 100.0, 300.0, 16.0),
            BoundingBox::new(0.0, 116.0, 120.0, 16.0),
        ]),
    );

    let mut highlighter = Highlighter::new(doc.clone(), Duration::from_millis(16));
    let boxes = highlighter
        .draw(vec![
            HighlightTarget {
                index: 0,
                element: button,
            },
            HighlightTarget {
                index: 1,
                element: wrapped,
            },
        ])
        .await
        .unwrap();
    assert_eq!(boxes, 3);
    assert!(highlighter.is_active());
    assert_eq!(doc.mounted_overlays(), vec![HIGHLIGHT_CONTAINER_ID.to_string()]);

    let frame = &doc.overlay_frames()[0];
    assert_eq!(frame.labels.len(), 2);
    assert_eq!(frame.labels[1].text, "1");

    highlighter.clear().await.unwrap();
    assert!(!highlighter.is_active());
    assert!(doc.mounted_overlays().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reposition_is_throttled() {
    let doc = Arc::new(MemoryDocument::new("https://a.test", "A"));
    let button = doc.append(
        doc.body_handle(),
        ElementSpec::new("button").rect(10.0, 10.0, 80.0, 30.0),
    );
    let mut highlighter = Highlighter::new(doc.clone(), Duration::from_millis(16));
    highlighter
        .draw(vec![HighlightTarget {
            index: 0,
            element: button,
        }])
        .await
        .unwrap();

    doc.set_rect(button, BoundingBox::new(10.0, 200.0, 80.0, 30.0));
    assert!(!highlighter.reposition().await.unwrap());

    tokio::time::advance(Duration::from_millis(20)).await;
    assert!(highlighter.reposition().await.unwrap());
    assert_eq!(doc.overlay_frames()[0].boxes[0].rect.y, 200.0);
}

#[tokio::test]
async fn test_draw_nothing_mounts_nothing() {
    let doc = Arc::new(MemoryDocument::new("https://a.test", "A"));
    let mut highlighter = Highlighter::new(doc.clone(), Duration::from_millis(16));
    assert_eq!(highlighter.draw(Vec::new()).await.unwrap(), 0);
    assert!(doc.mounted_overlays().is_empty());
}
