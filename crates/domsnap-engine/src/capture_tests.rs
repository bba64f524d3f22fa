use super::*;
use crate::host::{ElementSpec, MemoryDocument, MutationSource};

fn settings() -> CaptureSettings {
    CaptureSettings {
        stability_timeout: Duration::from_millis(1000),
        stability_quiet: Duration::from_millis(50),
        ..Default::default()
    }
}

fn page() -> Arc<MemoryDocument> {
    let doc = Arc::new(MemoryDocument::new("https://shop.test/cart", "Cart"));
    doc.append(
        doc.body_handle(),
        ElementSpec::new("button")
            .attr("id", "checkout")
            .rect(10.0, 10.0, 120.0, 30.0)
            .text("Checkout"),
    );
    doc
}

#[tokio::test(start_paused = true)]
async fn test_first_capture_publishes_snapshot() {
    let doc = page();
    let controller = CaptureController::new(doc.clone(), settings());
    let mut published = controller.subscribe();

    let outcome = controller.capture(&CaptureOptions::default()).await.unwrap();
    assert!(outcome.changed);
    assert!(outcome.stable);
    assert!(outcome.new_elements.is_empty());
    assert_eq!(outcome.snapshot.url(), "https://shop.test/cart");
    assert_eq!(outcome.snapshot.selector_map().len(), 1);
    assert!(outcome.serialized.contains("[0]<button"));
    assert_eq!(controller.state(), CaptureState::Idle);

    assert!(published.has_changed().unwrap());
    let seen = published.borrow_and_update().clone().unwrap();
    assert!(Arc::ptr_eq(&seen, &outcome.snapshot));
    assert!(Arc::ptr_eq(&controller.current().unwrap(), &outcome.snapshot));
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_capture_serves_cached_snapshot() {
    let doc = page();
    let controller = CaptureController::new(doc.clone(), settings());

    let first = controller.capture(&CaptureOptions::default()).await.unwrap();
    let second = controller.capture(&CaptureOptions::default()).await.unwrap();
    assert!(!second.changed);
    assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
}

#[tokio::test(start_paused = true)]
async fn test_new_elements_are_reported() {
    let doc = page();
    let controller = CaptureController::new(doc.clone(), settings());
    controller.capture(&CaptureOptions::default()).await.unwrap();

    doc.append(
        doc.body_handle(),
        ElementSpec::new("a")
            .attr("href", "/coupons")
            .rect(10.0, 60.0, 120.0, 20.0)
            .text("Coupons"),
    );
    let outcome = controller.capture(&CaptureOptions::default()).await.unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.new_elements, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_build() {
    let doc = page();
    let controller = CaptureController::new(doc.clone(), settings());
    let options = CaptureOptions::default();

    let (first, second) = tokio::join!(controller.capture(&options), controller.capture(&options));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
    // A second build would have compared equal and reported no change.
    assert!(first.changed && second.changed);
}

#[tokio::test(start_paused = true)]
async fn test_overlay_is_replaced_and_cleared() {
    let doc = page();
    let controller = CaptureController::new(doc.clone(), settings());
    let options = CaptureOptions {
        render_overlay: true,
        ..Default::default()
    };

    controller.capture(&options).await.unwrap();
    controller.capture(&options).await.unwrap();
    assert_eq!(doc.mounted_overlays().len(), 1);

    controller.clear_highlights().await.unwrap();
    assert!(doc.mounted_overlays().is_empty());
    assert!(!controller.reposition_overlays().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_vision_capture_attaches_screenshot() {
    let doc = page();
    let controller = CaptureController::new(doc.clone(), settings());
    let options = CaptureOptions {
        vision: true,
        ..Default::default()
    };

    let outcome = controller.capture(&options).await.unwrap();
    assert!(outcome.snapshot.screenshot().is_none());

    doc.set_screenshot(Some("aGVsbG8=".to_string()));
    let outcome = controller.capture(&options).await.unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.snapshot.screenshot(), Some("aGVsbG8="));
    assert_eq!(outcome.snapshot.screenshot_bytes(), Some(b"hello".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_build_returns_to_idle() {
    let doc = page();
    let controller = CaptureController::new(doc.clone(), settings());
    doc.remove(doc.body_handle());

    let err = controller.capture(&CaptureOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::BuildFailed(_)));
    assert_eq!(controller.state(), CaptureState::Idle);
    assert!(controller.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_composite_menu_item_keeps_its_index() {
    let doc = Arc::new(MemoryDocument::new("https://shop.test/", "Shop"));
    let menu = doc.append(
        doc.body_handle(),
        ElementSpec::new("div")
            .attr("class", "menu")
            .cursor("pointer")
            .rect(0.0, 0.0, 200.0, 100.0),
    );
    let item = doc.append(
        menu,
        ElementSpec::new("div").attr("class", "menu-item").rect(0.0, 0.0, 200.0, 30.0),
    );
    doc.append(item, ElementSpec::new("span").rect(5.0, 5.0, 50.0, 20.0).text("Copy"));
    let controller = CaptureController::new(doc.clone(), settings());

    let outcome = controller.capture(&CaptureOptions::default()).await.unwrap();
    let snapshot = &outcome.snapshot;
    assert_eq!(snapshot.selector_map().len(), 2);
    let (_, nested) = snapshot.element_by_highlight(1).unwrap();
    assert_eq!(nested.attribute("class"), Some("menu-item"));
    assert!(nested.is_distinct);
}

#[tokio::test(start_paused = true)]
async fn test_nested_listener_keeps_its_index() {
    let doc = Arc::new(MemoryDocument::new("https://shop.test/", "Shop"));
    doc.set_listener_introspection(true);
    let dialog = doc.append(
        doc.body_handle(),
        ElementSpec::new("div")
            .attr("role", "button")
            .rect(0.0, 0.0, 300.0, 200.0),
    );
    doc.append(
        dialog,
        ElementSpec::new("div")
            .attr("id", "close")
            .listener("click")
            .rect(260.0, 10.0, 30.0, 30.0),
    );
    let controller = CaptureController::new(doc.clone(), settings());

    let outcome = controller.capture(&CaptureOptions::default()).await.unwrap();
    let snapshot = &outcome.snapshot;
    assert_eq!(snapshot.selector_map().len(), 2);
    let (_, close) = snapshot.element_by_highlight(1).unwrap();
    assert_eq!(close.attribute("id"), Some("close"));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_debounces_recaptures() {
    let doc = page();
    let controller = Arc::new(CaptureController::new(doc.clone(), settings()));
    let mut published = controller.subscribe();
    let (events, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let task = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            controller
                .run(rx, cancel, CaptureOptions::default())
                .await
        })
    };

    published.changed().await.unwrap();
    let first_published = Instant::now();

    // Cosmetic churn never schedules a capture.
    events
        .send(CaptureEvent::Mutation(MutationRecord::attribute("div", "class")))
        .await
        .unwrap();

    doc.append(
        doc.body_handle(),
        ElementSpec::new("input")
            .attr("name", "coupon")
            .rect(10.0, 60.0, 120.0, 20.0),
    );
    events
        .send(CaptureEvent::Mutation(MutationRecord::child_list("body")))
        .await
        .unwrap();

    published.changed().await.unwrap();
    assert!(first_published.elapsed() >= Duration::from_millis(900));
    assert_eq!(
        published.borrow().as_ref().unwrap().selector_map().len(),
        2
    );

    events.send(CaptureEvent::Scroll).await.unwrap();
    events.send(CaptureEvent::ClearHighlights).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    cancel.cancel();
    assert_eq!(task.await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_forwarded_mutations_reach_the_queue() {
    let doc = page();
    let (events, mut rx) = mpsc::channel(4);
    let pump = forward_mutations(doc.observe_mutations(), events);

    doc.set_attribute(doc.body_handle(), "data-step", "2");
    let event = rx.recv().await.unwrap();
    assert!(matches!(
        event,
        CaptureEvent::Mutation(record) if record.attribute_name.as_deref() == Some("data-step")
    ));

    drop(rx);
    doc.set_attribute(doc.body_handle(), "data-step", "3");
    pump.await.unwrap();
}
