//! End-to-end flows: capture, locate, act and re-capture.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use domsnap_engine::host::{
    ActionEffect, ClickMethod, ElementSpec, MemoryDocument, MutationSource,
};
use domsnap_engine::{
    forward_mutations, Action, ActionExecutor, ActionSettings, CaptureController, CaptureOptions,
    CaptureSettings, Locator, StabilityWaiter,
};

fn settings() -> CaptureSettings {
    CaptureSettings {
        stability_quiet: Duration::from_millis(50),
        ..Default::default()
    }
}

fn login_page() -> Arc<MemoryDocument> {
    let doc = MemoryDocument::new("https://app.test/login", "Sign in");
    let body = doc.body_handle();
    doc.append(
        body,
        ElementSpec::new("input")
            .attr("id", "user")
            .attr("name", "user")
            .rect(10.0, 10.0, 200.0, 30.0),
    );
    doc.append(
        body,
        ElementSpec::new("button")
            .attr("id", "submit")
            .rect(10.0, 50.0, 80.0, 30.0)
            .text("Sign in"),
    );
    Arc::new(doc)
}

#[tokio::test(start_paused = true)]
async fn test_hidden_button_is_not_indexed() {
    let doc = MemoryDocument::new("https://app.test/", "Home");
    let body = doc.body_handle();
    doc.append(
        body,
        ElementSpec::new("button")
            .attr("id", "go")
            .rect(10.0, 10.0, 80.0, 30.0)
            .text("Go"),
    );
    doc.append(
        body,
        ElementSpec::new("button")
            .attr("id", "hidden")
            .display("none")
            .rect(10.0, 50.0, 80.0, 30.0)
            .text("Hidden"),
    );
    let doc = Arc::new(doc);
    let controller = CaptureController::new(doc.clone(), settings());

    let outcome = controller.capture(&CaptureOptions::default()).await.unwrap();
    let snapshot = &outcome.snapshot;
    assert_eq!(snapshot.selector_map().len(), 1);
    assert!(outcome.serialized.contains("[0]<button id=\"go\">Go />"));
    assert!(!outcome.serialized.contains("Hidden"));

    let (node, _) = snapshot.element_by_highlight(0).unwrap();
    let live = Locator::default().locate(doc.as_ref(), snapshot, node).await;
    assert_eq!(live, doc.find_by_id("go"));
}

#[tokio::test(start_paused = true)]
async fn test_button_hidden_after_capture_is_not_clicked() {
    let doc = MemoryDocument::new("https://app.test/", "Home");
    let go = doc.append(
        doc.body_handle(),
        ElementSpec::new("button")
            .attr("id", "go")
            .rect(10.0, 10.0, 80.0, 30.0)
            .text("Go"),
    );
    let doc = Arc::new(doc);
    let controller = CaptureController::new(doc.clone(), settings());
    let executor = ActionExecutor::new(doc.clone(), controller.subscribe(), ActionSettings::default());
    controller.capture(&CaptureOptions::default()).await.unwrap();

    doc.set_display(go, "none");
    doc.set_attribute(go, "disabled", "");

    assert!(!executor.execute_action(&Action::click(0)).await);
    assert!(!doc
        .effects()
        .iter()
        .any(|effect| matches!(effect, ActionEffect::Click { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_composite_widget_is_indexed_once() {
    let doc = MemoryDocument::new("https://app.test/", "Home");
    let body = doc.body_handle();
    let card = doc.append(
        body,
        ElementSpec::new("div")
            .attr("role", "button")
            .cursor("pointer")
            .rect(0.0, 0.0, 200.0, 40.0),
    );
    doc.append(
        card,
        ElementSpec::new("span").rect(10.0, 10.0, 60.0, 20.0).text("Open"),
    );
    let controller = CaptureController::new(Arc::new(doc), settings());

    let outcome = controller.capture(&CaptureOptions::default()).await.unwrap();
    let snapshot = &outcome.snapshot;
    assert_eq!(snapshot.selector_map().len(), 1);
    let (node, element) = snapshot.element_by_highlight(0).unwrap();
    assert_eq!(element.tag_name, "div");
    assert_eq!(snapshot.text_until_next_clickable(node), "Open");
}

#[tokio::test(start_paused = true)]
async fn test_fill_then_click() {
    let doc = login_page();
    let controller = CaptureController::new(doc.clone(), settings());
    let executor = ActionExecutor::new(doc.clone(), controller.subscribe(), ActionSettings::default());

    controller.capture(&CaptureOptions::default()).await.unwrap();
    let result = executor
        .execute_actions(&[Action::fill(0, "alice"), Action::click(1)])
        .await;

    assert!(result.success);
    assert_eq!((result.executed_count, result.total_count), (2, 2));

    let user = doc.find_by_id("user").unwrap();
    let submit = doc.find_by_id("submit").unwrap();
    assert_eq!(doc.value_of(user).as_deref(), Some("alice"));
    assert!(doc.effects().contains(&ActionEffect::Click {
        target: submit,
        method: ClickMethod::Native,
    }));
}

#[tokio::test(start_paused = true)]
async fn test_sequence_reports_partial_progress() {
    let doc = login_page();
    let controller = CaptureController::new(doc.clone(), settings());
    let executor = ActionExecutor::new(doc.clone(), controller.subscribe(), ActionSettings::default());

    controller.capture(&CaptureOptions::default()).await.unwrap();
    let user = doc.find_by_id("user").unwrap();
    doc.remove(user);

    let result = executor
        .execute_actions(&[Action::fill(0, "bob"), Action::click(1)])
        .await;

    assert!(!result.success);
    assert_eq!((result.executed_count, result.total_count), (1, 2));
    let submit = doc.find_by_id("submit").unwrap();
    assert!(doc
        .effects()
        .iter()
        .any(|effect| matches!(effect, ActionEffect::Click { target, .. } if *target == submit)));
}

#[tokio::test(start_paused = true)]
async fn test_quiet_document_settles_after_quiet_period() {
    let doc = login_page();
    let waiter = StabilityWaiter::new();

    let started = Instant::now();
    let stable = waiter
        .wait_for_stable(
            doc.as_ref(),
            Duration::from_millis(1000),
            Duration::from_millis(200),
        )
        .await;

    assert!(stable);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_busy_document_times_out() {
    let doc = login_page();
    let body = doc.body_handle();
    let busy = doc.clone();
    let ticker = tokio::spawn(async move {
        for i in 0..30 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            busy.append(body, ElementSpec::new("p").text(&format!("tick {}", i)));
        }
    });

    let started = Instant::now();
    let stable = StabilityWaiter::new()
        .wait_for_stable(
            doc.as_ref(),
            Duration::from_millis(1000),
            Duration::from_millis(200),
        )
        .await;

    assert!(!stable);
    assert!(started.elapsed() >= Duration::from_millis(1000));
    ticker.abort();
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_recaptures_after_mutation() {
    let doc = login_page();
    let controller = Arc::new(CaptureController::new(doc.clone(), settings()));
    let mut snapshots = controller.subscribe();

    let (tx, rx) = mpsc::channel(64);
    let forwarder = forward_mutations(doc.observe_mutations(), tx);
    let cancel = CancellationToken::new();
    let runner = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.run(rx, cancel, CaptureOptions::default()).await })
    };

    snapshots.changed().await.unwrap();
    let first = snapshots.borrow_and_update().clone().unwrap();
    assert_eq!(first.selector_map().len(), 2);

    doc.append(
        doc.body_handle(),
        ElementSpec::new("a")
            .attr("href", "/forgot")
            .rect(10.0, 90.0, 120.0, 20.0)
            .text("Forgot password?"),
    );

    snapshots.changed().await.unwrap();
    let second = snapshots.borrow_and_update().clone().unwrap();
    assert_eq!(second.selector_map().len(), 3);

    cancel.cancel();
    assert_eq!(runner.await.unwrap(), 2);
    forwarder.abort();
}
