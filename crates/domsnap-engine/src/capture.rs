//! Capture controller: the capture state machine and the re-capture loop.
//!
//! A capture waits for the document to settle, walks it, builds a snapshot,
//! redraws overlays and compares the result with the last capture of the
//! same URL. Captures never overlap. A request that arrives while another
//! one is building waits for it and shares its result.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::{build_tree, BuildMetrics, CaptureOptions};
use crate::dom::{construct, ChangeDetector, Snapshot, SnapshotMeta};
use crate::error::{EngineError, HostError};
use crate::highlight::Highlighter;
use crate::host::{Host, MutationRecord, MutationSubscription};
use crate::stability::{is_significant, StabilityWaiter};

/// Timing and serialization knobs of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub stability_timeout: Duration,
    pub stability_quiet: Duration,
    /// Quiet time after the last triggering event before a re-capture.
    pub debounce: Duration,
    pub min_capture_interval: Duration,
    pub overlay_throttle: Duration,
    /// Attributes rendered by the serializer and compared by the change detector.
    pub include_attributes: Vec<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            stability_timeout: Duration::from_millis(5000),
            stability_quiet: Duration::from_millis(500),
            debounce: Duration::from_millis(500),
            min_capture_interval: Duration::from_millis(1000),
            overlay_throttle: Duration::from_millis(16),
            include_attributes: [
                "id",
                "name",
                "type",
                "role",
                "aria-label",
                "placeholder",
                "value",
                "alt",
                "title",
                "href",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    WaitingStable,
    Building,
    Diffing,
}

/// Result of one capture request.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub snapshot: Arc<Snapshot>,
    /// The serialized snapshot differs from the previous capture of its URL.
    pub changed: bool,
    /// Indices whose element hash was absent from the previous capture.
    pub new_elements: Vec<u32>,
    /// The document went quiet before the walk started.
    pub stable: bool,
    pub serialized: String,
    pub metrics: Option<BuildMetrics>,
}

/// Inputs of the re-capture loop.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Mutation(MutationRecord),
    Scroll,
    Resize,
    Navigation,
    ClearHighlights,
    Recapture,
}

/// Forward a mutation stream into the controller's event queue.
pub fn forward_mutations(
    mut subscription: MutationSubscription,
    events: mpsc::Sender<CaptureEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = subscription.recv().await {
            if events.send(CaptureEvent::Mutation(record)).await.is_err() {
                break;
            }
        }
    })
}

/// Clears the in-flight flag even when the capture future is dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CaptureController<H: ?Sized> {
    host: Arc<H>,
    settings: CaptureSettings,
    waiter: StabilityWaiter,
    single_flight: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    last_outcome: RwLock<Option<(u64, CaptureOutcome)>>,
    current: RwLock<Option<Arc<Snapshot>>>,
    state: RwLock<CaptureState>,
    published: watch::Sender<Option<Arc<Snapshot>>>,
    highlighter: tokio::sync::Mutex<Option<Highlighter<H>>>,
    detector: Mutex<ChangeDetector>,
}

impl<H: Host + ?Sized> CaptureController<H> {
    pub fn new(host: Arc<H>, settings: CaptureSettings) -> Self {
        let detector = ChangeDetector::new(settings.include_attributes.clone());
        let (published, _) = watch::channel(None);
        Self {
            host,
            settings,
            waiter: StabilityWaiter::new(),
            single_flight: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            last_outcome: RwLock::new(None),
            current: RwLock::new(None),
            state: RwLock::new(CaptureState::Idle),
            published,
            highlighter: tokio::sync::Mutex::new(None),
            detector: Mutex::new(detector),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn state(&self) -> CaptureState {
        *self.state.read()
    }

    /// The last published snapshot.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    /// Receives every snapshot the controller publishes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.published.subscribe()
    }

    /// Capture the document, or join the capture already in progress.
    pub async fn capture(&self, options: &CaptureOptions) -> Result<CaptureOutcome, EngineError> {
        let observed = self.generation.load(Ordering::Acquire);
        let joined = self.in_flight.load(Ordering::Acquire);

        let _flight = self.single_flight.lock().await;
        if joined {
            let shared = self
                .last_outcome
                .read()
                .as_ref()
                .filter(|(generation, _)| *generation > observed)
                .map(|(_, outcome)| outcome.clone());
            if let Some(outcome) = shared {
                debug!("Joined in-flight capture");
                return Ok(outcome);
            }
        }

        let _guard = FlightGuard::enter(&self.in_flight);
        let result = self.run_capture(options).await;
        self.set_state(CaptureState::Idle);

        let outcome = result?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.last_outcome.write() = Some((generation, outcome.clone()));
        Ok(outcome)
    }

    async fn run_capture(&self, options: &CaptureOptions) -> Result<CaptureOutcome, EngineError> {
        self.set_state(CaptureState::WaitingStable);
        let stable = self
            .waiter
            .wait_for_stable(
                self.host.as_ref(),
                self.settings.stability_timeout,
                self.settings.stability_quiet,
            )
            .await;

        self.set_state(CaptureState::Building);
        let mut highlighter = self.highlighter.lock().await;
        if let Some(mut previous) = highlighter.take() {
            if let Err(err) = previous.clear().await {
                debug!(error = %err, "Cannot clear previous overlay");
            }
        }

        let output = build_tree(self.host.as_ref(), options).await?;
        let page = self.host.page_info().await?;
        let mut meta = SnapshotMeta::new(page.url, page.title, output.viewport);
        if options.vision {
            meta.screenshot = self.host.capture_screenshot().await;
            if meta.screenshot.is_none() {
                debug!("Host channel returned no screenshot");
            }
        }
        let snapshot = Arc::new(construct(&output.tree, meta)?);

        if options.render_overlay && !output.highlights.is_empty() {
            let mut active = Highlighter::new(self.host.clone(), self.settings.overlay_throttle);
            match active.draw(output.highlights).await {
                Ok(boxes) => debug!(boxes, "Rendered overlay"),
                Err(err) => warn!(error = %err, "Cannot render overlay"),
            }
            *highlighter = Some(active);
        }
        drop(highlighter);

        self.set_state(CaptureState::Diffing);
        let diff = self.detector.lock().diff(&snapshot);
        let snapshot = if diff.changed {
            self.publish(snapshot.clone());
            snapshot
        } else {
            self.cached_equivalent(&snapshot, options).unwrap_or_else(|| {
                self.publish(snapshot.clone());
                snapshot
            })
        };

        info!(
            url = snapshot.url(),
            indexed = snapshot.selector_map().len(),
            changed = diff.changed,
            new_elements = diff.new_elements.len(),
            stable,
            "Captured snapshot"
        );

        Ok(CaptureOutcome {
            snapshot,
            changed: diff.changed,
            new_elements: diff.new_elements,
            stable,
            serialized: diff.serialized,
            metrics: output.metrics,
        })
    }

    /// The cached snapshot, when it can stand in for an unchanged capture.
    fn cached_equivalent(&self, fresh: &Snapshot, options: &CaptureOptions) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .as_ref()
            .filter(|cached| cached.url() == fresh.url())
            .filter(|cached| !options.vision || cached.screenshot().is_some())
            .cloned()
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        *self.current.write() = Some(snapshot.clone());
        self.published.send_replace(Some(snapshot));
    }

    fn set_state(&self, state: CaptureState) {
        *self.state.write() = state;
    }

    /// Remove overlays drawn by the last capture.
    pub async fn clear_highlights(&self) -> Result<(), HostError> {
        if let Some(mut active) = self.highlighter.lock().await.take() {
            active.clear().await?;
        }
        Ok(())
    }

    /// Move overlays after scroll or resize. Returns whether anything was redrawn.
    pub async fn reposition_overlays(&self) -> Result<bool, HostError> {
        match self.highlighter.lock().await.as_mut() {
            Some(active) => active.reposition().await,
            None => Ok(false),
        }
    }

    /// Drive captures from `events` until cancelled or the queue closes.
    ///
    /// The first capture runs immediately. Significant mutations, navigation
    /// and explicit requests schedule a debounced re-capture, never sooner
    /// than the minimum interval after the previous one. Returns the number of
    /// captures performed.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<CaptureEvent>,
        cancel: CancellationToken,
        options: CaptureOptions,
    ) -> usize {
        let mut scheduled = Some(Instant::now());
        let mut last_capture: Option<Instant> = None;
        let mut captures = 0;

        loop {
            let due = scheduled.map(|at| match last_capture {
                Some(last) => at.max(last + self.settings.min_capture_interval),
                None => at,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    scheduled = None;
                    last_capture = Some(Instant::now());
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.capture(&options) => match result {
                            Ok(outcome) => {
                                captures += 1;
                                debug!(changed = outcome.changed, "Loop capture finished");
                            }
                            Err(err) => warn!(error = %err, "Capture failed"),
                        },
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    match event {
                        CaptureEvent::Mutation(record) => {
                            if is_significant(&record) {
                                scheduled = Some(Instant::now() + self.settings.debounce);
                            }
                        }
                        CaptureEvent::Navigation => {
                            if let Err(err) = self.clear_highlights().await {
                                debug!(error = %err, "Cannot clear overlay after navigation");
                            }
                            scheduled = Some(Instant::now() + self.settings.debounce);
                        }
                        CaptureEvent::Recapture => {
                            scheduled = Some(Instant::now());
                        }
                        CaptureEvent::Scroll | CaptureEvent::Resize => {
                            if let Err(err) = self.reposition_overlays().await {
                                debug!(error = %err, "Cannot reposition overlay");
                            }
                        }
                        CaptureEvent::ClearHighlights => {
                            if let Err(err) = self.clear_highlights().await {
                                warn!(error = %err, "Cannot clear overlay");
                            }
                        }
                    }
                }
            }
        }

        self.waiter.cancel();
        debug!(captures, "Capture loop stopped");
        captures
    }
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
