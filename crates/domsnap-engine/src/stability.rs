//! Waits for the document to stop changing before a capture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::EngineError;
use crate::host::{MutationKind, MutationRecord, MutationSource};

/// Subtrees that never affect what is rendered.
const NON_RENDERING_TAGS: &[&str] = &["script", "style", "noscript", "template", "meta", "link"];

/// Attribute edits that only restyle.
const COSMETIC_ATTRIBUTES: &[&str] = &["style", "class"];

/// Whether a mutation should reset the quiet period.
pub fn is_significant(record: &MutationRecord) -> bool {
    if record.inside_overlay {
        return false;
    }
    if record.kind == MutationKind::Attributes
        && record
            .attribute_name
            .as_deref()
            .is_some_and(|name| COSMETIC_ATTRIBUTES.contains(&name))
    {
        return false;
    }
    let non_rendering = |tag: &str| NON_RENDERING_TAGS.contains(&tag);
    !(non_rendering(&record.target_tag) || record.ancestor_tags.iter().any(|tag| non_rendering(tag)))
}

/// Resolves waits once the document has been quiet long enough.
///
/// Only one wait is pending at a time: starting a new one cancels the
/// previous wait, which then resolves `false`.
#[derive(Default)]
pub struct StabilityWaiter {
    pending: Mutex<Option<(u64, CancellationToken)>>,
    next_wait: AtomicU64,
}

impl StabilityWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pending wait, if any.
    pub fn cancel(&self) {
        if let Some((_, token)) = self.pending.lock().take() {
            token.cancel();
        }
    }

    /// `true` once `quiet` passes without a significant mutation, `false`
    /// when `timeout` passes first or the wait is superseded.
    pub async fn wait_for_stable<S: MutationSource + ?Sized>(
        &self,
        source: &S,
        timeout: Duration,
        quiet: Duration,
    ) -> bool {
        let id = self.next_wait.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        if let Some((previous, superseded)) = self.pending.lock().replace((id, token.clone())) {
            trace!(wait = previous, "Cancelling superseded stability wait");
            superseded.cancel();
        }

        let stable = Self::watch(source, &token, timeout, quiet).await;

        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|(current, _)| *current == id) {
            pending.take();
        }
        stable
    }

    async fn watch<S: MutationSource + ?Sized>(
        source: &S,
        token: &CancellationToken,
        timeout: Duration,
        quiet: Duration,
    ) -> bool {
        let started = Instant::now();
        let mut subscription = source.observe_mutations();
        let deadline = sleep(timeout);
        let quiet_timer = sleep(quiet);
        tokio::pin!(deadline, quiet_timer);
        let mut open = true;
        let mut resets = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Stability wait cancelled");
                    return false;
                }
                _ = &mut quiet_timer => {
                    debug!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        resets,
                        "Document is stable"
                    );
                    return true;
                }
                _ = &mut deadline => {
                    warn!(
                        error = %EngineError::UnstablePageTimeout(timeout.as_millis() as u64),
                        resets,
                        "Capturing without a quiet period"
                    );
                    return false;
                }
                record = subscription.recv(), if open => match record {
                    Some(record) if is_significant(&record) => {
                        resets += 1;
                        quiet_timer.as_mut().reset(Instant::now() + quiet);
                    }
                    Some(_) => {}
                    None => open = false,
                },
            }
        }
    }
}

#[cfg(test)]
#[path = "stability_tests.rs"]
mod tests;
