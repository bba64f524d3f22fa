//! Executes click, fill and select actions against indexed elements.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dom::Snapshot;
use crate::error::{EngineError, HostError};
use crate::host::{DocumentHost, ElementActions, NodeHandle, SelectOption};
use crate::locator::Locator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Fill,
    Select,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::Select => "select",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action on the element with highlight index `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "id")]
    pub index: u32,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Action {
    pub fn click(index: u32) -> Self {
        Self {
            index,
            kind: ActionKind::Click,
            value: None,
        }
    }

    pub fn fill(index: u32, value: impl Into<String>) -> Self {
        Self {
            index,
            kind: ActionKind::Fill,
            value: Some(value.into()),
        }
    }

    pub fn select(index: u32, value: impl Into<String>) -> Self {
        Self {
            index,
            kind: ActionKind::Select,
            value: Some(value.into()),
        }
    }
}

/// A list of actions with the reasoning that produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionSequenceResult {
    pub success: bool,
    pub executed_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSettings {
    /// Pause after a click so the page can react.
    pub settle_delay: Duration,
    /// Pause between the actions of a sequence.
    pub action_delay: Duration,
    pub include_dynamic_attributes: bool,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            action_delay: Duration::from_millis(100),
            include_dynamic_attributes: true,
        }
    }
}

struct SequenceGuard<'a>(&'a AtomicBool);

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs actions against the latest published snapshot.
pub struct ActionExecutor<H: ?Sized> {
    host: Arc<H>,
    snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    settings: ActionSettings,
    locator: Locator,
    executing: AtomicBool,
    cancel: CancellationToken,
}

impl<H: DocumentHost + ElementActions + ?Sized> ActionExecutor<H> {
    pub fn new(
        host: Arc<H>,
        snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
        settings: ActionSettings,
    ) -> Self {
        let locator = Locator::new(settings.include_dynamic_attributes);
        Self {
            host,
            snapshots,
            settings,
            locator,
            executing: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop sequences when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>, EngineError> {
        self.snapshots
            .borrow()
            .clone()
            .ok_or_else(|| EngineError::LocatorMiss("no snapshot has been captured".to_string()))
    }

    /// Run one action. Failures are logged and reported as `false`.
    pub async fn execute_action(&self, action: &Action) -> bool {
        match self.try_execute(action).await {
            Ok(()) => {
                debug!(index = action.index, kind = %action.kind, "Action executed");
                true
            }
            Err(err) => {
                warn!(index = action.index, kind = %action.kind, error = %err, "Action failed");
                false
            }
        }
    }

    /// Run one action, reporting why it failed.
    pub async fn try_execute(&self, action: &Action) -> Result<(), EngineError> {
        let element = self.resolve(action.index).await?;
        self.ensure_actionable(action.index, element).await?;
        if let Err(err) = self.host.scroll_into_view(element).await {
            debug!(error = %err, "Scroll into view failed");
        }

        match action.kind {
            ActionKind::Click => {
                self.click(element).await?;
                tokio::time::sleep(self.settings.settle_delay).await;
            }
            ActionKind::Fill => {
                let value = required_value(action)?;
                let tag = self.host.node_info(element).await?.tag_name;
                let fillable = matches!(tag.as_str(), "input" | "textarea")
                    || self.host.is_content_editable(element).await?;
                if !fillable {
                    return Err(EngineError::ActionTypeMismatch {
                        action: action.kind.to_string(),
                        tag,
                    });
                }
                self.host.set_value(element, value).await?;
            }
            ActionKind::Select => {
                let value = required_value(action)?;
                let tag = self.host.node_info(element).await?.tag_name;
                if tag != "select" {
                    return Err(EngineError::ActionTypeMismatch {
                        action: action.kind.to_string(),
                        tag,
                    });
                }
                let options = self.host.select_options(element).await?;
                let option = match_option(&options, value).ok_or_else(|| {
                    EngineError::UnsupportedActionValue {
                        action: action.kind.to_string(),
                        message: format!("no option matches '{}'", value),
                    }
                })?;
                let changed = self.host.choose_option(element, option.index).await?;
                debug!(option = option.index, changed, "Selected option");
            }
        }
        Ok(())
    }

    /// Run actions in order, pausing between them. A call made while another
    /// sequence is running returns immediately with nothing executed.
    pub async fn execute_actions(&self, actions: &[Action]) -> ActionSequenceResult {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Actions already executing, skipping");
            return ActionSequenceResult::default();
        }
        let _guard = SequenceGuard(&self.executing);

        let total_count = actions.len();
        let mut executed_count = 0;
        for action in actions {
            if self.cancel.is_cancelled() {
                debug!("Action sequence cancelled");
                break;
            }
            if self.execute_action(action).await {
                executed_count += 1;
            }
            if !self.settings.action_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.action_delay) => {}
                }
            }
        }

        info!(executed = executed_count, total = total_count, "Completed action sequence");
        ActionSequenceResult {
            success: executed_count == total_count,
            executed_count,
            total_count,
            reasoning: None,
        }
    }

    pub async fn execute_plan(&self, plan: &ActionPlan) -> ActionSequenceResult {
        if let Some(reasoning) = &plan.reasoning {
            info!(reasoning = %reasoning, "Executing action plan");
        }
        let mut result = self.execute_actions(&plan.actions).await;
        result.reasoning = plan.reasoning.clone();
        result
    }

    /// Whether `action` fits the element it targets in the current snapshot.
    pub fn validate_action(&self, action: &Action) -> bool {
        let Ok(snapshot) = self.snapshot() else {
            return false;
        };
        let Some((_, element)) = snapshot.element_by_highlight(action.index) else {
            return false;
        };
        match action.kind {
            ActionKind::Click => true,
            ActionKind::Fill => {
                action.value.is_some()
                    && (matches!(element.tag_name.as_str(), "input" | "textarea")
                        || element
                            .attribute("contenteditable")
                            .is_some_and(|v| v != "false"))
            }
            ActionKind::Select => action.value.is_some() && element.tag_name == "select",
        }
    }

    /// Options of the select element at `index`.
    pub async fn dropdown_options(&self, index: u32) -> Result<Vec<SelectOption>, EngineError> {
        let element = self.resolve(index).await?;
        let tag = self.host.node_info(element).await?.tag_name;
        if tag != "select" {
            return Err(EngineError::ActionTypeMismatch {
                action: "dropdown_options".to_string(),
                tag,
            });
        }
        Ok(self.host.select_options(element).await?)
    }

    async fn resolve(&self, index: u32) -> Result<NodeHandle, EngineError> {
        let snapshot = self.snapshot()?;
        let node = snapshot
            .selector_map()
            .get(&index)
            .copied()
            .ok_or_else(|| EngineError::LocatorMiss(format!("index {}", index)))?;
        self.locator.try_locate(self.host.as_ref(), &snapshot, node).await
    }

    /// The live element must be rendered with a box and accept input.
    async fn ensure_actionable(&self, index: u32, element: NodeHandle) -> Result<(), EngineError> {
        let not_actionable = |reason: &str| EngineError::NotActionable {
            index,
            reason: reason.to_string(),
        };

        let style = self.host.computed_style(element).await?;
        if style.display == "none" || style.visibility == "hidden" {
            return Err(not_actionable("hidden"));
        }
        if !self.host.layout(element).await?.has_offset_size() {
            return Err(not_actionable("no layout box"));
        }
        let attributes = self.host.attributes(element).await?;
        if attributes.contains_key("disabled") {
            return Err(not_actionable("disabled"));
        }
        if attributes.contains_key("inert") {
            return Err(not_actionable("inert"));
        }

        let mut ancestor = self.host.parent_element(element).await?;
        while let Some(node) = ancestor {
            if self.host.attributes(node).await?.contains_key("inert") {
                return Err(not_actionable("inert"));
            }
            ancestor = self.host.parent_element(node).await?;
        }
        Ok(())
    }

    /// Native click, then a synthetic event, then focus and click again.
    async fn click(&self, element: NodeHandle) -> Result<(), HostError> {
        match self.host.click(element).await {
            Ok(()) => return Ok(()),
            Err(err) => debug!(error = %err, "Native click failed"),
        }
        match self.host.dispatch_click(element).await {
            Ok(()) => return Ok(()),
            Err(err) => debug!(error = %err, "Synthetic click failed"),
        }
        self.host.focus(element).await?;
        self.host.click(element).await
    }
}

fn required_value(action: &Action) -> Result<&str, EngineError> {
    action
        .value
        .as_deref()
        .ok_or_else(|| EngineError::UnsupportedActionValue {
            action: action.kind.to_string(),
            message: "a value is required".to_string(),
        })
}

/// Option whose trimmed text equals the value, else the first one whose value does.
fn match_option<'a>(options: &'a [SelectOption], value: &str) -> Option<&'a SelectOption> {
    let wanted = value.trim();
    options
        .iter()
        .find(|option| option.text.trim() == wanted)
        .or_else(|| options.iter().find(|option| option.value == value))
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
