//! Engine and host error types.

use thiserror::Error;

use crate::cdp::CdpError;

/// Errors raised by a document host.
#[derive(Debug, Error)]
pub enum HostError {
    /// The node no longer exists in the live document.
    #[error("Node is gone: {0}")]
    NodeGone(u64),

    /// The frame's document belongs to another origin.
    #[error("Cross-origin frame: {0}")]
    CrossOrigin(String),

    /// The host cannot perform this operation.
    #[error("Unsupported host operation: {0}")]
    Unsupported(String),

    /// The host answered with something unexpected.
    #[error("Host protocol error: {0}")]
    Protocol(String),

    /// A script run inside the page failed.
    #[error("Script error: {0}")]
    Script(String),

    #[error(transparent)]
    Cdp(#[from] CdpError),
}

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node from a snapshot could not be re-found in the live document.
    #[error("Element not found: {0}")]
    LocatorMiss(String),

    /// An iframe hop could not be crossed.
    #[error("Cannot access frame document: {0}")]
    CrossOriginFrame(String),

    /// The document did not settle before the timeout elapsed.
    #[error("Page did not stabilize within {0} ms")]
    UnstablePageTimeout(u64),

    /// The action kind cannot be applied to this element.
    #[error("Cannot {action} a <{tag}> element")]
    ActionTypeMismatch { action: String, tag: String },

    /// The element is hidden, collapsed, disabled or inert.
    #[error("Element {index} is not actionable: {reason}")]
    NotActionable { index: u32, reason: String },

    /// The action value is missing or no option matches it.
    #[error("Unsupported value for {action}: {message}")]
    UnsupportedActionValue { action: String, message: String },

    /// The tree walk produced nothing.
    #[error("Failed to build DOM tree: {0}")]
    BuildFailed(String),

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

impl EngineError {
    /// Whether callers are expected to recover from this error locally.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::BuildFailed(_))
    }
}
