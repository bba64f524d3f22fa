//! Interactive-element indexing and DOM snapshots.
//!
//! The engine walks a live document through a [`host`] adapter, decides which
//! elements a user can interact with, numbers the visible ones and freezes the
//! result into an immutable [`Snapshot`]. Snapshots serialize into a compact
//! text form, detect changes between captures, and map highlight indices back
//! to live elements for [`ActionExecutor`] to click, fill or select.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐  events   ┌──────────────────┐  host traits  ┌─────────────────┐
//! │ CaptureController  │ ◄──────── │ StabilityWaiter  │ ◄──────────── │ CdpDocument /   │
//! │ (run loop, state)  │ ────────► │ build_tree       │ ────────────► │ MemoryDocument  │
//! └────────────────────┘           └──────────────────┘               └─────────────────┘
//!          │ watch<Snapshot>
//!          ▼
//! ┌────────────────────┐  Locator
//! │ ActionExecutor     │ ─────────► live element
//! └────────────────────┘
//! ```
//!
//! The [`cdp`] module talks to Chromium over its remote debugging port;
//! [`MemoryDocument`] is a scriptable in-process document for tests.

#![recursion_limit = "256"]

pub mod action;
pub mod builder;
pub mod capture;
pub mod cdp;
pub mod dom;
pub mod error;
pub mod highlight;
pub mod host;
pub mod locator;
pub mod stability;

pub use action::{
    Action, ActionExecutor, ActionKind, ActionPlan, ActionSequenceResult, ActionSettings,
};
pub use builder::{build_tree, BuildMetrics, BuildOutput, CaptureOptions};
pub use capture::{
    forward_mutations, CaptureController, CaptureEvent, CaptureOutcome, CaptureSettings,
    CaptureState,
};
pub use cdp::{CdpClient, CdpError, PageSession};
pub use dom::{
    construct, hash_element, serialize, BoundingBox, ChangeDetector, ElementHash, ElementNode,
    NodeIndex, SelectorMap, Snapshot, SnapshotMeta, ViewportInfo,
};
pub use error::{EngineError, HostError};
pub use highlight::Highlighter;
pub use host::{CdpDocument, Host, MemoryDocument, NodeHandle};
pub use locator::Locator;
pub use stability::StabilityWaiter;
