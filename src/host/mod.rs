//! Host document trait - the core abstraction over a DOM
//!
//! Interceptors need only three capabilities from the page they protect:
//! enumerating file-accepting elements, capture-phase listeners with
//! propagation control, and dispatching synthetic "change"/"drop" events
//! that carry files. `HostDocument` names exactly those, plus structural
//! mutation notifications for the watcher.

use crate::error::Result;
use crate::types::{DomEvent, ElementId, EventKind, FileRecord, NodeRef, Phase};
use std::sync::Arc;

pub mod memory;

/// Event listener callback
///
/// Listeners run synchronously inside `dispatch`. Long work must be
/// handed off to a task; only propagation control is decided inline.
pub type Listener = Arc<dyn Fn(&mut EventContext<'_>) + Send + Sync>;

/// Mutation observer callback, invoked with one batch of records
pub type MutationCallback = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

/// Box a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&mut EventContext<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure as a [`MutationCallback`]
pub fn observer<F>(f: F) -> MutationCallback
where
    F: Fn(&[MutationRecord]) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Handle for a registered mutation observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Where a listener sits relative to the event target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    /// An ancestor, on the way down
    Capturing,
    /// The target itself
    AtTarget,
    /// An ancestor, on the way up
    Bubbling,
}

/// Per-dispatch state handed to each listener
pub struct EventContext<'a> {
    event: &'a DomEvent,
    target: NodeRef,
    current: NodeRef,
    phase: DispatchPhase,
    propagation_stopped: bool,
    immediate_stopped: bool,
    default_prevented: bool,
}

impl<'a> EventContext<'a> {
    /// Start a dispatch of `event` at `target`
    ///
    /// Host implementations create one context per dispatch and move it
    /// along the propagation path with [`EventContext::enter`].
    pub fn new(event: &'a DomEvent, target: NodeRef) -> Self {
        Self {
            event,
            target,
            current: target,
            phase: DispatchPhase::AtTarget,
            propagation_stopped: false,
            immediate_stopped: false,
            default_prevented: false,
        }
    }

    /// Move the context to the next node on the propagation path
    pub fn enter(&mut self, node: NodeRef, phase: DispatchPhase) {
        self.current = node;
        self.phase = phase;
    }

    /// The event being dispatched
    pub fn event(&self) -> &'a DomEvent {
        self.event
    }

    /// The node the event was dispatched at
    pub fn target(&self) -> NodeRef {
        self.target
    }

    /// The node whose listeners are running
    pub fn current_target(&self) -> NodeRef {
        self.current
    }

    /// Current propagation phase
    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    /// Stop after the listeners of the current node
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Stop right now, skipping remaining listeners on this node too
    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_stopped = true;
    }

    /// Cancel the default action; no effect on non-cancelable events
    pub fn prevent_default(&mut self) {
        if self.event.cancelable {
            self.default_prevented = true;
        }
    }

    /// Whether propagation to further nodes was stopped
    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Whether propagation to further listeners was stopped
    pub fn is_immediate_stopped(&self) -> bool {
        self.immediate_stopped
    }

    /// Whether the default action was cancelled
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Result of a dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Whether a listener cancelled the default action
    pub default_prevented: bool,
    /// Number of listeners that ran
    pub listeners_invoked: usize,
}

/// One structural change to the document tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent whose child list changed
    pub target: Option<ElementId>,
    /// Roots of subtrees inserted into the document
    pub added: Vec<ElementId>,
    /// Roots of subtrees removed from the document
    pub removed: Vec<ElementId>,
}

/// Capabilities a host document must provide
pub trait HostDocument: Send + Sync {
    /// Host name for logs (e.g., "memory")
    fn name(&self) -> &str;

    /// Connected file-accepting elements, in document order
    fn file_inputs(&self) -> Vec<ElementId>;

    /// Whether the element accepts files
    fn is_file_input(&self, element: ElementId) -> bool;

    /// All descendants of an element in pre-order, excluding itself
    fn descendants(&self, element: ElementId) -> Vec<ElementId>;

    /// Register a listener for `kind` on `node` in the given phase
    fn add_listener(
        &self,
        node: NodeRef,
        kind: EventKind,
        phase: Phase,
        listener: Listener,
    ) -> Result<ListenerId>;

    /// Unregister a listener; returns whether it was registered
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Current file list of a file input
    fn files(&self, element: ElementId) -> Result<Vec<FileRecord>>;

    /// Replace the file list of a file input
    fn set_files(&self, element: ElementId, files: Vec<FileRecord>) -> Result<()>;

    /// Dispatch an event synchronously through capture, target and bubble
    fn dispatch(&self, node: NodeRef, event: DomEvent) -> Result<DispatchOutcome>;

    /// Register a structural mutation observer for the whole document
    fn observe(&self, callback: MutationCallback) -> ObserverId;

    /// Unregister a mutation observer; returns whether it was registered
    fn unobserve(&self, id: ObserverId) -> bool;
}
