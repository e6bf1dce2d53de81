//! Re-entrancy guard
//!
//! Interceptors dispatch their replacement events on the very nodes they
//! watch. The guard lets them recognise those events and let them through
//! instead of intercepting again.
//!
//! State lives in side tables keyed by event and element identity, never
//! on the element itself, so page scripts cannot observe or forge it.

use crate::types::{DomEvent, ElementId, EventKind};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct ElementState {
    attached: bool,
    /// Synthetic event id expected next, per event kind
    pending: HashMap<EventKind, String>,
}

#[derive(Debug, Default)]
struct GuardState {
    synthetic: HashSet<String>,
    elements: HashMap<ElementId, ElementState>,
}

/// Side-table re-entrancy guard shared by all interceptors of a document
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    state: Mutex<GuardState>,
}

impl ReentrancyGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        // Flags stay meaningful even if a listener panicked mid-update
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark an event as generated by this system
    pub fn mark_synthetic(&self, event: &DomEvent) {
        self.lock().synthetic.insert(event.id.clone());
    }

    /// Whether an event was marked synthetic
    pub fn is_synthetic(&self, event: &DomEvent) -> bool {
        self.lock().synthetic.contains(&event.id)
    }

    /// Drop the synthetic mark of an event, returning whether it was set
    pub fn clear_synthetic(&self, event: &DomEvent) -> bool {
        self.lock().synthetic.remove(&event.id)
    }

    /// Record the attached flag for an element
    ///
    /// Returns `true` only on the first call for that element.
    pub fn try_attach(&self, element: ElementId) -> bool {
        let mut state = self.lock();
        let entry = state.elements.entry(element).or_default();
        if entry.attached {
            false
        } else {
            entry.attached = true;
            true
        }
    }

    /// Whether an interceptor is attached to the element
    pub fn is_attached(&self, element: ElementId) -> bool {
        self.lock()
            .elements
            .get(&element)
            .map(|s| s.attached)
            .unwrap_or(false)
    }

    /// Elements with an attached interceptor, in id order
    pub fn attached(&self) -> Vec<ElementId> {
        let state = self.lock();
        let mut ids: Vec<ElementId> = state
            .elements
            .iter()
            .filter(|(_, s)| s.attached)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Announce that `event` is about to be dispatched at `element`
    ///
    /// Must be called immediately before dispatch; the receiving listener
    /// consumes it.
    pub fn mark_pending(&self, element: ElementId, event: &DomEvent) {
        self.lock()
            .elements
            .entry(element)
            .or_default()
            .pending
            .insert(event.kind, event.id.clone());
    }

    /// Consume the pending mark for `element` if `event` is the one announced
    ///
    /// Any other event of the same kind is treated as genuine and leaves
    /// the mark untouched.
    pub fn consume_pending(&self, element: ElementId, event: &DomEvent) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.elements.get_mut(&element) else {
            return false;
        };
        match entry.pending.get(&event.kind) {
            Some(expected) if *expected == event.id => {
                entry.pending.remove(&event.kind);
                true
            }
            _ => false,
        }
    }

    /// Whether any pending mark exists for `element` and `kind`
    pub fn has_pending(&self, element: ElementId, kind: EventKind) -> bool {
        self.lock()
            .elements
            .get(&element)
            .map(|s| s.pending.contains_key(&kind))
            .unwrap_or(false)
    }

    /// Drop all state for an element that left the document
    pub fn forget(&self, element: ElementId) {
        self.lock().elements.remove(&element);
    }
}
