//! DOM watcher - keeps every file input under interception
//!
//! Attaches the input interceptor to file inputs present at startup and
//! to every one inserted later, whether inserted directly or inside a
//! larger subtree. Attachment is idempotent, so nodes reported more than
//! once are harmless.

use crate::host::{observer, HostDocument, MutationRecord, ObserverId};
use crate::intercept::InputInterceptor;
use crate::types::ElementId;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Observes document mutations and attaches the input interceptor
pub struct DomWatcher {
    document: Arc<dyn HostDocument>,
    inputs: Arc<InputInterceptor>,
    observer: Mutex<Option<ObserverId>>,
    me: Weak<DomWatcher>,
}

impl DomWatcher {
    /// Create a watcher feeding `inputs`
    pub fn new(document: Arc<dyn HostDocument>, inputs: Arc<InputInterceptor>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            document,
            inputs,
            observer: Mutex::new(None),
            me: me.clone(),
        })
    }

    fn observer(&self) -> MutexGuard<'_, Option<ObserverId>> {
        self.observer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach to every file input currently in the document
    ///
    /// Returns the number of newly attached elements.
    pub fn attach_existing(&self) -> usize {
        let existing = self.document.file_inputs();
        let attached = existing.iter().filter(|id| self.attach(**id)).count();
        tracing::debug!(found = existing.len(), attached, "Attached to existing file inputs");
        attached
    }

    /// Start observing structural mutations
    ///
    /// Returns `false` if the watcher was already started. The document
    /// keeps the watcher alive until [`DomWatcher::stop`] is called.
    pub fn start(&self) -> bool {
        let mut registered = self.observer();
        if registered.is_some() {
            return false;
        }
        let Some(this) = self.me.upgrade() else {
            return false;
        };
        let id = self.document.observe(observer(move |records| {
            this.handle(records);
        }));
        *registered = Some(id);
        true
    }

    /// Stop observing; inserted inputs are no longer attached
    ///
    /// Returns `false` if the watcher was not running.
    pub fn stop(&self) -> bool {
        let Some(id) = self.observer().take() else {
            return false;
        };
        self.document.unobserve(id);
        tracing::debug!(host = self.document.name(), "DOM watcher stopped");
        true
    }

    /// Whether mutation observation is active
    pub fn is_started(&self) -> bool {
        self.observer().is_some()
    }

    /// Process one batch of mutation records
    ///
    /// Returns the number of newly attached elements.
    pub fn handle(&self, records: &[MutationRecord]) -> usize {
        if !self.is_started() {
            return 0;
        }
        let mut attached = 0;
        for record in records {
            for root in &record.added {
                attached += self.scan(*root);
            }
        }
        if attached > 0 {
            tracing::debug!(records = records.len(), attached, "Attached to inserted file inputs");
        }
        attached
    }

    /// Attach to `root` and any file input beneath it
    fn scan(&self, root: ElementId) -> usize {
        let mut attached = 0;
        if self.document.is_file_input(root) && self.attach(root) {
            attached += 1;
        }
        for element in self.document.descendants(root) {
            if self.document.is_file_input(element) && self.attach(element) {
                attached += 1;
            }
        }
        attached
    }

    fn attach(&self, element: ElementId) -> bool {
        match self.inputs.attach(element) {
            Ok(newly) => newly,
            Err(e) => {
                tracing::warn!(
                    element = %element,
                    error = %e,
                    "Failed to attach input interceptor"
                );
                false
            }
        }
    }
}
