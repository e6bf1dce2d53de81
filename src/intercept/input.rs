//! Input interceptor - per-element "change" substitution
//!
//! A capture listener on each `<input type="file">` stops the genuine
//! "change" before page listeners run, then a lane job assigns the
//! sanitized files back to the element and fires a fresh bubbling
//! "change" that the listener recognises and lets through.

use super::{replacement_files, InterceptorContext};
use crate::error::{MetaSafeError, Result};
use crate::host::{listener, EventContext, ListenerId};
use crate::lane::SerialLane;
use crate::types::{DomEvent, ElementId, EventKind, FileRecord, NodeRef, Phase};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

struct Attachment {
    listener: ListenerId,
    lane: SerialLane,
}

/// Intercepts "change" events on file inputs
pub struct InputInterceptor {
    ctx: InterceptorContext,
    attachments: Mutex<HashMap<ElementId, Attachment>>,
    me: Weak<InputInterceptor>,
}

impl InputInterceptor {
    /// Create an interceptor for the document in `ctx`
    pub fn new(ctx: InterceptorContext) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            ctx,
            attachments: Mutex::new(HashMap::new()),
            me: me.clone(),
        })
    }

    fn attachments(&self) -> MutexGuard<'_, HashMap<ElementId, Attachment>> {
        self.attachments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach to a file input
    ///
    /// Idempotent: returns `Ok(false)` if the element is already attached.
    pub fn attach(&self, element: ElementId) -> Result<bool> {
        if !self.ctx.document.is_file_input(element) {
            return Err(MetaSafeError::NotFileInput(element.to_string()));
        }
        // The listener keeps the interceptor alive until it is detached
        let this = self.me.upgrade().ok_or_else(|| {
            MetaSafeError::Runtime("Input interceptor is shutting down".to_string())
        })?;
        if !self.ctx.guard.try_attach(element) {
            return Ok(false);
        }
        let on_change = listener(move |event_ctx| this.on_change(element, event_ctx));

        let listener_id = match self.ctx.document.add_listener(
            NodeRef::Element(element),
            EventKind::Change,
            Phase::Capture,
            on_change,
        ) {
            Ok(id) => id,
            Err(e) => {
                self.ctx.guard.forget(element);
                return Err(e);
            }
        };

        let lane = SerialLane::spawn(
            format!("input-{}", element),
            &self.ctx.runtime,
            self.ctx.in_flight.clone(),
        );
        self.attachments().insert(
            element,
            Attachment {
                listener: listener_id,
                lane,
            },
        );

        tracing::debug!(
            element = %element,
            host = self.ctx.document.name(),
            "Input interceptor attached"
        );
        Ok(true)
    }

    /// Remove the listener from an element and drop its guard state
    pub fn detach(&self, element: ElementId) -> bool {
        let Some(attachment) = self.attachments().remove(&element) else {
            return false;
        };
        self.ctx.document.remove_listener(attachment.listener);
        self.ctx.guard.forget(element);
        tracing::debug!(element = %element, "Input interceptor detached");
        true
    }

    /// Elements currently attached
    pub fn attached(&self) -> Vec<ElementId> {
        let mut ids: Vec<ElementId> = self.attachments().keys().copied().collect();
        ids.sort();
        ids
    }

    fn on_change(&self, element: ElementId, event_ctx: &mut EventContext<'_>) {
        let event = event_ctx.event();

        // Our own replacement: consume the mark and let the page see it
        if self.ctx.guard.consume_pending(element, event) {
            tracing::trace!(element = %element, event_id = %event.id, "Passing synthetic change");
            return;
        }

        event_ctx.stop_immediate_propagation();

        let files = match self.ctx.document.files(element) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(element = %element, error = %e, "Cannot read file list");
                return;
            }
        };
        if files.is_empty() {
            return;
        }

        // Raw files must not stay readable while sanitization runs
        if let Err(e) = self.ctx.document.set_files(element, Vec::new()) {
            tracing::warn!(element = %element, error = %e, "Cannot clear file list");
        }

        tracing::debug!(element = %element, files = files.len(), "Intercepted file selection");

        let job = substitute(self.ctx.clone(), element, files);
        let submitted = match self.attachments().get(&element) {
            Some(attachment) => attachment.lane.submit(job),
            None => Err(MetaSafeError::Runtime(format!(
                "No lane for element {}",
                element
            ))),
        };
        if let Err(e) = submitted {
            tracing::warn!(element = %element, error = %e, "Dropping file selection");
        }
    }
}

/// Sanitize, assign back, and re-dispatch "change" on the element
async fn substitute(ctx: InterceptorContext, element: ElementId, files: Vec<FileRecord>) {
    let outcomes = ctx.sanitizer.sanitize_batch(&files).await;
    let blocked = outcomes.iter().filter(|o| o.is_blocked()).count();
    let replacement = replacement_files(outcomes);

    if let Err(e) = ctx.document.set_files(element, replacement) {
        tracing::warn!(element = %element, error = %e, "Cannot assign sanitized files");
        return;
    }

    let event = DomEvent::change();
    ctx.guard.mark_pending(element, &event);
    let result = ctx
        .document
        .dispatch(NodeRef::Element(element), event.clone());
    // Listener may have been detached mid-flight; never leave the mark behind
    ctx.guard.consume_pending(element, &event);

    match result {
        Ok(outcome) => tracing::debug!(
            element = %element,
            files = files.len(),
            blocked,
            listeners = outcome.listeners_invoked,
            "Dispatched sanitized change"
        ),
        Err(e) => {
            tracing::warn!(element = %element, error = %e, "Failed to dispatch sanitized change")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryDocument;
    use crate::host::HostDocument;
    use crate::intercept::tests::{context, jpeg, page_listener, recv};
    use std::time::Duration;

    #[tokio::test]
    async fn test_attach_requires_file_input() {
        let doc = Arc::new(MemoryDocument::new());
        let interceptor = InputInterceptor::new(context(doc.clone()));
        let div = doc.create_element("div");
        assert!(matches!(
            interceptor.attach(div),
            Err(MetaSafeError::NotFileInput(_))
        ));
        assert!(interceptor.attached().is_empty());
    }

    #[tokio::test]
    async fn test_attach_idempotent() {
        let doc = Arc::new(MemoryDocument::new());
        let ctx = context(doc.clone());
        let interceptor = InputInterceptor::new(ctx.clone());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();

        assert!(interceptor.attach(input).unwrap());
        assert!(!interceptor.attach(input).unwrap());
        assert_eq!(doc.listener_count(NodeRef::Element(input), EventKind::Change), 1);
        assert!(ctx.guard.is_attached(input));
        assert_eq!(interceptor.attached(), vec![input]);
    }

    #[tokio::test]
    async fn test_page_sees_only_sanitized_files() {
        let doc = Arc::new(MemoryDocument::new());
        let ctx = context(doc.clone());
        let interceptor = InputInterceptor::new(ctx.clone());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();
        interceptor.attach(input).unwrap();
        let mut seen = page_listener(&doc, input);

        doc.select_files(
            input,
            vec![jpeg("a.jpg"), FileRecord::new("b.pdf", "application/pdf", 1, vec![1u8])],
        )
        .unwrap();

        let files = recv(&mut seen).await;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a.jpg");
        assert_eq!(files[1].name, "sanitized.txt");

        ctx.in_flight.idle().await;
        assert!(seen.try_recv().is_err());
        assert_eq!(ctx.sanitizer.stats().batches, 1);
        assert!(!ctx.guard.has_pending(input, EventKind::Change));
    }

    #[tokio::test]
    async fn test_raw_files_cleared_while_pending() {
        let doc = Arc::new(MemoryDocument::new());
        let ctx = context(doc.clone());
        let interceptor = InputInterceptor::new(ctx.clone());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();
        interceptor.attach(input).unwrap();

        // No await between dispatch and the read: the lane job has not run yet
        doc.select_files(input, vec![jpeg("a.jpg")]).unwrap();
        assert!(doc.files(input).unwrap().is_empty());

        ctx.in_flight.idle().await;
        assert_eq!(doc.files(input).unwrap()[0].name, "a.jpg");
    }

    #[tokio::test]
    async fn test_empty_selection_not_forwarded() {
        let doc = Arc::new(MemoryDocument::new());
        let ctx = context(doc.clone());
        let interceptor = InputInterceptor::new(ctx.clone());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();
        interceptor.attach(input).unwrap();
        let mut seen = page_listener(&doc, input);

        doc.select_files(input, Vec::new()).unwrap();
        ctx.in_flight.idle().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(seen.try_recv().is_err());
        assert_eq!(ctx.sanitizer.stats().batches, 0);
    }

    #[tokio::test]
    async fn test_detach_restores_plain_delivery() {
        let doc = Arc::new(MemoryDocument::new());
        let ctx = context(doc.clone());
        let interceptor = InputInterceptor::new(ctx.clone());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();
        interceptor.attach(input).unwrap();

        assert!(interceptor.detach(input));
        assert!(!interceptor.detach(input));
        assert!(!ctx.guard.is_attached(input));
        assert_eq!(doc.listener_count(NodeRef::Element(input), EventKind::Change), 0);

        let mut seen = page_listener(&doc, input);
        doc.select_files(input, vec![jpeg("raw.jpg")]).unwrap();
        let files = recv(&mut seen).await;
        assert_eq!(files[0].name, "raw.jpg");
        assert_eq!(ctx.sanitizer.stats().batches, 0);
    }

    #[tokio::test]
    async fn test_rapid_selections_substituted_in_order() {
        let doc = Arc::new(MemoryDocument::new());
        let ctx = context(doc.clone());
        let interceptor = InputInterceptor::new(ctx.clone());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();
        interceptor.attach(input).unwrap();
        let mut seen = page_listener(&doc, input);

        doc.select_files(input, vec![jpeg("first.jpg")]).unwrap();
        doc.select_files(input, vec![jpeg("second.jpg")]).unwrap();

        assert_eq!(recv(&mut seen).await[0].name, "first.jpg");
        assert_eq!(recv(&mut seen).await[0].name, "second.jpg");
        ctx.in_flight.idle().await;
        assert_eq!(ctx.sanitizer.stats().batches, 2);
    }
}
