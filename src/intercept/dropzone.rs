//! Drop interceptor - document-wide drag-and-drop substitution
//!
//! Capture listeners on the window cancel every "dragover" (so the host
//! never opens or navigates to a dragged file) and steal every genuine
//! "drop" that carries files. The replacement drop is dispatched at the
//! original target with a transfer holding only sanitized files.

use super::{replacement_files, InterceptorContext};
use crate::error::{MetaSafeError, Result};
use crate::host::{listener, EventContext, ListenerId};
use crate::lane::SerialLane;
use crate::types::{DataTransfer, DomEvent, EventKind, FileRecord, NodeRef, Phase};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Intercepts "drop" and "dragover" on the whole document
pub struct DropInterceptor {
    ctx: InterceptorContext,
    lane: SerialLane,
    installed: AtomicBool,
    listeners: Mutex<Vec<ListenerId>>,
    me: Weak<DropInterceptor>,
}

impl DropInterceptor {
    /// Create an interceptor for the document in `ctx`
    pub fn new(ctx: InterceptorContext) -> Arc<Self> {
        let lane = SerialLane::spawn("drop", &ctx.runtime, ctx.in_flight.clone());
        Arc::new_cyclic(|me| Self {
            ctx,
            lane,
            installed: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            me: me.clone(),
        })
    }

    /// Install the window capture listeners
    ///
    /// Returns `Ok(false)` if they are already installed.
    pub fn install(&self) -> Result<bool> {
        if self.installed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        // The listener keeps the interceptor alive until it is uninstalled
        let Some(this) = self.me.upgrade() else {
            self.installed.store(false, Ordering::SeqCst);
            return Err(MetaSafeError::Runtime(
                "Drop interceptor is shutting down".to_string(),
            ));
        };
        let on_drop = listener(move |event_ctx| this.on_drop(event_ctx));
        let on_drag_over = listener(|event_ctx| event_ctx.prevent_default());

        let document = &self.ctx.document;
        let registered = document
            .add_listener(NodeRef::Window, EventKind::Drop, Phase::Capture, on_drop)
            .and_then(|drop_id| {
                document
                    .add_listener(
                        NodeRef::Window,
                        EventKind::DragOver,
                        Phase::Capture,
                        on_drag_over,
                    )
                    .map(|drag_id| vec![drop_id, drag_id])
                    .inspect_err(|_| {
                        document.remove_listener(drop_id);
                    })
            });

        match registered {
            Ok(ids) => {
                *self.listeners.lock().unwrap_or_else(|p| p.into_inner()) = ids;
                tracing::debug!(host = document.name(), "Drop interceptor installed");
                Ok(true)
            }
            Err(e) => {
                self.installed.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Remove the window listeners
    pub fn uninstall(&self) -> bool {
        if !self.installed.swap(false, Ordering::SeqCst) {
            return false;
        }
        let ids = std::mem::take(&mut *self.listeners.lock().unwrap_or_else(|p| p.into_inner()));
        for id in ids {
            self.ctx.document.remove_listener(id);
        }
        tracing::debug!("Drop interceptor uninstalled");
        true
    }

    /// Whether the window listeners are installed
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    fn on_drop(&self, event_ctx: &mut EventContext<'_>) {
        let event = event_ctx.event();
        if self.ctx.guard.is_synthetic(event) || !event.has_files() {
            return;
        }

        event_ctx.prevent_default();
        event_ctx.stop_immediate_propagation();

        let files = event.files().to_vec();
        let target = event_ctx.target();
        tracing::debug!(target = %target, files = files.len(), "Intercepted drop");

        if let Err(e) = self.lane.submit(substitute(self.ctx.clone(), target, files)) {
            tracing::warn!(target = %target, error = %e, "Dropping intercepted drop");
        }
    }
}

/// Sanitize the transfer and re-dispatch "drop" at the original target
async fn substitute(ctx: InterceptorContext, target: NodeRef, files: Vec<FileRecord>) {
    let outcomes = ctx.sanitizer.sanitize_batch(&files).await;
    let blocked = outcomes.iter().filter(|o| o.is_blocked()).count();
    let transfer = DataTransfer::from_files(replacement_files(outcomes));

    let event = DomEvent::drop(transfer);
    ctx.guard.mark_synthetic(&event);
    let result = ctx.document.dispatch(target, event.clone());
    ctx.guard.clear_synthetic(&event);

    match result {
        Ok(outcome) => tracing::debug!(
            target = %target,
            files = files.len(),
            blocked,
            listeners = outcome.listeners_invoked,
            "Dispatched sanitized drop"
        ),
        Err(e) => tracing::warn!(target = %target, error = %e, "Failed to dispatch sanitized drop"),
    }
}
