//! Shield - wires the interceptors into a document
//!
//! `Shield::init` runs once per document load: attach to existing file
//! inputs, start the DOM watcher, install the drop interceptor. The
//! installation belongs to the document: dropping the returned handle
//! leaves it active, and only [`Shield::shutdown`] removes it.

use crate::config::ShieldConfig;
use crate::error::{MetaSafeError, Result};
use crate::guard::ReentrancyGuard;
use crate::host::HostDocument;
use crate::intercept::{DropInterceptor, InputInterceptor, InterceptorContext};
use crate::lane::InFlight;
use crate::sanitize::{Sanitizer, SanitizerStats};
use crate::strip::jpeg::JpegMetadataStripper;
use crate::strip::MetadataStripper;
use crate::types::ElementId;
use crate::watcher::DomWatcher;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Handle to an active metasafe installation on one document
#[must_use = "the shield stays installed; keep the handle to inspect or shut it down"]
pub struct Shield {
    ctx: InterceptorContext,
    inputs: Arc<InputInterceptor>,
    drops: Arc<DropInterceptor>,
    watcher: Arc<DomWatcher>,
}

impl Shield {
    /// Install metasafe on `document` with a custom metadata stripper
    ///
    /// Must be called from within a tokio runtime; substitutions run on it.
    pub fn init(
        document: Arc<dyn HostDocument>,
        config: ShieldConfig,
        stripper: impl MetadataStripper + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| MetaSafeError::Runtime(format!("No tokio runtime: {}", e)))?;

        let ctx = InterceptorContext {
            document: document.clone(),
            sanitizer: Arc::new(Sanitizer::new(config, stripper)),
            guard: Arc::new(ReentrancyGuard::new()),
            runtime,
            in_flight: Arc::new(InFlight::new()),
        };

        let inputs = InputInterceptor::new(ctx.clone());
        let watcher = DomWatcher::new(document.clone(), inputs.clone());
        let drops = DropInterceptor::new(ctx.clone());

        let existing = watcher.attach_existing();
        watcher.start();
        drops.install()?;

        tracing::info!(
            host = document.name(),
            stripper = ctx.sanitizer.stripper_name(),
            allowed_types = ?ctx.sanitizer.config().allowed_types,
            existing_inputs = existing,
            "MetaSafe loaded, intercepting file uploads"
        );

        Ok(Self {
            ctx,
            inputs,
            drops,
            watcher,
        })
    }

    /// Install metasafe with the default policy and the JPEG stripper
    pub fn with_defaults(document: Arc<dyn HostDocument>) -> Result<Self> {
        Self::init(document, ShieldConfig::default(), JpegMetadataStripper::new())
    }

    /// The sanitization pipeline
    pub fn sanitizer(&self) -> &Sanitizer {
        &self.ctx.sanitizer
    }

    /// The re-entrancy guard
    pub fn guard(&self) -> &ReentrancyGuard {
        &self.ctx.guard
    }

    /// Pipeline counters
    pub fn stats(&self) -> SanitizerStats {
        self.ctx.sanitizer.stats()
    }

    /// File inputs under interception
    pub fn attached_inputs(&self) -> Vec<ElementId> {
        self.inputs.attached()
    }

    /// Whether the DOM watcher is observing mutations
    pub fn is_watching(&self) -> bool {
        self.watcher.is_started()
    }

    /// Substitutions queued or running
    pub fn pending(&self) -> usize {
        self.ctx.in_flight.pending()
    }

    /// Wait until every intercepted event has been substituted
    pub async fn settled(&self) {
        self.ctx.in_flight.idle().await
    }

    /// Stop watching and remove all interceptor listeners from the document
    ///
    /// Substitutions already queued still complete. Inputs inserted
    /// afterwards are left alone.
    pub fn shutdown(&self) {
        self.watcher.stop();
        for element in self.inputs.attached() {
            self.inputs.detach(element);
        }
        self.drops.uninstall();
        tracing::info!(host = self.ctx.document.name(), "MetaSafe shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryDocument;
    use crate::host::{listener, HostDocument};
    use crate::intercept::tests::{jpeg, page_listener, recv};
    use crate::types::{EventKind, FileRecord, NodeRef, Phase};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Names of the files in every "drop" reaching the window
    fn drop_listener(doc: &MemoryDocument) -> mpsc::UnboundedReceiver<Vec<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        doc.add_listener(
            NodeRef::Window,
            EventKind::Drop,
            Phase::Bubble,
            listener(move |ctx| {
                let names = ctx.event().files().iter().map(|f| f.name.clone()).collect();
                let _ = tx.send(names);
            }),
        )
        .unwrap();
        rx
    }

    #[test]
    fn test_init_requires_runtime() {
        let doc = Arc::new(MemoryDocument::new());
        let result = Shield::with_defaults(doc);
        assert!(matches!(result, Err(MetaSafeError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_init_rejects_invalid_config() {
        let doc = Arc::new(MemoryDocument::new());
        let config = ShieldConfig {
            strip_timeout_ms: Some(0),
            ..Default::default()
        };
        let result = Shield::init(doc, config, JpegMetadataStripper::new());
        assert!(matches!(result, Err(MetaSafeError::Config(_))));
    }

    #[tokio::test]
    async fn test_init_wires_everything() {
        let doc = Arc::new(MemoryDocument::new());
        let existing = doc.create_file_input();
        doc.append_child(doc.body(), existing).unwrap();

        let shield = Shield::with_defaults(doc.clone()).unwrap();
        assert_eq!(shield.attached_inputs(), vec![existing]);
        assert!(shield.is_watching());
        assert!(shield.guard().is_attached(existing));
        assert_eq!(doc.listener_count(NodeRef::Window, EventKind::Drop), 1);
        assert_eq!(doc.listener_count(NodeRef::Window, EventKind::DragOver), 1);
        assert_eq!(shield.sanitizer().stripper_name(), "jpeg");
        assert_eq!(shield.stats(), SanitizerStats::default());
        assert_eq!(shield.pending(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_removes_listeners() {
        let doc = Arc::new(MemoryDocument::new());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();

        let shield = Shield::with_defaults(doc.clone()).unwrap();
        shield.shutdown();

        assert!(shield.attached_inputs().is_empty());
        assert_eq!(doc.listener_count(NodeRef::Element(input), EventKind::Change), 0);
        assert_eq!(doc.listener_count(NodeRef::Window, EventKind::Drop), 0);
        assert!(!shield.guard().is_attached(input));
        assert!(!shield.is_watching());

        let late = doc.create_file_input();
        doc.append_child(doc.body(), late).unwrap();
        assert!(shield.attached_inputs().is_empty());
        assert_eq!(doc.listener_count(NodeRef::Element(late), EventKind::Change), 0);
    }

    #[tokio::test]
    async fn test_dropped_handle_keeps_document_protected() {
        let doc = Arc::new(MemoryDocument::new());
        let input = doc.create_file_input();
        doc.append_child(doc.body(), input).unwrap();
        let mut seen = page_listener(&doc, input);
        let mut dropped = drop_listener(&doc);

        drop(Shield::with_defaults(doc.clone()).unwrap());

        let secret = FileRecord::new("secret.pdf", "application/pdf", 1, vec![1u8]);
        doc.select_files(input, vec![secret]).unwrap();
        assert!(doc.files(input).unwrap().is_empty());
        let files = recv(&mut seen).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "sanitized.txt");

        let outcome = doc
            .drop_files(NodeRef::Element(doc.body()), vec![jpeg("gps.jpg")])
            .unwrap();
        assert!(outcome.default_prevented);
        let names = tokio::time::timeout(Duration::from_secs(2), dropped.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(names, vec!["gps.jpg".to_string()]);

        // Inputs inserted after the handle is gone are still picked up
        let late = doc.create_file_input();
        doc.append_child(doc.body(), late).unwrap();
        assert_eq!(doc.listener_count(NodeRef::Element(late), EventKind::Change), 1);
    }
}
