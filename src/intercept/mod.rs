//! Interceptors - capture file-selection events before page scripts
//!
//! Both interceptors follow the same shape: a capture-phase listener
//! decides synchronously (let our own event through, or stop the genuine
//! one and snapshot its files), then a lane job sanitizes the batch and
//! dispatches a replacement event carrying only sanitized files.

pub mod dropzone;
pub mod input;

pub use dropzone::DropInterceptor;
pub use input::InputInterceptor;

use crate::guard::ReentrancyGuard;
use crate::host::HostDocument;
use crate::lane::InFlight;
use crate::sanitize::Sanitizer;
use crate::types::{FileRecord, SanitizationOutcome};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Collaborators shared by every interceptor of one document
#[derive(Clone)]
pub struct InterceptorContext {
    pub document: Arc<dyn HostDocument>,
    pub sanitizer: Arc<Sanitizer>,
    pub guard: Arc<ReentrancyGuard>,
    pub runtime: Handle,
    pub in_flight: Arc<InFlight>,
}

/// Replacement file list for a batch of outcomes, in input order
pub(crate) fn replacement_files(outcomes: Vec<SanitizationOutcome>) -> Vec<FileRecord> {
    outcomes
        .into_iter()
        .map(SanitizationOutcome::into_file)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ShieldConfig;
    use crate::host::listener;
    use crate::host::memory::MemoryDocument;
    use crate::strip::jpeg::tests::jpeg_with_exif;
    use crate::types::{ElementId, EventKind, NodeRef, Phase};
    use std::time::Duration;
    use tokio::sync::mpsc;

    pub(crate) fn context(doc: Arc<MemoryDocument>) -> InterceptorContext {
        InterceptorContext {
            document: doc,
            sanitizer: Arc::new(Sanitizer::jpeg(ShieldConfig::default())),
            guard: Arc::new(ReentrancyGuard::new()),
            runtime: Handle::current(),
            in_flight: Arc::new(InFlight::new()),
        }
    }

    pub(crate) fn jpeg(name: &str) -> FileRecord {
        FileRecord::new(name, "image/jpeg", 1_700_000_000_000, jpeg_with_exif())
    }

    /// A page script listening for "change" in the bubble phase
    pub(crate) fn page_listener(
        doc: &Arc<MemoryDocument>,
        input: ElementId,
    ) -> mpsc::UnboundedReceiver<Vec<FileRecord>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = Arc::downgrade(doc);
        doc.add_listener(
            NodeRef::Element(input),
            EventKind::Change,
            Phase::Bubble,
            listener(move |_| {
                if let Some(doc) = reader.upgrade() {
                    let _ = tx.send(doc.files(input).unwrap_or_default());
                }
            }),
        )
        .unwrap();
        rx
    }

    pub(crate) async fn recv(rx: &mut mpsc::UnboundedReceiver<Vec<FileRecord>>) -> Vec<FileRecord> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("page listener was not called")
            .expect("channel closed")
    }

    #[test]
    fn test_replacement_files_preserve_order() {
        let outcomes = vec![
            SanitizationOutcome::Sanitized(FileRecord::new("a.jpg", "image/jpeg", 1, vec![1u8])),
            SanitizationOutcome::Blocked {
                placeholder: FileRecord::new("sanitized.txt", "text/plain", 2, vec![2u8]),
                reason: crate::types::BlockReason::UnsupportedType,
            },
        ];
        let files = replacement_files(outcomes);
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "sanitized.txt"]);
    }
}
