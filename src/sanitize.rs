//! Sanitization pipeline - file in, file out, never fails
//!
//! Allow-listed types are read and handed to the metadata stripper;
//! everything else, and every failure along the way, becomes the
//! placeholder. Unexamined bytes never pass through.

use crate::config::ShieldConfig;
use crate::error::{MetaSafeError, Result};
use crate::strip::jpeg::JpegMetadataStripper;
use crate::strip::MetadataStripper;
use crate::types::{now_millis, BlockReason, FileRecord, SanitizationOutcome};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizerStats {
    /// Batches processed (one per intercepted event)
    pub batches: u64,
    /// Files processed
    pub files: u64,
    /// Files whose metadata was stripped
    pub sanitized: u64,
    /// Files replaced by the placeholder
    pub blocked: u64,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    files: AtomicU64,
    sanitized: AtomicU64,
    blocked: AtomicU64,
}

/// The sanitization pipeline
pub struct Sanitizer {
    config: ShieldConfig,
    stripper: Arc<dyn MetadataStripper>,
    counters: Counters,
}

impl Sanitizer {
    /// Create a pipeline with a custom metadata stripper
    pub fn new(config: ShieldConfig, stripper: impl MetadataStripper + 'static) -> Self {
        Self {
            config,
            stripper: Arc::new(stripper),
            counters: Counters::default(),
        }
    }

    /// Create a pipeline backed by the built-in JPEG stripper
    pub fn jpeg(config: ShieldConfig) -> Self {
        Self::new(config, JpegMetadataStripper::new())
    }

    /// Active configuration
    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// Name of the underlying stripper
    pub fn stripper_name(&self) -> &str {
        self.stripper.name()
    }

    /// A fresh placeholder file, stamped with the current time
    pub fn placeholder(&self) -> FileRecord {
        FileRecord::new(
            self.config.placeholder_name.clone(),
            self.config.placeholder_type.clone(),
            now_millis(),
            self.config.placeholder_message.clone().into_bytes(),
        )
    }

    /// Sanitize one file
    ///
    /// Always resolves. Failures are logged and turned into the placeholder.
    pub async fn sanitize(&self, file: &FileRecord) -> SanitizationOutcome {
        self.counters.files.fetch_add(1, Ordering::Relaxed);

        match self.try_sanitize(file).await {
            Ok(clean) => {
                self.counters.sanitized.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    file = %file.name,
                    mime_type = %file.mime_type,
                    stripper = self.stripper.name(),
                    "File sanitized"
                );
                SanitizationOutcome::Sanitized(clean)
            }
            Err(e) => {
                self.counters.blocked.fetch_add(1, Ordering::Relaxed);
                let reason = block_reason(&e);
                if reason == BlockReason::UnsupportedType {
                    tracing::debug!(
                        file = %file.name,
                        mime_type = %file.mime_type,
                        "Blocking unsupported file type"
                    );
                } else {
                    tracing::warn!(
                        file = %file.name,
                        mime_type = %file.mime_type,
                        error = %e,
                        "Sanitization failed, blocking file"
                    );
                }
                SanitizationOutcome::Blocked {
                    placeholder: self.placeholder(),
                    reason,
                }
            }
        }
    }

    /// Sanitize a batch concurrently, preserving input order
    pub async fn sanitize_batch(&self, files: &[FileRecord]) -> Vec<SanitizationOutcome> {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        futures::future::join_all(files.iter().map(|file| self.sanitize(file))).await
    }

    /// Current counter values
    pub fn stats(&self) -> SanitizerStats {
        SanitizerStats {
            batches: self.counters.batches.load(Ordering::Relaxed),
            files: self.counters.files.load(Ordering::Relaxed),
            sanitized: self.counters.sanitized.load(Ordering::Relaxed),
            blocked: self.counters.blocked.load(Ordering::Relaxed),
        }
    }

    async fn try_sanitize(&self, file: &FileRecord) -> Result<FileRecord> {
        if !self.config.is_allowed(&file.mime_type) {
            return Err(MetaSafeError::UnsupportedType {
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
            });
        }

        let content = file.read().await.map_err(|e| MetaSafeError::ReadFailure {
            name: file.name.clone(),
            reason: e.to_string(),
        })?;

        // A panicking stripper is treated like one that returned an error
        let strip = AssertUnwindSafe(self.stripper.strip(content)).catch_unwind();
        let stripped = match self.config.strip_timeout() {
            Some(limit) => tokio::time::timeout(limit, strip).await.map_err(|_| {
                MetaSafeError::Timeout(format!(
                    "stripping '{}' exceeded {} ms",
                    file.name,
                    limit.as_millis()
                ))
            })?,
            None => strip.await,
        }
        .map_err(|_| {
            MetaSafeError::StripFailure(format!(
                "stripper '{}' panicked on '{}'",
                self.stripper.name(),
                file.name
            ))
        })??;

        Ok(file.with_content(stripped))
    }
}

fn block_reason(err: &MetaSafeError) -> BlockReason {
    match err {
        MetaSafeError::UnsupportedType { .. } => BlockReason::UnsupportedType,
        MetaSafeError::ReadFailure { .. } => BlockReason::ReadFailure,
        _ => BlockReason::StripFailure,
    }
}
