//! Metadata stripper trait - the seam to codec-specific cleaners
//!
//! The sanitization pipeline treats stripping as an opaque
//! `bytes → bytes` step that may fail. Each codec implements
//! `MetadataStripper`; the pipeline only decides *when* to call it.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub mod jpeg;

/// Removes embedded metadata from encoded file content
///
/// Implementations must return content carrying the same visual payload,
/// or an error. They may be slow or hang; the pipeline decides whether
/// to bound them with a timeout.
#[async_trait]
pub trait MetadataStripper: Send + Sync {
    /// Strip metadata from the full encoded content
    async fn strip(&self, content: Bytes) -> Result<Bytes>;

    /// Stripper name (e.g., "jpeg")
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: MetadataStripper + ?Sized> MetadataStripper for Arc<T> {
    async fn strip(&self, content: Bytes) -> Result<Bytes> {
        (**self).strip(content).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
