//! # a3s-metasafe
//!
//! Strip identifying metadata from files before a page ever sees them.
//!
//! ## Overview
//!
//! `a3s-metasafe` sits between the user and a document's scripts. It
//! intercepts file selection (`change` on `<input type="file">`) and
//! drag-and-drop (`drop` / `dragover`), sanitizes every file, and
//! re-dispatches a replacement event carrying only clean files. JPEG
//! images lose their EXIF, IPTC and comment segments; any other type is
//! replaced by a `sanitized.txt` placeholder.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_metasafe::{FileRecord, HostDocument, MemoryDocument, Shield};
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_metasafe::Result<()> {
//! let doc = Arc::new(MemoryDocument::new());
//! let input = doc.create_file_input();
//! doc.append_child(doc.body(), input)?;
//!
//! // Attach to inputs, watch for new ones, intercept drops
//! let shield = Shield::with_defaults(doc.clone())?;
//!
//! doc.select_files(
//!     input,
//!     vec![FileRecord::new("notes.pdf", "application/pdf", 0, b"%PDF".to_vec())],
//! )?;
//! shield.settled().await;
//!
//! assert_eq!(doc.files(input)?[0].name, "sanitized.txt");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **HostDocument** trait — the DOM surface the shield needs; `MemoryDocument` is in-process
//! - **MetadataStripper** trait — format-specific cleaning; `JpegMetadataStripper` is built in
//! - **Sanitizer** — allow-list, stripper call and placeholder fallback
//! - **InputInterceptor** / **DropInterceptor** — capture, stop, substitute, re-dispatch
//! - **ReentrancyGuard** — lets the replacement events through exactly once
//! - **DomWatcher** — attaches to file inputs inserted after startup
//! - **Shield** — wires everything together for one document

pub mod config;
pub mod error;
pub mod guard;
pub mod host;
pub mod intercept;
pub mod lane;
pub mod sanitize;
pub mod shield;
pub mod strip;
pub mod types;
pub mod watcher;

// Re-export core types
pub use config::ShieldConfig;
pub use error::{MetaSafeError, Result};
pub use guard::ReentrancyGuard;
pub use host::{DispatchOutcome, EventContext, HostDocument, MutationRecord, ObserverId};
pub use intercept::{DropInterceptor, InputInterceptor};
pub use sanitize::{Sanitizer, SanitizerStats};
pub use shield::Shield;
pub use strip::MetadataStripper;
pub use types::{
    BlockReason, DataTransfer, DomEvent, ElementId, EventKind, FileRecord, NodeRef, Phase,
    SanitizationOutcome,
};
pub use watcher::DomWatcher;

// Re-export built-in implementations for convenience
pub use host::memory::MemoryDocument;
pub use strip::jpeg::{strip_jpeg, JpegMetadataStripper};
