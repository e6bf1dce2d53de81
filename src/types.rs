//! Core types for the metasafe pipeline
//!
//! Files, sanitization outcomes, and the minimal event vocabulary the
//! interceptors need from a host document.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identity of an element inside a host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "el-{}", self.0)
    }
}

/// A node events can be dispatched at or listened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// The global object above the document root
    Window,
    /// An element of the document
    Element(ElementId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Window => f.write_str("window"),
            NodeRef::Element(id) => id.fmt(f),
        }
    }
}

/// Event kinds the interceptors care about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Change,
    Drop,
    DragOver,
}

impl EventKind {
    /// DOM event type string
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Change => "change",
            EventKind::Drop => "drop",
            EventKind::DragOver => "dragover",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listener registration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Runs on the way down, before the target and bubble listeners
    Capture,
    /// Runs at the target and on the way back up
    Bubble,
}

/// File content, either already in memory or read lazily from disk
///
/// Mirrors a browser `File`: the bytes behind a picked file are only
/// read when someone asks for them, and that read can fail.
#[derive(Debug, Clone)]
pub enum Blob {
    /// Bytes held in memory
    Memory(Bytes),
    /// Bytes backed by a file on disk
    Path(PathBuf),
}

impl Blob {
    /// Read the full content
    pub async fn read(&self) -> std::io::Result<Bytes> {
        match self {
            Blob::Memory(bytes) => Ok(bytes.clone()),
            Blob::Path(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }
}

/// An immutable file as seen by the pipeline
///
/// Sanitization never mutates a record; it produces a new one.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// File name without directory components
    pub name: String,

    /// MIME type as reported by the host
    pub mime_type: String,

    /// Last-modified timestamp in Unix milliseconds
    pub last_modified: u64,

    /// File content
    pub blob: Blob,
}

impl FileRecord {
    /// Create an in-memory file
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified: u64,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            last_modified,
            blob: Blob::Memory(content.into()),
        }
    }

    /// Create a file whose bytes live on disk
    pub fn from_path(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified: u64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            last_modified,
            blob: Blob::Path(path.into()),
        }
    }

    /// Read the full content of this file
    pub async fn read(&self) -> std::io::Result<Bytes> {
        self.blob.read().await
    }

    /// A new record with the same name, type and timestamp but other content
    pub fn with_content(&self, content: impl Into<Bytes>) -> Self {
        Self {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            last_modified: self.last_modified,
            blob: Blob::Memory(content.into()),
        }
    }

    /// In-memory content, if the bytes are already loaded
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.blob {
            Blob::Memory(bytes) => Some(bytes),
            Blob::Path(_) => None,
        }
    }
}

/// Normalize a MIME type to its essence (`Image/JPEG; q=1` → `image/jpeg`)
pub fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Why a file was replaced by the placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// MIME type not in the allow-list
    UnsupportedType,
    /// Bytes could not be read
    ReadFailure,
    /// Stripper failed, panicked, or timed out
    StripFailure,
}

/// Result of sanitizing one file
///
/// Every input yields exactly one outcome; there is no pass-through variant.
#[derive(Debug, Clone)]
pub enum SanitizationOutcome {
    /// Metadata removed; name, type and timestamp kept
    Sanitized(FileRecord),
    /// Replaced wholesale by the placeholder
    Blocked {
        placeholder: FileRecord,
        reason: BlockReason,
    },
}

impl SanitizationOutcome {
    /// The file that replaces the original
    pub fn file(&self) -> &FileRecord {
        match self {
            SanitizationOutcome::Sanitized(file) => file,
            SanitizationOutcome::Blocked { placeholder, .. } => placeholder,
        }
    }

    /// Consume the outcome, returning the replacement file
    pub fn into_file(self) -> FileRecord {
        match self {
            SanitizationOutcome::Sanitized(file) => file,
            SanitizationOutcome::Blocked { placeholder, .. } => placeholder,
        }
    }

    /// Whether the file was replaced by the placeholder
    pub fn is_blocked(&self) -> bool {
        matches!(self, SanitizationOutcome::Blocked { .. })
    }

    /// Block reason, if blocked
    pub fn block_reason(&self) -> Option<BlockReason> {
        match self {
            SanitizationOutcome::Sanitized(_) => None,
            SanitizationOutcome::Blocked { reason, .. } => Some(*reason),
        }
    }
}

/// File set carried by a drag-and-drop event
#[derive(Debug, Clone, Default)]
pub struct DataTransfer {
    files: Vec<FileRecord>,
}

impl DataTransfer {
    /// Create an empty transfer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transfer carrying the given files
    pub fn from_files(files: Vec<FileRecord>) -> Self {
        Self { files }
    }

    /// Append a file
    pub fn add(&mut self, file: FileRecord) {
        self.files.push(file);
    }

    /// Files in the transfer
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the transfer carries no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// An event dispatched through a host document
///
/// Each event gets a unique id (`evt-<uuid>`) so the re-entrancy guard
/// can recognise exactly the events it marked.
#[derive(Debug, Clone)]
pub struct DomEvent {
    /// Unique event identifier
    pub id: String,

    /// Event type
    pub kind: EventKind,

    /// Whether the event takes the bubble path after the target
    pub bubbles: bool,

    /// Whether `prevent_default` has any effect
    pub cancelable: bool,

    /// Transferred files for drag-and-drop events
    pub data_transfer: Option<DataTransfer>,

    /// Creation time in Unix milliseconds
    pub timestamp: u64,
}

impl DomEvent {
    /// Create an event of the given kind
    pub fn new(kind: EventKind, bubbles: bool, cancelable: bool) -> Self {
        Self {
            id: format!("evt-{}", uuid::Uuid::new_v4()),
            kind,
            bubbles,
            cancelable,
            data_transfer: None,
            timestamp: now_millis(),
        }
    }

    /// A bubbling "change" event, as fired by a file input
    pub fn change() -> Self {
        Self::new(EventKind::Change, true, false)
    }

    /// A bubbling, cancelable "drop" event carrying `transfer`
    pub fn drop(transfer: DataTransfer) -> Self {
        Self::new(EventKind::Drop, true, true).with_data_transfer(transfer)
    }

    /// A bubbling, cancelable "dragover" event
    pub fn drag_over() -> Self {
        Self::new(EventKind::DragOver, true, true)
    }

    /// Attach a data transfer
    pub fn with_data_transfer(mut self, transfer: DataTransfer) -> Self {
        self.data_transfer = Some(transfer);
        self
    }

    /// Files carried by this event (empty when there is no transfer)
    pub fn files(&self) -> &[FileRecord] {
        self.data_transfer
            .as_ref()
            .map(|t| t.files())
            .unwrap_or_default()
    }

    /// Whether the event carries at least one file
    pub fn has_files(&self) -> bool {
        !self.files().is_empty()
    }
}

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
