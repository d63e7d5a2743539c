//! Structured progress events and the sinks that receive them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnumEventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl EnumEventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EnumEventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened. `path` on [`SpecEvent`] always names the affected entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumEventKind {
    DirectoryCreated,
    FileCopied,
    FileMoved,
    DirectoryRemoved,
    DirectoryRemoveFailed,
    EntrySkipped,
    CacheHit,
    TargetRemoved,
    StagingRemoved,
    ArtifactsDownloaded,
    ArtifactsCopied,
    ModelStaged,
}

impl EnumEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectoryCreated => "directory_created",
            Self::FileCopied => "file_copied",
            Self::FileMoved => "file_moved",
            Self::DirectoryRemoved => "directory_removed",
            Self::DirectoryRemoveFailed => "directory_remove_failed",
            Self::EntrySkipped => "entry_skipped",
            Self::CacheHit => "cache_hit",
            Self::TargetRemoved => "target_removed",
            Self::StagingRemoved => "staging_removed",
            Self::ArtifactsDownloaded => "artifacts_downloaded",
            Self::ArtifactsCopied => "artifacts_copied",
            Self::ModelStaged => "model_staged",
        }
    }
}

impl fmt::Display for EnumEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecEvent {
    pub level: EnumEventLevel,
    pub kind: EnumEventKind,
    /// Human-readable text.
    pub message: String,
    pub path: PathBuf,
}

impl SpecEvent {
    pub fn new(
        level: EnumEventLevel,
        kind: EnumEventKind,
        message: impl Into<String>,
        path: &Path,
    ) -> Self {
        Self {
            level,
            kind,
            message: message.into(),
            path: path.to_path_buf(),
        }
    }

    /// Flat `(level, message, path, kind)` record for foreign-language callbacks.
    pub fn to_record(&self) -> (&'static str, &str, String, &'static str) {
        (
            self.level.as_str(),
            self.message.as_str(),
            self.path.to_string_lossy().into_owned(),
            self.kind.as_str(),
        )
    }
}

/// Receiver for progress events.
///
/// Implemented for closures, so `&|event: &SpecEvent| ...` is a valid sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SpecEvent);
}

impl<F> EventSink for F
where
    F: Fn(&SpecEvent) + Send + Sync,
{
    fn emit(&self, event: &SpecEvent) {
        self(event)
    }
}

/// Forwards events to `tracing`. Installing a subscriber is up to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SpecEvent) {
        let kind = event.kind.as_str();
        let path = event.path.display();
        match event.level {
            EnumEventLevel::Debug => tracing::debug!(kind, %path, "{}", event.message),
            EnumEventLevel::Info => tracing::info!(kind, %path, "{}", event.message),
            EnumEventLevel::Warn => tracing::warn!(kind, %path, "{}", event.message),
            EnumEventLevel::Error => tracing::error!(kind, %path, "{}", event.message),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &SpecEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    l_events: Mutex<Vec<SpecEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<SpecEvent> {
        self.l_events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn kinds(&self) -> Vec<EnumEventKind> {
        self.events().iter().map(|event| event.kind).collect()
    }

    /// Events of one kind.
    pub fn of_kind(&self, kind: EnumEventKind) -> Vec<SpecEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &SpecEvent) {
        self.l_events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
