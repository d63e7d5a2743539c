//! Staging specification models and top-level error types.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::mount::{SpecMountPolicy, StoragePolicy};

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Filesystem operation that failed, carried by [`SpecIoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumFsOperation {
    /// `create_dir_all` on a destination directory.
    CreateDir,
    /// Listing a directory.
    ReadDir,
    /// Reading entry metadata.
    Inspect,
    /// Copying file bytes and metadata.
    CopyFile,
    /// Moving (renaming) a file.
    MoveFile,
    /// Recursive delete of a directory tree.
    RemoveTree,
}

impl EnumFsOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateDir => "create directory",
            Self::ReadDir => "read directory",
            Self::Inspect => "inspect",
            Self::CopyFile => "copy file",
            Self::MoveFile => "move file",
            Self::RemoveTree => "remove tree",
        }
    }
}

impl fmt::Display for EnumFsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure class shared by every top-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumErrorKind {
    /// Source path, registry model or version does not exist.
    NotFound,
    /// Destination shape conflicts with the request.
    Conflict,
    /// Malformed coordinate or model URI.
    InvalidInput,
    /// Read/write/copy/move/delete/mkdir failure.
    Io,
    /// Registry or download transport failure.
    Transport,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// One non-fatal failure item with path + error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFsError {
    /// Path the failed operation targeted.
    pub path: PathBuf,
    /// User-facing error text.
    pub exception: String,
}

/// Fatal filesystem failure with the operation and offending path.
#[derive(Debug, Error)]
#[error("Failed to {operation} {}: {source}", .path.display())]
pub struct SpecIoError {
    pub operation: EnumFsOperation,
    pub path: PathBuf,
    pub source: io::Error,
}

impl SpecIoError {
    pub fn kind(&self) -> EnumErrorKind {
        match self.source.kind() {
            io::ErrorKind::NotFound => EnumErrorKind::NotFound,
            _ => EnumErrorKind::Io,
        }
    }
}

/// `copy_tree` failures. Every variant aborts the copy.
#[derive(Debug, Error)]
pub enum CopyTreeError {
    /// Source path is missing or not a directory.
    #[error("Source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),
    /// Source and destination overlap (`src` contains `dst` or vice versa).
    #[error(
        "Source and destination directories overlap: {} <-> {}",
        .path_source.display(),
        .path_destination.display()
    )]
    SourceDestinationOverlap {
        /// Source directory as given.
        path_source: PathBuf,
        /// Destination directory as given.
        path_destination: PathBuf,
    },
    #[error(transparent)]
    Io(#[from] SpecIoError),
}

impl CopyTreeError {
    pub fn kind(&self) -> EnumErrorKind {
        match self {
            Self::SourceNotDirectory(_) => EnumErrorKind::NotFound,
            Self::SourceDestinationOverlap { .. } => EnumErrorKind::Conflict,
            Self::Io(e) => e.kind(),
        }
    }
}

/// `flatten_tree` failures. Directory-removal failures are not errors; they
/// land in [`crate::ReportFlatten::errors`].
#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("Root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),
    #[error(transparent)]
    Io(#[from] SpecIoError),
}

impl FlattenError {
    pub fn kind(&self) -> EnumErrorKind {
        match self {
            Self::RootNotDirectory(_) => EnumErrorKind::NotFound,
            Self::Io(e) => e.kind(),
        }
    }
}

/// Failures reported by an [`crate::ArtifactStore`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid model URI: {0}")]
    InvalidModelUri(String),
    #[error("Model not found in registry: {model_uri}")]
    ModelNotFound { model_uri: String },
    #[error("Access denied for {model_uri}: {message}")]
    AccessDenied { model_uri: String, message: String },
    #[error("Failed to download {model_uri}: {message}")]
    Transport { model_uri: String, message: String },
}

impl RegistryError {
    pub fn kind(&self) -> EnumErrorKind {
        match self {
            Self::InvalidModelUri(_) => EnumErrorKind::InvalidInput,
            Self::ModelNotFound { .. } => EnumErrorKind::NotFound,
            Self::AccessDenied { .. } | Self::Transport { .. } => EnumErrorKind::Transport,
        }
    }
}

/// `stage_model` failures. Nothing is retried or rolled back.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Invalid model coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("Model path exists and is not a directory: {}", .0.display())]
    TargetNotDirectory(PathBuf),
    #[error("Registry produced no files for {model_uri} at {}", .path.display())]
    EmptyDownload { model_uri: String, path: PathBuf },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Copy(#[from] CopyTreeError),
    #[error(transparent)]
    Io(#[from] SpecIoError),
}

impl StageError {
    pub fn kind(&self) -> EnumErrorKind {
        match self {
            Self::InvalidCoordinate(_) => EnumErrorKind::InvalidInput,
            Self::TargetNotDirectory(_) => EnumErrorKind::Conflict,
            Self::EmptyDownload { .. } => EnumErrorKind::Transport,
            Self::Registry(e) => e.kind(),
            Self::Copy(e) => e.kind(),
            Self::Io(e) => e.kind(),
        }
    }
}

/// One immutable registered model version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecModelCoordinate {
    pub catalog: String,
    pub schema: String,
    pub model_name: String,
    pub version: u64,
}

impl SpecModelCoordinate {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        model_name: impl Into<String>,
        version: u64,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            model_name: model_name.into(),
            version,
        }
    }

    /// Check that every name component is usable both as a URI segment and as
    /// a single path component.
    ///
    /// Returns the user-facing reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        for (c_field, value) in [
            ("catalog", &self.catalog),
            ("schema", &self.schema),
            ("model_name", &self.model_name),
        ] {
            if value.is_empty() {
                return Err(format!("`{c_field}` must not be empty"));
            }
            if let Some(ch) = value.chars().find(|c| matches!(c, '/' | '\\' | '.')) {
                return Err(format!("`{c_field}` must not contain `{ch}`: {value:?}"));
            }
        }
        Ok(())
    }

    /// Registry reference, e.g. `models:/main.ml.churn/3`.
    pub fn model_uri(&self) -> String {
        format!(
            "models:/{}.{}.{}/{}",
            self.catalog, self.schema, self.model_name, self.version
        )
    }

    /// Deterministic `catalog/schema/model_name/version` below a base path.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.catalog);
        path.push(&self.schema);
        path.push(&self.model_name);
        path.push(self.version.to_string());
        path
    }
}

impl fmt::Display for SpecModelCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.model_uri())
    }
}

/// Input options for `stage_model`.
#[derive(Debug, Clone)]
pub struct SpecStageOptions {
    /// Delete existing target (and staging) content before downloading.
    pub if_overwrite: bool,
    /// Decides whether a target needs the local staging hop.
    pub storage_policy: Arc<dyn StoragePolicy>,
}

impl Default for SpecStageOptions {
    fn default() -> Self {
        Self {
            if_overwrite: false,
            storage_policy: Arc::new(SpecMountPolicy::default()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
