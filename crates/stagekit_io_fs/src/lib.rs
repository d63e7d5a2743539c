//! `stagekit_io_fs` v1:
//! Rust-side filesystem helpers for staging registered model artifacts.
//!
//! - `copy`     : recursive tree copy with metadata
//! - `stage`    : registry download to a deterministic local path
//! - `flatten`  : collapse a nested tree into its root
//! - `mount`    : networked-mount detection and staging paths
//! - `registry` : artifact-store seam and model URI parsing
//! - `event`    : structured progress events and sinks
//! - `spec`     : enums/options/errors
//! - `report`   : run-time report models
//! - `util`     : shared helper functions

pub mod copy;
pub mod event;
pub mod flatten;
pub mod mount;
pub mod registry;
pub mod report;
pub mod spec;
pub mod stage;
mod util;

pub use copy::copy_tree;
pub use event::{
    EnumEventKind, EnumEventLevel, EventSink, NoopSink, RecordingSink, SpecEvent, TracingSink,
};
pub use flatten::flatten_tree;
pub use mount::{EnumStorageClass, SpecMountPolicy, SpecMountRule, StoragePolicy};
pub use registry::{ArtifactStore, LocalMirrorArtifactStore, parse_model_uri};
pub use report::{ReportCopy, ReportCopyBuilder, ReportFlatten, ReportFlattenBuilder};
pub use spec::{
    CopyTreeError, EnumErrorKind, EnumFsOperation, FlattenError, RegistryError, SpecFsError,
    SpecIoError, SpecModelCoordinate, SpecStageOptions, StageError,
};
pub use stage::stage_model;
