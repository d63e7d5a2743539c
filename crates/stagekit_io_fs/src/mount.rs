//! Storage classification: decides whether a target path sits on a slow
//! networked mount and, if so, where its fast local staging copy lives.

use std::fmt;
use std::path::{Path, PathBuf};

/// Distributed-filesystem FUSE mount root.
pub const C_MOUNT_ROOT_DBFS: &str = "/dbfs";
/// Managed-volume mount root.
pub const C_MOUNT_ROOT_VOLUMES: &str = "/Volumes";
/// Node-local scratch disk used for staging.
pub const C_SCRATCH_ROOT_LOCAL_DISK: &str = "/local_disk0";

/// Storage class of a destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumStorageClass {
    /// Local disk: download straight into the target.
    LocalFast,
    /// Networked mount: download to scratch first, then bulk-copy.
    NetworkedMount,
}

/// Injectable policy consulted by `stage_model`.
pub trait StoragePolicy: fmt::Debug + Send + Sync {
    /// Classify `path` by where it is stored.
    fn classify(&self, path: &Path) -> EnumStorageClass;

    /// Local staging location for a networked `path`. `None` for local paths.
    fn derive_staging_path(&self, path: &Path) -> Option<PathBuf>;
}

/// One mount root and the scratch root that substitutes for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecMountRule {
    pub path_mount_root: PathBuf,
    pub path_scratch_root: PathBuf,
}

impl SpecMountRule {
    pub fn new(path_mount_root: impl Into<PathBuf>, path_scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            path_mount_root: path_mount_root.into(),
            path_scratch_root: path_scratch_root.into(),
        }
    }

    /// Component-wise prefix test, so `/dbfs2/x` does not match `/dbfs`.
    fn matches(&self, path: &Path) -> bool {
        path.starts_with(&self.path_mount_root)
    }
}

/// Prefix table policy. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecMountPolicy {
    pub rules: Vec<SpecMountRule>,
}

impl Default for SpecMountPolicy {
    fn default() -> Self {
        let path_scratch_root = Path::new(C_SCRATCH_ROOT_LOCAL_DISK);
        Self {
            rules: vec![
                SpecMountRule::new(
                    C_MOUNT_ROOT_DBFS,
                    path_scratch_root.join(C_MOUNT_ROOT_DBFS.trim_start_matches('/')),
                ),
                SpecMountRule::new(
                    C_MOUNT_ROOT_VOLUMES,
                    path_scratch_root.join(C_MOUNT_ROOT_VOLUMES.trim_start_matches('/')),
                ),
            ],
        }
    }
}

impl SpecMountPolicy {
    pub fn with_rules(rules: Vec<SpecMountRule>) -> Self {
        Self { rules }
    }

    /// Policy that treats every path as local.
    pub fn local_only() -> Self {
        Self { rules: Vec::new() }
    }

    fn find_rule(&self, path: &Path) -> Option<&SpecMountRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }
}

impl StoragePolicy for SpecMountPolicy {
    fn classify(&self, path: &Path) -> EnumStorageClass {
        match self.find_rule(path) {
            Some(_) => EnumStorageClass::NetworkedMount,
            None => EnumStorageClass::LocalFast,
        }
    }

    fn derive_staging_path(&self, path: &Path) -> Option<PathBuf> {
        let rule = self.find_rule(path)?;
        let path_rel = path.strip_prefix(&rule.path_mount_root).ok()?;
        Some(rule.path_scratch_root.join(path_rel))
    }
}
