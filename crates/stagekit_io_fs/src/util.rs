use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::spec::{EnumFsOperation, SpecIoError};

////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// `map_err` adapter attaching the operation and path to an IO failure.
pub(crate) fn wrap_io_error(
    operation: EnumFsOperation,
    path: &Path,
) -> impl FnOnce(io::Error) -> SpecIoError {
    let path = path.to_path_buf();
    move |source| SpecIoError {
        operation,
        path,
        source,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DirectoryListing

#[derive(Debug, Clone)]
pub(crate) struct SpecDirEntry {
    pub(crate) path: PathBuf,
    pub(crate) name: OsString,
    pub(crate) file_type: fs::FileType,
}

impl SpecDirEntry {
    /// Directory test that follows symlinks.
    pub(crate) fn is_dir_followed(&self) -> bool {
        self.file_type.is_dir() || (self.file_type.is_symlink() && self.path.is_dir())
    }
}

/// List `path_dir` once, sorted by name. The directory handle is closed on
/// return, so callers may mutate the tree while iterating the result.
pub(crate) fn read_dir_sorted(path_dir: &Path) -> io::Result<Vec<SpecDirEntry>> {
    let mut l_entries = Vec::new();
    for entry_res in fs::read_dir(path_dir)? {
        let entry = entry_res?;
        let file_type = entry.file_type()?;
        l_entries.push(SpecDirEntry {
            path: entry.path(),
            name: entry.file_name(),
            file_type,
        });
    }
    l_entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(l_entries)
}

pub(crate) fn dir_has_entries(path_dir: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path_dir)?.next().is_some())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

/// Existence test that does not follow symlinks (a dangling link exists).
pub(crate) fn path_exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn _normalize_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    // Resolve the deepest existing ancestor so a not-yet-created destination
    // compares against the canonical source.
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if !parent.as_os_str().is_empty() {
            return _normalize_path(parent).join(name);
        }
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

pub(crate) fn is_overlap(src: &Path, dst: &Path) -> bool {
    let src_resolved = _normalize_path(src);
    let dst_resolved = _normalize_path(dst);
    dst_resolved.starts_with(&src_resolved) || src_resolved.starts_with(&dst_resolved)
}

/// First free `dir_root/name`, else `dir_root/{stem}_{n}{.ext}` for n = 1, 2, ...
pub(crate) fn derive_available_path(dir_root: &Path, name: &OsStr) -> PathBuf {
    let path_candidate = dir_root.join(name);
    if !path_exists_no_follow(&path_candidate) {
        return path_candidate;
    }

    let (stem, ext) = split_extension(name);
    let mut n_suffix: u64 = 1;
    loop {
        let mut name_candidate = stem.clone();
        name_candidate.push(format!("_{n_suffix}"));
        name_candidate.push(&ext);
        let path_candidate = dir_root.join(name_candidate);
        if !path_exists_no_follow(&path_candidate) {
            return path_candidate;
        }
        n_suffix += 1;
    }
}

/// Split `name` into stem and extension (with its dot). The extension starts
/// at the last dot; leading dots belong to the stem, so `..a` and `.env`
/// have none.
fn split_extension(name: &OsStr) -> (OsString, OsString) {
    let Some(c_name) = name.to_str() else {
        let path_name = Path::new(name);
        let stem = path_name.file_stem().unwrap_or(name).to_os_string();
        let mut ext = OsString::new();
        if let Some(raw_ext) = path_name.extension() {
            ext.push(".");
            ext.push(raw_ext);
        }
        return (stem, ext);
    };

    let n_leading_dots = c_name.len() - c_name.trim_start_matches('.').len();
    match c_name[n_leading_dots..].rfind('.') {
        Some(idx) => {
            let idx_dot = n_leading_dots + idx;
            (c_name[..idx_dot].into(), c_name[idx_dot..].into())
        }
        None => (c_name.into(), OsString::new()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FileTransfer

/// Copy bytes, then permission bits, access/modification times and (Linux)
/// extended attributes. Returns the number of bytes copied.
///
/// An existing destination is replaced even when an earlier copy left it
/// read-only. Failures name the source when it cannot be read and the
/// destination otherwise.
pub(crate) fn copy_file_with_metadata(
    path_file_src: &Path,
    path_file_dst: &Path,
) -> Result<u64, SpecIoError> {
    fs::File::open(path_file_src)
        .map_err(wrap_io_error(EnumFsOperation::CopyFile, path_file_src))?;

    let n_bytes = match fs::copy(path_file_src, path_file_dst) {
        Err(e)
            if e.kind() == io::ErrorKind::PermissionDenied
                && path_exists_no_follow(path_file_dst) =>
        {
            fs::remove_file(path_file_dst)
                .map_err(wrap_io_error(EnumFsOperation::CopyFile, path_file_dst))?;
            fs::copy(path_file_src, path_file_dst)
        }
        res => res,
    }
    .map_err(wrap_io_error(EnumFsOperation::CopyFile, path_file_dst))?;

    apply_metadata(path_file_src, path_file_dst)
        .map_err(wrap_io_error(EnumFsOperation::CopyFile, path_file_dst))?;
    Ok(n_bytes)
}

fn apply_metadata(path_file_src: &Path, path_file_dst: &Path) -> Result<(), io::Error> {
    use filetime::{FileTime, set_file_times};

    let stat_src = fs::metadata(path_file_src)?;

    // Before permissions: a read-only destination refuses xattr writes.
    #[cfg(target_os = "linux")]
    copy_xattrs_linux(path_file_src, path_file_dst);

    fs::set_permissions(path_file_dst, stat_src.permissions())?;

    let file_time_access = FileTime::from_last_access_time(&stat_src);
    let file_time_modify = FileTime::from_last_modification_time(&stat_src);
    set_file_times(path_file_dst, file_time_access, file_time_modify)?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let iter_xattr_names = match xattr::list(path_file_src) {
        Ok(v) => v,
        Err(_) => return,
    };

    for name in iter_xattr_names {
        let Some(raw_value) = xattr::get(path_file_src, &name).ok().flatten() else {
            continue;
        };
        let _ = xattr::set(path_file_dst, &name, &raw_value);
    }
}

/// Rename `path_src` to `path_dst`, falling back to copy + delete when the
/// two paths live on different devices. Symlinks move as links.
pub(crate) fn move_file(path_src: &Path, path_dst: &Path) -> Result<(), io::Error> {
    match fs::rename(path_src, path_dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            if fs::symlink_metadata(path_src)?.file_type().is_symlink() {
                copy_symlink(path_src, path_dst)?;
            } else {
                copy_file_with_metadata(path_src, path_dst).map_err(|e| e.source)?;
            }
            fs::remove_file(path_src)
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn copy_symlink(path_src: &Path, path_dst: &Path) -> Result<(), io::Error> {
    let target = fs::read_link(path_src)?;
    std::os::unix::fs::symlink(target, path_dst)
}

#[cfg(not(unix))]
fn copy_symlink(path_src: &Path, _path_dst: &Path) -> Result<(), io::Error> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!(
            "Cannot move symbolic link across devices: {}",
            path_src.display()
        ),
    ))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
