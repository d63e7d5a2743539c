//! Recursive directory copy.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::event::{EnumEventKind, EnumEventLevel, EventSink, SpecEvent};
use crate::report::{ReportCopy, ReportCopyBuilder};
use crate::spec::{CopyTreeError, EnumFsOperation};
use crate::util::{copy_file_with_metadata, is_overlap, read_dir_sorted, wrap_io_error};

struct SpecCopyContext<'a> {
    sink: &'a dyn EventSink,
    builder_cp_report: ReportCopyBuilder,
    /// `(dev, ino)` of the directories on the current descent path.
    set_ancestor_dirs: HashSet<(u64, u64)>,
}

/// Copy a directory tree from `dir_source` to `dir_destination`.
///
/// The destination and any missing intermediate directories are created.
/// Directories (including symlinked ones) are recursed into; files are copied
/// with their permission bits, timestamps and, on Linux, extended attributes.
/// Existing destination files are overwritten, so repeating the call with an
/// unchanged source is idempotent.
///
/// Any IO failure aborts the copy and is returned as [`CopyTreeError::Io`];
/// already-copied entries are left in place.
pub fn copy_tree<P, Q>(
    dir_source: P,
    dir_destination: Q,
    sink: &dyn EventSink,
) -> Result<ReportCopy, CopyTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let path_dir_src = dir_source.as_ref();
    let path_dir_dst = dir_destination.as_ref();

    if !path_dir_src.is_dir() {
        return Err(CopyTreeError::SourceNotDirectory(path_dir_src.to_path_buf()));
    }
    if is_overlap(path_dir_src, path_dir_dst) {
        return Err(CopyTreeError::SourceDestinationOverlap {
            path_source: path_dir_src.to_path_buf(),
            path_destination: path_dir_dst.to_path_buf(),
        });
    }

    let mut spec_cp_ctx = SpecCopyContext {
        sink,
        builder_cp_report: ReportCopyBuilder::default(),
        set_ancestor_dirs: HashSet::new(),
    };
    walk_directory(path_dir_src, path_dir_dst, &mut spec_cp_ctx)?;
    Ok(spec_cp_ctx.builder_cp_report.build())
}

fn walk_directory(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    spec_cp_ctx: &mut SpecCopyContext<'_>,
) -> Result<(), CopyTreeError> {
    #[cfg(unix)]
    let tuple_dir_identifier = {
        use std::os::unix::fs::MetadataExt;

        let stat_dir = fs::metadata(path_dir_src)
            .map_err(wrap_io_error(EnumFsOperation::Inspect, path_dir_src))?;
        let tuple_dir_identifier = (stat_dir.dev(), stat_dir.ino());
        if !spec_cp_ctx.set_ancestor_dirs.insert(tuple_dir_identifier) {
            let message = format!("Symlink loop detected: {}", path_dir_src.display());
            spec_cp_ctx.sink.emit(&SpecEvent::new(
                EnumEventLevel::Warn,
                EnumEventKind::EntrySkipped,
                message.clone(),
                path_dir_src,
            ));
            spec_cp_ctx.builder_cp_report.add_warning(message);
            return Ok(());
        }
        tuple_dir_identifier
    };

    ensure_directory(path_dir_dst, spec_cp_ctx)?;

    let l_entries = read_dir_sorted(path_dir_src)
        .map_err(wrap_io_error(EnumFsOperation::ReadDir, path_dir_src))?;
    for entry in l_entries {
        let path_dst_item = path_dir_dst.join(&entry.name);
        if entry.is_dir_followed() {
            walk_directory(&entry.path, &path_dst_item, spec_cp_ctx)?;
            continue;
        }
        copy_entry_file(&entry.path, &path_dst_item, spec_cp_ctx)?;
    }

    #[cfg(unix)]
    {
        spec_cp_ctx.set_ancestor_dirs.remove(&tuple_dir_identifier);
    }
    Ok(())
}

fn ensure_directory(
    path_dir_dst: &Path,
    spec_cp_ctx: &mut SpecCopyContext<'_>,
) -> Result<(), CopyTreeError> {
    if path_dir_dst.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path_dir_dst)
        .map_err(wrap_io_error(EnumFsOperation::CreateDir, path_dir_dst))?;
    spec_cp_ctx.builder_cp_report.add_dir_created();
    spec_cp_ctx.sink.emit(&SpecEvent::new(
        EnumEventLevel::Debug,
        EnumEventKind::DirectoryCreated,
        format!("Created directory: {}", path_dir_dst.display()),
        path_dir_dst,
    ));
    Ok(())
}

fn copy_entry_file(
    path_file_src: &Path,
    path_file_dst: &Path,
    spec_cp_ctx: &mut SpecCopyContext<'_>,
) -> Result<(), CopyTreeError> {
    // Follows symlinks: a dangling link is a missing source.
    let meta_file_src = fs::metadata(path_file_src)
        .map_err(wrap_io_error(EnumFsOperation::Inspect, path_file_src))?;
    if !meta_file_src.is_file() {
        let message = format!("Special file skipped: {}", path_file_src.display());
        spec_cp_ctx.sink.emit(&SpecEvent::new(
            EnumEventLevel::Warn,
            EnumEventKind::EntrySkipped,
            message.clone(),
            path_file_src,
        ));
        spec_cp_ctx.builder_cp_report.add_warning(message);
        return Ok(());
    }

    let n_bytes = copy_file_with_metadata(path_file_src, path_file_dst)?;
    spec_cp_ctx.builder_cp_report.add_file_copied(n_bytes);
    spec_cp_ctx.sink.emit(&SpecEvent::new(
        EnumEventLevel::Debug,
        EnumEventKind::FileCopied,
        format!(
            "Copied: {} --> {}",
            path_file_src.display(),
            path_file_dst.display()
        ),
        path_file_dst,
    ));
    Ok(())
}
