//! Move every nested file into the root directory and prune emptied
//! subdirectories.

use std::fs;
use std::path::{Path, PathBuf};

use crate::event::{EnumEventKind, EnumEventLevel, EventSink, SpecEvent};
use crate::report::{ReportFlatten, ReportFlattenBuilder};
use crate::spec::{EnumFsOperation, FlattenError};
use crate::util::{SpecDirEntry, derive_available_path, move_file, read_dir_sorted, wrap_io_error};

struct SpecFlattenContext<'a> {
    path_dir_root: PathBuf,
    sink: &'a dyn EventSink,
    builder_ft_report: ReportFlattenBuilder,
}

/// Flatten the tree under `dir_root` into `dir_root` itself.
///
/// Subdirectories are processed post-order (deepest first, siblings by name).
/// Each nested file is moved to `dir_root/{name}`, or to the first free
/// `dir_root/{stem}_{n}{.ext}` when that name is taken at move time. After its
/// files are moved, each subdirectory is removed.
///
/// Files already directly under `dir_root` are never touched. A directory that
/// cannot be removed is recorded in [`ReportFlatten::errors`] and the walk
/// continues; a file that cannot be moved aborts with [`FlattenError::Io`].
pub fn flatten_tree<P: AsRef<Path>>(
    dir_root: P,
    sink: &dyn EventSink,
) -> Result<ReportFlatten, FlattenError> {
    let path_dir_root = dir_root.as_ref().to_path_buf();
    if !path_dir_root.is_dir() {
        return Err(FlattenError::RootNotDirectory(path_dir_root));
    }

    let l_entries = read_dir_sorted(&path_dir_root)
        .map_err(wrap_io_error(EnumFsOperation::ReadDir, &path_dir_root))?;
    let mut spec_ft_ctx = SpecFlattenContext {
        path_dir_root,
        sink,
        builder_ft_report: ReportFlattenBuilder::default(),
    };

    // Root-level files and directory symlinks stay where they are.
    for entry in l_entries {
        if entry.file_type.is_dir() {
            flatten_directory(&entry.path, &mut spec_ft_ctx)?;
        }
    }
    Ok(spec_ft_ctx.builder_ft_report.build())
}

fn flatten_directory(
    path_dir: &Path,
    spec_ft_ctx: &mut SpecFlattenContext<'_>,
) -> Result<(), FlattenError> {
    match read_dir_sorted(path_dir) {
        Ok(l_entries) => {
            let (l_dirs, l_others): (Vec<SpecDirEntry>, Vec<SpecDirEntry>) = l_entries
                .into_iter()
                .partition(|entry| entry.file_type.is_dir());
            for entry in &l_dirs {
                flatten_directory(&entry.path, spec_ft_ctx)?;
            }
            for entry in l_others {
                if entry.is_dir_followed() {
                    skip_entry(
                        &entry.path,
                        format!("Directory symlink left in place: {}", entry.path.display()),
                        spec_ft_ctx,
                    );
                    continue;
                }
                move_into_root(&entry, spec_ft_ctx)?;
            }
        }
        Err(e) => skip_entry(
            path_dir,
            format!("Failed to read directory {} ({e})", path_dir.display()),
            spec_ft_ctx,
        ),
    }

    remove_emptied_directory(path_dir, spec_ft_ctx);
    Ok(())
}

fn move_into_root(
    entry: &SpecDirEntry,
    spec_ft_ctx: &mut SpecFlattenContext<'_>,
) -> Result<(), FlattenError> {
    let path_file_dst = derive_available_path(&spec_ft_ctx.path_dir_root, &entry.name);
    move_file(&entry.path, &path_file_dst)
        .map_err(wrap_io_error(EnumFsOperation::MoveFile, &entry.path))?;

    let if_renamed = path_file_dst.file_name() != Some(entry.name.as_os_str());
    spec_ft_ctx.builder_ft_report.add_moved(if_renamed);
    spec_ft_ctx.sink.emit(&SpecEvent::new(
        EnumEventLevel::Info,
        EnumEventKind::FileMoved,
        format!(
            "Moved: {} --> {}",
            entry.path.display(),
            path_file_dst.display()
        ),
        &path_file_dst,
    ));
    Ok(())
}

fn remove_emptied_directory(path_dir: &Path, spec_ft_ctx: &mut SpecFlattenContext<'_>) {
    match fs::remove_dir(path_dir) {
        Ok(()) => {
            spec_ft_ctx.builder_ft_report.add_dir_removed();
            spec_ft_ctx.sink.emit(&SpecEvent::new(
                EnumEventLevel::Info,
                EnumEventKind::DirectoryRemoved,
                format!("Removed empty directory: {}", path_dir.display()),
                path_dir,
            ));
        }
        Err(e) => {
            spec_ft_ctx.sink.emit(&SpecEvent::new(
                EnumEventLevel::Warn,
                EnumEventKind::DirectoryRemoveFailed,
                format!("Could not remove {}: {e}", path_dir.display()),
                path_dir,
            ));
            spec_ft_ctx
                .builder_ft_report
                .add_error(path_dir.to_path_buf(), e.to_string());
        }
    }
}

fn skip_entry(path: &Path, message: String, spec_ft_ctx: &mut SpecFlattenContext<'_>) {
    spec_ft_ctx.sink.emit(&SpecEvent::new(
        EnumEventLevel::Warn,
        EnumEventKind::EntrySkipped,
        message.clone(),
        path,
    ));
    spec_ft_ctx.builder_ft_report.add_warning(message);
}
