//! Run-time report models and mutable report builders.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::spec::SpecFsError;

/// Aggregate counters for one `copy_tree` run.
#[derive(Debug, Default, Clone)]
pub struct ReportCopy {
    /// Destination directories that did not exist before the run.
    pub cnt_dirs_created: u64,
    /// Files written to the destination.
    pub cnt_files_copied: u64,
    /// Bytes written across all copied files.
    pub n_bytes_copied: u64,
    /// Skipped entries (special files, symlink loops).
    pub warnings: Vec<String>,
}

impl ReportCopy {
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_dirs_created".to_string(), self.cnt_dirs_created);
        dict_counts.insert("cnt_files_copied".to_string(), self.cnt_files_copied);
        dict_counts.insert("n_bytes_copied".to_string(), self.n_bytes_copied);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} dirs_created={} files_copied={} bytes_copied={} warnings={}",
            self.cnt_dirs_created,
            self.cnt_files_copied,
            self.n_bytes_copied,
            self.warning_count()
        )
    }
}

impl fmt::Display for ReportCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[COPY]"))
    }
}

/// Mutable accumulator for copy statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportCopyBuilder {
    pub cnt_dirs_created: u64,
    pub cnt_files_copied: u64,
    pub n_bytes_copied: u64,
    pub warnings: Vec<String>,
}

impl ReportCopyBuilder {
    pub fn add_dir_created(&mut self) {
        self.cnt_dirs_created += 1;
    }

    pub fn add_file_copied(&mut self, n_bytes: u64) {
        self.cnt_files_copied += 1;
        self.n_bytes_copied += n_bytes;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn build(self) -> ReportCopy {
        ReportCopy {
            cnt_dirs_created: self.cnt_dirs_created,
            cnt_files_copied: self.cnt_files_copied,
            n_bytes_copied: self.n_bytes_copied,
            warnings: self.warnings,
        }
    }
}

/// Aggregate counters and diagnostics for one `flatten_tree` run.
#[derive(Debug, Default, Clone)]
pub struct ReportFlatten {
    /// Files moved into the root, renamed or not.
    pub cnt_files_moved: u64,
    /// Subset of moved files that took a `_{n}` suffix.
    pub cnt_files_renamed: u64,
    /// Subdirectories removed after being emptied.
    pub cnt_dirs_removed: u64,
    /// Entries left in place (directory symlinks, unreadable directories).
    pub warnings: Vec<String>,
    /// Directory-removal failures. The root is flat only when this is empty.
    pub errors: Vec<SpecFsError>,
}

impl ReportFlatten {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_files_moved".to_string(), self.cnt_files_moved);
        dict_counts.insert("cnt_files_renamed".to_string(), self.cnt_files_renamed);
        dict_counts.insert("cnt_dirs_removed".to_string(), self.cnt_dirs_removed);
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} moved={} renamed={} dirs_removed={} errors={} warnings={}",
            self.cnt_files_moved,
            self.cnt_files_renamed,
            self.cnt_dirs_removed,
            self.error_count(),
            self.warning_count()
        )
    }
}

impl fmt::Display for ReportFlatten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[FLATTEN]"))
    }
}

/// Mutable accumulator for flatten statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportFlattenBuilder {
    pub cnt_files_moved: u64,
    pub cnt_files_renamed: u64,
    pub cnt_dirs_removed: u64,
    pub warnings: Vec<String>,
    pub errors: Vec<SpecFsError>,
}

impl ReportFlattenBuilder {
    pub fn add_moved(&mut self, if_renamed: bool) {
        self.cnt_files_moved += 1;
        if if_renamed {
            self.cnt_files_renamed += 1;
        }
    }

    pub fn add_dir_removed(&mut self) {
        self.cnt_dirs_removed += 1;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Add one path-scoped error.
    pub fn add_error(&mut self, path: PathBuf, exception: String) {
        self.errors.push(SpecFsError { path, exception });
    }

    pub fn build(self) -> ReportFlatten {
        ReportFlatten {
            cnt_files_moved: self.cnt_files_moved,
            cnt_files_renamed: self.cnt_files_renamed,
            cnt_dirs_removed: self.cnt_dirs_removed,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{ReportCopyBuilder, ReportFlattenBuilder};

    #[test]
    fn report_copy_to_dict_and_format() {
        let mut builder = ReportCopyBuilder::default();
        builder.add_dir_created();
        builder.add_file_copied(10);
        builder.add_file_copied(5);
        builder.add_warning("w".to_string());
        let report = builder.build();

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_dirs_created"], 1);
        assert_eq!(dict_counts["cnt_files_copied"], 2);
        assert_eq!(dict_counts["n_bytes_copied"], 15);
        assert_eq!(dict_counts["cnt_warnings"], 1);
        assert_eq!(
            report.to_string(),
            "[COPY] dirs_created=1 files_copied=2 bytes_copied=15 warnings=1"
        );
    }

    #[test]
    fn report_flatten_counts_renames_and_errors() {
        let mut builder = ReportFlattenBuilder::default();
        builder.add_moved(false);
        builder.add_moved(true);
        builder.add_dir_removed();
        builder.add_error(PathBuf::from("/r/sub"), "Directory not empty".to_string());
        let report = builder.build();

        assert_eq!(report.error_count(), 1);
        assert_eq!(report.to_dict()["cnt_files_renamed"], 1);
        assert_eq!(
            report.format("[FLATTEN]"),
            "[FLATTEN] moved=2 renamed=1 dirs_removed=1 errors=1 warnings=0"
        );
    }
}
