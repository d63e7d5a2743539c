//! Stage a registered model version onto local or mounted storage.

use std::fs;
use std::path::{Path, PathBuf};

use crate::copy::copy_tree;
use crate::event::{EnumEventKind, EnumEventLevel, EventSink, SpecEvent};
use crate::mount::EnumStorageClass;
use crate::registry::ArtifactStore;
use crate::spec::{EnumFsOperation, SpecModelCoordinate, SpecStageOptions, StageError};
use crate::util::{dir_has_entries, is_overlap, wrap_io_error};

/// Download the artifacts of `coordinate` to
/// `local_base_path/catalog/schema/model_name/version` and return that path.
///
/// - Without `if_overwrite`, a non-empty target is returned as-is and the store
///   is not called. Cached content is not validated.
/// - With `if_overwrite`, an existing target (and staging copy) is deleted first.
/// - Targets the storage policy classifies as networked mounts are downloaded
///   to the policy's staging path, then copied into place with [`copy_tree`].
///
/// Every failure propagates immediately; nothing is retried or cleaned up.
pub fn stage_model<P: AsRef<Path>>(
    coordinate: &SpecModelCoordinate,
    local_base_path: P,
    spec_stage_options: &SpecStageOptions,
    store: &dyn ArtifactStore,
    sink: &dyn EventSink,
) -> Result<PathBuf, StageError> {
    coordinate
        .validate()
        .map_err(StageError::InvalidCoordinate)?;
    let path_dir_target = local_base_path.as_ref().join(coordinate.relative_path());

    if path_dir_target.exists() && !path_dir_target.is_dir() {
        return Err(StageError::TargetNotDirectory(path_dir_target));
    }
    if !spec_stage_options.if_overwrite && has_content(&path_dir_target)? {
        emit(
            sink,
            EnumEventLevel::Info,
            EnumEventKind::CacheHit,
            format!(
                "Model path {} already exists and contains content.",
                path_dir_target.display()
            ),
            &path_dir_target,
        );
        return Ok(path_dir_target);
    }
    if spec_stage_options.if_overwrite && path_dir_target.exists() {
        remove_tree(&path_dir_target)?;
        emit(
            sink,
            EnumEventLevel::Info,
            EnumEventKind::TargetRemoved,
            format!("Existing model path {} removed.", path_dir_target.display()),
            &path_dir_target,
        );
    }

    let model_uri = coordinate.model_uri();
    let storage_policy = &spec_stage_options.storage_policy;
    let path_dir_staging = match storage_policy.classify(&path_dir_target) {
        EnumStorageClass::LocalFast => None,
        EnumStorageClass::NetworkedMount => {
            // A staging path inside (or equal to) the target cannot be copied from.
            match storage_policy.derive_staging_path(&path_dir_target) {
                Some(path_dir_staging) if !is_overlap(&path_dir_staging, &path_dir_target) => {
                    Some(path_dir_staging)
                }
                _ => {
                    emit(
                        sink,
                        EnumEventLevel::Warn,
                        EnumEventKind::EntrySkipped,
                        format!(
                            "No usable staging path for mounted target {}; downloading directly.",
                            path_dir_target.display()
                        ),
                        &path_dir_target,
                    );
                    None
                }
            }
        }
    };

    match path_dir_staging {
        Some(path_dir_staging) => {
            if spec_stage_options.if_overwrite && path_dir_staging.exists() {
                remove_tree(&path_dir_staging)?;
                emit(
                    sink,
                    EnumEventLevel::Info,
                    EnumEventKind::StagingRemoved,
                    format!(
                        "Existing model path in local disk {} removed.",
                        path_dir_staging.display()
                    ),
                    &path_dir_staging,
                );
            }
            download(store, &model_uri, &path_dir_staging)?;
            emit(
                sink,
                EnumEventLevel::Info,
                EnumEventKind::ArtifactsDownloaded,
                format!(
                    "Model artifacts downloaded to local disk {}",
                    path_dir_staging.display()
                ),
                &path_dir_staging,
            );
            let report_copy = copy_tree(&path_dir_staging, &path_dir_target, sink)?;
            emit(
                sink,
                EnumEventLevel::Info,
                EnumEventKind::ArtifactsCopied,
                format!(
                    "Model artifacts copied to mounted storage {} {}",
                    path_dir_target.display(),
                    report_copy
                ),
                &path_dir_target,
            );
        }
        None => {
            download(store, &model_uri, &path_dir_target)?;
            emit(
                sink,
                EnumEventLevel::Info,
                EnumEventKind::ArtifactsDownloaded,
                format!("Model artifacts downloaded to {}", path_dir_target.display()),
                &path_dir_target,
            );
        }
    }

    if !has_content(&path_dir_target)? {
        return Err(StageError::EmptyDownload {
            model_uri,
            path: path_dir_target,
        });
    }
    emit(
        sink,
        EnumEventLevel::Info,
        EnumEventKind::ModelStaged,
        format!(
            "Model {model_uri} from registry saved in: {}",
            path_dir_target.display()
        ),
        &path_dir_target,
    );
    Ok(path_dir_target)
}

fn download(
    store: &dyn ArtifactStore,
    model_uri: &str,
    path_dir_dst: &Path,
) -> Result<(), StageError> {
    fs::create_dir_all(path_dir_dst)
        .map_err(wrap_io_error(EnumFsOperation::CreateDir, path_dir_dst))?;
    store.download_artifacts(model_uri, path_dir_dst)?;
    Ok(())
}

fn has_content(path_dir: &Path) -> Result<bool, StageError> {
    if !path_dir.is_dir() {
        return Ok(false);
    }
    Ok(dir_has_entries(path_dir).map_err(wrap_io_error(EnumFsOperation::ReadDir, path_dir))?)
}

fn remove_tree(path_dir: &Path) -> Result<(), StageError> {
    fs::remove_dir_all(path_dir).map_err(wrap_io_error(EnumFsOperation::RemoveTree, path_dir))?;
    Ok(())
}

fn emit(
    sink: &dyn EventSink,
    level: EnumEventLevel,
    kind: EnumEventKind,
    message: String,
    path: &Path,
) {
    sink.emit(&SpecEvent::new(level, kind, message, path));
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    use super::stage_model;
    use crate::event::{EnumEventKind, NoopSink, RecordingSink};
    use crate::mount::{SpecMountPolicy, SpecMountRule};
    use crate::registry::LocalMirrorArtifactStore;
    use crate::spec::{
        EnumErrorKind, RegistryError, SpecModelCoordinate, SpecStageOptions, StageError,
    };

    /// Store that writes one file per call and remembers where it wrote.
    struct FakeStore {
        n_calls: AtomicUsize,
        l_destinations: Mutex<Vec<PathBuf>>,
        c_payload: &'static str,
    }

    impl FakeStore {
        fn new(c_payload: &'static str) -> Self {
            Self {
                n_calls: AtomicUsize::new(0),
                l_destinations: Mutex::new(Vec::new()),
                c_payload,
            }
        }

        fn calls(&self) -> usize {
            self.n_calls.load(Ordering::SeqCst)
        }
    }

    impl crate::registry::ArtifactStore for FakeStore {
        fn download_artifacts(
            &self,
            model_uri: &str,
            dir_destination: &Path,
        ) -> Result<(), RegistryError> {
            self.n_calls.fetch_add(1, Ordering::SeqCst);
            self.l_destinations
                .lock()
                .expect("lock")
                .push(dir_destination.to_path_buf());
            assert!(dir_destination.is_dir(), "destination must exist");
            fs::write(dir_destination.join("MLmodel"), self.c_payload).map_err(|e| {
                RegistryError::Transport {
                    model_uri: model_uri.to_string(),
                    message: e.to_string(),
                }
            })
        }
    }

    fn coordinate() -> SpecModelCoordinate {
        SpecModelCoordinate::new("main", "ml", "churn", 4)
    }

    fn local_options(if_overwrite: bool) -> SpecStageOptions {
        SpecStageOptions {
            if_overwrite,
            storage_policy: Arc::new(SpecMountPolicy::local_only()),
        }
    }

    #[test]
    fn stage_downloads_into_deterministic_path() {
        let tmp = TempDir::new().expect("tempdir");
        let store = FakeStore::new("v4");

        let path_model = stage_model(
            &coordinate(),
            tmp.path(),
            &local_options(false),
            &store,
            &NoopSink,
        )
        .expect("stage");

        assert_eq!(path_model, tmp.path().join("main/ml/churn/4"));
        assert_eq!(fs::read_to_string(path_model.join("MLmodel")).expect("read"), "v4");
        assert_eq!(store.calls(), 1);
    }

    #[test]
    fn stage_skips_existing_content_without_overwrite() {
        let tmp = TempDir::new().expect("tempdir");
        let path_target = tmp.path().join("main/ml/churn/4");
        fs::create_dir_all(&path_target).expect("mkdir");
        fs::write(path_target.join("cached.bin"), "old").expect("write");

        let store = FakeStore::new("new");
        let sink = RecordingSink::new();
        let path_model =
            stage_model(&coordinate(), tmp.path(), &local_options(false), &store, &sink)
                .expect("stage");

        assert_eq!(path_model, path_target);
        assert_eq!(store.calls(), 0);
        assert!(!path_target.join("MLmodel").exists());
        assert_eq!(sink.kinds(), vec![EnumEventKind::CacheHit]);
    }

    #[test]
    fn stage_downloads_into_existing_empty_target() {
        let tmp = TempDir::new().expect("tempdir");
        let path_target = tmp.path().join("main/ml/churn/4");
        fs::create_dir_all(&path_target).expect("mkdir");

        let store = FakeStore::new("v4");
        stage_model(&coordinate(), tmp.path(), &local_options(false), &store, &NoopSink)
            .expect("stage");
        assert_eq!(store.calls(), 1);
        assert!(path_target.join("MLmodel").exists());
    }

    #[test]
    fn stage_overwrite_replaces_prior_content() {
        let tmp = TempDir::new().expect("tempdir");
        let path_target = tmp.path().join("main/ml/churn/4");
        fs::create_dir_all(path_target.join("old_dir")).expect("mkdir");
        fs::write(path_target.join("stale.bin"), "old").expect("write");

        let store = FakeStore::new("fresh");
        let sink = RecordingSink::new();
        let path_model =
            stage_model(&coordinate(), tmp.path(), &local_options(true), &store, &sink)
                .expect("stage");

        assert_eq!(store.calls(), 1);
        assert!(!path_model.join("stale.bin").exists());
        assert!(!path_model.join("old_dir").exists());
        assert_eq!(fs::read_to_string(path_model.join("MLmodel")).expect("read"), "fresh");
        assert_eq!(
            sink.kinds(),
            vec![
                EnumEventKind::TargetRemoved,
                EnumEventKind::ArtifactsDownloaded,
                EnumEventKind::ModelStaged,
            ]
        );
    }

    #[test]
    fn stage_mounted_target_goes_through_scratch() {
        let tmp = TempDir::new().expect("tempdir");
        let path_mount = tmp.path().join("mnt");
        let path_scratch = tmp.path().join("scratch");
        let spec_stage_options = SpecStageOptions {
            if_overwrite: false,
            storage_policy: Arc::new(SpecMountPolicy::with_rules(vec![SpecMountRule::new(
                &path_mount,
                &path_scratch,
            )])),
        };

        let store = FakeStore::new("staged");
        let sink = RecordingSink::new();
        let path_model = stage_model(
            &coordinate(),
            path_mount.join("models"),
            &spec_stage_options,
            &store,
            &sink,
        )
        .expect("stage");

        let path_staging = path_scratch.join("models/main/ml/churn/4");
        assert_eq!(path_model, path_mount.join("models/main/ml/churn/4"));
        assert_eq!(
            store.l_destinations.lock().expect("lock").as_slice(),
            &[path_staging.clone()]
        );
        assert_eq!(fs::read_to_string(path_staging.join("MLmodel")).expect("read"), "staged");
        assert_eq!(fs::read_to_string(path_model.join("MLmodel")).expect("read"), "staged");

        let l_milestones: Vec<_> = sink
            .kinds()
            .into_iter()
            .filter(|kind| {
                !matches!(kind, EnumEventKind::FileCopied | EnumEventKind::DirectoryCreated)
            })
            .collect();
        assert_eq!(
            l_milestones,
            vec![
                EnumEventKind::ArtifactsDownloaded,
                EnumEventKind::ArtifactsCopied,
                EnumEventKind::ModelStaged,
            ]
        );
    }

    #[test]
    fn stage_mounted_overwrite_clears_stale_scratch() {
        let tmp = TempDir::new().expect("tempdir");
        let path_mount = tmp.path().join("mnt");
        let path_scratch = tmp.path().join("scratch");
        let path_staging = path_scratch.join("main/ml/churn/4");
        fs::create_dir_all(&path_staging).expect("mkdir");
        fs::write(path_staging.join("stale.bin"), "old").expect("write");

        let spec_stage_options = SpecStageOptions {
            if_overwrite: true,
            storage_policy: Arc::new(SpecMountPolicy::with_rules(vec![SpecMountRule::new(
                &path_mount,
                &path_scratch,
            )])),
        };
        let store = FakeStore::new("fresh");
        let sink = RecordingSink::new();
        let path_model =
            stage_model(&coordinate(), &path_mount, &spec_stage_options, &store, &sink)
                .expect("stage");

        assert!(!path_model.join("stale.bin").exists());
        assert!(!path_staging.join("stale.bin").exists());
        assert_eq!(sink.of_kind(EnumEventKind::StagingRemoved).len(), 1);
    }

    #[test]
    fn stage_downloads_directly_when_scratch_is_the_mount() {
        let tmp = TempDir::new().expect("tempdir");
        let path_mount = tmp.path().join("m");
        let spec_stage_options = SpecStageOptions {
            if_overwrite: false,
            storage_policy: Arc::new(SpecMountPolicy::with_rules(vec![SpecMountRule::new(
                &path_mount,
                &path_mount,
            )])),
        };

        let store = FakeStore::new("direct");
        let sink = RecordingSink::new();
        let path_model =
            stage_model(&coordinate(), &path_mount, &spec_stage_options, &store, &sink)
                .expect("stage");

        assert_eq!(
            store.l_destinations.lock().expect("lock").as_slice(),
            &[path_model.clone()]
        );
        assert_eq!(fs::read_to_string(path_model.join("MLmodel")).expect("read"), "direct");
        assert_eq!(
            sink.kinds(),
            vec![
                EnumEventKind::EntrySkipped,
                EnumEventKind::ArtifactsDownloaded,
                EnumEventKind::ModelStaged,
            ]
        );
    }

    #[test]
    fn stage_propagates_registry_failure() {
        let tmp = TempDir::new().expect("tempdir");
        let store = |model_uri: &str, _dst: &Path| -> Result<(), RegistryError> {
            Err(RegistryError::ModelNotFound {
                model_uri: model_uri.to_string(),
            })
        };

        let err = stage_model(&coordinate(), tmp.path(), &local_options(false), &store, &NoopSink)
            .expect_err("must fail");
        assert!(matches!(err, StageError::Registry(RegistryError::ModelNotFound { .. })));
        assert_eq!(err.kind(), EnumErrorKind::NotFound);
    }

    #[test]
    fn stage_rejects_empty_download() {
        let tmp = TempDir::new().expect("tempdir");
        let store = |_model_uri: &str, _dst: &Path| -> Result<(), RegistryError> { Ok(()) };

        let err = stage_model(&coordinate(), tmp.path(), &local_options(false), &store, &NoopSink)
            .expect_err("must fail");
        assert!(matches!(err, StageError::EmptyDownload { .. }));
    }

    #[test]
    fn stage_rejects_invalid_coordinate_before_touching_disk() {
        let tmp = TempDir::new().expect("tempdir");
        let store = FakeStore::new("x");
        let bad = SpecModelCoordinate::new("main", "..", "churn", 1);

        let err = stage_model(&bad, tmp.path(), &local_options(true), &store, &NoopSink)
            .expect_err("must fail");
        assert_eq!(err.kind(), EnumErrorKind::InvalidInput);
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn stage_rejects_file_at_target() {
        let tmp = TempDir::new().expect("tempdir");
        let path_target = tmp.path().join("main/ml/churn/4");
        fs::create_dir_all(path_target.parent().expect("parent")).expect("mkdir");
        fs::write(&path_target, "not a dir").expect("write");

        let err = stage_model(
            &coordinate(),
            tmp.path(),
            &local_options(false),
            &FakeStore::new("x"),
            &NoopSink,
        )
        .expect_err("must fail");
        assert!(matches!(err, StageError::TargetNotDirectory(_)));
    }

    #[test]
    fn stage_from_local_mirror() {
        let tmp = TempDir::new().expect("tempdir");
        let path_version = tmp.path().join("mirror/main/ml/churn/4");
        fs::create_dir_all(path_version.join("artifacts")).expect("mkdir");
        fs::write(path_version.join("artifacts/model.pkl"), "w").expect("write");

        let store = LocalMirrorArtifactStore::new(tmp.path().join("mirror"));
        let path_model = stage_model(
            &coordinate(),
            tmp.path().join("models"),
            &local_options(false),
            &store,
            &NoopSink,
        )
        .expect("stage");
        assert!(path_model.join("artifacts/model.pkl").exists());
    }
}
