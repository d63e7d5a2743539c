//! Registry seam: the opaque "download artifacts for a model URI" operation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::copy::copy_tree;
use crate::event::{EventSink, TracingSink};
use crate::spec::{RegistryError, SpecModelCoordinate};

/// Scheme prefix of registered-model URIs.
pub const C_MODEL_URI_SCHEME: &str = "models:/";

/// External artifact store.
///
/// `download_artifacts` must leave `dir_destination` populated with the
/// model's files or return an error. The destination directory exists when
/// the call is made. Closures with the same signature are stores too.
pub trait ArtifactStore: Send + Sync {
    fn download_artifacts(&self, model_uri: &str, dir_destination: &Path)
    -> Result<(), RegistryError>;
}

impl<F> ArtifactStore for F
where
    F: Fn(&str, &Path) -> Result<(), RegistryError> + Send + Sync,
{
    fn download_artifacts(
        &self,
        model_uri: &str,
        dir_destination: &Path,
    ) -> Result<(), RegistryError> {
        self(model_uri, dir_destination)
    }
}

/// Parse `models:/{catalog}.{schema}.{model_name}/{version}`.
pub fn parse_model_uri(model_uri: &str) -> Result<SpecModelCoordinate, RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidModelUri(format!("{model_uri} ({reason})"));

    let rest = model_uri
        .strip_prefix(C_MODEL_URI_SCHEME)
        .ok_or_else(|| invalid("expected `models:/` prefix"))?;
    let (name_full, version) = rest
        .rsplit_once('/')
        .ok_or_else(|| invalid("missing `/version`"))?;
    let version = version
        .parse::<u64>()
        .map_err(|_| invalid("version must be a non-negative integer"))?;

    let l_parts: Vec<&str> = name_full.split('.').collect();
    let [catalog, schema, model_name] = l_parts.as_slice() else {
        return Err(invalid("expected `catalog.schema.model_name`"));
    };
    let coordinate = SpecModelCoordinate::new(*catalog, *schema, *model_name, version);
    coordinate.validate().map_err(|reason| invalid(&reason))?;
    Ok(coordinate)
}

/// Store backed by a registry export on disk, laid out as
/// `dir_root/catalog/schema/model_name/version/...`.
///
/// Per-file copy events go to `sink` (tracing unless replaced).
#[derive(Clone)]
pub struct LocalMirrorArtifactStore {
    pub dir_root: PathBuf,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for LocalMirrorArtifactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMirrorArtifactStore")
            .field("dir_root", &self.dir_root)
            .finish_non_exhaustive()
    }
}

impl LocalMirrorArtifactStore {
    pub fn new(dir_root: impl Into<PathBuf>) -> Self {
        Self {
            dir_root: dir_root.into(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Directory holding the artifacts of `coordinate`.
    pub fn resolve(&self, coordinate: &SpecModelCoordinate) -> PathBuf {
        self.dir_root.join(coordinate.relative_path())
    }
}

impl ArtifactStore for LocalMirrorArtifactStore {
    fn download_artifacts(
        &self,
        model_uri: &str,
        dir_destination: &Path,
    ) -> Result<(), RegistryError> {
        let coordinate = parse_model_uri(model_uri)?;
        let path_dir_src = self.resolve(&coordinate);
        if !path_dir_src.is_dir() {
            return Err(RegistryError::ModelNotFound {
                model_uri: model_uri.to_string(),
            });
        }

        copy_tree(&path_dir_src, dir_destination, self.sink.as_ref()).map_err(|e| {
            RegistryError::Transport {
                model_uri: model_uri.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::{ArtifactStore, LocalMirrorArtifactStore, parse_model_uri};
    use crate::event::{EnumEventKind, RecordingSink};
    use crate::spec::{EnumErrorKind, RegistryError, SpecModelCoordinate};

    #[test]
    fn parse_model_uri_round_trips_coordinate() {
        let coordinate = SpecModelCoordinate::new("main", "ml", "churn", 12);
        assert_eq!(parse_model_uri(&coordinate.model_uri()).expect("parse"), coordinate);
    }

    #[test]
    fn parse_model_uri_rejects_malformed_input() {
        for model_uri in [
            "runs:/abc/model",
            "models:/main.ml.churn",
            "models:/main.ml.churn/latest",
            "models:/main.ml.churn/-1",
            "models:/ml.churn/1",
            "models:/a.b.c.d/1",
            "models:/main..churn/1",
        ] {
            let err = parse_model_uri(model_uri).expect_err(model_uri);
            assert!(matches!(err, RegistryError::InvalidModelUri(_)), "{model_uri}");
            assert_eq!(err.kind(), EnumErrorKind::InvalidInput);
        }
    }

    #[test]
    fn local_mirror_copies_version_directory() {
        let tmp = TempDir::new().expect("tempdir");
        let mirror = tmp.path().join("mirror");
        let path_version = mirror.join("main/ml/churn/3");
        fs::create_dir_all(path_version.join("artifacts")).expect("mkdir");
        fs::write(path_version.join("MLmodel"), "flavors").expect("write");
        fs::write(path_version.join("artifacts/model.pkl"), "w").expect("write");

        let dst = tmp.path().join("dst");
        fs::create_dir_all(&dst).expect("mkdir");
        let store = LocalMirrorArtifactStore::new(&mirror);
        store
            .download_artifacts("models:/main.ml.churn/3", &dst)
            .expect("download");

        assert_eq!(fs::read_to_string(dst.join("MLmodel")).expect("read"), "flavors");
        assert!(dst.join("artifacts/model.pkl").exists());
    }

    #[test]
    fn local_mirror_reports_copies_to_its_sink() {
        let tmp = TempDir::new().expect("tempdir");
        let mirror = tmp.path().join("mirror");
        fs::create_dir_all(mirror.join("main/ml/churn/3")).expect("mkdir");
        fs::write(mirror.join("main/ml/churn/3/MLmodel"), "flavors").expect("write");

        let dst = tmp.path().join("dst");
        fs::create_dir_all(&dst).expect("mkdir");
        let sink = Arc::new(RecordingSink::new());
        let store = LocalMirrorArtifactStore::new(&mirror).with_sink(sink.clone());
        store
            .download_artifacts("models:/main.ml.churn/3", &dst)
            .expect("download");

        let l_copied = sink.of_kind(EnumEventKind::FileCopied);
        assert_eq!(l_copied.len(), 1);
        assert_eq!(l_copied[0].path, dst.join("MLmodel"));
    }

    #[test]
    fn local_mirror_reports_missing_version() {
        let tmp = TempDir::new().expect("tempdir");
        let store = LocalMirrorArtifactStore::new(tmp.path());
        let err = store
            .download_artifacts("models:/main.ml.churn/9", Path::new("/unused"))
            .expect_err("missing version");
        assert!(matches!(err, RegistryError::ModelNotFound { .. }));
        assert_eq!(err.kind(), EnumErrorKind::NotFound);
    }
}
