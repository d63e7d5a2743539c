use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pyo3::exceptions::{
    PyConnectionError, PyFileExistsError, PyFileNotFoundError, PyOSError, PyPermissionError,
    PyValueError,
};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use stagekit_io_fs::{
    ArtifactStore, EnumErrorKind, EventSink, RegistryError, ReportCopy, ReportFlatten,
    SpecEvent, SpecFsError, SpecModelCoordinate, SpecMountPolicy, SpecMountRule,
    SpecStageOptions, TracingSink, copy_tree, flatten_tree, stage_model,
};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "stagekit.fs.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

const C_MLFLOW_ARTIFACTS_MODULE: &str = "mlflow.artifacts";
const C_MLFLOW_DOWNLOAD_FN: &str = "download_artifacts";

#[pyclass(name = "SpecFsError")]
#[derive(Debug, Clone)]
struct PySpecFsError {
    #[pyo3(get)]
    path: String,
    #[pyo3(get)]
    exception: String,
}

impl From<SpecFsError> for PySpecFsError {
    fn from(spec_error: SpecFsError) -> Self {
        Self {
            path: spec_error.path.to_string_lossy().to_string(),
            exception: spec_error.exception,
        }
    }
}

#[pyclass(name = "ReportCopy")]
#[derive(Debug, Clone)]
struct PyReportCopy {
    #[pyo3(get)]
    cnt_dirs_created: u64,
    #[pyo3(get)]
    cnt_files_copied: u64,
    #[pyo3(get)]
    n_bytes_copied: u64,
    #[pyo3(get)]
    warnings: Vec<String>,
}

impl From<ReportCopy> for PyReportCopy {
    fn from(report_copy: ReportCopy) -> Self {
        Self {
            cnt_dirs_created: report_copy.cnt_dirs_created,
            cnt_files_copied: report_copy.cnt_files_copied,
            n_bytes_copied: report_copy.n_bytes_copied,
            warnings: report_copy.warnings,
        }
    }
}

impl PyReportCopy {
    fn to_report(&self) -> ReportCopy {
        ReportCopy {
            cnt_dirs_created: self.cnt_dirs_created,
            cnt_files_copied: self.cnt_files_copied,
            n_bytes_copied: self.n_bytes_copied,
            warnings: self.warnings.clone(),
        }
    }
}

#[pymethods]
impl PyReportCopy {
    #[getter]
    fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn to_dict(&self) -> BTreeMap<String, u64> {
        self.to_report().to_dict()
    }

    #[pyo3(signature = (prefix = "[COPY]"))]
    fn format(&self, prefix: &str) -> String {
        self.to_report().format(prefix)
    }

    fn __str__(&self) -> String {
        self.format("[COPY]")
    }
}

#[pyclass(name = "ReportFlatten")]
#[derive(Debug, Clone)]
struct PyReportFlatten {
    #[pyo3(get)]
    cnt_files_moved: u64,
    #[pyo3(get)]
    cnt_files_renamed: u64,
    #[pyo3(get)]
    cnt_dirs_removed: u64,
    #[pyo3(get)]
    warnings: Vec<String>,
    #[pyo3(get)]
    errors: Vec<PySpecFsError>,
}

impl From<ReportFlatten> for PyReportFlatten {
    fn from(report_flatten: ReportFlatten) -> Self {
        Self {
            cnt_files_moved: report_flatten.cnt_files_moved,
            cnt_files_renamed: report_flatten.cnt_files_renamed,
            cnt_dirs_removed: report_flatten.cnt_dirs_removed,
            warnings: report_flatten.warnings,
            errors: report_flatten
                .errors
                .into_iter()
                .map(PySpecFsError::from)
                .collect(),
        }
    }
}

impl PyReportFlatten {
    fn to_report(&self) -> ReportFlatten {
        ReportFlatten {
            cnt_files_moved: self.cnt_files_moved,
            cnt_files_renamed: self.cnt_files_renamed,
            cnt_dirs_removed: self.cnt_dirs_removed,
            warnings: self.warnings.clone(),
            errors: self
                .errors
                .iter()
                .map(|e| SpecFsError {
                    path: PathBuf::from(&e.path),
                    exception: e.exception.clone(),
                })
                .collect(),
        }
    }
}

#[pymethods]
impl PyReportFlatten {
    #[getter]
    fn error_count(&self) -> usize {
        self.errors.len()
    }

    #[getter]
    fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn to_dict(&self) -> BTreeMap<String, u64> {
        self.to_report().to_dict()
    }

    #[pyo3(signature = (prefix = "[FLATTEN]"))]
    fn format(&self, prefix: &str) -> String {
        self.to_report().format(prefix)
    }

    fn __str__(&self) -> String {
        self.format("[FLATTEN]")
    }
}

/// Forwards events to a Python `logger(level, message, path, kind)` callable.
struct PyCallbackSink {
    callable: Py<PyAny>,
}

impl EventSink for PyCallbackSink {
    fn emit(&self, event: &SpecEvent) {
        Python::with_gil(|py| {
            // A failing logger must not abort the filesystem operation.
            if let Err(e) = self.callable.call1(py, event.to_record()) {
                e.print(py);
            }
        });
    }
}

fn build_sink(logger: Option<PyObject>) -> Box<dyn EventSink> {
    match logger {
        Some(callable) => Box::new(PyCallbackSink { callable }),
        None => Box::new(TracingSink),
    }
}

/// Calls `download_artifacts(artifact_uri=..., dst_path=...)`.
struct PyArtifactStore {
    callable: Py<PyAny>,
}

impl ArtifactStore for PyArtifactStore {
    fn download_artifacts(
        &self,
        model_uri: &str,
        dir_destination: &Path,
    ) -> Result<(), RegistryError> {
        Python::with_gil(|py| {
            let res_call = (|| -> PyResult<()> {
                let kwargs = PyDict::new(py);
                kwargs.set_item("artifact_uri", model_uri)?;
                kwargs.set_item("dst_path", dir_destination.to_string_lossy().into_owned())?;
                self.callable.call(py, (), Some(&kwargs))?;
                Ok(())
            })();
            res_call.map_err(|exception| map_download_error(py, model_uri, exception))
        })
    }
}

/// Classify a Python download failure, honouring MLflow's `error_code`.
fn map_download_error(py: Python<'_>, model_uri: &str, exception: PyErr) -> RegistryError {
    let c_error_code = exception
        .value(py)
        .getattr("error_code")
        .and_then(|v| v.extract::<String>())
        .unwrap_or_default();
    let message = exception.to_string();

    if exception.is_instance_of::<PyFileNotFoundError>(py)
        || c_error_code == "RESOURCE_DOES_NOT_EXIST"
    {
        return RegistryError::ModelNotFound {
            model_uri: model_uri.to_string(),
        };
    }
    if exception.is_instance_of::<PyPermissionError>(py) || c_error_code == "PERMISSION_DENIED" {
        return RegistryError::AccessDenied {
            model_uri: model_uri.to_string(),
            message,
        };
    }
    RegistryError::Transport {
        model_uri: model_uri.to_string(),
        message,
    }
}

fn resolve_download_callable(
    py: Python<'_>,
    download_artifacts: Option<PyObject>,
) -> PyResult<PyObject> {
    match download_artifacts {
        Some(callable) => Ok(callable),
        None => Ok(PyModule::import(py, C_MLFLOW_ARTIFACTS_MODULE)?
            .getattr(C_MLFLOW_DOWNLOAD_FN)?
            .unbind()),
    }
}

fn map_error(kind: EnumErrorKind, message: String) -> PyErr {
    match kind {
        EnumErrorKind::NotFound => PyFileNotFoundError::new_err(message),
        EnumErrorKind::Conflict => PyFileExistsError::new_err(message),
        EnumErrorKind::InvalidInput => PyValueError::new_err(message),
        EnumErrorKind::Transport => PyConnectionError::new_err(message),
        EnumErrorKind::Io => PyOSError::new_err(message),
    }
}

#[pyfunction(name = "copy_tree")]
#[pyo3(signature = (dir_source, dir_destination, logger = None))]
fn copy_tree_py(
    py: Python<'_>,
    dir_source: String,
    dir_destination: String,
    logger: Option<PyObject>,
) -> PyResult<PyReportCopy> {
    let sink = build_sink(logger);
    let report_copy = py.allow_threads(|| copy_tree(&dir_source, &dir_destination, sink.as_ref()));
    let report_copy = report_copy.map_err(|e| map_error(e.kind(), e.to_string()))?;
    Ok(PyReportCopy::from(report_copy))
}

#[pyfunction(name = "flatten_folder")]
#[pyo3(signature = (root_folder, logger = None))]
fn flatten_folder_py(
    py: Python<'_>,
    root_folder: String,
    logger: Option<PyObject>,
) -> PyResult<PyReportFlatten> {
    let sink = build_sink(logger);
    let report_flatten = py.allow_threads(|| flatten_tree(&root_folder, sink.as_ref()));
    let report_flatten = report_flatten.map_err(|e| map_error(e.kind(), e.to_string()))?;
    Ok(PyReportFlatten::from(report_flatten))
}

#[pyfunction(name = "stage_registered_model")]
#[pyo3(signature = (
    *,
    catalog,
    schema,
    model_name,
    version,
    local_base_path,
    overwrite = false,
    download_artifacts = None,
    logger = None,
    mount_rules = None
))]
#[allow(clippy::too_many_arguments)]
fn stage_registered_model_py(
    py: Python<'_>,
    catalog: String,
    schema: String,
    model_name: String,
    version: u64,
    local_base_path: String,
    overwrite: bool,
    download_artifacts: Option<PyObject>,
    logger: Option<PyObject>,
    mount_rules: Option<Vec<(String, String)>>,
) -> PyResult<String> {
    let coordinate = SpecModelCoordinate::new(catalog, schema, model_name, version);
    let mount_policy = match mount_rules {
        Some(l_rules) => SpecMountPolicy::with_rules(
            l_rules
                .into_iter()
                .map(|(mount_root, scratch_root)| SpecMountRule::new(mount_root, scratch_root))
                .collect(),
        ),
        None => SpecMountPolicy::default(),
    };
    let spec_stage_options = SpecStageOptions {
        if_overwrite: overwrite,
        storage_policy: Arc::new(mount_policy),
    };
    let store = PyArtifactStore {
        callable: resolve_download_callable(py, download_artifacts)?,
    };
    let sink = build_sink(logger);

    let path_model = py.allow_threads(|| {
        stage_model(
            &coordinate,
            &local_base_path,
            &spec_stage_options,
            &store,
            sink.as_ref(),
        )
    });
    let path_model = path_model.map_err(|e| map_error(e.kind(), e.to_string()))?;
    Ok(path_model.to_string_lossy().into_owned())
}

#[pymodule]
fn _stagekit_io_fs_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PySpecFsError>()?;
    module.add_class::<PyReportCopy>()?;
    module.add_class::<PyReportFlatten>()?;
    module.add_function(wrap_pyfunction!(copy_tree_py, module)?)?;
    module.add_function(wrap_pyfunction!(flatten_folder_py, module)?)?;
    module.add_function(wrap_pyfunction!(stage_registered_model_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
