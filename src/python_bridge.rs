/// Python-Rust Bridge using PyO3
/// Registers the CogVideo nodes with a Python node-graph host

#[cfg(feature = "python-bindings")]
mod python_bindings {
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::{PyDict, PyTuple, PyType};

    use crate::error::{CogVideoError, ErrorKind};
    use crate::nodes::{self, CogVideoStatus, CogVideoUploader, NodeSpec, SocketType};
    use crate::{Config, ImageTensor};

    fn to_py_err(err: CogVideoError) -> PyErr {
        match err.kind() {
            ErrorKind::InvalidInput | ErrorKind::Configuration => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }

    fn socket_name(socket: SocketType) -> &'static str {
        match socket {
            SocketType::Image => "IMAGE",
            SocketType::String => "STRING",
        }
    }

    /// Read an IMAGE input: a torch tensor or numpy array with a `shape`
    fn extract_image(image: &Bound<'_, PyAny>) -> PyResult<ImageTensor> {
        let shape: Vec<i64> = image.getattr("shape")?.extract()?;

        let mut array = image.clone();
        for method in ["detach", "cpu", "numpy"] {
            if array.hasattr(method)? {
                array = array.call_method0(method)?;
            }
        }
        let values: Vec<f64> = array
            .call_method1("reshape", (-1,))?
            .call_method0("tolist")?
            .extract()?;

        ImageTensor::from_host_array(&shape, values).map_err(to_py_err)
    }

    /// `{"required": {name: (TYPE, {options})}}`
    fn input_types<'py>(py: Python<'py>, spec: &NodeSpec) -> PyResult<Bound<'py, PyDict>> {
        let required = PyDict::new_bound(py);
        for input in &spec.inputs {
            let options = PyDict::new_bound(py);
            if let Some(default) = input.default {
                options.set_item("default", default)?;
            }
            if input.multiline {
                options.set_item("multiline", true)?;
            }
            let entry = PyTuple::new_bound(py, [socket_name(input.socket).into_py(py), options.into_py(py)]);
            required.set_item(input.name, entry)?;
        }

        let dict = PyDict::new_bound(py);
        dict.set_item("required", required)?;
        Ok(dict)
    }

    /// Image-to-video node
    #[pyclass(name = "CogVideoUploader")]
    pub struct PyCogVideoUploader {
        node: CogVideoUploader,
    }

    #[pymethods]
    impl PyCogVideoUploader {
        #[classattr]
        const RETURN_TYPES: (&'static str,) = ("STRING",);
        #[classattr]
        const RETURN_NAMES: (&'static str,) = ("video_path",);
        #[classattr]
        const FUNCTION: &'static str = "generate_video";
        #[classattr]
        const CATEGORY: &'static str = nodes::NODE_CATEGORY;

        #[new]
        fn new() -> PyResult<Self> {
            let config = Config::load().unwrap_or_else(|_| Config::from_env());
            Ok(Self {
                node: CogVideoUploader::new(config).map_err(to_py_err)?,
            })
        }

        #[classmethod]
        #[allow(non_snake_case)]
        fn INPUT_TYPES<'py>(_cls: &Bound<'py, PyType>, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
            input_types(py, &CogVideoUploader::spec())
        }

        /// Called by the host with the keyword inputs from `INPUT_TYPES`
        #[pyo3(signature = (image, prompt = nodes::DEFAULT_PROMPT.to_string(), bearer_token = String::new()))]
        fn generate_video(
            &self,
            py: Python<'_>,
            image: &Bound<'_, PyAny>,
            prompt: String,
            bearer_token: String,
        ) -> PyResult<(String,)> {
            let image = extract_image(image)?;
            let path = py
                .allow_threads(|| self.node.generate_video(&image, &prompt, &bearer_token))
                .map_err(to_py_err)?;
            Ok((path,))
        }
    }

    /// Raw job status node
    #[pyclass(name = "CogVideoStatus")]
    pub struct PyCogVideoStatus {
        node: CogVideoStatus,
    }

    #[pymethods]
    impl PyCogVideoStatus {
        #[classattr]
        const RETURN_TYPES: (&'static str,) = ("STRING",);
        #[classattr]
        const RETURN_NAMES: (&'static str,) = ("status",);
        #[classattr]
        const FUNCTION: &'static str = "check_status";
        #[classattr]
        const CATEGORY: &'static str = nodes::NODE_CATEGORY;

        #[new]
        fn new() -> PyResult<Self> {
            let config = Config::load().unwrap_or_else(|_| Config::from_env());
            Ok(Self {
                node: CogVideoStatus::new(config).map_err(to_py_err)?,
            })
        }

        #[classmethod]
        #[allow(non_snake_case)]
        fn INPUT_TYPES<'py>(_cls: &Bound<'py, PyType>, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
            input_types(py, &CogVideoStatus::spec())
        }

        fn check_status(&self, py: Python<'_>, chat_id: String) -> PyResult<(String,)> {
            let status = py
                .allow_threads(|| self.node.check_status(&chat_id))
                .map_err(to_py_err)?;
            Ok((status,))
        }
    }

    /// Module initialization
    #[pymodule]
    fn cogvideo_nodes(m: &Bound<'_, PyModule>) -> PyResult<()> {
        let py = m.py();
        m.add_class::<PyCogVideoUploader>()?;
        m.add_class::<PyCogVideoStatus>()?;

        let class_mappings = PyDict::new_bound(py);
        let display_names = PyDict::new_bound(py);
        class_mappings.set_item("CogVideoUploader", py.get_type_bound::<PyCogVideoUploader>())?;
        class_mappings.set_item("CogVideoStatus", py.get_type_bound::<PyCogVideoStatus>())?;
        for spec in nodes::node_class_mappings() {
            display_names.set_item(spec.class_name, spec.display_name)?;
        }
        m.add("NODE_CLASS_MAPPINGS", class_mappings)?;
        m.add("NODE_DISPLAY_NAME_MAPPINGS", display_names)?;

        // Add version info
        m.add("__version__", env!("CARGO_PKG_VERSION"))?;

        Ok(())
    }
}

#[cfg(feature = "python-bindings")]
pub use python_bindings::*;
