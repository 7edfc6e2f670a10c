//! Python bindings.
//!
//! Exposes the driver under the method names of the original Python support
//! library (`status`, `chans`, `ranges`, `readTextMode`, `readBinaryMode`,
//! `reset`, `close`), plus snake_case aliases.

use std::time::Duration;

use pyo3::exceptions::{PyConnectionError, PyIOError, PyTimeoutError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyList;

use crate::ads8684::{Ads8684, SerialConfig, DEFAULT_TIMEOUT};
use crate::decode::Samples;
use crate::errors::DriverError;
use crate::logging;
use crate::protocol::Response;

impl From<DriverError> for PyErr {
    fn from(e: DriverError) -> Self {
        let msg = e.to_string();
        match e {
            DriverError::Timeout(_) => PyTimeoutError::new_err(msg),
            DriverError::Parse(_) | DriverError::Protocol(_) | DriverError::Framing(_) => {
                PyValueError::new_err(msg)
            }
            DriverError::Closed => PyConnectionError::new_err(msg),
            DriverError::Io(_) | DriverError::Serial(_) => PyIOError::new_err(msg),
        }
    }
}

/// Convert a device reply into a Python dict via the `json` module.
fn to_py<'py>(py: Python<'py>, response: &Response) -> PyResult<Bound<'py, PyAny>> {
    let text = serde_json::to_string(response).map_err(DriverError::from)?;
    py.import("json")?.call_method1("loads", (text,))
}

/// ADS8684 fast-readout board.
///
/// Example:
///     >>> ads = Ads8684("/dev/ttyACM0")
///     >>> ads.chans([0, 1, 2, 3])
///     >>> y = ads.readBinaryMode(100)
///     >>> ads.close()
#[pyclass(name = "Ads8684", unsendable)]
struct PyAds8684 {
    inner: Ads8684,
}

#[pymethods]
impl PyAds8684 {
    /// Open `port` (`COMx` on Windows, `/dev/ttyACM0` on Linux).
    ///
    /// Args:
    ///     port: Serial port name.
    ///     timeout: Per-read timeout in seconds. Default: 5.
    #[new]
    #[pyo3(signature = (port, timeout=None))]
    fn new(port: &str, timeout: Option<f64>) -> PyResult<Self> {
        let timeout = match timeout {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|e| PyValueError::new_err(format!("invalid timeout: {e}")))?,
            None => DEFAULT_TIMEOUT,
        };
        let config = SerialConfig::new(port).with_timeout(timeout);
        Ok(PyAds8684 {
            inner: Ads8684::open_with(&config)?,
        })
    }

    fn close(&mut self) {
        self.inner.close();
    }

    #[getter]
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// True if the last call failed mid-reply; call reset() before continuing.
    #[getter]
    fn is_desynced(&self) -> bool {
        self.inner.is_desynced()
    }

    /// Get verbose status from the device.
    fn status<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        let reply = self.inner.status()?;
        to_py(py, &reply)
    }

    /// Set the list of channels to use, e.g. [0, 1, 2, 3].
    ///
    /// Values are forwarded to the device unchecked, but each must fit in
    /// 0-255; larger or negative values raise OverflowError before anything
    /// is sent.
    fn chans<'py>(&mut self, py: Python<'py>, chans: Vec<u8>) -> PyResult<Bound<'py, PyAny>> {
        let reply = self.inner.chans(&chans)?;
        to_py(py, &reply)
    }

    /// Set the range number of each channel (0-4).
    ///
    /// Values are forwarded to the device unchecked, but each must fit in
    /// 0-255; larger or negative values raise OverflowError before anything
    /// is sent.
    fn ranges<'py>(&mut self, py: Python<'py>, ranges: Vec<u8>) -> PyResult<Bound<'py, PyAny>> {
        let reply = self.inner.ranges(&ranges)?;
        to_py(py, &reply)
    }

    /// Read `npts` points in text mode, strictly for troubleshooting.
    ///
    /// Returns:
    ///     Status dict with a `data` entry.
    #[pyo3(name = "readTextMode")]
    fn read_text_mode_camel<'py>(
        &mut self,
        py: Python<'py>,
        npts: u32,
    ) -> PyResult<Bound<'py, PyAny>> {
        self.read_text_mode(py, npts)
    }

    fn read_text_mode<'py>(&mut self, py: Python<'py>, npts: u32) -> PyResult<Bound<'py, PyAny>> {
        let reply = self.inner.read_text_mode(npts)?;
        to_py(py, &reply)
    }

    /// Read `npts` points in binary mode.
    ///
    /// Args:
    ///     npts: Number of points to read.
    ///     volts: Scale to Volts (default) or return raw codes.
    ///
    /// Returns:
    ///     One list per active channel.
    #[pyo3(name = "readBinaryMode", signature = (npts, volts=true))]
    fn read_binary_mode_camel<'py>(
        &mut self,
        py: Python<'py>,
        npts: u32,
        volts: bool,
    ) -> PyResult<Bound<'py, PyList>> {
        self.read_binary_mode(py, npts, volts)
    }

    #[pyo3(signature = (npts, volts=true))]
    fn read_binary_mode<'py>(
        &mut self,
        py: Python<'py>,
        npts: u32,
        volts: bool,
    ) -> PyResult<Bound<'py, PyList>> {
        match self.inner.read_binary_mode(npts, volts)? {
            Samples::Volts(rows) => PyList::new(py, rows),
            Samples::Codes(rows) => PyList::new(py, rows),
        }
    }

    /// Reset the device.
    fn reset<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        let reply = self.inner.reset()?;
        to_py(py, &reply)
    }

    fn __repr__(&self) -> String {
        format!("Ads8684(open={})", self.inner.is_open())
    }
}

/// Route Rust log records into Python `logging`.
///
/// Args:
///     level: Optional minimum level name ("debug", "info", ...). Defaults to
///         ADS8684_LOG / RUST_LOG, or "info".
#[pyfunction]
#[pyo3(signature = (level=None))]
fn init_logging(py: Python<'_>, level: Option<&str>) -> PyResult<()> {
    logging::init_python_logging(py)?;
    if let Some(lvl) = logging::parse_level(level) {
        logging::set_python_log_level(py, lvl)?;
    }
    Ok(())
}

/// Change the minimum level forwarded to Python.
#[pyfunction]
fn set_log_level(py: Python<'_>, level: &str) -> PyResult<()> {
    let lvl = logging::parse_level(Some(level))
        .ok_or_else(|| PyValueError::new_err(format!("unknown log level {level:?}")))?;
    logging::set_python_log_level(py, lvl)
}

/// Drop cached per-target Python loggers after reconfiguring `logging`.
#[pyfunction]
fn reset_logging_cache() {
    logging::reset_python_logging_cache();
}

#[pymodule]
fn ads8684(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyAds8684>()?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    m.add_function(wrap_pyfunction!(set_log_level, m)?)?;
    m.add_function(wrap_pyfunction!(reset_logging_cache, m)?)?;

    m.add("INTERNAL_VREF", crate::calibration::INTERNAL_VREF)?;
    m.add("NUM_RANGES", crate::calibration::NUM_RANGES)?;
    Ok(())
}
