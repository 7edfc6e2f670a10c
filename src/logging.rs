//! Log setup.
//!
//! The library only emits through the `log` facade. Binaries call
//! [`init_rust_logging`]; the Python extension installs a bridge that hands
//! records to the `logging` module instead (feature `python`).

use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

static RUST_LOG_ONCE: Once = Once::new();

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "ADS8684_LOG";

fn env_level() -> LevelFilter {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .as_deref()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

fn level_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

/// Parse a level name, ignoring case. Unknown names yield `None`.
pub fn parse_level(input: Option<&str>) -> Option<LevelFilter> {
    input.and_then(|s| s.parse::<LevelFilter>().ok())
}

/// Initialize logging for Rust binaries (stderr formatter) based on
/// `ADS8684_LOG`/`RUST_LOG`, or `verbosity` when given.
pub fn init_rust_logging(verbosity: Option<LevelFilter>) {
    let level = verbosity.unwrap_or_else(env_level);
    RUST_LOG_ONCE.call_once(|| {
        let env = Env::default().default_filter_or(level_to_str(level));
        let mut builder = env_logger::Builder::from_env(env);
        builder
            .format_timestamp_millis()
            .format_module_path(true)
            .format_target(false);
        if verbosity.is_some() {
            builder.filter_level(level);
        }
        builder.init();
    });
}

#[cfg(feature = "python")]
pub use bridge::{init_python_logging, reset_python_logging_cache, set_python_log_level};

#[cfg(feature = "python")]
mod bridge {
    use std::collections::HashMap;
    use std::sync::{Mutex, Once};

    use log::{LevelFilter, Log, Metadata, Record};
    use once_cell::sync::OnceCell;
    use pyo3::prelude::*;
    use pyo3::types::{PyAny, PyModule, PyTuple};

    use super::env_level;

    static PY_LOG_ONCE: Once = Once::new();
    static PY_LOGGER: OnceCell<&'static PyLogger> = OnceCell::new();

    struct PyLogger {
        top_filter: Mutex<LevelFilter>,
        logging_mod: Py<PyModule>,
        cache: Mutex<HashMap<String, (LevelFilter, Py<PyAny>)>>, // target -> (effective_level, logger)
    }

    impl PyLogger {
        fn new(py: Python<'_>, top_filter: LevelFilter) -> PyResult<Self> {
            let logging = py.import("logging")?;
            Ok(Self {
                top_filter: Mutex::new(top_filter),
                logging_mod: logging.into(),
                cache: Mutex::new(HashMap::new()),
            })
        }

        fn top(&self) -> LevelFilter {
            self.top_filter
                .lock()
                .map(|lf| *lf)
                .unwrap_or(LevelFilter::Off)
        }

        fn map_level(level: log::Level) -> usize {
            match level {
                log::Level::Error => 40,
                log::Level::Warn => 30,
                log::Level::Info => 20,
                log::Level::Debug => 10,
                log::Level::Trace => 5,
            }
        }

        fn extract_max_level(logger: &Bound<'_, PyAny>) -> PyResult<LevelFilter> {
            use log::Level::*;
            for l in &[Trace, Debug, Info, Warn, Error] {
                let enabled = logger
                    .call_method1("isEnabledFor", (Self::map_level(*l),))?
                    .is_truthy()?;
                if enabled {
                    return Ok(l.to_level_filter());
                }
            }
            Ok(LevelFilter::Off)
        }

        /// Look up (or create and cache) the Python logger for `target`.
        fn logger_for(&self, py: Python<'_>, target: &str) -> Option<(LevelFilter, Py<PyAny>)> {
            let mut cache = self.cache.lock().ok()?;
            if let Some((level, logger)) = cache.get(target) {
                return Some((*level, logger.clone_ref(py)));
            }
            let logging = self.logging_mod.bind(py);
            let logger = match logging.getattr("getLogger").and_then(|f| f.call1((target,))) {
                Ok(l) => l,
                Err(e) => {
                    e.restore(py);
                    return None;
                }
            };
            let max_level = Self::extract_max_level(&logger).unwrap_or(LevelFilter::Off);
            let owned = logger.unbind();
            cache.insert(target.to_string(), (max_level, owned.clone_ref(py)));
            Some((max_level, owned))
        }

        fn log_record(&self, record: &Record) {
            let target = record.target().replace("::", ".");
            Python::attach(|py| {
                let Some((enabled_level, logger)) = self.logger_for(py, &target) else {
                    return;
                };
                let level = record.level().to_level_filter();
                if level > enabled_level || level > self.top() {
                    return;
                }

                let logger = logger.bind(py);
                let none = py.None();
                let made = logger.call_method1(
                    "makeRecord",
                    (
                        &target,
                        Self::map_level(record.level()),
                        record.file(),
                        record.line().unwrap_or_default(),
                        format!("{}", record.args()),
                        PyTuple::empty(py),
                        &none, // exc_info
                        &none, // func
                        &none, // extra
                    ),
                );
                let handled = made.and_then(|rec| logger.call_method1("handle", (rec,)));
                if let Err(e) = handled {
                    e.restore(py);
                }
            });
        }
    }

    impl Log for PyLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level().to_level_filter() <= self.top()
        }

        fn log(&self, record: &Record) {
            self.log_record(record);
        }

        fn flush(&self) {}
    }

    /// Install the bridge so Rust logs flow into Python's `logging`.
    /// Safe to call multiple times; a logger is installed on first call.
    pub fn init_python_logging(py: Python<'_>) -> PyResult<()> {
        let level = env_level();
        PY_LOG_ONCE.call_once(|| match PyLogger::new(py, level) {
            Ok(logger) => {
                let leaked: &'static PyLogger = Box::leak(Box::new(logger));
                if log::set_logger(leaked).is_ok() {
                    log::set_max_level(level);
                    let _ = PY_LOGGER.set(leaked);
                }
            }
            Err(e) => e.restore(py),
        });
        Ok(())
    }

    /// Forget cached per-target loggers (call after changing Python logging config).
    pub fn reset_python_logging_cache() {
        if let Some(logger) = PY_LOGGER.get() {
            if let Ok(mut cache) = logger.cache.lock() {
                cache.clear();
            }
        }
    }

    /// Set the minimum level forwarded to Python.
    pub fn set_python_log_level(py: Python<'_>, level: LevelFilter) -> PyResult<()> {
        init_python_logging(py)?;
        if let Some(logger) = PY_LOGGER.get() {
            if let Ok(mut lf) = logger.top_filter.lock() {
                *lf = level;
            }
            reset_python_logging_cache();
        }
        log::set_max_level(level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_round_trip() {
        for level in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
            LevelFilter::Trace,
        ] {
            assert_eq!(parse_level(Some(level_to_str(level))), Some(level));
        }
    }

    #[test]
    fn unknown_level_is_none() {
        assert_eq!(parse_level(Some("loud")), None);
        assert_eq!(parse_level(None), None);
        assert_eq!(parse_level(Some("DEBUG")), Some(LevelFilter::Debug));
    }
}
