//! Configuration for a line

use crate::core::{LineError, Result};

/// Smallest stack accepted for worker threads
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Configuration for a [`Line`](crate::Line)
///
/// ```rust
/// use assembly_line::LineConfig;
///
/// let config = LineConfig::new("ingest")
///     .with_trim_threshold(256)
///     .with_worker_stack_size(256 * 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct LineConfig {
    /// Prefix for coordinator and worker thread names, and the log label
    pub name: String,
    /// Catch task panics so the worker still reports completion.
    /// Default: true
    pub catch_panics: bool,
    /// Compact a group's queue storage every this many pops (0 = never).
    /// Default: 1024
    pub trim_threshold: usize,
    /// Stack size for worker threads (None = platform default)
    pub worker_stack_size: Option<usize>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            name: "line".to_string(),
            catch_panics: true,
            trim_threshold: 1024,
            worker_stack_size: None,
        }
    }
}

impl LineConfig {
    /// Create a configuration with the given name and defaults otherwise
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable panic isolation around task execution
    ///
    /// With panics uncaught, a panicking task unwinds its worker thread and
    /// the panic reaches the panic hook as an ordinary thread panic. The
    /// slot is still returned and the task is counted as panicked.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }

    /// Set the queue compaction period
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_trim_threshold(mut self, pops: usize) -> Self {
        self.trim_threshold = pops;
        self
    }

    /// Set the worker thread stack size in bytes
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LineError::invalid_config("name", "Line name must not be empty"));
        }
        if self.name.contains('\0') {
            return Err(LineError::invalid_config(
                "name",
                "Line name must not contain NUL bytes",
            ));
        }
        if let Some(bytes) = self.worker_stack_size {
            if bytes < MIN_STACK_SIZE {
                return Err(LineError::invalid_config(
                    "worker_stack_size",
                    format!("stack size must be at least {} bytes, got {}", MIN_STACK_SIZE, bytes),
                ));
            }
        }
        Ok(())
    }
}
