//! Error types for the assembly line

use uuid::Uuid;

/// Result type for assembly line operations
pub type Result<T> = std::result::Result<T, LineError>;

/// Errors that can occur while operating a line
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LineError {
    /// `start` was called on a line that already has a coordinator
    #[error("Line {line_id} is already started")]
    AlreadyStarted {
        /// Identifier of the line
        line_id: Uuid,
    },

    /// The line has not been started yet
    #[error("Line {line_id} has not been started")]
    NotStarted {
        /// Identifier of the line
        line_id: Uuid,
    },

    /// The line has terminated and no longer reads requests
    #[error("Line {line_id} is closed")]
    Closed {
        /// Identifier of the line
        line_id: Uuid,
    },

    /// A hire would drive the worker count below zero
    #[error("Invalid worker count for category {category}: cannot apply {delta} to {workers} workers")]
    InvalidWorkerCount {
        /// Debug rendering of the category
        category: String,
        /// Workers hired before the request
        workers: usize,
        /// Requested change
        delta: isize,
    },

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// Failed to spawn a coordinator or worker thread
    #[error("Failed to spawn thread '{thread_name}': {message}")]
    SpawnError {
        /// Name given to the thread
        thread_name: String,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Task execution failed
    #[error("Task execution failed ({task}): {message}")]
    ExecutionError {
        /// Name of the failed task
        task: String,
        /// Error message
        message: String,
    },

    /// Task observed cancellation and stopped early
    #[error("Task cancelled ({task}): {reason}")]
    Cancelled {
        /// Name of the cancelled task
        task: String,
        /// Reason for cancellation
        reason: String,
    },

    /// A report could not be rendered
    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LineError {
    /// Create an already started error
    pub fn already_started(line_id: Uuid) -> Self {
        LineError::AlreadyStarted { line_id }
    }

    /// Create a not started error
    pub fn not_started(line_id: Uuid) -> Self {
        LineError::NotStarted { line_id }
    }

    /// Create a closed error
    pub fn closed(line_id: Uuid) -> Self {
        LineError::Closed { line_id }
    }

    /// Create an invalid worker count error
    pub fn invalid_worker_count(category: impl Into<String>, workers: usize, delta: isize) -> Self {
        LineError::InvalidWorkerCount {
            category: category.into(),
            workers,
            delta,
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        LineError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        thread_name: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LineError::SpawnError {
            thread_name: thread_name.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an execution error
    pub fn execution(task: impl Into<String>, message: impl Into<String>) -> Self {
        LineError::ExecutionError {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(task: impl Into<String>, reason: impl Into<String>) -> Self {
        LineError::Cancelled {
            task: task.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the line is gone for good
    pub fn is_closed(&self) -> bool {
        matches!(self, LineError::Closed { .. })
    }
}
