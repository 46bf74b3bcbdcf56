//! # Error Handling
//!
//! Error types for index orchestration and the engines behind it.
//!
//! ## Classes
//!
//! 1. **Input errors**: shape, capacity and label checks that reject a call
//!    before any work starts
//! 2. **Result errors**: a query could not collect `k` neighbors
//! 3. **Worker errors**: a partitioned chunk failed or panicked; carried back
//!    as data, never by unwinding across threads
//! 4. **System errors**: I/O, configuration, engine internals

use thiserror::Error;

/// Result type alias for annbatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for annbatch
#[derive(Error, Debug)]
pub enum Error {
    // Input Errors
    #[error("Dimension mismatch: index has dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Capacity exceeded: {requested} items requested, {available} slots left of {capacity}")]
    CapacityExceeded { requested: usize, available: usize, capacity: usize },

    #[error("Bad label {label}: index holds {size} items")]
    BadLabel { label: i64, size: usize },

    // Result Errors
    #[error("Unable to find {k} neighbors (found {found}). Probably ef or M is too small")]
    InsufficientNeighbors { k: usize, found: usize },

    #[error("Unable to find {k} neighbors for {failed_rows} of {total_rows} queries. Probably ef or M is too small")]
    IncompleteBatch { k: usize, failed_rows: usize, total_rows: usize },

    #[error("Batch insert incomplete: {inserted} of {requested} items stored")]
    IncompleteInsert { requested: usize, inserted: usize },

    // Worker Errors
    #[error("Worker for range [{start}, {end}) panicked")]
    WorkerPanicked { start: usize, end: usize },

    // Engine Errors
    #[error("Engine error: {message}")]
    Engine { message: String },

    #[error("Index corruption detected: {details}")]
    IndexCorruption { details: String },

    // System Errors
    #[error("IO error: {message}")]
    Io { message: String, source: std::io::Error },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// True for errors caused by caller input rather than index state
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. }
                | Error::CapacityExceeded { .. }
                | Error::BadLabel { .. }
        )
    }

    /// Get error code for log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Error::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Error::BadLabel { .. } => "BAD_LABEL",
            Error::InsufficientNeighbors { .. } => "INSUFFICIENT_NEIGHBORS",
            Error::IncompleteBatch { .. } => "INCOMPLETE_BATCH",
            Error::IncompleteInsert { .. } => "INCOMPLETE_INSERT",
            Error::WorkerPanicked { .. } => "WORKER_PANICKED",
            Error::Engine { .. } => "ENGINE_ERROR",
            Error::IndexCorruption { .. } => "INDEX_CORRUPTION",
            Error::Io { .. } => "IO_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Extension trait for adding context to results
pub trait ResultExt<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e {
            Error::Io { message, source } => Error::Io {
                message: format!("{}: {}", f(), message),
                source,
            },
            Error::Engine { message } => Error::Engine {
                message: format!("{}: {}", f(), message),
            },
            Error::IndexCorruption { details } => Error::IndexCorruption {
                details: format!("{}: {}", f(), details),
            },
            Error::Configuration { message } => Error::Configuration {
                message: format!("{}: {}", f(), message),
            },
            Error::Internal { message } => Error::Internal {
                message: format!("{}: {}", f(), message),
            },
            // Structured variants carry their own fields
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        assert!(Error::BadLabel { label: 0, size: 3 }.is_input_error());
        assert!(Error::DimensionMismatch { expected: 3, actual: 4 }.is_input_error());
        assert!(!Error::InsufficientNeighbors { k: 5, found: 3 }.is_input_error());
    }

    #[test]
    fn test_context_keeps_io_source() {
        let err: Result<()> = Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into());
        let err = err.with_context(|| "loading index.bin".to_string()).unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(err.to_string().contains("loading index.bin"));
    }

    #[test]
    fn test_context_keeps_variant() {
        let err: Result<()> = Err(Error::IndexCorruption { details: "bad magic".into() });
        let err = err.with_context(|| "opening index.bin".to_string()).unwrap_err();
        assert_eq!(err.error_code(), "INDEX_CORRUPTION");
        assert!(err.to_string().contains("opening index.bin: bad magic"));

        let err: Result<()> = Err(Error::BadLabel { label: 9, size: 2 });
        let err = err.with_context(|| "ignored".to_string()).unwrap_err();
        assert!(matches!(err, Error::BadLabel { label: 9, size: 2 }));
    }
}
