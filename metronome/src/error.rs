//! Error types for the metronome telemetry recorder.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by a [`Getter`](crate::recorder::Getter).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for all metronome operations.
///
/// Each variant wraps the error enum of one concern, so callers can match
/// on the broad category first and drill into the details when needed.
#[derive(Error, Debug)]
pub enum MetronomeError {
    /// Error in the declared field set or in a row's fields.
    #[error("field error: {0}")]
    Field(#[from] FieldError),

    /// Row or slice index out of range.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Raw series data violates the columnar invariants.
    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    /// Error in the recorder lifecycle or in the sampling loop.
    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),

    /// Error saving or loading a recording.
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Errors about field names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The caller declared the implicit `time` field.
    #[error("field '{field}' is reserved and added implicitly")]
    ReservedField {
        /// The reserved field name.
        field: String,
    },

    /// The same field was declared twice.
    #[error("field '{field}' is declared more than once")]
    DuplicateField {
        /// The duplicated field name.
        field: String,
    },

    /// A declared field is absent from the row being appended.
    #[error("field '{field}' is required")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// Lookup of a field that was never declared.
    #[error("unknown field '{field}'")]
    UnknownField {
        /// The unknown field name.
        field: String,
    },
}

/// Errors about row and slice indices.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The requested row does not exist.
    #[error("row index {index} out of range for {len} row(s)")]
    RowOutOfRange {
        /// The requested index (negative counts from the end).
        index: isize,
        /// The number of rows in the store.
        len: usize,
    },

    /// The requested range does not fit the stored rows.
    #[error("slice {start}..{end} out of range for {len} row(s)")]
    SliceOutOfRange {
        /// Inclusive start of the range.
        start: usize,
        /// Exclusive end of the range.
        end: usize,
        /// The number of rows in the store.
        len: usize,
    },
}

/// Errors raised when replacing a store's contents from raw data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    /// Columns in the raw data have different lengths.
    #[error("column '{field}' has {found} value(s), expected {expected}")]
    RaggedColumns {
        /// The first column whose length differs.
        field: String,
        /// Length of the first column.
        expected: usize,
        /// Length of the offending column.
        found: usize,
    },

    /// The raw data names the same column twice.
    #[error("column '{field}' appears more than once")]
    DuplicateColumn {
        /// The duplicated column name.
        field: String,
    },
}

/// Errors from the recorder lifecycle and the background sampling loop.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// The sampling rate is not a positive finite number.
    #[error("invalid sampling rate {rate} (must be finite and > 0)")]
    InvalidRate {
        /// The rejected rate in samples per second.
        rate: f64,
    },

    /// Recording was started without a getter to sample.
    #[error("no getter installed; set one before starting")]
    NoGetter,

    /// The operation is not allowed while recording is active.
    #[error("cannot {operation} while recording; stop first")]
    Recording {
        /// The rejected operation.
        operation: &'static str,
    },

    /// The getter failed to produce a row.
    #[error("getter failed: {source}")]
    Getter {
        /// The error returned by the getter.
        #[source]
        source: BoxError,
    },

    /// The background sampling thread could not be spawned.
    #[error("failed to spawn sampling thread: {source}")]
    Spawn {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The background sampling thread panicked.
    #[error("sampling thread panicked: {message}")]
    WorkerPanicked {
        /// The panic payload, when it was a string.
        message: String,
    },
}

/// Errors that can occur while saving or loading a recording.
#[derive(Error, Debug)]
pub enum PersistError {
    /// The recording file could not be read.
    #[error("failed to read recording '{}': {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The recording file could not be written.
    #[error("failed to write recording '{}': {source}", path.display())]
    Write {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The recording file is not a valid recording document.
    #[error("failed to parse recording '{}': {source}", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The recording could not be serialized.
    #[error("failed to serialize recording '{}': {source}", path.display())]
    Serialize {
        /// The file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, MetronomeError>`.
pub type Result<T> = std::result::Result<T, MetronomeError>;
