//! Error types for engine operations

use mmult_chip::DimsError;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input stream is shorter than the geometry requires, or framing is wrong.
    MalformedInput,
    /// Geometry, engine configuration or host-side data shapes are invalid.
    Configuration,
    /// A result left the output lane range.
    Overflow,
    /// The stream transport did not deliver in time.
    Timeout,
    /// The stream transport failed.
    Transport,
    /// The engine was driven out of order.
    InvalidState,
    /// Underlying I/O failed.
    Io,
}

/// Errors that can occur while running the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input stream ended before the geometry was satisfied
    #[error("Malformed input: stream ended in the {section} after {consumed} of {expected} words")]
    MalformedInput {
        /// Which part of the stream was being read
        section: &'static str,
        /// Words consumed before the stream ended
        consumed: usize,
        /// Words the geometry requires in total
        expected: usize,
    },

    /// End-of-stream marker missing or on the wrong word
    #[error("End marker misplaced: word {index} of {words}")]
    EndMarker {
        /// Offending word index, or `words` when the marker is missing
        index: usize,
        /// Words in the stream
        words: usize,
    },

    /// Geometry violates a packing or tiling constraint
    #[error("Invalid geometry: {source}")]
    InvalidGeometry {
        /// Violated constraint
        #[from]
        source: DimsError,
    },

    /// Engine configuration rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for rejection
        reason: String,
    },

    /// Host-side buffer has the wrong number of elements
    #[error("Shape mismatch for {what}: got {got} elements, expected {expected}")]
    ShapeMismatch {
        /// Buffer name
        what: &'static str,
        /// Elements supplied
        got: usize,
        /// Elements required
        expected: usize,
    },

    /// Dot product plus offset does not fit the output lane
    #[error("Overflow at row {row}, class {class}: {value} does not fit {lane}")]
    Overflow {
        /// Global input row
        row: usize,
        /// Output class
        class: usize,
        /// Exact result
        value: i64,
        /// Output lane type
        lane: &'static str,
    },

    /// Stream transport timed out
    #[error("Stream timeout after {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Stream transport failed
    #[error("Transfer failed: {reason}")]
    TransferFailed {
        /// Reason for failure
        reason: String,
    },

    /// Engine driven out of order
    #[error("Engine in invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// I/O error on a byte-backed transport
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Create a malformed input error
    pub fn malformed_input(section: &'static str, consumed: usize, expected: usize) -> Self {
        Self::MalformedInput {
            section,
            consumed,
            expected,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(what: &'static str, got: usize, expected: usize) -> Self {
        Self::ShapeMismatch {
            what,
            got,
            expected,
        }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Classify this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput { .. } | Self::EndMarker { .. } => ErrorKind::MalformedInput,
            Self::InvalidGeometry { .. } | Self::InvalidConfig { .. } | Self::ShapeMismatch { .. } => {
                ErrorKind::Configuration
            }
            Self::Overflow { .. } => ErrorKind::Overflow,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::TransferFailed { .. } => ErrorKind::Transport,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}
