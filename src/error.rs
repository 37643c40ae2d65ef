//! Error types for pskit-bridge operations.
//!
//! This module provides the error hierarchy using `thiserror` for the
//! execution bridge, the structure engine, batch processing, I/O and CLI
//! commands.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for bridge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A request was rejected before reaching the engine.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The engine failed to compute a result.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The execution context became unusable.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A batch stopped early because the execution context became unusable.
    ///
    /// `report` is the formatted output for the inputs handled before the
    /// stop.
    #[error("batch aborted: {source}")]
    BatchAborted {
        /// Formatted output of the partial batch.
        report: String,
        /// Transport error that stopped the batch.
        source: TransportError,
    },

    /// The caller stopped waiting for a response.
    #[error("call {id} timed out after {timeout_ms}ms")]
    Timeout {
        /// Correlation id of the abandoned call.
        id: u64,
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u128,
    },

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Invalid state errors.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state.
        message: String,
    },

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// Returns `true` when the error means the bridge must be recreated.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::BatchAborted { .. })
    }
}

/// Parameter-shape errors detected before an engine call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The function name is not in the dispatch table.
    #[error("unsupported function: {name}")]
    UnsupportedFunction {
        /// Name that was requested.
        name: String,
    },

    /// A required parameter was absent.
    #[error("missing parameter: {name}")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },

    /// A parameter had the wrong type or an unusable value.
    #[error("{name} {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What is wrong with it, e.g. "must be string".
        reason: String,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidParameter`].
    pub fn invalid(name: &str, reason: &str) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failures raised by the computation engine itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The structure file could not be parsed.
    #[error("file parsing failed: {reason}")]
    Parse {
        /// Parser message.
        reason: String,
    },

    /// Input lacks either protein or nucleic-acid residues.
    #[error("not a protein-nucleic acid complex")]
    NotAComplex,

    /// The requested chain does not exist.
    #[error("chain {chain_id} not exists, valid chain ids are: {valid:?}")]
    UnknownChain {
        /// Requested chain id.
        chain_id: String,
        /// Chain ids present in the input.
        valid: Vec<String>,
    },

    /// Fragment bounds fall outside the chain.
    #[error("invalid range for chain {chain_id}, enter values between {min} and {max}")]
    InvalidRange {
        /// Chain the range applies to.
        chain_id: String,
        /// First residue number of the chain.
        min: i64,
        /// Last residue number of the chain.
        max: i64,
    },

    /// The computation selected nothing to operate on.
    #[error("empty selection: {reason}")]
    EmptySelection {
        /// What was empty.
        reason: String,
    },

    /// The engine could not be loaded.
    #[error("engine failed to load: {reason}")]
    Load {
        /// Loader message.
        reason: String,
    },
}

/// Failures of the execution context as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The worker stopped while calls were pending.
    #[error("execution context terminated: {reason}")]
    ContextTerminated {
        /// Why it stopped.
        reason: String,
    },

    /// The worker emitted a message the broker could not use.
    #[error("execution context fault: {reason}")]
    Fault {
        /// Fault description.
        reason: String,
    },

    /// The worker thread could not be started.
    #[error("failed to spawn execution context: {reason}")]
    SpawnFailed {
        /// OS error text.
        reason: String,
    },

    /// The bridge was disposed.
    #[error("bridge is closed")]
    Closed,
}

/// I/O-specific errors for file operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No input files were given.
    #[error("no input files")]
    NoInputs,

    /// Output format error.
    #[error("output format error: {0}")]
    OutputFormat(String),
}

// Implement From traits for standard library errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::OutputFormat(err.to_string())
    }
}
