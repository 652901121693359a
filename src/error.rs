//! Error types for the WQDSS engine.
//!
//! One enum per component, matching the boundaries in §7 of the design spec:
//! model registry, run sandbox, worker dispatch, sweep engine, and the HTTP
//! surface contract.

use thiserror::Error;

/// Errors raised by the model registry (C1).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model '{0}' not registered")]
    NotFound(String),

    #[error("model '{0}' already exists in the registry")]
    AlreadyExists(String),

    #[error("archive is not a valid zip file: {0}")]
    InvalidArchive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Errors raised while preparing or executing a run in the sandbox (C2).
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("input file '{0}' has no header rows to preserve")]
    MissingHeaderLines(String),

    #[error("column '{column}' not found in input file '{file}'")]
    ColumnNotFound { file: String, column: String },

    #[error("output file '{0}' missing from run archive")]
    MissingOutputFile(String),

    #[error("model binary exited without producing a result")]
    ModelDidNotRun,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Errors raised by a worker dispatcher (C3).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("model '{0}' not registered")]
    ModelNotFound(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("queue connection failed: {0}")]
    QueueConnection(String),

    #[error("queue operation failed: {0}")]
    Queue(String),

    #[error("dispatch timed out waiting for a result")]
    Timeout,

    #[error("failed to decode task result: {0}")]
    DecodeError(String),

    #[error("remote model registry request failed: {0}")]
    RegistryRequest(#[from] reqwest::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors raised by the sweep engine (C4) and execution state machine (C5).
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("input files declare mismatched step-sequence lengths: {0:?}")]
    NonEqualStepCount(Vec<usize>),

    #[error("run '{0}' has no result attached yet")]
    RunNotCompleted(String),

    #[error("model directory for '{0}' could not be materialised: {1}")]
    ModelDirMissing(String, String),

    #[error("sweep has no permutations to run")]
    EmptySweep,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("failed to parse a scored value: {0}")]
    ScoreParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the HTTP surface contract (C6).
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("invalid sweep specification: {0}")]
    InvalidSpec(String),

    #[error("execution '{0}' not found")]
    ExecutionNotFound(String),

    #[error("execution '{0}' has not completed yet")]
    NotCompleted(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}
