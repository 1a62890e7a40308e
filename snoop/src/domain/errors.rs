//! Structured error types for snoop
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

use super::types::CpuId;

/// Failures of the instrumentation lifecycle (open through close)
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Failed to open instrumentation object {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Program {0} not found in instrumentation object")]
    ProgramNotFound(String),

    #[error("Failed to load {program}: {reason}")]
    Load { program: String, reason: String },

    #[error("Failed to attach {program} to {point}: {reason}")]
    Attach { program: String, point: String, reason: String },

    #[error("Failed to detach {program}: {reason}")]
    Detach { program: String, reason: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: &'static str },

    #[error("Map {0} not found in instrumentation object")]
    MapNotFound(String),

    #[error("Map {name} is not a perf event array: {reason}")]
    MapKind { name: String, reason: String },
}

/// Failures of the per-CPU buffer consumer
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Invalid per-CPU page count {0}: must be a non-zero power of two")]
    InvalidPageCount(usize),

    #[error("Failed to open perf buffer on CPU {cpu}: {reason}")]
    Create { cpu: CpuId, reason: String },

    #[error("Failed to enumerate online CPUs: {0}")]
    Cpus(String),

    #[error("Perf buffer poll failed: {0}")]
    Poll(String),
}

/// Per-record decode failures (non-fatal)
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated record: expected at least {expected} bytes, got {actual}")]
    TruncatedRecord { expected: usize, actual: usize },
}

/// Everything that can end a tracing session
#[derive(Error, Debug)]
pub enum TraceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    #[error("Invalid kernel release {0:?}")]
    KernelRelease(String),
}
