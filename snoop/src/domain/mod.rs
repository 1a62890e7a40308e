//! Domain model for snoop
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - The decoded event model handed to sinks
//! - Structured error handling

pub mod errors;
pub mod events;
pub mod types;

// Re-export common types for convenience
pub use types::{CpuId, Pid, Tid, Timestamp, Uid};

pub use errors::{ConsumerError, DecodeError, LifecycleError, TraceError};
pub use events::{DecodedEvent, OpenEvent, SyncEvent};
