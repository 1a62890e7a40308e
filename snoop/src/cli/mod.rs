//! Command-line interface for snoop
//!
//! This module contains CLI argument parsing and the mapping to a
//! [`TraceConfig`](crate::orchestrator::TraceConfig).

pub mod args;

pub use args::{Args, LayoutArg};
