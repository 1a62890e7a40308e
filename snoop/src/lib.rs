//! # snoop - eBPF Trace Consumer
//!
//! snoop loads a compiled eBPF object, attaches one of its programs to a
//! syscall hook, and turns the fixed-format records the program writes into a
//! per-CPU perf event array into readable events.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                eBPF Object (Kernel, prebuilt)                │
//! │  • Tracepoints: syscalls/sys_enter_openat, sys_enter_sync    │
//! │  • Kprobes: do_sys_openat2, ksys_sync                        │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │ perf event array "events"
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    snoop (This Crate)                        │
//! │                                                              │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐            │
//! │  │ Lifecycle  │──▶│  Consumer  │──▶│   Sink     │            │
//! │  │ (open/load │   │ (poll and  │   │ (console / │            │
//! │  │  /attach)  │   │  decode)   │   │  JSON)     │            │
//! │  └────────────┘   └────────────┘   └────────────┘            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`lifecycle`]: open, load, attach and close the instrumentation object
//! - [`consumer`]: per-CPU perf buffers, bounded polling and loss reporting
//! - [`decode`]: raw record decoding and open-record layout selection
//! - [`orchestrator`]: one tracing session from open to teardown
//! - [`target`]: the selectable programs and their attach points
//! - [`sink`]: console and JSON-lines output
//! - [`kernel`]: kernel release parsing and comparison
//! - [`preflight`]: memlock limit and privilege checks
//! - [`cli`]: command-line parsing
//! - [`domain`]: identifiers, decoded events and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Trace openat(2) with the object in the current directory
//! sudo ./snoop
//!
//! # Trace sync(2) via kprobe, JSON output
//! sudo ./snoop -t ksys-sync --json
//! ```

pub mod cli;
pub mod consumer;
pub mod decode;
pub mod domain;
pub mod kernel;
pub mod lifecycle;
pub mod orchestrator;
pub mod preflight;
pub mod sink;
pub mod target;
