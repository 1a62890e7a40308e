//! Trace targets
//!
//! Each target names the program to enable in the instrumentation object,
//! where to attach it and which record shape it writes to the `events` map.

use clap::ValueEnum;
use std::fmt;

use crate::decode::RecordKind;

/// Kernel hook a program is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachPoint {
    /// Static tracepoint, `category/name` under `/sys/kernel/tracing/events`
    Tracepoint { category: String, name: String },
    /// Kernel function entry hook (kprobe)
    Kprobe { symbol: String },
}

impl AttachPoint {
    pub fn tracepoint(category: &str, name: &str) -> Self {
        AttachPoint::Tracepoint { category: category.to_string(), name: name.to_string() }
    }

    pub fn kprobe(symbol: &str) -> Self {
        AttachPoint::Kprobe { symbol: symbol.to_string() }
    }
}

impl fmt::Display for AttachPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachPoint::Tracepoint { category, name } => write!(f, "tracepoint {category}/{name}"),
            AttachPoint::Kprobe { symbol } => write!(f, "kprobe {symbol}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceTarget {
    /// `openat(2)` via the `syscalls/sys_enter_openat` tracepoint
    Openat,
    /// `openat2(2)` and friends via a kprobe on `do_sys_openat2`
    Openat2,
    /// `sync(2)` via the `syscalls/sys_enter_sync` tracepoint
    Sync,
    /// `sync(2)` via a kprobe on `ksys_sync`
    KsysSync,
}

impl TraceTarget {
    /// Program to enable in the instrumentation object
    pub fn program(self) -> &'static str {
        match self {
            TraceTarget::Openat => "sys_enter_openat",
            TraceTarget::Openat2 => "do_sys_openat2",
            TraceTarget::Sync => "tracepoint__sys_enter_sync",
            TraceTarget::KsysSync => "ksys_sync",
        }
    }

    pub fn attach_point(self) -> AttachPoint {
        match self {
            TraceTarget::Openat => AttachPoint::tracepoint("syscalls", "sys_enter_openat"),
            TraceTarget::Openat2 => AttachPoint::kprobe("do_sys_openat2"),
            TraceTarget::Sync => AttachPoint::tracepoint("syscalls", "sys_enter_sync"),
            TraceTarget::KsysSync => AttachPoint::kprobe("ksys_sync"),
        }
    }

    pub fn record_kind(self) -> RecordKind {
        match self {
            TraceTarget::Openat | TraceTarget::Openat2 => RecordKind::Open,
            TraceTarget::Sync | TraceTarget::KsysSync => RecordKind::Sync,
        }
    }

    /// Perf event array the program writes to
    pub fn channel(self) -> &'static str {
        snoop_common::EVENTS_MAP
    }
}
