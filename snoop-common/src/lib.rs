//! # Shared Record Layouts (eBPF ↔ Userspace)
//!
//! Binary records written by the kernel-side instrumentation into the
//! `events` perf event array. All types use `#[repr(C)]` so userspace sees the
//! exact layout the producer wrote; fields are in native endianness.
//!
//! ## Key Types
//!
//! - [`OpenRecordLegacy`] - open record from kernels below the layout threshold
//! - [`OpenRecord`] - open record whose flags and mode come from `open_how`
//! - [`SyncRecord`] - `sync(2)` record
//!
//! String fields are fixed-capacity and NUL-padded by the producer, but the
//! producer does not guarantee a terminating NUL when a string fills its
//! buffer.

#![no_std]

/// Length of the kernel task command name (`TASK_COMM_LEN`)
pub const TASK_COMM_LEN: usize = 16;

/// Capacity of the filename copied from userspace by the open programs
pub const FILENAME_LEN: usize = 64;

/// Name of the perf event array every program writes to
pub const EVENTS_MAP: &str = "events";

/// Open record emitted by kernels below the layout threshold
///
/// `flags` and `mode` are the raw syscall argument words.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct OpenRecordLegacy {
    /// Process ID (TGID)
    pub pid: u32,
    /// Thread ID
    pub tid: u32,
    /// Parent process ID (`task->real_parent->pid`)
    pub ppid: u32,
    /// Real user ID
    pub uid: u32,
    /// Open flags (`O_*`)
    pub flags: u64,
    /// Creation mode
    pub mode: u64,
    /// `bpf_ktime_get_ns()` at syscall entry
    pub ts: u64,
    pub comm: [u8; TASK_COMM_LEN],
    pub filename: [u8; FILENAME_LEN],
}

/// Leading `flags` and `mode` words of the kernel's `struct open_how`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct OpenHow {
    pub flags: u64,
    pub mode: u64,
}

/// Open record emitted by kernels at or above the layout threshold
///
/// Same size and offsets as [`OpenRecordLegacy`]; only the source of
/// `flags` and `mode` differs on the producer side.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct OpenRecord {
    pub pid: u32,
    pub tid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub how: OpenHow,
    pub ts: u64,
    pub comm: [u8; TASK_COMM_LEN],
    pub filename: [u8; FILENAME_LEN],
}

/// Record emitted by the `sync` probes
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SyncRecord {
    pub comm: [u8; TASK_COMM_LEN],
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
    /// Login UID (`task->loginuid`), the user behind the terminal
    pub loginuid: u32,
}

#[cfg(feature = "user")]
use aya::Pod;

// Records are plain bytes on the perf channel
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for OpenRecordLegacy {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for OpenRecord {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for SyncRecord {}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn test_legacy_open_layout() {
        assert_eq!(size_of::<OpenRecordLegacy>(), 120);
        assert_eq!(offset_of!(OpenRecordLegacy, flags), 16);
        assert_eq!(offset_of!(OpenRecordLegacy, mode), 24);
        assert_eq!(offset_of!(OpenRecordLegacy, comm), 40);
        assert_eq!(offset_of!(OpenRecordLegacy, filename), 56);
    }

    #[test]
    fn test_current_open_layout() {
        assert_eq!(size_of::<OpenRecord>(), 120);
        assert_eq!(offset_of!(OpenRecord, how) + offset_of!(OpenHow, flags), 16);
        assert_eq!(offset_of!(OpenRecord, how) + offset_of!(OpenHow, mode), 24);
        assert_eq!(offset_of!(OpenRecord, ts), 32);
        assert_eq!(offset_of!(OpenRecord, comm), 40);
        assert_eq!(offset_of!(OpenRecord, filename), 56);
    }

    #[test]
    fn test_sync_layout() {
        assert_eq!(size_of::<SyncRecord>(), 32);
        assert_eq!(offset_of!(SyncRecord, pid), 16);
        assert_eq!(offset_of!(SyncRecord, loginuid), 28);
    }
}
