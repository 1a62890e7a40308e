//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep process, thread, user and CPU identifiers from
//! being mixed up as they flow from decoded records into the sinks.

use serde::Serialize;
use std::fmt;

/// Process ID (TGID in kernel terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread ID (PID in kernel terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Uid(pub u32);

impl Uid {
    /// `(uid_t)-1`, what the kernel reports for an unset login UID
    pub const INVALID: Uid = Uid(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "unset")
        }
    }
}

/// CPU ID
///
/// Index of the per-CPU ring a record was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Timestamp in nanoseconds
///
/// Monotonic clock since boot (`bpf_ktime_get_ns()`), not wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_display() {
        assert_eq!(Uid(0).to_string(), "0");
        assert_eq!(Uid::INVALID.to_string(), "unset");
        assert!(!Uid(u32::MAX).is_valid());
    }

    #[test]
    fn test_cpu_display() {
        assert_eq!(CpuId(2).to_string(), "#2");
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&(Pid(7), CpuId(3), Timestamp(99))).unwrap();
        assert_eq!(json, "[7,3,99]");
    }
}
