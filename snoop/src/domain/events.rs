//! Decoded trace events
//!
//! What the decoder hands to the sinks. Unlike the raw records these own
//! their strings and carry typed identifiers.

use serde::Serialize;

use super::types::{Pid, Tid, Timestamp, Uid};

/// An `openat`/`openat2` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenEvent {
    pub pid: Pid,
    pub tid: Tid,
    pub ppid: Pid,
    pub uid: Uid,
    pub flags: u64,
    pub mode: u64,
    pub timestamp: Timestamp,
    pub comm: String,
    pub filename: String,
}

/// A `sync` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEvent {
    pub comm: String,
    pub pid: Pid,
    pub uid: Uid,
    pub gid: u32,
    pub login_uid: Uid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DecodedEvent {
    Open(OpenEvent),
    Sync(SyncEvent),
}

impl DecodedEvent {
    pub fn pid(&self) -> Pid {
        match self {
            DecodedEvent::Open(e) => e.pid,
            DecodedEvent::Sync(e) => e.pid,
        }
    }

    pub fn comm(&self) -> &str {
        match self {
            DecodedEvent::Open(e) => &e.comm,
            DecodedEvent::Sync(e) => &e.comm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_event_json_is_tagged() {
        let event = DecodedEvent::Sync(SyncEvent {
            comm: "sync".to_string(),
            pid: Pid(42),
            uid: Uid(1000),
            gid: 1000,
            login_uid: Uid(1000),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "sync");
        assert_eq!(value["pid"], 42);
        assert_eq!(value["comm"], "sync");
    }

    #[test]
    fn test_open_event_json_is_tagged() {
        let event = DecodedEvent::Open(OpenEvent {
            pid: Pid(1),
            tid: Tid(1),
            ppid: Pid(0),
            uid: Uid(0),
            flags: 0,
            mode: 0,
            timestamp: Timestamp(5),
            comm: "init".to_string(),
            filename: "/etc/fstab".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "open");
        assert_eq!(value["timestamp"], 5);
        assert_eq!(value["filename"], "/etc/fstab");
        assert_eq!(event.pid(), Pid(1));
        assert_eq!(event.comm(), "init");
    }
}
