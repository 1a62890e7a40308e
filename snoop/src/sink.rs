//! Output sinks
//!
//! The consumer hands every decoded event and every loss report to an
//! [`EventSink`]. Two sinks ship: [`ConsoleSink`] prints one human-readable
//! line per event and [`JsonSink`] writes JSON lines for other tools.

use chrono::{DateTime, Local};
use log::warn;
use serde_json::json;
use std::io::Write;

use crate::domain::{CpuId, DecodedEvent, OpenEvent, SyncEvent};

const TIME_FORMAT: &str = "%Y/%m/%d_%H:%M";

/// Receives decoded events from the poll loop
pub trait EventSink {
    fn emit(&mut self, event: &DecodedEvent);

    /// The kernel dropped `count` samples on `cpu`
    fn report_loss(&mut self, cpu: CpuId, count: u64);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &DecodedEvent) {
        (**self).emit(event);
    }

    fn report_loss(&mut self, cpu: CpuId, count: u64) {
        (**self).report_loss(cpu, count);
    }
}

/// Human-readable lines stamped with the local time of delivery
pub struct ConsoleSink<W: Write> {
    writer: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for ConsoleSink<W> {
    fn emit(&mut self, event: &DecodedEvent) {
        let line = format_event(event, &Local::now());
        if let Err(e) = writeln!(self.writer, "{line}") {
            warn!("Failed to write event: {e}");
        }
    }

    fn report_loss(&mut self, cpu: CpuId, count: u64) {
        warn!("lost {count} events on CPU {cpu}");
    }
}

/// Render one event the way [`ConsoleSink`] prints it
pub fn format_event(event: &DecodedEvent, now: &DateTime<Local>) -> String {
    let time = now.format(TIME_FORMAT);
    match event {
        DecodedEvent::Open(OpenEvent { comm, pid, filename, flags, mode, .. }) => {
            format!("({time}) {comm} (pid: {pid}) opened: {filename} (flags: {flags:#010x}, mode: {mode:#010x})")
        }
        DecodedEvent::Sync(SyncEvent { comm, pid, uid, gid, login_uid }) => {
            format!("({time}) {comm} (pid: {pid}, uid: {uid}, gid: {gid}, loginuid: {login_uid}) called sync")
        }
    }
}

/// One JSON object per line
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, value: &impl serde::Serialize) {
        let result = serde_json::to_writer(&mut self.writer, value)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        if let Err(e) = result {
            warn!("Failed to write JSON line: {e}");
        }
    }
}

impl<W: Write> EventSink for JsonSink<W> {
    fn emit(&mut self, event: &DecodedEvent) {
        self.write_line(event);
    }

    fn report_loss(&mut self, cpu: CpuId, count: u64) {
        self.write_line(&json!({ "kind": "lost", "cpu": cpu, "count": count }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pid, Tid, Timestamp, Uid};
    use chrono::TimeZone;

    fn open_event() -> DecodedEvent {
        DecodedEvent::Open(OpenEvent {
            pid: Pid(1234),
            tid: Tid(1234),
            ppid: Pid(1),
            uid: Uid(0),
            flags: 0x8000,
            mode: 0o644,
            timestamp: Timestamp(42),
            comm: "cat".to_string(),
            filename: "/etc/passwd".to_string(),
        })
    }

    fn sync_event() -> DecodedEvent {
        DecodedEvent::Sync(SyncEvent {
            comm: "sync".to_string(),
            pid: Pid(77),
            uid: Uid(1000),
            gid: 100,
            login_uid: Uid::INVALID,
        })
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap()
    }

    #[test]
    fn test_format_open() {
        assert_eq!(
            format_event(&open_event(), &fixed_time()),
            "(2024/03/05_07:08) cat (pid: 1234) opened: /etc/passwd (flags: 0x00008000, mode: 0x000001a4)"
        );
    }

    #[test]
    fn test_format_sync() {
        assert_eq!(
            format_event(&sync_event(), &fixed_time()),
            "(2024/03/05_07:08) sync (pid: 77, uid: 1000, gid: 100, loginuid: unset) called sync"
        );
    }

    #[test]
    fn test_console_sink_writes_one_line_per_event() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.emit(&open_event());
        sink.emit(&sync_event());
        sink.report_loss(CpuId(2), 5);

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("opened: /etc/passwd (flags: 0x00008000, mode: 0x000001a4)"));
        assert!(lines[1].ends_with("called sync"));
    }

    #[test]
    fn test_json_sink_lines() {
        let mut sink = JsonSink::new(Vec::new());
        sink.emit(&open_event());
        sink.report_loss(CpuId(2), 5);

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let values: Vec<serde_json::Value> =
            output.lines().map(|line| serde_json::from_str(line).unwrap()).collect();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["kind"], "open");
        assert_eq!(values[0]["pid"], 1234);
        assert_eq!(values[0]["filename"], "/etc/passwd");
        assert_eq!(values[1], json!({ "kind": "lost", "cpu": 2, "count": 5 }));
    }

    #[test]
    fn test_sink_by_reference() {
        fn emit_into<S: EventSink>(mut sink: S, event: &DecodedEvent) {
            sink.emit(event);
        }

        let mut sink = JsonSink::new(Vec::new());
        emit_into(&mut sink, &sync_event());
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap().lines().count(), 1);
    }
}
