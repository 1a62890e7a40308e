//! # Binary Record Decoding
//!
//! Turns raw perf samples into [`DecodedEvent`]s. Decoding is pure: the only
//! input besides the bytes is the [`RecordDecoder`] configuration, which
//! carries the record kind of the active target and the open-record layout
//! chosen for the running kernel.
//!
//! ## Open Record Layouts
//!
//! - [`OpenLayout::Legacy`]: flags and mode are two raw argument words
//! - [`OpenLayout::Current`]: flags and mode are the leading words of `open_how`
//!
//! Both layouts are 120 bytes with flags at offset 16 and mode at offset 24;
//! the kernel release only changes where the producer reads them from.
//!
//! Samples are copied into an owned record before any field is read. Perf
//! pads samples, so trailing bytes past the record are ignored; samples
//! shorter than the record are rejected.

use std::mem::size_of;

use aya::Pod;
use snoop_common::{OpenRecord, OpenRecordLegacy, SyncRecord};

use crate::domain::{DecodeError, DecodedEvent, OpenEvent, Pid, SyncEvent, Tid, Timestamp, Uid};
use crate::kernel::KernelVersion;

/// Open flag marking a directory open; such opens are not reported
#[allow(clippy::cast_sign_loss)]
pub const O_DIRECTORY: u64 = libc::O_DIRECTORY as u64;

/// Default release from which the producer reads flags and mode from `open_how`
pub const DEFAULT_LAYOUT_THRESHOLD: &str = "5.9.0";

/// Which record shape the active target produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Open,
    Sync,
}

/// Layout of open records, selected by the producing kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenLayout {
    Legacy,
    Current,
}

impl OpenLayout {
    /// Layout for a kernel release given the first release using `open_how`
    pub fn for_kernel(running: &KernelVersion, threshold: &KernelVersion) -> Self {
        if running < threshold {
            OpenLayout::Legacy
        } else {
            OpenLayout::Current
        }
    }

    /// Minimum sample size for this layout
    pub fn record_size(self) -> usize {
        match self {
            OpenLayout::Legacy => size_of::<OpenRecordLegacy>(),
            OpenLayout::Current => size_of::<OpenRecord>(),
        }
    }
}

/// How the open layout is chosen at load time
#[derive(Debug, Clone)]
pub enum LayoutPolicy {
    /// Compare the running kernel against the threshold release
    Auto { threshold: KernelVersion },
    /// Use this layout regardless of the kernel
    Fixed(OpenLayout),
}

impl LayoutPolicy {
    /// Resolve the policy against the running kernel
    ///
    /// An unreadable kernel release falls back to the current layout.
    pub fn resolve(&self) -> OpenLayout {
        match self {
            LayoutPolicy::Fixed(layout) => *layout,
            LayoutPolicy::Auto { threshold } => match KernelVersion::running() {
                Ok(running) => {
                    let layout = OpenLayout::for_kernel(&running, threshold);
                    log::debug!("Kernel {running} vs threshold {threshold}: {layout:?} open layout");
                    layout
                }
                Err(e) => {
                    log::warn!("{e:#}; assuming current open layout");
                    OpenLayout::Current
                }
            },
        }
    }
}

/// Decoder for the records of one trace target
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder {
    pub kind: RecordKind,
    pub layout: OpenLayout,
}

impl RecordDecoder {
    #[must_use]
    pub fn new(kind: RecordKind, layout: OpenLayout) -> Self {
        Self { kind, layout }
    }

    /// Decode one raw sample
    ///
    /// Returns `Ok(None)` for records that decode fine but are filtered out.
    ///
    /// # Errors
    /// Returns [`DecodeError::TruncatedRecord`] if `raw` is shorter than the record
    pub fn decode(&self, raw: &[u8]) -> Result<Option<DecodedEvent>, DecodeError> {
        match self.kind {
            RecordKind::Open => decode_open(raw, self.layout),
            RecordKind::Sync => decode_sync(raw).map(Some),
        }
    }
}

/// Decode an open record, suppressing directory opens
///
/// # Errors
/// Returns [`DecodeError::TruncatedRecord`] if `raw` is shorter than the layout
pub fn decode_open(raw: &[u8], layout: OpenLayout) -> Result<Option<DecodedEvent>, DecodeError> {
    let event = match layout {
        OpenLayout::Legacy => {
            let r: OpenRecordLegacy = copy_record(raw)?;
            OpenEvent {
                pid: Pid(r.pid),
                tid: Tid(r.tid),
                ppid: Pid(r.ppid),
                uid: Uid(r.uid),
                flags: r.flags,
                mode: r.mode,
                timestamp: Timestamp(r.ts),
                comm: fixed_str(&r.comm),
                filename: fixed_str(&r.filename),
            }
        }
        OpenLayout::Current => {
            let r: OpenRecord = copy_record(raw)?;
            OpenEvent {
                pid: Pid(r.pid),
                tid: Tid(r.tid),
                ppid: Pid(r.ppid),
                uid: Uid(r.uid),
                flags: r.how.flags,
                mode: r.how.mode,
                timestamp: Timestamp(r.ts),
                comm: fixed_str(&r.comm),
                filename: fixed_str(&r.filename),
            }
        }
    };

    if event.flags & O_DIRECTORY != 0 {
        return Ok(None);
    }

    Ok(Some(DecodedEvent::Open(event)))
}

/// Decode a sync record
///
/// # Errors
/// Returns [`DecodeError::TruncatedRecord`] if `raw` is shorter than the record
pub fn decode_sync(raw: &[u8]) -> Result<DecodedEvent, DecodeError> {
    let r: SyncRecord = copy_record(raw)?;
    Ok(DecodedEvent::Sync(SyncEvent {
        comm: fixed_str(&r.comm),
        pid: Pid(r.pid),
        uid: Uid(r.uid),
        gid: r.gid,
        login_uid: Uid(r.loginuid),
    }))
}

/// Read a `T` from the first `size_of::<T>()` bytes of `raw`
fn copy_record<T: Pod>(raw: &[u8]) -> Result<T, DecodeError> {
    let expected = size_of::<T>();
    if raw.len() < expected {
        return Err(DecodeError::TruncatedRecord { expected, actual: raw.len() });
    }

    // SAFETY: `raw` holds at least size_of::<T>() bytes and T is Pod, so any
    // byte pattern is a valid value; perf samples carry no alignment guarantee.
    #[allow(unsafe_code)]
    let record = unsafe { std::ptr::read_unaligned(raw.as_ptr().cast::<T>()) };
    Ok(record)
}

/// Read a NUL-padded fixed buffer, stopping at the first NUL or at capacity
fn fixed_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snoop_common::{FILENAME_LEN, TASK_COMM_LEN};
    use std::mem::offset_of;

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
        buf[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
    }

    fn put_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) {
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn legacy_record(flags: u64, mode: u64, filename: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; size_of::<OpenRecordLegacy>()];
        put_u32(&mut buf, offset_of!(OpenRecordLegacy, pid), 1234);
        put_u32(&mut buf, offset_of!(OpenRecordLegacy, tid), 1235);
        put_u32(&mut buf, offset_of!(OpenRecordLegacy, ppid), 1);
        put_u32(&mut buf, offset_of!(OpenRecordLegacy, uid), 0);
        put_u64(&mut buf, offset_of!(OpenRecordLegacy, flags), flags);
        put_u64(&mut buf, offset_of!(OpenRecordLegacy, mode), mode);
        put_u64(&mut buf, offset_of!(OpenRecordLegacy, ts), 99);
        put_bytes(&mut buf, offset_of!(OpenRecordLegacy, comm), b"cat");
        put_bytes(&mut buf, offset_of!(OpenRecordLegacy, filename), filename);
        buf
    }

    fn current_record(flags: u64, mode: u64, filename: &[u8]) -> Vec<u8> {
        let how = offset_of!(OpenRecord, how);
        let mut buf = vec![0u8; size_of::<OpenRecord>()];
        put_u32(&mut buf, offset_of!(OpenRecord, pid), 1234);
        put_u32(&mut buf, offset_of!(OpenRecord, tid), 1235);
        put_u32(&mut buf, offset_of!(OpenRecord, ppid), 1);
        put_u64(&mut buf, how + offset_of!(snoop_common::OpenHow, flags), flags);
        put_u64(&mut buf, how + offset_of!(snoop_common::OpenHow, mode), mode);
        put_u64(&mut buf, offset_of!(OpenRecord, ts), 99);
        put_bytes(&mut buf, offset_of!(OpenRecord, comm), b"cat");
        put_bytes(&mut buf, offset_of!(OpenRecord, filename), filename);
        buf
    }

    fn sync_record(comm: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; size_of::<SyncRecord>()];
        put_bytes(&mut buf, offset_of!(SyncRecord, comm), comm);
        put_u32(&mut buf, offset_of!(SyncRecord, pid), 77);
        put_u32(&mut buf, offset_of!(SyncRecord, uid), 1000);
        put_u32(&mut buf, offset_of!(SyncRecord, gid), 100);
        put_u32(&mut buf, offset_of!(SyncRecord, loginuid), u32::MAX);
        buf
    }

    fn expect_open(result: Result<Option<DecodedEvent>, DecodeError>) -> OpenEvent {
        match result {
            Ok(Some(DecodedEvent::Open(event))) => event,
            other => panic!("expected open event, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_legacy_open() {
        let raw = legacy_record(0x241, 0o644, b"/etc/passwd");
        let event = expect_open(decode_open(&raw, OpenLayout::Legacy));
        assert_eq!(event.pid, Pid(1234));
        assert_eq!(event.tid, Tid(1235));
        assert_eq!(event.ppid, Pid(1));
        assert_eq!(event.uid, Uid(0));
        assert_eq!(event.flags, 0x241);
        assert_eq!(event.mode, 0o644);
        assert_eq!(event.timestamp, Timestamp(99));
        assert_eq!(event.comm, "cat");
        assert_eq!(event.filename, "/etc/passwd");
    }

    #[test]
    fn test_layouts_agree_on_flags_and_mode() {
        let legacy = expect_open(decode_open(&legacy_record(0x8042, 0o600, b"a"), OpenLayout::Legacy));
        let current =
            expect_open(decode_open(&current_record(0x8042, 0o600, b"a"), OpenLayout::Current));
        assert_eq!(legacy.flags, current.flags);
        assert_eq!(legacy.mode, current.mode);
        assert_eq!(legacy, current);
    }

    #[test]
    fn test_current_layout_decodes_padded_producer_sample() {
        // 120-byte record padded by perf to 124 bytes
        let mut raw = current_record(0x241, 0o600, b"/var/log/syslog");
        raw.extend_from_slice(&[0xaa; 4]);
        let event = expect_open(decode_open(&raw, OpenLayout::Current));
        assert_eq!(event.flags, 0x241);
        assert_eq!(event.mode, 0o600);
        assert_eq!(event.timestamp, Timestamp(99));
        assert_eq!(event.comm, "cat");
        assert_eq!(event.filename, "/var/log/syslog");
    }

    #[test]
    fn test_directory_open_is_suppressed() {
        let flags = O_DIRECTORY | 0x8000;
        assert_eq!(decode_open(&legacy_record(flags, 0, b"/tmp"), OpenLayout::Legacy), Ok(None));
        assert_eq!(decode_open(&current_record(flags, 0, b"/tmp"), OpenLayout::Current), Ok(None));
    }

    #[test]
    fn test_truncated_record_every_length() {
        let cases = [
            (RecordDecoder::new(RecordKind::Open, OpenLayout::Legacy), legacy_record(0, 0, b"x")),
            (RecordDecoder::new(RecordKind::Open, OpenLayout::Current), current_record(0, 0, b"x")),
            (RecordDecoder::new(RecordKind::Sync, OpenLayout::Current), sync_record(b"sync")),
        ];

        for (decoder, raw) in cases {
            let expected = raw.len();
            for len in 0..expected {
                assert_eq!(
                    decoder.decode(&raw[..len]),
                    Err(DecodeError::TruncatedRecord { expected, actual: len }),
                    "{decoder:?} accepted {len} bytes"
                );
            }
            assert!(decoder.decode(&raw).is_ok());
        }
    }

    #[test]
    fn test_oversized_sample_ignores_padding() {
        let padding = [0xff; 12];

        for layout in [OpenLayout::Legacy, OpenLayout::Current] {
            let mut raw = match layout {
                OpenLayout::Legacy => legacy_record(0, 0, b"/etc/hosts"),
                OpenLayout::Current => current_record(0, 0, b"/etc/hosts"),
            };
            raw.extend_from_slice(&padding);
            let event = expect_open(decode_open(&raw, layout));
            assert_eq!(event.filename, "/etc/hosts");
            assert_eq!(event.pid, Pid(1234));
        }

        let mut raw = sync_record(b"sync");
        raw.extend_from_slice(&padding);
        let DecodedEvent::Sync(event) = decode_sync(&raw).unwrap() else {
            panic!("expected sync event")
        };
        assert_eq!(event.comm, "sync");
        assert!(!event.login_uid.is_valid());
    }

    #[test]
    fn test_strings_filling_capacity_without_nul() {
        let filename = [b'a'; FILENAME_LEN];
        let mut raw = legacy_record(0, 0, &filename);
        put_bytes(&mut raw, offset_of!(OpenRecordLegacy, comm), &[b'c'; TASK_COMM_LEN]);
        let event = expect_open(decode_open(&raw, OpenLayout::Legacy));
        assert_eq!(event.filename.len(), FILENAME_LEN);
        assert_eq!(event.comm, "c".repeat(TASK_COMM_LEN));
    }

    #[test]
    fn test_garbage_after_nul_is_dropped() {
        let event = expect_open(decode_open(&legacy_record(0, 0, b"/a\0junk"), OpenLayout::Legacy));
        assert_eq!(event.filename, "/a");
    }

    #[test]
    fn test_decode_sync() {
        let event = decode_sync(&sync_record(b"sync")).unwrap();
        let DecodedEvent::Sync(event) = event else { panic!("expected sync event") };
        assert_eq!(event.comm, "sync");
        assert_eq!(event.pid, Pid(77));
        assert_eq!(event.uid, Uid(1000));
        assert_eq!(event.gid, 100);
        assert!(!event.login_uid.is_valid());
    }

    #[test]
    fn test_record_decoder_dispatches_on_kind() {
        let decoder = RecordDecoder::new(RecordKind::Sync, OpenLayout::Current);
        assert!(matches!(decoder.decode(&sync_record(b"x")), Ok(Some(DecodedEvent::Sync(_)))));

        let decoder = RecordDecoder::new(RecordKind::Open, OpenLayout::Legacy);
        assert!(matches!(
            decoder.decode(&legacy_record(0, 0, b"/x")),
            Ok(Some(DecodedEvent::Open(_)))
        ));
    }

    #[test]
    fn test_layout_for_kernel() {
        let threshold: KernelVersion = DEFAULT_LAYOUT_THRESHOLD.parse().unwrap();
        let old: KernelVersion = "5.4.0-150-generic".parse().unwrap();
        let new: KernelVersion = "6.8.0".parse().unwrap();
        assert_eq!(OpenLayout::for_kernel(&old, &threshold), OpenLayout::Legacy);
        assert_eq!(OpenLayout::for_kernel(&threshold, &threshold), OpenLayout::Current);
        assert_eq!(OpenLayout::for_kernel(&"5.9".parse::<KernelVersion>().unwrap(), &threshold), OpenLayout::Current);
        assert_eq!(OpenLayout::for_kernel(&new, &threshold), OpenLayout::Current);
        assert_eq!(OpenLayout::Legacy.record_size(), 120);
        assert_eq!(OpenLayout::Current.record_size(), 120);
    }

    #[test]
    fn test_fixed_policy_ignores_kernel() {
        assert_eq!(LayoutPolicy::Fixed(OpenLayout::Legacy).resolve(), OpenLayout::Legacy);
    }
}
