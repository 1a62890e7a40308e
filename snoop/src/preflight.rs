//! Pre-flight checks for snoop
//!
//! Prepares the process for loading eBPF objects and reports problems with
//! actionable messages before anything touches the kernel.

#![allow(unsafe_code)] // setrlimit() and geteuid() require unsafe

use anyhow::{Context, Result};
use log::{info, warn};
use std::io;

use crate::kernel::KernelVersion;

/// Run all pre-flight checks before eBPF loading
///
/// Only the memlock bump is fatal; the other checks warn.
pub fn run_preflight_checks() -> Result<()> {
    check_privileges();
    log_kernel_release();
    bump_memlock_rlimit()
}

/// Lift `RLIMIT_MEMLOCK` so maps and perf buffers can be locked in memory
///
/// Kernels before 5.11 charge BPF memory against this limit.
pub fn bump_memlock_rlimit() -> Result<()> {
    let rlim = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
    if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) } != 0 {
        return Err(io::Error::last_os_error())
            .context("Failed to increase RLIMIT_MEMLOCK limit (run as root or with CAP_SYS_RESOURCE)");
    }
    Ok(())
}

/// Warn when not running as root; returns whether the effective UID is 0
///
/// CAP_BPF and CAP_PERFMON may still be enough, so this is not fatal.
pub fn check_privileges() -> bool {
    let is_root = unsafe { libc::geteuid() } == 0;
    if !is_root {
        warn!("Not running as root: loading eBPF programs will likely fail (try sudo)");
    }
    is_root
}

fn log_kernel_release() {
    match KernelVersion::running() {
        Ok(release) => info!("Kernel release: {release}"),
        Err(e) => warn!("{e:#}"),
    }
}
