//! CPU utility functions
//!
//! Queries the online CPU list from the /sys filesystem.

use anyhow::{Context, Result};
use std::fs;

use crate::domain::CpuId;

const ONLINE_CPUS: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
pub fn online_cpus() -> Result<Vec<CpuId>> {
    let content =
        fs::read_to_string(ONLINE_CPUS).with_context(|| format!("Failed to read {ONLINE_CPUS}"))?;
    parse_cpu_list(&content)
}

/// Parse a kernel CPU list such as "0-3" or "0-3,8-11"
pub fn parse_cpu_list(content: &str) -> Result<Vec<CpuId>> {
    let mut cpus = Vec::new();

    for range in content.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse().with_context(|| format!("Bad CPU range {range:?}"))?;
            let end: u32 = end.parse().with_context(|| format!("Bad CPU range {range:?}"))?;
            cpus.extend((start..=end).map(CpuId));
        } else {
            let cpu: u32 = range.parse().with_context(|| format!("Bad CPU id {range:?}"))?;
            cpus.push(CpuId(cpu));
        }
    }

    if cpus.is_empty() {
        anyhow::bail!("Empty CPU list");
    }
    Ok(cpus)
}
