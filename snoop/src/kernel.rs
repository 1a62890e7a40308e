//! Kernel release parsing and comparison
//!
//! Releases look like `5.15.0-91-generic`, `6.1.0-arch1-1` or
//! `3.10.0-957.el7`. Only the leading numeric components take part in
//! comparisons: the string is split on `.`, `-` and `~` and parsing stops at
//! the first component that is not a number.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::domain::TraceError;

const OSRELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// A kernel release with its numeric components
#[derive(Debug, Clone)]
pub struct KernelVersion {
    release: String,
    parts: Vec<u32>,
}

impl KernelVersion {
    /// Release of the running kernel
    ///
    /// # Errors
    /// Returns an error if the release cannot be read or has no numeric prefix
    pub fn running() -> Result<Self> {
        let release = std::fs::read_to_string(OSRELEASE_PATH)
            .with_context(|| format!("Failed to read kernel release from {OSRELEASE_PATH}"))?;
        Ok(release.trim().parse()?)
    }

    pub fn parts(&self) -> &[u32] {
        &self.parts
    }
}

impl FromStr for KernelVersion {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(['.', '-', '~'])
            .map_while(|component| component.parse().ok())
            .collect();

        if parts.is_empty() {
            return Err(TraceError::KernelRelease(s.to_string()));
        }

        Ok(Self { release: s.to_string(), parts })
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.release)
    }
}

// Equality follows the numeric components: "3.10.0-957" == "3.10.0-957.el7"
impl PartialEq for KernelVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KernelVersion {}

impl PartialOrd for KernelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KernelVersion {
    // Missing components count as 0, as with KERNEL_VERSION(a, b, c)
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        let component = |parts: &[u32], i: usize| parts.get(i).copied().unwrap_or(0);
        (0..len)
            .map(|i| component(&self.parts, i).cmp(&component(&other.parts, i)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> KernelVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_distribution_releases() {
        assert_eq!(v("5.15.0-91-generic").parts(), &[5, 15, 0, 91]);
        assert_eq!(v("6.1.0-arch1-1").parts(), &[6, 1, 0]);
        assert_eq!(v("4.18.0~rc3").parts(), &[4, 18, 0]);
        assert_eq!(v("5.9").to_string(), "5.9");
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        assert!("generic".parse::<KernelVersion>().is_err());
        assert!("".parse::<KernelVersion>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        // Trailing distribution tags do not count
        assert_eq!(v("3.10.0-957"), v("3.10.0-957.el7"));
        assert!(v("3.10.0-956") < v("3.10.0-957.el7"));
        assert!(v("3.10.0-957") < v("3.10.0-957.100"));
    }

    #[test]
    fn test_layout_threshold_boundary() {
        let threshold = v("5.9.0");
        assert!(v("5.8.18-100.fc31.x86_64") < threshold);
        assert!(v("5.9.0-1-amd64") >= threshold);
        assert!(v("5.10.0") >= threshold);
        // Missing components are zero
        assert_eq!(v("5.9"), threshold);
        assert!(v("5") < threshold);
        assert!(v("6") > threshold);
    }

    #[test]
    fn test_running_kernel() {
        #[cfg(target_os = "linux")]
        {
            let running = KernelVersion::running().expect("Failed to read running kernel");
            assert!(running.parts()[0] >= 2);
        }
    }
}
