//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::decode::{LayoutPolicy, OpenLayout, DEFAULT_LAYOUT_THRESHOLD};
use crate::kernel::KernelVersion;
use crate::lifecycle::OpenOptions;
use crate::orchestrator::TraceConfig;
use crate::target::TraceTarget;

#[derive(Parser, Debug)]
#[command(
    name = "snoop",
    version,
    about = "Trace file opens and sync calls with eBPF",
    after_help = "\
EXAMPLES:
    sudo snoop                                  Trace openat(2) with ./example.bpf.o
    sudo snoop -t sync --json                   Trace sync(2) as JSON lines
    sudo snoop -o build/example.bpf.o --btf /sys/kernel/btf/vmlinux"
)]
pub struct Args {
    /// Debug logging and a verbose verifier log
    #[arg(short, long)]
    pub verbose: bool,

    /// Compiled instrumentation object
    #[arg(short, long, value_name = "PATH", default_value = "example.bpf.o")]
    pub object: PathBuf,

    /// BTF file used for CO-RE relocations instead of the kernel's
    #[arg(long, value_name = "PATH", env = "EXAMPLE_BTF_FILE")]
    pub btf: Option<PathBuf>,

    /// What to trace
    #[arg(short, long, value_enum, default_value_t = TraceTarget::Openat)]
    pub target: TraceTarget,

    /// Perf buffer pages per CPU (power of two)
    #[arg(long, default_value_t = 16)]
    pub pages: usize,

    /// Upper bound on one poll wait, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 100)]
    pub poll_timeout_ms: u64,

    /// Open record layout
    #[arg(long, value_enum, default_value_t = LayoutArg::Auto)]
    pub layout: LayoutArg,

    /// First kernel release whose open records carry open_how (with --layout auto)
    #[arg(long, value_name = "RELEASE", default_value = DEFAULT_LAYOUT_THRESHOLD)]
    pub layout_threshold: KernelVersion,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// Pick by comparing the running kernel with --layout-threshold
    Auto,
    /// Raw flags and mode words
    Legacy,
    /// Flags and mode read from `open_how`
    Current,
}

impl Args {
    pub fn trace_config(&self) -> TraceConfig {
        let layout = match self.layout {
            LayoutArg::Auto => LayoutPolicy::Auto { threshold: self.layout_threshold.clone() },
            LayoutArg::Legacy => LayoutPolicy::Fixed(OpenLayout::Legacy),
            LayoutArg::Current => LayoutPolicy::Fixed(OpenLayout::Current),
        };

        TraceConfig {
            object: self.object.clone(),
            open: OpenOptions { btf_path: self.btf.clone(), verbose: self.verbose },
            target: self.target,
            page_count: self.pages,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            layout,
        }
    }
}
