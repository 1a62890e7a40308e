//! # aya-backed Instrumentation Objects
//!
//! Loads a compiled eBPF object with [`EbpfLoader`]. Opening creates the
//! object's maps; programs are only submitted to the verifier when the
//! lifecycle loads them, one by one, which is how autoload is expressed here.
//!
//! ## Supported Programs
//!
//! - **Tracepoint**: attached by `category/name`
//! - **Kprobe**: attached by kernel symbol at offset 0

use aya::maps::PerfEventArray;
use aya::programs::kprobe::KProbeLinkId;
use aya::programs::trace_point::TracePointLinkId;
use aya::programs::{KProbe, Program, ProgramError, TracePoint};
use aya::{Btf, Ebpf, EbpfLoader, Endianness, VerifierLogLevel};
use log::debug;
use std::path::Path;

use super::{InstrumentationUnit, OpenOptions, UnitOpener};
use crate::consumer::PerfChannel;
use crate::domain::LifecycleError;
use crate::target::AttachPoint;

/// Opens eBPF objects from ELF files on disk
#[derive(Debug, Default, Clone, Copy)]
pub struct AyaOpener;

impl UnitOpener for AyaOpener {
    type Unit = AyaUnit;

    fn open(&self, path: &Path, options: &OpenOptions) -> Result<AyaUnit, LifecycleError> {
        let open_error =
            |reason: String| LifecycleError::Open { path: path.to_path_buf(), reason };

        let btf = options
            .btf_path
            .as_deref()
            .map(|btf_path| {
                debug!("Using BTF from {}", btf_path.display());
                Btf::parse_file(btf_path, Endianness::default())
                    .map_err(|e| open_error(format!("BTF {}: {e}", btf_path.display())))
            })
            .transpose()?;

        let mut loader = EbpfLoader::new();
        if let Some(btf) = btf.as_ref() {
            loader.btf(Some(btf));
        }
        if options.verbose {
            loader.verifier_log_level(VerifierLogLevel::VERBOSE | VerifierLogLevel::STATS);
        }

        let ebpf = loader.load_file(path).map_err(|e| open_error(e.to_string()))?;
        Ok(AyaUnit { ebpf })
    }
}

/// An opened eBPF object
pub struct AyaUnit {
    ebpf: Ebpf,
}

/// Link of an attached program; the variant follows the program type
#[derive(Debug)]
pub enum AyaLink {
    TracePoint(TracePointLinkId),
    KProbe(KProbeLinkId),
}

impl AyaUnit {
    fn program_mut(&mut self, name: &str) -> Result<&mut Program, LifecycleError> {
        self.ebpf.program_mut(name).ok_or_else(|| LifecycleError::ProgramNotFound(name.to_string()))
    }
}

impl InstrumentationUnit for AyaUnit {
    type Link = AyaLink;
    type Channel = PerfChannel;

    fn program_names(&self) -> Vec<String> {
        self.ebpf.programs().map(|(name, _)| name.to_string()).collect()
    }

    fn map_names(&self) -> Vec<String> {
        self.ebpf.maps().map(|(name, _)| name.to_string()).collect()
    }

    fn has_program(&self, name: &str) -> bool {
        self.ebpf.program(name).is_some()
    }

    fn load_program(&mut self, name: &str) -> Result<(), LifecycleError> {
        let load_error =
            |reason: String| LifecycleError::Load { program: name.to_string(), reason };

        let result = match self.program_mut(name)? {
            Program::TracePoint(program) => program.load(),
            Program::KProbe(program) => program.load(),
            _ => {
                return Err(load_error(
                    "only tracepoint and kprobe programs are supported".to_string(),
                ))
            }
        };
        result.map_err(|e| load_error(e.to_string()))
    }

    fn attach_program(&mut self, name: &str, point: &AttachPoint) -> Result<AyaLink, LifecycleError> {
        let attach_error = |e: ProgramError| LifecycleError::Attach {
            program: name.to_string(),
            point: point.to_string(),
            reason: e.to_string(),
        };

        let program = self.program_mut(name)?;
        match point {
            AttachPoint::Tracepoint { category, name: event } => {
                let program: &mut TracePoint = program.try_into().map_err(attach_error)?;
                program.attach(category, event).map(AyaLink::TracePoint).map_err(attach_error)
            }
            AttachPoint::Kprobe { symbol } => {
                let program: &mut KProbe = program.try_into().map_err(attach_error)?;
                program.attach(symbol, 0).map(AyaLink::KProbe).map_err(attach_error)
            }
        }
    }

    fn detach_program(&mut self, name: &str, link: AyaLink) -> Result<(), LifecycleError> {
        let detach_error =
            |e: ProgramError| LifecycleError::Detach { program: name.to_string(), reason: e.to_string() };

        let program = self.program_mut(name)?;
        match link {
            AyaLink::TracePoint(id) => {
                let program: &mut TracePoint = program.try_into().map_err(detach_error)?;
                program.detach(id).map_err(detach_error)
            }
            AyaLink::KProbe(id) => {
                let program: &mut KProbe = program.try_into().map_err(detach_error)?;
                program.detach(id).map_err(detach_error)
            }
        }
    }

    fn take_channel(&mut self, name: &str) -> Result<PerfChannel, LifecycleError> {
        let map =
            self.ebpf.take_map(name).ok_or_else(|| LifecycleError::MapNotFound(name.to_string()))?;
        let array = PerfEventArray::try_from(map).map_err(|e| LifecycleError::MapKind {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(PerfChannel::new(array))
    }
}
