//! # Instrumentation Lifecycle
//!
//! Drives an instrumentation object through
//! `Closed → Opened → Loaded → Attached → Polling → Closed`.
//!
//! ## Rules
//!
//! - Programs and maps can only be looked up once the object is opened.
//! - Only programs picked with [`Lifecycle::select_program`] are loaded, so the
//!   verifier only sees the entry points this run needs.
//! - A failed open or load releases the object; there is no partial retry.
//! - A failed attach leaves the object loaded so the attach can be retried.
//! - [`Lifecycle::close`] detaches every link, then releases the object. It is
//!   idempotent and also runs on drop.
//!
//! The kernel side is reached through the [`UnitOpener`] and
//! [`InstrumentationUnit`] traits; [`aya_unit`] provides the production
//! implementation.

pub mod aya_unit;

use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::LifecycleError;
use crate::target::AttachPoint;

pub use aya_unit::{AyaOpener, AyaUnit};

/// Options for opening an instrumentation object
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Alternate BTF file for CO-RE relocations instead of the kernel's own
    pub btf_path: Option<PathBuf>,
    /// Ask the verifier for a verbose log
    pub verbose: bool,
}

/// Opens instrumentation objects from compiled artifacts
pub trait UnitOpener {
    type Unit: InstrumentationUnit;

    /// # Errors
    /// Returns [`LifecycleError::Open`] if the artifact is missing or malformed
    fn open(&self, path: &Path, options: &OpenOptions) -> Result<Self::Unit, LifecycleError>;
}

/// An opened instrumentation object
pub trait InstrumentationUnit {
    /// Handle of one attachment
    type Link;
    /// Consumable handle to a perf event array
    type Channel;

    fn program_names(&self) -> Vec<String>;
    fn map_names(&self) -> Vec<String>;
    fn has_program(&self, name: &str) -> bool;

    /// Submit one program to the verifier
    ///
    /// # Errors
    /// Returns [`LifecycleError::Load`] on verifier rejection or resource exhaustion
    fn load_program(&mut self, name: &str) -> Result<(), LifecycleError>;

    /// # Errors
    /// Returns [`LifecycleError::Attach`] if the hook cannot be bound
    fn attach_program(
        &mut self,
        name: &str,
        point: &AttachPoint,
    ) -> Result<Self::Link, LifecycleError>;

    /// # Errors
    /// Returns [`LifecycleError::Detach`] if the link cannot be released
    fn detach_program(&mut self, name: &str, link: Self::Link) -> Result<(), LifecycleError>;

    /// Take ownership of a map as an event channel
    ///
    /// # Errors
    /// Returns [`LifecycleError::MapNotFound`] or [`LifecycleError::MapKind`]
    fn take_channel(&mut self, name: &str) -> Result<Self::Channel, LifecycleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Closed,
    Opened,
    Loaded,
    Attached,
    Polling,
}

impl LifecycleState {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleState::Closed => "closed",
            LifecycleState::Opened => "opened",
            LifecycleState::Loaded => "loaded",
            LifecycleState::Attached => "attached",
            LifecycleState::Polling => "polling",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A program selected for loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    name: String,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Owns one instrumentation object for the whole session
pub struct Lifecycle<'a, O: UnitOpener> {
    opener: &'a O,
    unit: Option<O::Unit>,
    state: LifecycleState,
    autoload: BTreeSet<String>,
    links: Vec<(String, <O::Unit as InstrumentationUnit>::Link)>,
}

impl<'a, O: UnitOpener> Lifecycle<'a, O> {
    #[must_use]
    pub fn new(opener: &'a O) -> Self {
        Self {
            opener,
            unit: None,
            state: LifecycleState::Closed,
            autoload: BTreeSet::new(),
            links: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn attached_count(&self) -> usize {
        self.links.len()
    }

    /// Open a compiled instrumentation object
    ///
    /// # Errors
    /// Returns [`LifecycleError::Open`] if the artifact cannot be parsed, or
    /// [`LifecycleError::InvalidState`] if an object is already open
    pub fn open(&mut self, path: &Path, options: &OpenOptions) -> Result<(), LifecycleError> {
        self.expect_state("open", &[LifecycleState::Closed])?;

        let unit = self.opener.open(path, options)?;
        info!(
            "Opened {}: programs [{}], maps [{}]",
            path.display(),
            unit.program_names().join(", "),
            unit.map_names().join(", ")
        );

        self.unit = Some(unit);
        self.state = LifecycleState::Opened;
        Ok(())
    }

    pub fn program_names(&self) -> Vec<String> {
        self.unit.as_ref().map(InstrumentationUnit::program_names).unwrap_or_default()
    }

    pub fn map_names(&self) -> Vec<String> {
        self.unit.as_ref().map(InstrumentationUnit::map_names).unwrap_or_default()
    }

    /// Enable autoload for one program; every other program stays disabled
    ///
    /// # Errors
    /// Returns [`LifecycleError::ProgramNotFound`] if the object has no such
    /// program, or [`LifecycleError::InvalidState`] unless opened
    pub fn select_program(&mut self, name: &str) -> Result<Program, LifecycleError> {
        self.expect_state("select a program", &[LifecycleState::Opened])?;

        let unit = self.unit.as_ref().ok_or(LifecycleError::InvalidState {
            operation: "select a program",
            state: LifecycleState::Closed.name(),
        })?;
        if !unit.has_program(name) {
            return Err(LifecycleError::ProgramNotFound(name.to_string()));
        }

        self.autoload.insert(name.to_string());
        debug!("Autoload enabled for {name}");
        Ok(Program { name: name.to_string() })
    }

    /// Load every selected program
    ///
    /// On failure the object is released and the lifecycle is closed.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Load`] if any program fails to load or none
    /// was selected, or [`LifecycleError::InvalidState`] unless opened
    pub fn load(&mut self) -> Result<(), LifecycleError> {
        self.expect_state("load", &[LifecycleState::Opened])?;

        if let Err(e) = self.load_selected() {
            self.close();
            return Err(e);
        }

        self.state = LifecycleState::Loaded;
        Ok(())
    }

    fn load_selected(&mut self) -> Result<(), LifecycleError> {
        if self.autoload.is_empty() {
            return Err(LifecycleError::Load {
                program: "<none>".to_string(),
                reason: "no program selected for autoload".to_string(),
            });
        }

        let unit = self.unit.as_mut().ok_or(LifecycleError::InvalidState {
            operation: "load",
            state: LifecycleState::Closed.name(),
        })?;
        for name in &self.autoload {
            unit.load_program(name)?;
            info!("Loaded program {name}");
        }
        Ok(())
    }

    /// Attach a loaded program to its kernel hook
    ///
    /// Attaches are independent: a failure leaves the object loaded and
    /// earlier attachments in place.
    ///
    /// # Errors
    /// Returns [`LifecycleError::InvalidState`] before load, or
    /// [`LifecycleError::Attach`] if the program was not selected or the hook
    /// cannot be bound
    pub fn attach(&mut self, program: &Program, point: &AttachPoint) -> Result<(), LifecycleError> {
        self.expect_state("attach", &[LifecycleState::Loaded, LifecycleState::Attached])?;

        if !self.autoload.contains(program.name()) {
            return Err(LifecycleError::Attach {
                program: program.name().to_string(),
                point: point.to_string(),
                reason: "program was not selected for loading".to_string(),
            });
        }

        let unit = self.unit.as_mut().ok_or(LifecycleError::InvalidState {
            operation: "attach",
            state: LifecycleState::Closed.name(),
        })?;
        let link = unit.attach_program(program.name(), point)?;
        info!("Attached {} to {point}", program.name());

        self.links.push((program.name().to_string(), link));
        self.state = LifecycleState::Attached;
        Ok(())
    }

    /// Resolve a perf event array by name
    ///
    /// # Errors
    /// Returns [`LifecycleError::MapNotFound`] / [`LifecycleError::MapKind`],
    /// or [`LifecycleError::InvalidState`] when closed or already polling
    pub fn map(
        &mut self,
        name: &str,
    ) -> Result<<O::Unit as InstrumentationUnit>::Channel, LifecycleError> {
        self.expect_state(
            "resolve a map",
            &[LifecycleState::Opened, LifecycleState::Loaded, LifecycleState::Attached],
        )?;

        let unit = self.unit.as_mut().ok_or(LifecycleError::InvalidState {
            operation: "resolve a map",
            state: LifecycleState::Closed.name(),
        })?;
        let channel = unit.take_channel(name)?;
        debug!("Resolved event channel {name}");
        Ok(channel)
    }

    /// Hand the attached object over to the poll loop
    ///
    /// # Errors
    /// Returns [`LifecycleError::InvalidState`] unless attached
    pub fn start_polling(&mut self) -> Result<(), LifecycleError> {
        self.expect_state("start polling", &[LifecycleState::Attached])?;
        self.state = LifecycleState::Polling;
        Ok(())
    }

    /// Detach everything, then release the object
    ///
    /// Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        if let Some(unit) = self.unit.as_mut() {
            for (name, link) in self.links.drain(..).rev() {
                match unit.detach_program(&name, link) {
                    Ok(()) => debug!("Detached {name}"),
                    Err(e) => warn!("{e}"),
                }
            }
        }

        if self.unit.take().is_some() {
            info!("Closed instrumentation object");
        }

        self.autoload.clear();
        self.state = LifecycleState::Closed;
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[LifecycleState],
    ) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState { operation, state: self.state.name() })
        }
    }
}

impl<O: UnitOpener> Drop for Lifecycle<'_, O> {
    fn drop(&mut self) {
        self.close();
    }
}
