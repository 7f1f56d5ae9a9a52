//! Workflow phase state machine.
//!
//! The configuration run walks eight phases strictly in order. The
//! [`PhaseTracker`] owns the current position and refuses any transition
//! other than "start the next phase", so a phase can never be skipped or
//! revisited.
//!
//! ```text
//! (not started)
//!     ↓
//! LoadProfile → LoadCatalog → ConnectDevice → ValidateDevice
//!     ↓
//! CameraChoice → ExtrasSelection → RemovePackages → InstallApps
//!     ↓
//! (finished)
//!
//! (a started phase can fail; nothing follows a failure)
//! ```

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Number of phases in a configuration run.
pub const TOTAL_PHASES: u8 = 8;

/// The eight workflow phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Phase {
    /// Parse the device profile
    LoadProfile = 1,
    /// Parse the apps catalog and cross-check the profile's extras
    LoadCatalog = 2,
    ConnectDevice = 3,
    /// Match the device model against the profile pattern
    ValidateDevice = 4,
    /// Stock or replacement camera. Only a boundary when the profile has no camera package
    CameraChoice = 5,
    ExtrasSelection = 6,
    RemovePackages = 7,
    /// Download, install, then assign default roles
    InstallApps = 8,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Self::LoadProfile,
        Self::LoadCatalog,
        Self::ConnectDevice,
        Self::ValidateDevice,
        Self::CameraChoice,
        Self::ExtrasSelection,
        Self::RemovePackages,
        Self::InstallApps,
    ];

    /// 1-based position.
    #[inline]
    pub const fn number(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::LoadProfile => "Loading profile",
            Self::LoadCatalog => "Loading apps catalog",
            Self::ConnectDevice => "Connecting to device",
            Self::ValidateDevice => "Validating device",
            Self::CameraChoice => "Camera choice",
            Self::ExtrasSelection => "Selecting extra apps",
            Self::RemovePackages => "Removing packages",
            Self::InstallApps => "Installing apps",
        }
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::LoadProfile => Some(Self::LoadCatalog),
            Self::LoadCatalog => Some(Self::ConnectDevice),
            Self::ConnectDevice => Some(Self::ValidateDevice),
            Self::ValidateDevice => Some(Self::CameraChoice),
            Self::CameraChoice => Some(Self::ExtrasSelection),
            Self::ExtrasSelection => Some(Self::RemovePackages),
            Self::RemovePackages => Some(Self::InstallApps),
            Self::InstallApps => None,
        }
    }

    /// True once this phase has run, the device may have been changed.
    pub const fn mutates_device(self) -> bool {
        matches!(self, Self::RemovePackages | Self::InstallApps)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Rejected phase transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransitionError {
    #[error("Cannot start {to} after {} (phases run strictly in order)", from.map_or("the beginning", Phase::name))]
    OutOfOrder { from: Option<Phase>, to: Phase },

    #[error("Cannot start {to} while {current} is still running")]
    StillRunning { current: Phase, to: Phase },

    #[error("No phase is running")]
    NotRunning,

    #[error("Workflow already failed at {at}")]
    AlreadyFailed { at: Phase },
}

/// Tracks the position of one run in the phase sequence.
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    /// Last phase started
    current: Option<Phase>,
    running: bool,
    completed: Vec<Phase>,
    failed_at: Option<Phase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `phase`, which must directly follow the last completed one.
    pub fn begin(&mut self, phase: Phase) -> Result<(), PhaseTransitionError> {
        if let Some(at) = self.failed_at {
            return Err(PhaseTransitionError::AlreadyFailed { at });
        }
        if let (true, Some(current)) = (self.running, self.current) {
            return Err(PhaseTransitionError::StillRunning { current, to: phase });
        }
        let expected = match self.current {
            None => Some(Phase::LoadProfile),
            Some(last) => last.next(),
        };
        if expected != Some(phase) {
            return Err(PhaseTransitionError::OutOfOrder {
                from: self.current,
                to: phase,
            });
        }
        self.current = Some(phase);
        self.running = true;
        Ok(())
    }

    /// Finish the running phase.
    pub fn complete(&mut self) -> Result<Phase, PhaseTransitionError> {
        match (self.running, self.current) {
            (true, Some(phase)) => {
                self.running = false;
                self.completed.push(phase);
                Ok(phase)
            }
            _ => Err(PhaseTransitionError::NotRunning),
        }
    }

    /// Record a failure in the running phase. Returns the failed phase.
    ///
    /// Failing before any phase started records nothing.
    pub fn fail(&mut self) -> Option<Phase> {
        if self.failed_at.is_none() && self.running {
            self.failed_at = self.current;
            self.running = false;
        }
        self.failed_at
    }

    #[inline]
    pub fn current(&self) -> Option<Phase> {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<Phase> {
        self.failed_at
    }

    pub fn completed(&self) -> &[Phase] {
        &self.completed
    }

    /// True once every phase has completed.
    pub fn is_finished(&self) -> bool {
        self.completed.len() == Phase::ALL.len()
    }
}
