//! Package removal with Knox protection and failure isolation.
//!
//! Every package in the input list ends in exactly one outcome, so the
//! returned counts always partition the input:
//! `removed + skipped + failed == packages.len()`.
//!
//! The installed-package snapshot is fetched once per remover and never
//! refreshed. A package removed earlier in a batch is still "installed" as
//! far as later lookups are concerned; batch entries are distinct ids so
//! this never changes an outcome.

use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::device::DeviceTransport;
use crate::error::{ClearphoneError, Result};
use crate::events::{Event, EventKind, EventSink};
use crate::profile::PackageToRemove;

/// Packages Samsung Knox blocks from removal without root.
pub const KNOX_PROTECTED_PACKAGES: &[&str] = &[
    "com.samsung.android.knox.analytics.uploader",
    "com.samsung.android.knox.attestation",
    "com.samsung.android.knox.containeragent",
    "com.samsung.android.knox.containercore",
    "com.samsung.android.knox.kpecore",
    "com.samsung.android.knox.pushmanager",
    "com.samsung.knox.securefolder",
    "com.sec.enterprise.knox.attestation",
    "com.sec.enterprise.knox.cloudmdm.smdms",
    "com.sec.knox.switcher",
    // Core services guarded by Knox
    "com.samsung.android.providers.context",
    "com.samsung.android.service.livedrawing",
];

pub fn is_knox_protected(package_id: &str) -> bool {
    KNOX_PROTECTED_PACKAGES.contains(&package_id)
}

/// Why a removal attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NotInstalled,
    DeviceAdmin,
    PermissionDenied,
    /// Anything else; carries the display text
    Other(String),
}

impl FailureReason {
    /// Classify raw device output into a reason.
    pub fn categorize(error_text: &str) -> Self {
        let lower = error_text.to_lowercase();
        if lower.contains("not installed") {
            Self::NotInstalled
        } else if lower.contains("device policy manager") || lower.contains("admin") {
            Self::DeviceAdmin
        } else if lower.contains("permission") {
            Self::PermissionDenied
        } else if lower.contains("failure") {
            Self::Other(format!("Uninstall failed: {}", error_text))
        } else if error_text.is_empty() {
            Self::Other("Unknown error".to_string())
        } else {
            Self::Other(error_text.to_string())
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => write!(f, "Package not installed"),
            Self::DeviceAdmin => write!(f, "Package is a device administrator"),
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::Other(text) => write!(f, "{}", text),
        }
    }
}

/// Final state of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    SkippedNotInstalled,
    SkippedProtected,
    Failed(FailureReason),
}

impl RemovalOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedNotInstalled | Self::SkippedProtected)
    }
}

/// Counts plus per-package outcomes, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<(String, RemovalOutcome)>,
}

impl RemovalSummary {
    fn record(&mut self, package_id: &str, outcome: RemovalOutcome) {
        match &outcome {
            RemovalOutcome::Removed => self.removed += 1,
            RemovalOutcome::Failed(_) => self.failed += 1,
            _ => self.skipped += 1,
        }
        self.outcomes.push((package_id.to_string(), outcome));
    }

    pub fn total(&self) -> usize {
        self.removed + self.skipped + self.failed
    }
}

/// Removes packages from a device, one at a time.
pub struct PackageRemover<'a> {
    device: &'a dyn DeviceTransport,
    dry_run: bool,
    installed: Option<HashSet<String>>,
}

impl<'a> PackageRemover<'a> {
    pub fn new(device: &'a dyn DeviceTransport, dry_run: bool) -> Self {
        Self {
            device,
            dry_run,
            installed: None,
        }
    }

    /// Installed-package snapshot, fetched on first use.
    fn take_snapshot(&mut self) -> Result<HashSet<String>> {
        if let Some(installed) = self.installed.take() {
            return Ok(installed);
        }
        let packages = self.device.list_packages()?;
        debug!("Installed package snapshot: {} packages", packages.len());
        Ok(packages.into_iter().collect())
    }

    /// Process every package in order.
    ///
    /// Only failing to read the installed-package list or losing the device
    /// is an error. Individual removal failures are reported as events and
    /// counted.
    pub fn remove_packages(
        &mut self,
        packages: &[PackageToRemove],
        sink: &mut dyn EventSink,
    ) -> Result<RemovalSummary> {
        let installed = self.take_snapshot()?;
        let mut summary = RemovalSummary::default();
        let mut aborted = None;

        for pkg in packages {
            match self.process(pkg, &installed, sink) {
                Ok(outcome) => summary.record(&pkg.id, outcome),
                Err(e) => {
                    aborted = Some(e);
                    break;
                }
            }
        }

        self.installed = Some(installed);
        if let Some(e) = aborted {
            return Err(e);
        }

        info!(
            "Package removal: {} removed, {} skipped, {} failed",
            summary.removed, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    fn process(
        &self,
        pkg: &PackageToRemove,
        installed: &HashSet<String>,
        sink: &mut dyn EventSink,
    ) -> Result<RemovalOutcome> {
        if !installed.contains(&pkg.id) {
            sink.emit(Event::package(
                EventKind::PackageNotInstalled,
                format!("Not installed: {}", pkg.name),
                &pkg.id,
                &pkg.name,
                "Package not found on device",
            ));
            return Ok(RemovalOutcome::SkippedNotInstalled);
        }

        if is_knox_protected(&pkg.id) {
            sink.emit(Event::package(
                EventKind::PackageRemovalSkipped,
                format!("Knox protected: {}", pkg.name),
                &pkg.id,
                &pkg.name,
                "Package is protected by Samsung Knox",
            ));
            return Ok(RemovalOutcome::SkippedProtected);
        }

        sink.emit(Event::package(
            EventKind::PackageRemovalStarted,
            format!("Removing: {}", pkg.name),
            &pkg.id,
            &pkg.name,
            "",
        ));

        if self.dry_run {
            sink.emit(Event::package(
                EventKind::PackageRemoved,
                format!("Would remove: {} (dry run)", pkg.name),
                &pkg.id,
                &pkg.name,
                "",
            ));
            return Ok(RemovalOutcome::Removed);
        }

        let reason = match self.device.uninstall(&pkg.id) {
            Ok(output) if output.success || output.contains_marker("success") => {
                sink.emit(Event::package(
                    EventKind::PackageRemoved,
                    format!("Removed: {}", pkg.name),
                    &pkg.id,
                    &pkg.name,
                    "",
                ));
                return Ok(RemovalOutcome::Removed);
            }
            Ok(output) => FailureReason::categorize(output.error_text()),
            Err(ClearphoneError::DeviceDisconnected) => {
                return Err(ClearphoneError::DeviceDisconnected);
            }
            Err(e) => FailureReason::categorize(&e.to_string()),
        };

        warn!("Failed to remove {}: {}", pkg.id, reason);
        sink.emit(Event::package(
            EventKind::PackageRemovalFailed,
            format!("Failed to remove: {}", pkg.name),
            &pkg.id,
            &pkg.name,
            reason.to_string(),
        ));
        Ok(RemovalOutcome::Failed(reason))
    }
}
