//! Configuration workflow orchestration.
//!
//! [`ConfigurationWorkflow`] drives one configuration run through the eight
//! phases in [`Phase`] order. Progress is pushed to an [`EventSink`] as it
//! happens; the [`WorkflowResult`] is returned once the run ends.
//!
//! # Failure policy
//!
//! - A [`ClearphoneError`] raised by any phase is fatal. The run stops, the
//!   result is marked failed and a single `WORKFLOW_FAILED` event closes the
//!   stream.
//! - Per-item failures (a package that will not uninstall, a download or
//!   install that fails, a role that cannot be set) are events plus counters.
//!   They never stop the run.
//!
//! The workflow never closes the device transport; that belongs to whoever
//! created it.

mod phase;

pub use phase::{Phase, PhaseTracker, PhaseTransitionError, TOTAL_PHASES};

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::catalog::{AppDefinition, AppsCatalog, load_apps_catalog};
use crate::device::{DeviceInfo, DeviceTransport, model_matches};
use crate::downloader::{Downloader, download_app};
use crate::error::{ClearphoneError, Result};
use crate::events::{Event, EventKind, EventPayload, EventSink};
use crate::installer::{AppInstaller, role_assignments};
use crate::profile::{
    CAMERA_CONDITION, ConditionalChoices, DeviceProfile, load_profile, validate_profile_apps,
};
use crate::remover::PackageRemover;

/// Catalog id (free partition) of the replacement camera.
pub const REPLACEMENT_CAMERA_ID: &str = "camera";
/// Shown when the catalog has no replacement camera entry.
pub const REPLACEMENT_CAMERA_NAME: &str = "Fossify Camera";

/// Inputs for one configuration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub profile_path: PathBuf,
    /// Directory holding `apps/` and the default `downloads/`
    pub project_root: PathBuf,
    /// Skip every device-mutating call and report synthetic success
    pub dry_run: bool,
    /// Ignore checkpoint callbacks and use defaults
    pub non_interactive: bool,
    pub download_dir: Option<PathBuf>,
}

impl WorkflowConfig {
    pub fn new(profile_path: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            profile_path: profile_path.into(),
            project_root: project_root.into(),
            dry_run: false,
            non_interactive: false,
            download_dir: None,
        }
    }

    /// Explicit download directory, else `<root>/downloads`.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| self.project_root.join("downloads"))
    }
}

/// Resolved camera decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraChoice {
    /// Keep the vendor camera
    Stock,
    /// Remove the vendor camera and install the replacement
    #[serde(rename = "fossify")]
    Replacement,
}

impl fmt::Display for CameraChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stock => write!(f, "stock"),
            Self::Replacement => write!(f, "fossify"),
        }
    }
}

/// Decisions collected at the two checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserChoices {
    /// `None` until phase 5 resolves it, and stays `None` when skipped
    pub camera_choice: Option<CameraChoice>,
    pub selected_extras_free: Vec<String>,
    pub selected_extras_non_free: Vec<String>,
}

impl UserChoices {
    /// Conditional-tag map consumed by package filtering.
    pub fn conditional_choices(&self) -> ConditionalChoices {
        let mut choices = ConditionalChoices::new();
        if self.camera_choice == Some(CameraChoice::Replacement) {
            choices.insert(CAMERA_CONDITION.to_string(), true);
        }
        choices
    }
}

/// Final aggregate of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowResult {
    pub packages_removed: usize,
    pub packages_skipped: usize,
    pub packages_failed: usize,
    pub apps_installed: usize,
    /// Installer-stage failures only
    pub apps_failed: usize,
    /// Apps dropped because their download failed
    pub apps_download_failed: usize,
    pub success: bool,
    pub error_message: String,
    pub error_suggestion: Option<String>,
    pub failed_phase: Option<Phase>,
}

impl Default for WorkflowResult {
    fn default() -> Self {
        Self {
            packages_removed: 0,
            packages_skipped: 0,
            packages_failed: 0,
            apps_installed: 0,
            apps_failed: 0,
            apps_download_failed: 0,
            success: true,
            error_message: String::new(),
            error_suggestion: None,
            failed_phase: None,
        }
    }
}

/// Camera checkpoint: `(stock_name, stock_package) -> choice`.
pub type CameraChoiceCallback<'a> = Box<dyn FnMut(&str, &str) -> CameraChoice + 'a>;

/// Extras checkpoint: `(free, non_free) -> (selected_free_ids, selected_non_free_ids)`.
pub type ExtrasChoiceCallback<'a> =
    Box<dyn FnMut(&[AppDefinition], &[AppDefinition]) -> (Vec<String>, Vec<String>) + 'a>;

/// The eight-phase configuration run.
pub struct ConfigurationWorkflow<'a> {
    config: WorkflowConfig,
    device: &'a mut dyn DeviceTransport,
    downloader: &'a mut dyn Downloader,
    camera_callback: Option<CameraChoiceCallback<'a>>,
    extras_callback: Option<ExtrasChoiceCallback<'a>>,
    tracker: PhaseTracker,
    choices: UserChoices,
    result: WorkflowResult,
    profile: Option<DeviceProfile>,
    catalog: Option<AppsCatalog>,
    device_info: Option<DeviceInfo>,
}

fn phase_event(kind: EventKind, phase: Phase) -> Event {
    let verb = if kind == EventKind::PhaseStarted {
        "Starting"
    } else {
        "Completed"
    };
    Event::new(
        kind,
        format!("{}: {}", verb, phase.name()),
        EventPayload::Phase {
            phase_name: phase.name().to_string(),
            phase_number: phase.number(),
            total_phases: TOTAL_PHASES,
        },
    )
}

fn device_event(kind: EventKind, message: String, info: &DeviceInfo) -> Event {
    Event::new(
        kind,
        message,
        EventPayload::Device {
            serial: info.serial.clone(),
            model: info.model.clone(),
            android_version: info.android_version.clone(),
            manufacturer: info.manufacturer.clone(),
        },
    )
}

impl<'a> ConfigurationWorkflow<'a> {
    pub fn new(
        config: WorkflowConfig,
        device: &'a mut dyn DeviceTransport,
        downloader: &'a mut dyn Downloader,
    ) -> Self {
        Self {
            config,
            device,
            downloader,
            camera_callback: None,
            extras_callback: None,
            tracker: PhaseTracker::new(),
            choices: UserChoices::default(),
            result: WorkflowResult::default(),
            profile: None,
            catalog: None,
            device_info: None,
        }
    }

    pub fn with_camera_callback(
        mut self,
        callback: impl FnMut(&str, &str) -> CameraChoice + 'a,
    ) -> Self {
        self.camera_callback = Some(Box::new(callback));
        self
    }

    pub fn with_extras_callback(
        mut self,
        callback: impl FnMut(&[AppDefinition], &[AppDefinition]) -> (Vec<String>, Vec<String>) + 'a,
    ) -> Self {
        self.extras_callback = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn choices(&self) -> &UserChoices {
        &self.choices
    }

    pub fn result(&self) -> &WorkflowResult {
        &self.result
    }

    pub fn tracker(&self) -> &PhaseTracker {
        &self.tracker
    }

    fn profile_name(&self) -> String {
        self.config.profile_path.display().to_string()
    }

    fn workflow_event(&self, kind: EventKind, message: impl Into<String>) -> Event {
        Event::new(
            kind,
            message,
            EventPayload::Workflow {
                profile_name: self.profile_name(),
                device_name: self
                    .device_info
                    .as_ref()
                    .map(|info| info.model.clone())
                    .unwrap_or_default(),
            },
        )
    }

    /// Run every phase and return the final result.
    ///
    /// The first event is always `WORKFLOW_STARTED` and the last is either
    /// `WORKFLOW_COMPLETED` or `WORKFLOW_FAILED`.
    pub fn execute(&mut self, sink: &mut dyn EventSink) -> WorkflowResult {
        info!("Starting configuration workflow for {}", self.profile_name());
        sink.emit(self.workflow_event(
            EventKind::WorkflowStarted,
            "Starting configuration workflow",
        ));

        match self.run_phases(sink) {
            Ok(()) => {
                self.result.success = true;
                info!("Configuration completed successfully");
                sink.emit(self.workflow_event(
                    EventKind::WorkflowCompleted,
                    "Configuration completed successfully",
                ));
            }
            Err(e) => {
                let failed_phase = self.tracker.fail();
                error!(
                    "Configuration failed in {}: {}",
                    failed_phase.map_or("setup", Phase::name),
                    e
                );
                self.result.success = false;
                self.result.error_message = e.message();
                self.result.error_suggestion = Some(e.suggestion());
                self.result.failed_phase = failed_phase;
                sink.emit(self.workflow_event(EventKind::WorkflowFailed, e.to_string()));
            }
        }

        self.result.clone()
    }

    fn run_phases(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.phase_load_profile(sink)?;
        self.phase_load_catalog(sink)?;
        self.phase_connect_device(sink)?;
        self.phase_validate_device(sink)?;
        self.phase_camera_choice(sink)?;
        self.phase_extras_selection(sink)?;
        self.phase_remove_packages(sink)?;
        self.phase_install_apps(sink)
    }

    fn begin(&mut self, phase: Phase, sink: &mut dyn EventSink) -> Result<()> {
        self.tracker
            .begin(phase)
            .map_err(|e| ClearphoneError::unexpected(e.to_string()))?;
        info!("Phase {}/{}: {}", phase.number(), TOTAL_PHASES, phase);
        sink.emit(phase_event(EventKind::PhaseStarted, phase));
        Ok(())
    }

    fn finish(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        let phase = self
            .tracker
            .complete()
            .map_err(|e| ClearphoneError::unexpected(e.to_string()))?;
        sink.emit(phase_event(EventKind::PhaseCompleted, phase));
        Ok(())
    }

    fn loaded_profile(&self) -> Result<&DeviceProfile> {
        self.profile
            .as_ref()
            .ok_or_else(|| ClearphoneError::unexpected("Profile not loaded"))
    }

    fn loaded_catalog(&self) -> Result<&AppsCatalog> {
        self.catalog
            .as_ref()
            .ok_or_else(|| ClearphoneError::unexpected("Catalog not loaded"))
    }

    fn phase_load_profile(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.begin(Phase::LoadProfile, sink)?;
        self.profile = Some(load_profile(&self.config.profile_path)?);
        self.finish(sink)
    }

    fn phase_load_catalog(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.begin(Phase::LoadCatalog, sink)?;
        let catalog = load_apps_catalog(&self.config.project_root)?;
        let errors = validate_profile_apps(self.loaded_profile()?, &catalog);
        if !errors.is_empty() {
            return Err(ClearphoneError::ProfileValidation { errors });
        }
        self.catalog = Some(catalog);
        self.finish(sink)
    }

    fn phase_connect_device(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.begin(Phase::ConnectDevice, sink)?;
        let info = self.device.connect()?;
        sink.emit(device_event(
            EventKind::DeviceConnected,
            format!("Connected to {} {}", info.manufacturer, info.model),
            &info,
        ));
        self.device_info = Some(info);
        self.finish(sink)
    }

    fn phase_validate_device(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.begin(Phase::ValidateDevice, sink)?;
        let profile = self.loaded_profile()?;
        let info = self
            .device_info
            .as_ref()
            .ok_or(ClearphoneError::NoDevice)?;

        if !model_matches(&profile.device.model_pattern, &info.model) {
            return Err(ClearphoneError::DeviceMismatch {
                expected_pattern: profile.device.model_pattern.clone(),
                expected_name: profile.device.name.clone(),
                actual_model: info.model.clone(),
            });
        }

        sink.emit(device_event(
            EventKind::DeviceValidated,
            format!("Device validated: {}", profile.device.name),
            info,
        ));
        self.finish(sink)
    }

    fn phase_camera_choice(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.begin(Phase::CameraChoice, sink)?;

        let Some(stock) = self.loaded_profile()?.stock_camera_package().cloned() else {
            return self.finish(sink);
        };
        let replacement_name = self
            .loaded_catalog()?
            .free(REPLACEMENT_CAMERA_ID)
            .map_or(REPLACEMENT_CAMERA_NAME.to_string(), |app| app.name.clone());

        let camera_event = |kind: EventKind, message: String, user_choice: String| {
            Event::new(
                kind,
                message,
                EventPayload::CameraChoice {
                    stock_camera_name: stock.name.clone(),
                    stock_camera_package: stock.id.clone(),
                    replacement_name: replacement_name.clone(),
                    user_choice,
                },
            )
        };

        sink.emit(camera_event(
            EventKind::CameraChoiceRequired,
            "Camera choice required".to_string(),
            String::new(),
        ));

        let choice = match (&mut self.camera_callback, self.config.non_interactive) {
            (_, true) | (None, false) => CameraChoice::Stock,
            (Some(callback), false) => callback(&stock.name, &stock.id),
        };
        self.choices.camera_choice = Some(choice);
        info!("Camera choice: {}", choice);

        sink.emit(camera_event(
            EventKind::CameraChoiceMade,
            format!("Camera choice: {}", choice),
            choice.to_string(),
        ));

        if choice == CameraChoice::Replacement
            && self.loaded_catalog()?.free(REPLACEMENT_CAMERA_ID).is_none()
        {
            warn!(
                "Replacement camera chosen but the catalog has no '{}' app",
                REPLACEMENT_CAMERA_ID
            );
            sink.emit(Event::bare(
                EventKind::Warning,
                format!(
                    "No '{}' app in extras/free.toml; the stock camera will be removed without a replacement",
                    REPLACEMENT_CAMERA_ID
                ),
            ));
        }

        self.finish(sink)
    }

    fn phase_extras_selection(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.begin(Phase::ExtrasSelection, sink)?;

        // Field borrows so the callback can be borrowed mutably alongside
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| ClearphoneError::unexpected("Profile not loaded"))?;
        let catalog = self
            .catalog
            .as_ref()
            .ok_or_else(|| ClearphoneError::unexpected("Catalog not loaded"))?;
        let free = catalog.all_free();
        let non_free = catalog.all_non_free();
        let available_free: Vec<String> = free.iter().map(|a| a.id.clone()).collect();
        let available_non_free: Vec<String> = non_free.iter().map(|a| a.id.clone()).collect();

        sink.emit(Event::new(
            EventKind::ExtrasSelectionRequired,
            "Extra apps selection required",
            EventPayload::ExtrasSelection {
                available_free: available_free.clone(),
                available_non_free: available_non_free.clone(),
                selected_free: Vec::new(),
                selected_non_free: Vec::new(),
            },
        ));

        let (selected_free, selected_non_free) =
            match (&mut self.extras_callback, self.config.non_interactive) {
                (Some(callback), false) => callback(free, non_free),
                _ => (
                    profile.apps.extras_free.clone(),
                    profile.apps.extras_non_free.clone(),
                ),
            };
        info!(
            "Extras selected: free={:?} non_free={:?}",
            selected_free, selected_non_free
        );

        sink.emit(Event::new(
            EventKind::ExtrasSelectionMade,
            "Extra apps selected",
            EventPayload::ExtrasSelection {
                available_free,
                available_non_free,
                selected_free: selected_free.clone(),
                selected_non_free: selected_non_free.clone(),
            },
        ));

        self.choices.selected_extras_free = selected_free;
        self.choices.selected_extras_non_free = selected_non_free;
        self.finish(sink)
    }

    fn phase_remove_packages(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.begin(Phase::RemovePackages, sink)?;

        let packages = self
            .loaded_profile()?
            .get_packages_to_remove(&self.choices.conditional_choices());
        let summary = PackageRemover::new(&*self.device, self.config.dry_run)
            .remove_packages(&packages, sink)?;

        self.result.packages_removed = summary.removed;
        self.result.packages_skipped = summary.skipped;
        self.result.packages_failed = summary.failed;
        self.finish(sink)
    }

    /// Core apps by priority, then the replacement camera when chosen, then
    /// the selected extras. Each app id appears once.
    fn installation_set(&self) -> Result<Vec<AppDefinition>> {
        let catalog = self.loaded_catalog()?;
        let mut apps = catalog.core_sorted();
        let mut seen: HashSet<String> = apps.iter().map(|app| app.id.clone()).collect();

        let mut extra = Vec::new();
        if self.choices.camera_choice == Some(CameraChoice::Replacement) {
            if let Some(camera) = catalog.free(REPLACEMENT_CAMERA_ID) {
                extra.push(camera.clone());
            }
        }
        extra.extend(catalog.resolve(
            &self.choices.selected_extras_free,
            &self.choices.selected_extras_non_free,
        )?);

        for app in extra {
            if seen.insert(app.id.clone()) {
                apps.push(app);
            } else {
                debug!("{} already in the installation set", app.id);
            }
        }
        Ok(apps)
    }

    fn phase_install_apps(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        self.begin(Phase::InstallApps, sink)?;

        let apps = self.installation_set()?;
        info!(
            "Installing {} apps (downloads into {})",
            apps.len(),
            self.config.download_dir().display()
        );

        let mut downloaded = Vec::with_capacity(apps.len());
        for app in &apps {
            match download_app(&mut *self.downloader, app, sink) {
                Some(path) => downloaded.push((app.clone(), path)),
                None => self.result.apps_download_failed += 1,
            }
        }

        let installer = AppInstaller::new(&*self.device, self.config.dry_run);
        let summary = installer.install_apps(&downloaded, sink)?;
        self.result.apps_installed = summary.installed;
        self.result.apps_failed = summary.failed;

        let installed = downloaded
            .iter()
            .map(|(app, _)| app)
            .filter(|app| summary.installed_ids.contains(&app.id));
        installer.set_default_apps(&role_assignments(installed), sink)?;

        self.finish(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_defaults_to_success() {
        let result = WorkflowResult::default();
        assert!(result.success);
        assert_eq!(result.packages_removed, 0);
        assert!(result.failed_phase.is_none());
    }

    #[test]
    fn test_conditional_choices_from_camera() {
        let mut choices = UserChoices::default();
        assert!(choices.conditional_choices().is_empty());
        choices.camera_choice = Some(CameraChoice::Stock);
        assert!(choices.conditional_choices().is_empty());
        choices.camera_choice = Some(CameraChoice::Replacement);
        assert_eq!(choices.conditional_choices().get(CAMERA_CONDITION), Some(&true));
    }

    #[test]
    fn test_camera_choice_strings() {
        assert_eq!(CameraChoice::Stock.to_string(), "stock");
        assert_eq!(CameraChoice::Replacement.to_string(), "fossify");
        assert_eq!(
            serde_json::to_value(CameraChoice::Replacement).unwrap(),
            "fossify"
        );
    }

    #[test]
    fn test_download_dir_default() {
        let mut config = WorkflowConfig::new("p.toml", "/srv/clearphone");
        assert_eq!(config.download_dir(), PathBuf::from("/srv/clearphone/downloads"));
        config.download_dir = Some(PathBuf::from("/tmp/apks"));
        assert_eq!(config.download_dir(), PathBuf::from("/tmp/apks"));
    }

    #[test]
    fn test_result_serializes_phase() {
        let result = WorkflowResult {
            success: false,
            failed_phase: Some(Phase::ValidateDevice),
            ..WorkflowResult::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["failed_phase"], "validate_device");
        assert_eq!(json["success"], false);
    }
}
