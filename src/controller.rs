//! Entry point for user interfaces.
//!
//! The controller knows the project root and builds everything a UI needs
//! from it: profile listings, profile summaries, configured workflows and
//! the browser / Play Store toggles. It does not own the device transport;
//! the caller connects nothing up front and closes the transport when done.

use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use tracing::{info, warn};

use crate::catalog::load_apps_catalog;
use crate::config::{self, APPS_DIR, PROFILES_DIR};
use crate::device::{DeviceInfo, DeviceTransport};
use crate::downloader::{Downloader, download_app};
use crate::error::{ClearphoneError, Result};
use crate::events::{Event, EventKind, EventPayload, EventSink};
use crate::installer::AppInstaller;
use crate::profile::{ProfileSummary, load_profile};
use crate::workflow::{ConfigurationWorkflow, WorkflowConfig, WorkflowResult};

/// Catalog id (free partition) of the optional browser.
pub const BROWSER_APP_ID: &str = "browser";
/// Google Play Store package.
pub const PLAY_STORE_PACKAGE: &str = "com.android.vending";

/// Options for a configuration run, as a UI collects them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureOptions {
    /// Absolute, or relative to the project root / `device-profiles`
    pub profile: PathBuf,
    pub dry_run: bool,
    /// Consult checkpoint callbacks instead of defaults
    pub interactive: bool,
    pub download_dir: Option<PathBuf>,
}

/// Result of a single toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleReport {
    pub success: bool,
    pub message: String,
}

impl ToggleReport {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Phone-wide presets built from the two toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum PhoneMode {
    /// Browser removed, Play Store disabled
    Clearphone,
    /// Browser installed, Play Store enabled
    Smartphone,
}

pub struct ConfigurationController {
    root: PathBuf,
}

impl ConfigurationController {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Missing project directories, one message each.
    pub fn check_prerequisites(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let apps_dir = self.root.join(APPS_DIR);
        if !apps_dir.is_dir() {
            errors.push(format!("Apps catalog not found at {}", apps_dir.display()));
        }

        let profiles_dir = self.root.join(PROFILES_DIR);
        if !profiles_dir.is_dir() {
            errors.push(format!(
                "Device profiles directory not found at {}",
                profiles_dir.display()
            ));
        }

        errors
    }

    /// Sorted `*.toml` files in `device-profiles/`. Empty if the directory is missing.
    pub fn list_profiles(&self) -> Result<Vec<PathBuf>> {
        let profiles_dir = self.root.join(PROFILES_DIR);
        if !profiles_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut profiles = Vec::new();
        for entry in fs::read_dir(&profiles_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                profiles.push(path);
            }
        }
        profiles.sort();
        Ok(profiles)
    }

    pub fn resolve_profile(&self, profile: &Path) -> PathBuf {
        config::resolve_profile_path(&self.root, profile)
    }

    pub fn profile_summary(&self, profile: &Path) -> Result<ProfileSummary> {
        Ok(load_profile(&self.resolve_profile(profile))?.summary())
    }

    pub fn workflow_config(&self, options: &ConfigureOptions) -> WorkflowConfig {
        WorkflowConfig {
            profile_path: self.resolve_profile(&options.profile),
            project_root: self.root.clone(),
            dry_run: options.dry_run,
            non_interactive: !options.interactive,
            download_dir: options.download_dir.clone(),
        }
    }

    /// Build a workflow for `options`. Attach checkpoint callbacks before running it.
    pub fn workflow<'a>(
        &self,
        options: &ConfigureOptions,
        device: &'a mut dyn DeviceTransport,
        downloader: &'a mut dyn Downloader,
    ) -> ConfigurationWorkflow<'a> {
        ConfigurationWorkflow::new(self.workflow_config(options), device, downloader)
    }

    /// Run a configuration with default checkpoint decisions.
    pub fn configure(
        &self,
        options: &ConfigureOptions,
        device: &mut dyn DeviceTransport,
        downloader: &mut dyn Downloader,
        sink: &mut dyn EventSink,
    ) -> WorkflowResult {
        self.workflow(options, device, downloader).execute(sink)
    }

    /// Install (`enabled`) or uninstall the catalog browser.
    pub fn set_browser(
        &self,
        enabled: bool,
        dry_run: bool,
        device: &mut dyn DeviceTransport,
        downloader: &mut dyn Downloader,
        sink: &mut dyn EventSink,
    ) -> Result<ToggleReport> {
        ensure_connected(device, sink)?;

        let catalog = load_apps_catalog(&self.root)?;
        let browser = catalog
            .free(BROWSER_APP_ID)
            .ok_or_else(|| ClearphoneError::app_not_found(BROWSER_APP_ID, "extras_free"))?
            .clone();

        if enabled {
            let Some(apk) = download_app(downloader, &browser, sink) else {
                return Ok(ToggleReport::failed(format!(
                    "Could not download {}",
                    browser.name
                )));
            };
            let summary = AppInstaller::new(&*device, dry_run)
                .install_apps(&[(browser.clone(), apk)], sink)?;
            return Ok(if summary.installed == 1 {
                ToggleReport::ok(format!("{} enabled", browser.name))
            } else {
                ToggleReport::failed(format!("Failed to install {}", browser.name))
            });
        }

        sink.emit(Event::package(
            EventKind::PackageRemovalStarted,
            format!("Removing: {}", browser.name),
            &browser.package_id,
            &browser.name,
            "",
        ));
        if dry_run {
            sink.emit(Event::package(
                EventKind::PackageRemoved,
                format!("Would remove: {} (dry run)", browser.name),
                &browser.package_id,
                &browser.name,
                "",
            ));
            return Ok(ToggleReport::ok(format!("{} disabled", browser.name)));
        }

        let output = device.uninstall(&browser.package_id)?;
        if output.success || output.contains_marker("success") {
            sink.emit(Event::package(
                EventKind::PackageRemoved,
                format!("Removed: {}", browser.name),
                &browser.package_id,
                &browser.name,
                "",
            ));
            Ok(ToggleReport::ok(format!("{} disabled", browser.name)))
        } else {
            // Usually means the browser was never installed
            warn!("Uninstall of {} failed: {}", browser.package_id, output.error_text());
            sink.emit(Event::package(
                EventKind::PackageRemovalFailed,
                format!("Failed to remove: {}", browser.name),
                &browser.package_id,
                &browser.name,
                format!("{} may not be installed", browser.name),
            ));
            Ok(ToggleReport::failed(format!(
                "{} may not be installed",
                browser.name
            )))
        }
    }

    /// Enable or disable the Play Store for user 0.
    pub fn set_play_store(
        &self,
        enabled: bool,
        dry_run: bool,
        device: &mut dyn DeviceTransport,
        sink: &mut dyn EventSink,
    ) -> Result<ToggleReport> {
        ensure_connected(device, sink)?;
        let verb = if enabled { "enable" } else { "disable" };

        if dry_run {
            return Ok(ToggleReport::ok(format!(
                "Would {} {} (dry run)",
                verb, PLAY_STORE_PACKAGE
            )));
        }

        let output = if enabled {
            device.enable(PLAY_STORE_PACKAGE)?
        } else {
            device.disable(PLAY_STORE_PACKAGE)?
        };

        if output.success {
            info!("Play Store {}d", verb);
            Ok(ToggleReport::ok(format!("Play Store {}d", verb)))
        } else {
            let message = format!("Could not {} Play Store: {}", verb, output.error_text());
            warn!("{}", message);
            sink.emit(Event::bare(EventKind::Warning, message.clone()));
            Ok(ToggleReport::failed(message))
        }
    }

    /// Apply a preset: browser first, then Play Store.
    pub fn set_mode(
        &self,
        mode: PhoneMode,
        dry_run: bool,
        device: &mut dyn DeviceTransport,
        downloader: &mut dyn Downloader,
        sink: &mut dyn EventSink,
    ) -> Result<Vec<ToggleReport>> {
        let enabled = mode == PhoneMode::Smartphone;
        info!("Switching to {} mode", mode);
        Ok(vec![
            self.set_browser(enabled, dry_run, device, downloader, sink)?,
            self.set_play_store(enabled, dry_run, device, sink)?,
        ])
    }
}

/// Connect unless the transport already has a session.
fn ensure_connected(
    device: &mut dyn DeviceTransport,
    sink: &mut dyn EventSink,
) -> Result<DeviceInfo> {
    if let Some(info) = device.device_info() {
        return Ok(info.clone());
    }
    let info = device.connect()?;
    sink.emit(Event::new(
        EventKind::DeviceConnected,
        format!("Connected to {} {}", info.manufacturer, info.model),
        EventPayload::Device {
            serial: info.serial.clone(),
            model: info.model.clone(),
            android_version: info.android_version.clone(),
            manufacturer: info.manufacturer.clone(),
        },
    ));
    Ok(info)
}
