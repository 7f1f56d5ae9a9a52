//! Device profile loading and validation.
//!
//! A device profile is a TOML file describing one phone model:
//!
//! - `[device]`: model glob pattern plus display metadata
//! - `[apps]`: the extras installed when nobody picks interactively
//! - `[[packages]]`: packages to remove, in order
//!
//! Packages may carry a `conditional` tag. A conditional package is only
//! removed once a mid-run choice with the same tag resolves to true, e.g. the
//! stock camera is removed only when the user picks the replacement camera.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::catalog::AppsCatalog;
use crate::error::{ClearphoneError, Result};

/// Conditional tag used for the stock camera package.
pub const CAMERA_CONDITION: &str = "camera";

/// Resolved mid-run choices, keyed by conditional tag.
pub type ConditionalChoices = HashMap<String, bool>;

/// What to do with a package.
///
/// Only `Remove` is acted upon by the removal phase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageAction {
    #[default]
    Remove,
    Disable,
}

/// A package that should be removed from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageToRemove {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Who ships the package (Samsung, Google, carrier...)
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub action: PackageAction,
    #[serde(default)]
    pub conditional: Option<String>,
    #[serde(default)]
    pub removal_rationale: String,
}

/// Device identification from the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSpec {
    /// Glob matched against the device's reported model, e.g. `SM-S921*`
    pub model_pattern: String,
    pub name: String,
    pub android_version: String,
    pub maintainer: String,
}

/// Extras installed by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppsSelection {
    #[serde(default)]
    pub extras_free: Vec<String>,
    #[serde(default)]
    pub extras_non_free: Vec<String>,
}

/// Complete device profile parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub path: PathBuf,
    pub device: DeviceSpec,
    pub apps: AppsSelection,
    pub packages: Vec<PackageToRemove>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    model_pattern: Option<String>,
    name: Option<String>,
    android_version: Option<String>,
    maintainer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    device: Option<RawDevice>,
    #[serde(default)]
    apps: AppsSelection,
    #[serde(default)]
    packages: Vec<toml::Value>,
}

impl DeviceProfile {
    /// Packages to remove given the resolved conditional choices.
    ///
    /// Non-conditional `remove` packages are always included. A conditional
    /// package is included only when its tag maps to `true`. `disable`
    /// packages are never included.
    pub fn get_packages_to_remove(&self, choices: &ConditionalChoices) -> Vec<PackageToRemove> {
        self.packages
            .iter()
            .filter(|pkg| pkg.action == PackageAction::Remove)
            .filter(|pkg| match &pkg.conditional {
                None => true,
                Some(tag) => choices.get(tag).copied().unwrap_or(false),
            })
            .cloned()
            .collect()
    }

    /// Packages gated behind a conditional tag.
    pub fn conditional_packages(&self) -> Vec<&PackageToRemove> {
        self.packages
            .iter()
            .filter(|pkg| pkg.conditional.is_some())
            .collect()
    }

    pub fn has_camera_choice(&self) -> bool {
        self.stock_camera_package().is_some()
    }

    /// First package tagged with the camera condition.
    pub fn stock_camera_package(&self) -> Option<&PackageToRemove> {
        self.packages
            .iter()
            .find(|pkg| pkg.conditional.as_deref() == Some(CAMERA_CONDITION))
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            name: self.device.name.clone(),
            model_pattern: self.device.model_pattern.clone(),
            android_version: self.device.android_version.clone(),
            maintainer: self.device.maintainer.clone(),
            package_count: self.packages.len(),
            has_camera_choice: self.has_camera_choice(),
            extras_free: self.apps.extras_free.clone(),
            extras_non_free: self.apps.extras_non_free.clone(),
        }
    }
}

/// Display summary of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub model_pattern: String,
    pub android_version: String,
    pub maintainer: String,
    pub package_count: usize,
    pub has_camera_choice: bool,
    pub extras_free: Vec<String>,
    pub extras_non_free: Vec<String>,
}

/// Load a device profile from a TOML file.
pub fn load_profile(path: &Path) -> Result<DeviceProfile> {
    if !path.is_file() {
        return Err(ClearphoneError::ProfileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path)?;
    let profile = parse_profile(&content, path)?;
    info!(
        "Loaded profile {} ({} packages)",
        profile.device.name,
        profile.packages.len()
    );
    Ok(profile)
}

/// Parse profile TOML. `path` is only used for error reporting.
pub fn parse_profile(content: &str, path: &Path) -> Result<DeviceProfile> {
    let raw: RawProfile = toml::from_str(content)
        .map_err(|e: toml::de::Error| ClearphoneError::profile_parse(path, e.to_string()))?;

    let device = raw
        .device
        .ok_or_else(|| ClearphoneError::profile_parse(path, "Missing required [device] section"))?;

    let required = |value: Option<String>, field: &str| {
        value.ok_or_else(|| {
            ClearphoneError::profile_parse(
                path,
                format!("Missing required field: device.{}", field),
            )
        })
    };

    let device = DeviceSpec {
        model_pattern: required(device.model_pattern, "model_pattern")?,
        name: required(device.name, "name")?,
        android_version: required(device.android_version, "android_version")?,
        maintainer: required(device.maintainer, "maintainer")?,
    };

    let mut packages = Vec::with_capacity(raw.packages.len());
    for value in raw.packages {
        let has_id = value.get("id").is_some_and(toml::Value::is_str);
        if !has_id {
            return Err(ClearphoneError::profile_parse(
                path,
                "Package missing required 'id' field",
            ));
        }
        let pkg: PackageToRemove = value
            .try_into()
            .map_err(|e: toml::de::Error| ClearphoneError::profile_parse(path, e.to_string()))?;
        packages.push(pkg);
    }

    debug!(
        "Parsed profile {}: pattern={}, {} packages",
        path.display(),
        device.model_pattern,
        packages.len()
    );

    Ok(DeviceProfile {
        path: path.to_path_buf(),
        device,
        apps: raw.apps,
        packages,
    })
}

/// Check that every default extra in the profile exists in its partition.
///
/// Returns one message per missing id; empty means valid.
pub fn validate_profile_apps(profile: &DeviceProfile, catalog: &AppsCatalog) -> Vec<String> {
    let mut errors = Vec::new();

    for app_id in &profile.apps.extras_free {
        if catalog.free(app_id).is_none() {
            errors.push(format!("App '{}' not found in extras/free.toml", app_id));
        }
    }

    for app_id in &profile.apps.extras_non_free {
        if catalog.non_free(app_id).is_none() {
            errors.push(format!("App '{}' not found in extras/non-free.toml", app_id));
        }
    }

    errors
}
