//! Shared fixtures for integration tests: a scripted device, a scripted
//! downloader and a throwaway project root.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use clearphone::downloader::{DownloadError, Downloader, Progress};
use clearphone::{
    AppDefinition, ClearphoneError, CommandOutput, DefaultRole, DeviceInfo, DeviceTransport,
};
use tempfile::TempDir;

// =============================================================================
// FakeDevice
// =============================================================================

/// In-memory device that records every call.
pub struct FakeDevice {
    pub info: DeviceInfo,
    /// Returned by `connect` instead of `info`
    pub connect_error: Option<fn() -> ClearphoneError>,
    pub installed: Vec<String>,
    /// package id -> stderr of a failing uninstall
    pub failing_uninstalls: HashMap<String, String>,
    /// package ids whose uninstall reports a lost device
    pub disconnect_on_uninstall: HashSet<String>,
    /// APK file stems that fail to install
    pub failing_installs: HashSet<String>,
    pub failing_roles: HashSet<DefaultRole>,
    pub disable_fails: bool,
    connected: Option<DeviceInfo>,
    calls: RefCell<Vec<String>>,
    pub closed: bool,
}

impl FakeDevice {
    pub fn new(model: &str) -> Self {
        Self {
            info: DeviceInfo {
                serial: "MOCK123456".to_string(),
                model: model.to_string(),
                android_version: "14".to_string(),
                manufacturer: "samsung".to_string(),
            },
            connect_error: None,
            installed: Vec::new(),
            failing_uninstalls: HashMap::new(),
            disconnect_on_uninstall: HashSet::new(),
            failing_installs: HashSet::new(),
            failing_roles: HashSet::new(),
            disable_fails: false,
            connected: None,
            calls: RefCell::new(Vec::new()),
            closed: false,
        }
    }

    /// Galaxy S24 with the fixture profile's packages installed.
    pub fn s24() -> Self {
        Self::new("SM-S921U").with_installed(&[
            "com.samsung.android.bixby.agent",
            "com.sec.android.app.camera",
            "com.facebook.katana",
        ])
    }

    pub fn with_installed(mut self, packages: &[&str]) -> Self {
        self.installed = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn failing_with(mut self, error: fn() -> ClearphoneError) -> Self {
        self.connect_error = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Calls that would change the device.
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| !c.starts_with("connect") && !c.starts_with("list_packages"))
            .cloned()
            .collect()
    }

    pub fn uninstalled(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| c.strip_prefix("uninstall:").map(str::to_string))
            .collect()
    }

    pub fn roles_set(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| c.strip_prefix("set_role:").map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl DeviceTransport for FakeDevice {
    fn connect(&mut self) -> clearphone::Result<DeviceInfo> {
        self.record("connect".to_string());
        if let Some(error) = self.connect_error {
            return Err(error());
        }
        self.connected = Some(self.info.clone());
        Ok(self.info.clone())
    }

    fn device_info(&self) -> Option<&DeviceInfo> {
        self.connected.as_ref()
    }

    fn list_packages(&self) -> clearphone::Result<Vec<String>> {
        self.record("list_packages".to_string());
        Ok(self.installed.clone())
    }

    fn uninstall(&self, package_id: &str) -> clearphone::Result<CommandOutput> {
        self.record(format!("uninstall:{}", package_id));
        if self.disconnect_on_uninstall.contains(package_id) {
            return Err(ClearphoneError::DeviceDisconnected);
        }
        Ok(match self.failing_uninstalls.get(package_id) {
            Some(stderr) => CommandOutput::failed(stderr.clone()),
            None => CommandOutput::ok("Success"),
        })
    }

    fn disable(&self, package_id: &str) -> clearphone::Result<CommandOutput> {
        self.record(format!("disable:{}", package_id));
        Ok(if self.disable_fails {
            CommandOutput::failed("Security exception: Shell cannot change component state")
        } else {
            CommandOutput::ok(format!("Package {} new state: disabled-user", package_id))
        })
    }

    fn enable(&self, package_id: &str) -> clearphone::Result<CommandOutput> {
        self.record(format!("enable:{}", package_id));
        Ok(CommandOutput::ok(format!("Package {} new state: enabled", package_id)))
    }

    fn install_apk(&self, apk_path: &Path) -> clearphone::Result<CommandOutput> {
        let stem = apk_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(format!("install:{}", stem));
        Ok(if self.failing_installs.contains(&stem) {
            CommandOutput::failed("Failure [INSTALL_FAILED_UPDATE_INCOMPATIBLE]")
        } else {
            CommandOutput::ok("Success")
        })
    }

    fn set_role(&self, role: DefaultRole, package_id: &str) -> clearphone::Result<CommandOutput> {
        self.record(format!("set_role:{}:{}", role, package_id));
        Ok(if self.failing_roles.contains(&role) {
            CommandOutput::failed("Role not available")
        } else {
            CommandOutput::ok("")
        })
    }

    fn close(&mut self) {
        self.closed = true;
        self.connected = None;
    }
}

// =============================================================================
// FakeDownloader
// =============================================================================

/// Downloader that never touches the network. Paths are `<dir>/<app id>.apk`.
pub struct FakeDownloader {
    dir: PathBuf,
    pub failing: HashSet<String>,
    pub fetched: Vec<String>,
}

impl FakeDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            failing: HashSet::new(),
            fetched: Vec::new(),
        }
    }

    pub fn failing_for(mut self, app_id: &str) -> Self {
        self.failing.insert(app_id.to_string());
        self
    }
}

impl Downloader for FakeDownloader {
    fn fetch(
        &mut self,
        app: &AppDefinition,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<PathBuf, DownloadError> {
        self.fetched.push(app.id.clone());
        if self.failing.contains(&app.id) {
            return Err(DownloadError::Http {
                url: format!("https://f-droid.org/repo/{}.apk", app.package_id),
                details: "404 Not Found".to_string(),
            });
        }
        let url = format!("https://f-droid.org/repo/{}.apk", app.package_id);
        progress(Progress {
            url: &url,
            downloaded: 50,
            total: Some(100),
        });
        progress(Progress {
            url: &url,
            downloaded: 100,
            total: Some(100),
        });
        Ok(self.dir.join(format!("{}.apk", app.id)))
    }
}

// =============================================================================
// Project fixture
// =============================================================================

pub const CORE_TOML: &str = r#"
[launcher]
package_id = "app.olauncher"
name = "Olauncher"
source = "fdroid"
fdroid_package_name = "app.olauncher"
installation_priority = 1

[gallery]
package_id = "org.fossify.gallery"
name = "Fossify Gallery"
fdroid_package_name = "org.fossify.gallery"

[dialer]
package_id = "org.fossify.phone"
name = "Fossify Phone"
fdroid_package_name = "org.fossify.phone"
installation_priority = 10

[keyboard]
package_id = "org.futo.inputmethod.latin"
name = "FUTO Keyboard"
source = "fdroid"
fdroid_package_name = "org.futo.inputmethod.latin"
installation_priority = 5
"#;

pub const FREE_TOML: &str = r#"
[camera]
package_id = "org.fossify.camera"
name = "Fossify Camera"
description = "Simple camera app"
fdroid_package_name = "org.fossify.camera"

[weather]
package_id = "org.breezyweather"
name = "Breezy Weather"
description = "Weather app"
fdroid_package_name = "org.breezyweather"

[browser]
package_id = "org.mozilla.fennec_fdroid"
name = "Fennec"
fdroid_package_name = "org.mozilla.fennec_fdroid"
"#;

pub const NON_FREE_TOML: &str = r#"
[signal]
package_id = "org.thoughtcrime.securesms"
name = "Signal"
source = "direct"
download_url = "https://example.invalid/signal.apk"
"#;

pub const PROFILE_TOML: &str = r#"
[device]
model_pattern = "SM-S921*"
name = "Samsung Galaxy S24"
android_version = "14"
maintainer = "test"

[apps]
extras_free = ["weather"]
extras_non_free = []

[[packages]]
id = "com.samsung.android.bixby.agent"
name = "Bixby Voice"
source = "Samsung"
function = "Voice assistant"
category = "vendor"
action = "remove"
removal_rationale = "Replaced by user's preferred apps"

[[packages]]
id = "com.sec.android.app.camera"
name = "Samsung Camera"
source = "Samsung"
function = "Camera"
category = "system"
action = "remove"
conditional = "camera"
removal_rationale = "Conditionally removed"
"#;

/// Temporary project root with a catalog and one profile (`test-s24.toml`).
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let project = Self::bare();
        project.write("apps/core.toml", CORE_TOML);
        project.write("apps/extras/free.toml", FREE_TOML);
        project.write("apps/extras/non-free.toml", NON_FREE_TOML);
        project.write("device-profiles/test-s24.toml", PROFILE_TOML);
        project
    }

    /// Empty directory.
    pub fn bare() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn profile_path(&self) -> PathBuf {
        self.root().join("device-profiles/test-s24.toml")
    }

    pub fn downloads(&self) -> PathBuf {
        self.root().join("downloads")
    }

    /// Write `content` at `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }
}
